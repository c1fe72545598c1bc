//! TOML loading for schemas and relation specs.
//!
//! Schema files declare one `[types.<EntityType>]` table per entity type:
//!
//! ```toml
//! [types.Document]
//! fields = [
//!     { name = "title", kind = "string" },
//!     { name = "status", kind = "string" },
//! ]
//! relations = [
//!     { name = "line_items", kind = "one_to_many", target = "LineItem", back_reference = "document" },
//! ]
//! ```
//!
//! Spec files use the same layout:
//!
//! ```toml
//! [types.Document]
//! included_relations = ["line_items"]
//! excluded_fields = ["status"]
//! copy_defaults = { status = "draft" }
//! ```
//!
//! Defaults are written as plain TOML values and coerced to the declared
//! field kind.

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use amend_types::{EntityType, FieldKind, Value};

use crate::error::{ConfigResult, ConfigurationError};
use crate::schema::{EntitySchema, FieldDescriptor, RelationDescriptor, SchemaRegistry};
use crate::spec::{AmendmentSpec, RelationSpec};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaFile {
    #[serde(default)]
    types: BTreeMap<String, SchemaTable>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaTable {
    #[serde(default)]
    fields: Vec<FieldDescriptor>,
    #[serde(default)]
    relations: Vec<RelationDescriptor>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SpecFile {
    #[serde(default)]
    types: BTreeMap<String, SpecTable>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SpecTable {
    #[serde(default)]
    included_relations: Vec<String>,
    #[serde(default)]
    excluded_fields: Vec<String>,
    #[serde(default)]
    copy_defaults: BTreeMap<String, toml::Value>,
}

/// Parse and validate a schema registry from TOML text.
pub fn parse_schema(text: &str) -> ConfigResult<SchemaRegistry> {
    let file: SchemaFile =
        toml::from_str(text).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
    let mut registry = SchemaRegistry::new();
    for (name, table) in file.types {
        registry.register(EntitySchema {
            entity_type: EntityType::from(name),
            fields: table.fields,
            relations: table.relations,
        })?;
    }
    registry.validate()?;
    Ok(registry)
}

/// Parse a relation spec from TOML text and validate it against `schema`.
pub fn parse_spec(text: &str, schema: &SchemaRegistry) -> ConfigResult<AmendmentSpec> {
    let file: SpecFile =
        toml::from_str(text).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
    let mut spec = AmendmentSpec::new();
    for (name, table) in file.types {
        let entity_type = EntityType::from(name);
        let entity = schema.require(&entity_type)?;

        let mut relation_spec = RelationSpec {
            included_relations: table.included_relations.into_iter().collect(),
            excluded_fields: table.excluded_fields.into_iter().collect(),
            ..RelationSpec::default()
        };
        for (field, raw) in table.copy_defaults {
            let declared = entity
                .field(&field)
                .ok_or_else(|| ConfigurationError::UnknownField {
                    entity_type: entity_type.clone(),
                    field: field.clone(),
                })?;
            let value = coerce(declared.kind, &raw).ok_or_else(|| {
                ConfigurationError::DefaultKindMismatch {
                    entity_type: entity_type.clone(),
                    field: field.clone(),
                    expected: declared.kind,
                    found: raw.to_string(),
                }
            })?;
            relation_spec.copy_defaults.insert(field, value);
        }
        spec.insert(entity_type, relation_spec);
    }
    spec.validate(schema)?;
    Ok(spec)
}

/// Read and parse a schema file.
pub fn load_schema_file(path: &Path) -> ConfigResult<SchemaRegistry> {
    parse_schema(&read(path)?)
}

/// Read and parse a spec file.
pub fn load_spec_file(path: &Path, schema: &SchemaRegistry) -> ConfigResult<AmendmentSpec> {
    parse_spec(&read(path)?, schema)
}

fn read(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| ConfigurationError::Io(format!("{}: {e}", path.display())))
}

fn coerce(kind: FieldKind, raw: &toml::Value) -> Option<Value> {
    match (kind, raw) {
        (_, toml::Value::String(s)) => Value::parse(kind, s).ok(),
        (FieldKind::Integer, toml::Value::Integer(n)) => Some(Value::Integer(*n)),
        (FieldKind::Decimal, toml::Value::Integer(n)) => Some(Value::Decimal(Decimal::from(*n))),
        (FieldKind::Decimal, toml::Value::Float(f)) => Decimal::try_from(*f).ok().map(Value::Decimal),
        (FieldKind::Boolean, toml::Value::Boolean(b)) => Some(Value::Boolean(*b)),
        (FieldKind::Date | FieldKind::DateTime, toml::Value::Datetime(dt)) => {
            Value::parse(kind, &dt.to_string()).ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCHEMA: &str = r#"
[types.Document]
fields = [
    { name = "title", kind = "string" },
    { name = "status", kind = "string" },
    { name = "signed", kind = "date" },
    { name = "version", kind = "integer" },
]
relations = [
    { name = "line_items", kind = "one_to_many", target = "LineItem", back_reference = "document" },
    { name = "tags", kind = "many_to_many", target = "Tag" },
]

[types.LineItem]
fields = [{ name = "amount", kind = "decimal" }]
relations = [{ name = "document", kind = "many_to_one", target = "Document" }]

[types.Tag]
fields = [{ name = "label", kind = "string" }]
"#;

    #[test]
    fn schema_parses_and_validates() {
        let registry = parse_schema(SCHEMA).unwrap();
        assert_eq!(registry.len(), 3);
        let doc = registry.require(&"Document".into()).unwrap();
        assert_eq!(doc.field("signed").unwrap().kind, FieldKind::Date);
        assert_eq!(
            doc.relation_named("line_items").unwrap().back_reference.as_deref(),
            Some("document")
        );
    }

    #[test]
    fn schema_with_dangling_target_fails() {
        let text = r#"
[types.Document]
relations = [{ name = "owner", kind = "many_to_one", target = "User" }]
"#;
        assert!(matches!(
            parse_schema(text),
            Err(ConfigurationError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        assert!(matches!(
            parse_schema("[types.Document"),
            Err(ConfigurationError::Parse(_))
        ));
    }

    #[test]
    fn spec_coerces_defaults() {
        let registry = parse_schema(SCHEMA).unwrap();
        let text = r#"
[types.Document]
included_relations = ["line_items", "tags"]
excluded_fields = ["status", "signed", "version"]
copy_defaults = { status = "draft", signed = 2024-01-31, version = 0 }
"#;
        let spec = parse_spec(text, &registry).unwrap();
        let doc = spec.for_type(&"Document".into());
        assert!(doc.includes("tags"));
        assert_eq!(doc.copy_defaults["status"], Value::from("draft"));
        assert_eq!(
            doc.copy_defaults["signed"],
            Value::parse(FieldKind::Date, "2024-01-31").unwrap()
        );
        assert_eq!(doc.copy_defaults["version"], Value::Integer(0));
    }

    #[test]
    fn spec_rejects_uncoercible_default() {
        let registry = parse_schema(SCHEMA).unwrap();
        let text = r#"
[types.Document]
excluded_fields = ["version"]
copy_defaults = { version = true }
"#;
        assert!(matches!(
            parse_spec(text, &registry),
            Err(ConfigurationError::DefaultKindMismatch { expected: FieldKind::Integer, .. })
        ));
    }

    #[test]
    fn spec_rejects_unknown_relation() {
        let registry = parse_schema(SCHEMA).unwrap();
        let text = r#"
[types.Document]
included_relations = ["risks"]
"#;
        assert!(matches!(
            parse_spec(text, &registry),
            Err(ConfigurationError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn spec_rejects_unknown_keys() {
        let registry = parse_schema(SCHEMA).unwrap();
        let text = r#"
[types.Document]
include = ["line_items"]
"#;
        assert!(matches!(
            parse_spec(text, &registry),
            Err(ConfigurationError::Parse(_))
        ));
    }

    #[test]
    fn load_from_files() {
        let mut schema_file = tempfile::NamedTempFile::new().unwrap();
        schema_file.write_all(SCHEMA.as_bytes()).unwrap();
        let registry = load_schema_file(schema_file.path()).unwrap();

        let mut spec_file = tempfile::NamedTempFile::new().unwrap();
        spec_file
            .write_all(b"[types.Document]\nincluded_relations = [\"line_items\"]\n")
            .unwrap();
        let spec = load_spec_file(spec_file.path(), &registry).unwrap();
        assert!(spec.for_type(&"Document".into()).includes("line_items"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_schema_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigurationError::Io(_)));
    }
}
