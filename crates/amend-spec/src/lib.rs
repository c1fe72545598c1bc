//! Entity schemas and relation specifications for the amendment engine.
//!
//! The engine has no built-in knowledge of any entity shape. Everything it
//! needs is supplied here, once, at startup:
//!
//! - [`SchemaRegistry`] -- the introspection interface: for every entity
//!   type, its scalar fields and tagged relation descriptors.
//! - [`AmendmentSpec`] -- per entity type, which relations take part in
//!   copy/merge, which fields are excluded, and which defaults a fresh copy
//!   receives.
//!
//! Both are validated eagerly; a bad configuration is reported as a
//! [`ConfigurationError`] before any entity is touched.
//!
//! # Quick Start
//!
//! ```rust
//! use amend_spec::{AmendmentSpec, EntitySchema, RelationSpec, SchemaRegistry};
//! use amend_types::FieldKind;
//!
//! let mut schema = SchemaRegistry::new();
//! schema
//!     .register(
//!         EntitySchema::new("Document")
//!             .with_field("title", FieldKind::String)
//!             .with_field("status", FieldKind::String)
//!             .one_to_many("line_items", "LineItem", "document"),
//!     )
//!     .unwrap();
//! schema
//!     .register(
//!         EntitySchema::new("LineItem")
//!             .with_field("amount", FieldKind::Decimal)
//!             .many_to_one("document", "Document"),
//!     )
//!     .unwrap();
//! schema.validate().unwrap();
//!
//! let spec = AmendmentSpec::new().with(
//!     "Document",
//!     RelationSpec::new()
//!         .include("line_items")
//!         .exclude("status")
//!         .default_value("status", "draft"),
//! );
//! spec.validate(&schema).unwrap();
//! ```

pub mod error;
pub mod loader;
pub mod schema;
pub mod spec;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::{load_schema_file, load_spec_file, parse_schema, parse_spec};
pub use schema::{EntitySchema, FieldDescriptor, RelationDescriptor, RelationKind, SchemaRegistry};
pub use spec::{AmendmentSpec, RelationSpec};
