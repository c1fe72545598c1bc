use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context as _};
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use amend_engine::{ConflictReport, CopyOptions, MergeOutcome};
use amend_ledger::{InMemoryLedgerStore, LedgerEntry, LedgerStatus, RelationBaseline};
use amend_sdk::{Amendment, Amendments, SdkError};
use amend_spec::{load_schema_file, load_spec_file, AmendmentSpec, RelationKind, SchemaRegistry};
use amend_store::{EntityRecord, InMemoryEntityStore};
use amend_types::{AmendmentId, EntityId, EntityType, Value};

use crate::cli::*;
use crate::workspace::Workspace;

type Service<'a> = Amendments<'a, InMemoryEntityStore, InMemoryLedgerStore>;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let ctx = Context::load(&cli)?;
    match cli.command {
        Command::Check(_) => cmd_check(&ctx),
        Command::Copy(args) => cmd_copy(&ctx, args),
        Command::Merge(args) => cmd_merge(&ctx, args),
        Command::Cancel(args) => cmd_cancel(&ctx, args),
        Command::ShowLedger(args) => cmd_show_ledger(&ctx, args),
        Command::List(args) => cmd_list(&ctx, args),
    }
}

struct Context {
    schema: SchemaRegistry,
    spec: AmendmentSpec,
    workspace: PathBuf,
    format: OutputFormat,
}

impl Context {
    fn load(cli: &Cli) -> anyhow::Result<Self> {
        let schema = load_schema_file(&cli.schema)
            .with_context(|| format!("loading schema {}", cli.schema.display()))?;
        let spec = load_spec_file(&cli.spec, &schema)
            .with_context(|| format!("loading spec {}", cli.spec.display()))?;
        debug!(
            schema = %cli.schema.display(),
            spec = %cli.spec.display(),
            types = schema.len(),
            "configuration loaded"
        );
        Ok(Self {
            schema,
            spec,
            workspace: cli.workspace.clone(),
            format: cli.format,
        })
    }

    /// Run `body` against the workspace. With `persist`, the workspace is
    /// saved only if `body` succeeds.
    fn with_service<T>(
        &self,
        persist: bool,
        retain_copy: bool,
        body: impl FnOnce(&Service<'_>) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let mut session = Workspace::load(&self.workspace)?.open()?;
        let saved = std::mem::take(&mut session.amendments);
        // The flag covers this invocation only; the saved config is untouched.
        let mut config = session.config.clone();
        config.retain_copy |= retain_copy;

        let service = Amendments::new(
            &session.store,
            &session.ledgers,
            &self.schema,
            &self.spec,
            config,
        )?
        .with_amendments(saved)?;
        let result = body(&service)?;

        if persist {
            session.capture(service.list()?)?.save(&self.workspace)?;
            debug!(workspace = %self.workspace.display(), "workspace saved");
        }
        Ok(result)
    }

    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(value),
        }
        Ok(())
    }
}

fn parse_id<T: FromStr>(raw: &str, what: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(raw).with_context(|| format!("invalid {what} id: {raw}"))
}

/// Parse `Type.field=value`, coercing the value to the declared kind.
fn parse_default(schema: &SchemaRegistry, raw: &str) -> anyhow::Result<(EntityType, String, Value)> {
    let (target, literal) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected Type.field=value, got {raw}"))?;
    let (type_name, field) = target
        .split_once('.')
        .ok_or_else(|| anyhow!("expected Type.field=value, got {raw}"))?;
    let entity_type = EntityType::from(type_name);
    let declared = schema
        .require(&entity_type)?
        .field(field)
        .ok_or_else(|| anyhow!("{type_name} has no field {field}"))?;
    let value = Value::parse(declared.kind, literal)?;
    Ok((entity_type, field.to_string(), value))
}

// ---- check ----

#[derive(Serialize)]
struct CheckReport {
    entity_types: usize,
    spec_types: usize,
    entities: usize,
    ledgers: usize,
    amendments: usize,
    problems: Vec<String>,
}

fn cmd_check(ctx: &Context) -> anyhow::Result<()> {
    let workspace = Workspace::load(&ctx.workspace)?;
    let problems: Vec<String> = workspace
        .entities
        .iter()
        .flat_map(|record| record_problems(&ctx.schema, record))
        .collect();
    let report = CheckReport {
        entity_types: ctx.schema.len(),
        spec_types: ctx.spec.entity_types().count(),
        entities: workspace.entities.len(),
        ledgers: workspace.ledgers.len(),
        amendments: workspace.amendments.len(),
        problems,
    };
    // rebuilding the stores verifies every ledger seal
    workspace.open()?;

    ctx.emit(&report, |r| {
        println!(
            "Schema: {} types, spec: {} types",
            r.entity_types.to_string().bold(),
            r.spec_types.to_string().bold()
        );
        println!(
            "Workspace: {} entities, {} ledgers, {} amendments",
            r.entities, r.ledgers, r.amendments
        );
        for problem in &r.problems {
            println!("  {} {}", "✗".red(), problem);
        }
        if r.problems.is_empty() {
            println!("{} No issues.", "✓".green().bold());
        }
    })?;
    if !report.problems.is_empty() {
        bail!("{} problem(s) in workspace", report.problems.len());
    }
    Ok(())
}

fn record_problems(schema: &SchemaRegistry, record: &EntityRecord) -> Vec<String> {
    let id = record.id.short_id();
    let Some(entity) = schema.get(&record.entity_type) else {
        return vec![format!("{id}: unknown entity type {}", record.entity_type)];
    };
    let mut problems = Vec::new();
    for (name, value) in &record.fields {
        match entity.field(name) {
            None => problems.push(format!("{id}: {} has no field {name}", record.entity_type)),
            Some(declared) if !value.fits(declared.kind) => problems.push(format!(
                "{id}: {}.{name} holds {value}, expected {}",
                record.entity_type,
                declared.kind.as_str()
            )),
            Some(_) => {}
        }
    }
    let declared_as = |name: &str, kind: RelationKind| {
        entity.relation_named(name).is_some_and(|r| r.kind == kind)
    };
    for name in record.references.keys() {
        if !declared_as(name, RelationKind::ManyToOne) {
            problems.push(format!("{id}: {} has no many-to-one {name}", record.entity_type));
        }
    }
    for name in record.members.keys() {
        if !declared_as(name, RelationKind::ManyToMany) {
            problems.push(format!("{id}: {} has no many-to-many {name}", record.entity_type));
        }
    }
    problems
}

// ---- copy ----

fn cmd_copy(ctx: &Context, args: CopyArgs) -> anyhow::Result<()> {
    let original: EntityId = parse_id(&args.original, "entity")?;
    let mut options = CopyOptions::new();
    for raw in &args.defaults {
        let (entity_type, field, value) = parse_default(&ctx.schema, raw)?;
        options = options.default_value(entity_type, &field, value);
    }

    let amendment = ctx.with_service(true, false, |service| {
        Ok(service.create_amendment_with(&original, &options)?)
    })?;
    ctx.emit(&amendment, |a| {
        println!("{} Amendment {} created", "✓".green().bold(), format!("#{}", a.number).yellow());
        println!("  Amendment: {}", a.id);
        println!("  Original:  {}", a.original_id.to_string().dimmed());
        println!("  Copy:      {}", a.copy_id.to_string().cyan());
        println!("  Ledger:    {}", a.ledger_id);
    })
}

// ---- merge ----

fn cmd_merge(ctx: &Context, args: MergeArgs) -> anyhow::Result<()> {
    let id: AmendmentId = parse_id(&args.amendment, "amendment")?;
    let result = ctx.with_service(true, args.retain_copy, |service| {
        Ok(service.finalize_amendment(&id)?)
    });

    match result {
        Ok(outcome) => ctx.emit(&outcome, print_outcome),
        Err(err) => {
            let Some(report) = err.downcast_ref::<SdkError>().and_then(SdkError::conflicts) else {
                return Err(err);
            };
            ctx.emit(report, print_conflicts)?;
            bail!("merge aborted: {} conflict(s); amendment {} is still open", report.len(), id)
        }
    }
}

fn print_outcome(outcome: &MergeOutcome) {
    if outcome.is_noop() {
        println!("{} Merged. Original already up to date.", "✓".green().bold());
    } else {
        println!("{} Merged {} change(s)", "✓".green().bold(), outcome.changes().to_string().bold());
    }
    let rows = [
        ("fields applied", outcome.fields_applied),
        ("fields already applied", outcome.fields_already_applied),
        ("references applied", outcome.references_applied),
        ("children inserted", outcome.children_inserted),
        ("children removed", outcome.children_removed),
        ("members added", outcome.members_added),
        ("members removed", outcome.members_removed),
        ("copy entities discarded", outcome.copy_entities_discarded),
    ];
    for (label, count) in rows.into_iter().filter(|(_, count)| *count > 0) {
        println!("  {label}: {count}");
    }
}

fn print_conflicts(report: &ConflictReport) {
    println!("{} {} conflict(s)", "✗".red().bold(), report.len());
    for conflict in report.conflicts() {
        println!(
            "  {} {}.{} [{}]",
            conflict.entity_id.short_id().dimmed(),
            conflict.entity_type.as_str().bold(),
            conflict.field.yellow(),
            conflict.kind
        );
        println!("    baseline: {}", conflict.baseline);
        println!("    original: {}", conflict.original);
        println!("    incoming: {}", conflict.incoming);
    }
}

// ---- cancel ----

fn cmd_cancel(ctx: &Context, args: CancelArgs) -> anyhow::Result<()> {
    let id: AmendmentId = parse_id(&args.amendment, "amendment")?;
    let amendment = ctx.with_service(true, false, |service| Ok(service.cancel_amendment(&id)?))?;
    ctx.emit(&amendment, |a| {
        println!(
            "{} Amendment {} cancelled, copy discarded",
            "✓".green().bold(),
            format!("#{}", a.number).yellow()
        );
    })
}

// ---- show-ledger ----

fn cmd_show_ledger(ctx: &Context, args: ShowLedgerArgs) -> anyhow::Result<()> {
    let id: AmendmentId = parse_id(&args.amendment, "amendment")?;
    let record = ctx.with_service(false, false, |service| Ok(service.ledger(&id)?))?;
    ctx.emit(&record, |r| {
        let status = match &r.status {
            LedgerStatus::Open => "open".green(),
            LedgerStatus::Consumed { .. } => "consumed".yellow(),
            LedgerStatus::Discarded { .. } => "discarded".red(),
        };
        println!("Ledger {} ({})", r.ledger.id().to_string().bold(), status);
        println!("  Created: {}", r.ledger.created_at());
        println!("  Seal:    {}", r.ledger.seal_hex().dimmed());
        print_entry(r.ledger.root(), None, 1);
    })
}

fn print_entry(entry: &LedgerEntry, relation: Option<&str>, depth: usize) {
    let indent = "  ".repeat(depth);
    let label = relation.map(|r| format!("{r}: ")).unwrap_or_default();
    println!(
        "{indent}{label}{} {} → {}",
        entry.entity_type.as_str().bold(),
        entry.original_id.short_id().dimmed(),
        entry.copy_id.short_id().cyan()
    );
    for (name, value) in &entry.baseline_fields {
        let shown = value
            .decode()
            .map(|v| v.to_string())
            .unwrap_or_else(|e| format!("<{e}>"));
        println!("{indent}  {name} = {shown}");
    }
    for (name, baseline) in &entry.baseline_relations {
        match baseline {
            RelationBaseline::Reference(Some(target)) => {
                println!("{indent}  {name} → {}", target.short_id())
            }
            RelationBaseline::Reference(None) => println!("{indent}  {name} → none"),
            RelationBaseline::Members(ids) => println!("{indent}  {name}: {} member(s)", ids.len()),
            RelationBaseline::Child(_) | RelationBaseline::Children(_) => {
                for child in baseline.child_entries().into_values() {
                    print_entry(child, Some(name), depth + 1);
                }
            }
        }
    }
}

// ---- list ----

fn cmd_list(ctx: &Context, args: ListArgs) -> anyhow::Result<()> {
    let workspace = Workspace::load(&ctx.workspace)?;
    let mut amendments: Vec<Amendment> = workspace.amendments;
    if let Some(raw) = &args.original {
        let original: EntityId = parse_id(raw, "entity")?;
        amendments.retain(|a| a.original_id == original);
    }
    amendments.sort_by_key(|a| (a.original_id, a.number));

    ctx.emit(&amendments, |all| {
        if all.is_empty() {
            println!("No amendments.");
        }
        for a in all {
            let status = match a.status {
                amend_sdk::AmendmentStatus::Open => a.status.to_string().green(),
                amend_sdk::AmendmentStatus::Merged => a.status.to_string().yellow(),
                amend_sdk::AmendmentStatus::Cancelled => a.status.to_string().red(),
            };
            println!(
                "{} {} {} → {}  {}",
                format!("#{}", a.number).yellow().bold(),
                status,
                a.original_id.short_id().dimmed(),
                a.copy_id.short_id().cyan(),
                a.id
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use clap::Parser;
    use amend_sdk::AmendmentStatus;
    use amend_store::EntityStore;

    const SCHEMA: &str = r#"
[types.Contract]
fields = [
    { name = "title", kind = "string" },
    { name = "status", kind = "string" },
]
relations = [
    { name = "clauses", kind = "one_to_many", target = "Clause", back_reference = "contract" },
]

[types.Clause]
fields = [{ name = "text", kind = "string" }]
relations = [{ name = "contract", kind = "many_to_one", target = "Contract" }]
"#;

    const SPEC: &str = r#"
[types.Contract]
included_relations = ["clauses"]
excluded_fields = ["status"]
copy_defaults = { status = "draft" }
"#;

    struct Fixture {
        dir: tempfile::TempDir,
        contract: EntityId,
        clause: EntityId,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("schema.toml"), SCHEMA).unwrap();
            fs::write(dir.path().join("spec.toml"), SPEC).unwrap();

            let store = InMemoryEntityStore::new();
            let contract = store
                .insert(
                    EntityRecord::new("Contract")
                        .field("title", "Lease")
                        .field("status", "signed"),
                )
                .unwrap();
            let clause = store
                .insert(
                    EntityRecord::new("Clause")
                        .field("text", "rent is due monthly")
                        .reference("contract", contract),
                )
                .unwrap();
            let fixture = Self {
                dir,
                contract,
                clause,
            };
            Workspace {
                entities: store.snapshot().unwrap().entities,
                ..Workspace::default()
            }
            .save(&fixture.workspace_path())
            .unwrap();
            fixture
        }

        fn path(&self, name: &str) -> String {
            self.dir.path().join(name).display().to_string()
        }

        fn workspace_path(&self) -> PathBuf {
            self.dir.path().join("amend.json")
        }

        fn run(&self, args: &[&str]) -> anyhow::Result<()> {
            let workspace = self.path("amend.json");
            let schema = self.path("schema.toml");
            let spec = self.path("spec.toml");
            let mut argv = vec!["amend", "-w", &workspace, "--schema", &schema, "--spec", &spec];
            argv.extend_from_slice(args);
            run_command(Cli::try_parse_from(argv).unwrap())
        }

        fn workspace(&self) -> Workspace {
            Workspace::load(&self.workspace_path()).unwrap()
        }

        fn only_amendment(&self) -> Amendment {
            let amendments = self.workspace().amendments;
            assert_eq!(amendments.len(), 1);
            amendments[0].clone()
        }

        /// Edit one entity directly in the workspace file.
        fn edit(&self, id: &EntityId, field: &str, value: &str) {
            edit_workspace(&self.workspace_path(), id, field, value);
        }

        fn field(&self, id: &EntityId, field: &str) -> Option<Value> {
            self.workspace()
                .entities
                .into_iter()
                .find(|r| &r.id == id)
                .map(|r| r.get_field(field).clone())
        }
    }

    fn edit_workspace(path: &Path, id: &EntityId, field: &str, value: &str) {
        let mut workspace = Workspace::load(path).unwrap();
        let record = workspace.entities.iter_mut().find(|r| &r.id == id).unwrap();
        record.set_field(field, value);
        workspace.save(path).unwrap();
    }

    #[test]
    fn check_passes_on_a_clean_workspace() {
        let fixture = Fixture::new();
        fixture.run(&["check"]).unwrap();
    }

    #[test]
    fn check_reports_undeclared_fields() {
        let fixture = Fixture::new();
        fixture.edit(&fixture.contract, "colour", "red");
        let err = fixture.run(&["check"]).unwrap_err();
        assert!(err.to_string().contains("1 problem"));
    }

    #[test]
    fn invalid_spec_fails_before_touching_the_workspace() {
        let fixture = Fixture::new();
        fs::write(
            fixture.dir.path().join("spec.toml"),
            "[types.Contract]\nincluded_relations = [\"appendices\"]\n",
        )
        .unwrap();
        assert!(fixture.run(&["check"]).is_err());
    }

    #[test]
    fn copy_edit_merge() {
        let fixture = Fixture::new();
        fixture.run(&["copy", &fixture.contract.to_string()]).unwrap();
        let amendment = fixture.only_amendment();
        assert_eq!(amendment.number, 1);
        assert_eq!(fixture.field(&amendment.copy_id, "status"), Some(Value::from("draft")));

        fixture.edit(&amendment.copy_id, "title", "Lease (amended)");
        fixture.run(&["merge", &amendment.id.to_string()]).unwrap();

        assert_eq!(
            fixture.field(&fixture.contract, "title"),
            Some(Value::from("Lease (amended)"))
        );
        assert_eq!(fixture.field(&fixture.contract, "status"), Some(Value::from("signed")));
        assert_eq!(fixture.field(&amendment.copy_id, "title"), None);
        assert_eq!(fixture.only_amendment().status, AmendmentStatus::Merged);
        assert!(matches!(
            fixture.workspace().ledgers[0].status,
            LedgerStatus::Consumed { .. }
        ));
    }

    #[test]
    fn merge_with_retain_copy_keeps_the_copy() {
        let fixture = Fixture::new();
        fixture.run(&["copy", &fixture.contract.to_string()]).unwrap();
        let amendment = fixture.only_amendment();
        fixture
            .run(&["merge", &amendment.id.to_string(), "--retain-copy"])
            .unwrap();
        assert!(fixture.field(&amendment.copy_id, "title").is_some());
        assert!(!fixture.workspace().config.retain_copy);
    }

    #[test]
    fn retain_copy_flag_applies_to_one_merge_only() {
        let fixture = Fixture::new();
        fixture.run(&["copy", &fixture.contract.to_string()]).unwrap();
        let first = fixture.only_amendment();
        fixture.run(&["merge", &first.id.to_string(), "--retain-copy"]).unwrap();
        assert!(!fixture.workspace().config.retain_copy);

        fixture.run(&["copy", &fixture.contract.to_string()]).unwrap();
        let second = fixture
            .workspace()
            .amendments
            .into_iter()
            .find(|a| a.is_open())
            .unwrap();
        fixture.run(&["merge", &second.id.to_string()]).unwrap();
        assert!(fixture.field(&first.copy_id, "title").is_some());
        assert_eq!(fixture.field(&second.copy_id, "title"), None);
    }

    #[test]
    fn conflicting_merge_leaves_workspace_unchanged() {
        let fixture = Fixture::new();
        fixture.run(&["copy", &fixture.contract.to_string()]).unwrap();
        let amendment = fixture.only_amendment();
        let ledger = fixture.workspace().ledgers[0].ledger.clone();
        let clause_copy = ledger.root().find_by_original(&fixture.clause).unwrap().copy_id;

        fixture.edit(&fixture.clause, "text", "rent is due weekly");
        fixture.edit(&clause_copy, "text", "rent is due yearly");
        let before = fs::read_to_string(fixture.workspace_path()).unwrap();

        let err = fixture
            .run(&["--format", "json", "merge", &amendment.id.to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("1 conflict"));
        assert_eq!(fs::read_to_string(fixture.workspace_path()).unwrap(), before);
        assert!(fixture.only_amendment().is_open());
    }

    #[test]
    fn cancel_discards_the_copy() {
        let fixture = Fixture::new();
        let before = fixture.workspace().entities;
        fixture.run(&["copy", &fixture.contract.to_string()]).unwrap();
        let amendment = fixture.only_amendment();

        fixture.run(&["cancel", &amendment.id.to_string()]).unwrap();
        let workspace = fixture.workspace();
        assert_eq!(workspace.entities, before);
        assert_eq!(workspace.amendments[0].status, AmendmentStatus::Cancelled);
        assert!(fixture.run(&["merge", &amendment.id.to_string()]).is_err());
    }

    #[test]
    fn copy_accepts_extra_defaults() {
        let fixture = Fixture::new();
        fixture
            .run(&["copy", &fixture.contract.to_string(), "-D", "Contract.status=proposed"])
            .unwrap();
        let amendment = fixture.only_amendment();
        assert_eq!(
            fixture.field(&amendment.copy_id, "status"),
            Some(Value::from("proposed"))
        );
    }

    #[test]
    fn default_on_an_unknown_field_is_rejected() {
        let fixture = Fixture::new();
        let err = fixture
            .run(&["copy", &fixture.contract.to_string(), "-D", "Contract.colour=red"])
            .unwrap_err();
        assert!(err.to_string().contains("colour"));
        assert!(fixture.workspace().amendments.is_empty());
    }

    #[test]
    fn show_ledger_and_list() {
        let fixture = Fixture::new();
        fixture.run(&["copy", &fixture.contract.to_string()]).unwrap();
        fixture.run(&["copy", &fixture.contract.to_string()]).unwrap();
        let amendments = fixture.workspace().amendments;
        assert_eq!(amendments.len(), 2);

        fixture
            .run(&["show-ledger", &amendments[0].id.to_string()])
            .unwrap();
        fixture
            .run(&["list", "--original", &fixture.contract.to_string()])
            .unwrap();
        fixture.run(&["--format", "json", "list"]).unwrap();
    }

    #[test]
    fn bad_ids_are_rejected() {
        let fixture = Fixture::new();
        let err = fixture.run(&["merge", "not-a-uuid"]).unwrap_err();
        assert!(err.to_string().contains("invalid amendment id"));
    }
}
