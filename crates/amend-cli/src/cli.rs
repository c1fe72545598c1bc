use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "amend",
    about = "Amend live entities through independent copies and three-way merges",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// JSON file holding entities, ledgers and amendments
    #[arg(short, long, global = true, default_value = "amend.json")]
    pub workspace: PathBuf,

    /// TOML file declaring entity types
    #[arg(long, global = true, default_value = "schema.toml")]
    pub schema: PathBuf,

    /// TOML file declaring what an amendment copies
    #[arg(long, global = true, default_value = "spec.toml")]
    pub spec: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate the schema, the spec, and the workspace
    Check(CheckArgs),
    /// Start an amendment by copying an entity and its subtree
    Copy(CopyArgs),
    /// Merge an amendment's copy back into its original
    Merge(MergeArgs),
    /// Cancel an amendment and discard its copy
    Cancel(CancelArgs),
    /// Show the correspondence ledger of an amendment
    ShowLedger(ShowLedgerArgs),
    /// List amendments
    List(ListArgs),
}

#[derive(Args)]
pub struct CheckArgs {}

#[derive(Args)]
pub struct CopyArgs {
    /// Id of the entity to amend
    pub original: String,
    /// Extra copy default, as Type.field=value
    #[arg(short = 'D', long = "default")]
    pub defaults: Vec<String>,
}

#[derive(Args)]
pub struct MergeArgs {
    pub amendment: String,
    /// Keep the copy after merging
    #[arg(long)]
    pub retain_copy: bool,
}

#[derive(Args)]
pub struct CancelArgs {
    pub amendment: String,
}

#[derive(Args)]
pub struct ShowLedgerArgs {
    pub amendment: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// Only amendments of this original
    #[arg(long)]
    pub original: Option<String>,
}
