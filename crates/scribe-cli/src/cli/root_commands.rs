use clap::{Args, Subcommand, ValueEnum};

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a project config and create the audit database.
    Init(InitArgs),
    /// List audit entries, newest first.
    Log(LogArgs),
    /// Show one audit entry.
    Show(ShowArgs),
    /// Print the merged configuration.
    Config,
    /// Dump JSON schema for a record type.
    Schema(SchemaArgs),
}

/// Arguments for `scribe init`.
#[derive(Debug, Args)]
pub struct InitArgs {
    /// Overwrite an existing `.scribe/config.toml`.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for `scribe log`.
#[derive(Debug, Args)]
pub struct LogArgs {
    /// insert, update, remove, associate or dissociate.
    #[arg(long)]
    pub action: Option<String>,
    /// Affected table (join table for associate/dissociate).
    #[arg(long)]
    pub table: Option<String>,
    /// Class of the source entity.
    #[arg(long)]
    pub class: Option<String>,
    /// Stored key of the source entity.
    #[arg(long)]
    pub fk: Option<String>,
}

/// Arguments for `scribe show`.
#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Audit log id.
    pub id: i64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SchemaType {
    Record,
    Reference,
    Entity,
}

/// Arguments for `scribe schema`.
#[derive(Debug, Args)]
pub struct SchemaArgs {
    #[arg(value_enum)]
    pub type_name: SchemaType,
}
