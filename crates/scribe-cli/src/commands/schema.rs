use schemars::schema_for;
use scribe_core::metadata::EntityMeta;
use scribe_core::record::{AuditRecord, Reference};

use crate::cli::GlobalFlags;
use crate::cli::root_commands::{SchemaArgs, SchemaType};
use crate::output::output;

/// Handle `scribe schema`.
pub fn handle(args: &SchemaArgs, flags: &GlobalFlags) -> anyhow::Result<()> {
    output(&schema_value(args.type_name)?, flags.format)
}

fn schema_value(type_name: SchemaType) -> anyhow::Result<serde_json::Value> {
    let schema = match type_name {
        SchemaType::Record => schema_for!(AuditRecord),
        SchemaType::Reference => schema_for!(Reference),
        SchemaType::Entity => schema_for!(EntityMeta),
    };
    Ok(serde_json::to_value(schema)?)
}
