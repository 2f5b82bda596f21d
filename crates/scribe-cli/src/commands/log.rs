use scribe_core::enums::AuditAction;
use scribe_db::repos::audit::AuditFilter;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::LogArgs;
use crate::context;
use crate::output::output;

/// Handle `scribe log`.
pub async fn handle(args: &LogArgs, flags: &GlobalFlags) -> anyhow::Result<()> {
    let config = context::load_config()?;
    let service = context::open_service(&config, flags).await?;
    let filter = build_filter(args, flags.limit.unwrap_or(config.general.default_limit))?;
    let entries = service.query_audit(&filter).await?;
    output(&entries, flags.format)
}

fn build_filter(args: &LogArgs, limit: u32) -> anyhow::Result<AuditFilter> {
    let action = args
        .action
        .as_deref()
        .map(|raw| {
            raw.parse::<AuditAction>()
                .map_err(|error| anyhow::anyhow!("invalid action '{raw}': {error}"))
        })
        .transpose()?;
    Ok(AuditFilter {
        action,
        table: args.table.clone(),
        class: args.class.clone(),
        foreign_key: args.fk.clone(),
        limit: Some(limit),
    })
}
