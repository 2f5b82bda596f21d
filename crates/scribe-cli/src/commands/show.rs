use crate::cli::GlobalFlags;
use crate::cli::root_commands::ShowArgs;
use crate::context;
use crate::output::output;

/// Handle `scribe show`.
pub async fn handle(args: &ShowArgs, flags: &GlobalFlags) -> anyhow::Result<()> {
    let config = context::load_config()?;
    let service = context::open_service(&config, flags).await?;
    let Some(entry) = service.get_audit(args.id).await? else {
        anyhow::bail!("audit entry {} not found", args.id);
    };
    output(&entry, flags.format)
}
