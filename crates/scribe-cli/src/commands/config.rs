use crate::cli::GlobalFlags;
use crate::context;
use crate::output::output;

/// Handle `scribe config`.
pub fn handle(flags: &GlobalFlags) -> anyhow::Result<()> {
    let mut config = context::load_config()?;
    if let Some(path) = &flags.db {
        config.database.path.clone_from(path);
    }
    // Rejects duplicate or identifier-less entities.
    config.registry()?;
    output(&config, flags.format)
}
