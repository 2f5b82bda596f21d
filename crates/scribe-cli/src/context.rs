use std::path::Path;

use anyhow::Context;
use scribe_config::ScribeConfig;
use scribe_core::auditor::Auditor;
use scribe_db::ScribeDb;
use scribe_db::service::AuditService;

use crate::cli::GlobalFlags;

/// Load configuration from `.env`, config files and `SCRIBE_*` variables.
pub fn load_config() -> anyhow::Result<ScribeConfig> {
    ScribeConfig::load_with_dotenv().context("failed to load scribe configuration")
}

/// Database path: `--db` first, then `database.path`.
pub fn database_path<'a>(config: &'a ScribeConfig, flags: &'a GlobalFlags) -> anyhow::Result<&'a str> {
    match flags.db.as_deref() {
        Some(path) => Ok(path),
        None => Ok(config.database_path()?),
    }
}

/// Open the audit database for reading history.
///
/// Refuses to create a missing file so a typo in `--db` does not silently
/// produce an empty log.
pub async fn open_service(config: &ScribeConfig, flags: &GlobalFlags) -> anyhow::Result<AuditService> {
    let path = database_path(config, flags)?;
    if path != ":memory:" && !Path::new(path).exists() {
        anyhow::bail!("no audit database at '{path}'. Run 'scribe init' first.");
    }
    let auditor = Auditor::new(config.registry()?).with_filter(config.filter());
    let db = ScribeDb::open_local_with(path, config.database.foreign_keys)
        .await
        .with_context(|| format!("failed to open audit database '{path}'"))?;
    Ok(AuditService::from_db(db, auditor))
}
