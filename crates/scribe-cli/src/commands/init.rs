use std::path::{Path, PathBuf};

use anyhow::Context;
use scribe_config::ScribeConfig;
use scribe_db::ScribeDb;
use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::InitArgs;
use crate::output::{Text, output};

#[derive(Debug, Serialize)]
pub struct InitReport {
    pub config_path: PathBuf,
    pub database: PathBuf,
    /// `false` when an existing config was kept.
    pub config_written: bool,
}

impl Text for InitReport {
    fn to_text(&self) -> anyhow::Result<String> {
        let verb = if self.config_written { "wrote" } else { "kept" };
        Ok(format!(
            "{verb} {}\naudit database ready at {}",
            self.config_path.display(),
            self.database.display()
        ))
    }
}

/// Handle `scribe init`.
pub async fn handle(args: &InitArgs, flags: &GlobalFlags) -> anyhow::Result<()> {
    let root = std::env::current_dir().context("failed to read current directory")?;
    let report = init_project(&root, flags.db.as_deref(), args.force).await?;
    if flags.quiet {
        return Ok(());
    }
    output(&report, flags.format)
}

/// Write `.scribe/config.toml` under `root` and create the audit schema.
pub async fn init_project(
    root: &Path,
    db_override: Option<&str>,
    force: bool,
) -> anyhow::Result<InitReport> {
    let dir = root.join(".scribe");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let config_path = dir.join("config.toml");

    let config_written = force || !config_path.exists();
    let config = if config_written {
        let mut config = ScribeConfig::default();
        if let Some(path) = db_override {
            config.database.path = path.to_string();
        }
        let rendered = toml::to_string_pretty(&config)?;
        std::fs::write(&config_path, rendered)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        config
    } else {
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let mut config: ScribeConfig = toml::from_str(&raw)
            .with_context(|| format!("invalid config {}", config_path.display()))?;
        if let Some(path) = db_override {
            config.database.path = path.to_string();
        }
        config
    };

    let database = root.join(config.database_path()?);
    if let Some(parent) = database.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let database_str = database
        .to_str()
        .context("database path is not valid UTF-8")?;
    ScribeDb::open_local_with(database_str, config.database.foreign_keys)
        .await
        .with_context(|| format!("failed to create audit database '{database_str}'"))?;
    tracing::info!(path = %database.display(), "audit database initialized");

    Ok(InitReport {
        config_path,
        database,
        config_written,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn writes_config_and_creates_schema() {
        let dir = TempDir::new().unwrap();
        let report = init_project(dir.path(), None, false).await.unwrap();

        assert!(report.config_written);
        assert_eq!(report.config_path, dir.path().join(".scribe/config.toml"));
        assert_eq!(report.database, dir.path().join(".scribe/audit.db"));

        let raw = std::fs::read_to_string(&report.config_path).unwrap();
        let config: ScribeConfig = toml::from_str(&raw).unwrap();
        assert_eq!(config.general.default_limit, 20);

        let db = ScribeDb::open_local(report.database.to_str().unwrap())
            .await
            .unwrap();
        let mut rows = db
            .conn()
            .query("SELECT COUNT(*) FROM audit_logs", ())
            .await
            .unwrap();
        assert_eq!(rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap(), 0);
    }

    #[tokio::test]
    async fn existing_config_is_kept_unless_forced() {
        let dir = TempDir::new().unwrap();
        init_project(dir.path(), None, false).await.unwrap();
        let config_path = dir.path().join(".scribe/config.toml");
        std::fs::write(&config_path, "[database]\npath = \"data/trail.db\"\n").unwrap();

        let kept = init_project(dir.path(), None, false).await.unwrap();
        assert!(!kept.config_written);
        assert_eq!(kept.database, dir.path().join("data/trail.db"));
        assert!(kept.database.exists());

        let forced = init_project(dir.path(), None, true).await.unwrap();
        assert!(forced.config_written);
        assert_eq!(forced.database, dir.path().join(".scribe/audit.db"));
    }

    #[tokio::test]
    async fn db_flag_overrides_path() {
        let dir = TempDir::new().unwrap();
        let report = init_project(dir.path(), Some("custom/audit.db"), false)
            .await
            .unwrap();
        assert_eq!(report.database, dir.path().join("custom/audit.db"));

        let raw = std::fs::read_to_string(&report.config_path).unwrap();
        assert!(raw.contains("custom/audit.db"));
    }
}
