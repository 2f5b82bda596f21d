//! Plain-text rendering of audit entries and configuration.

use std::fmt::Write as _;

use scribe_config::ScribeConfig;
use scribe_core::record::{AuditLogEntry, Reference};

/// Human-readable form of a command response.
pub trait Text {
    fn to_text(&self) -> anyhow::Result<String>;
}

/// `label (class#key)`, or just `class#key` for unlabeled references.
#[must_use]
pub fn format_reference(reference: &Reference) -> String {
    let key = format!("{}#{}", reference.class, reference.foreign_key_display());
    match reference.label.as_deref() {
        Some(label) => format!("{label} ({key})"),
        None => key,
    }
}

/// One line per entry: id, time, action, table, then who touched what.
#[must_use]
pub fn summary_line(entry: &AuditLogEntry) -> String {
    let record = &entry.record;
    let mut line = format!(
        "#{:<5} {} {:<10} {:<16} {}",
        entry.id,
        entry.logged_at.format("%Y-%m-%d %H:%M:%S"),
        record.action.as_str(),
        record.table,
        format_reference(&record.source),
    );
    if let Some(target) = &record.target {
        let _ = write!(line, " -> {}", format_reference(target));
    }
    if let Some(blame) = &record.blame {
        let _ = write!(line, " by {}", format_reference(blame));
    }
    line
}

impl Text for Vec<AuditLogEntry> {
    fn to_text(&self) -> anyhow::Result<String> {
        if self.is_empty() {
            return Ok(String::from("(no entries)"));
        }
        Ok(self.iter().map(summary_line).collect::<Vec<_>>().join("\n"))
    }
}

impl Text for AuditLogEntry {
    fn to_text(&self) -> anyhow::Result<String> {
        let mut out = summary_line(self);
        for (field, entry) in self.record.diff.iter().flatten() {
            let _ = write!(
                out,
                "\n    {field} [{}]: {} -> {}",
                entry.col, entry.old, entry.new
            );
        }
        Ok(out)
    }
}

impl Text for ScribeConfig {
    fn to_text(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Text for serde_json::Value {
    fn to_text(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
