use serde::Serialize;

use crate::cli::OutputFormat;

pub mod text;

pub use text::Text;

/// Render a response to a string in the requested format.
pub fn render<T: Serialize + Text>(value: &T, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Text => value.to_text(),
    }
}

/// Print a response in the requested format.
pub fn output<T: Serialize + Text>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    let rendered = render(value, format)?;
    println!("{rendered}");
    Ok(())
}
