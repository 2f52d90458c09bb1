//! Scan result model and renderers

pub mod json;
pub mod model;
pub mod text;

pub use model::{ScanResult, Severity, Vulnerability};

/// Render `result` as `json` or `text`
pub fn render(result: &ScanResult, format: &str) -> anyhow::Result<String> {
    match format.to_ascii_lowercase().as_str() {
        "json" => json::render(result),
        "text" | "txt" => Ok(text::render(result)),
        other => anyhow::bail!("unknown output format '{}' (expected text or json)", other),
    }
}
