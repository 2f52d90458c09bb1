use crate::reporting::model::{ScanResult, Severity};
use unicode_width::UnicodeWidthStr;

// ==============================
// BOX CONFIGURATION
// ==============================

const BOX_WIDTH: usize = 70;
const INNER_WIDTH: usize = BOX_WIDTH - 2;

fn visual_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

// ==============================
// BOX RENDERING HELPERS
// ==============================

fn top_border() -> String {
    format!("╔{}╗", "═".repeat(INNER_WIDTH))
}

fn middle_border() -> String {
    format!("╠{}╣", "═".repeat(INNER_WIDTH))
}

fn bottom_border() -> String {
    format!("╚{}╝", "═".repeat(INNER_WIDTH))
}

/// Left-aligned box line, padded by display width
fn box_line(content: &str) -> String {
    let padded = format!(" {} ", content);
    let padding = INNER_WIDTH.saturating_sub(visual_width(&padded));
    format!("║{}{}║", padded, " ".repeat(padding))
}

fn box_line_centered(content: &str) -> String {
    let padded = format!(" {} ", content);
    let width = visual_width(&padded);
    if width >= INNER_WIDTH {
        return box_line(content);
    }

    let left = (INNER_WIDTH - width) / 2;
    let right = INNER_WIDTH - width - left;
    format!("║{}{}{}║", " ".repeat(left), padded, " ".repeat(right))
}

// ==============================
// MAIN REPORT RENDERER
// ==============================

pub fn render(result: &ScanResult) -> String {
    let mut out = Vec::new();
    let findings: Vec<_> = result.vulnerabilities.iter().filter(|v| v.injectable).collect();

    out.push(top_border());
    out.push(box_line_centered(if findings.is_empty() {
        "SCAN COMPLETE"
    } else {
        "SQL INJECTION DETECTED"
    }));
    out.push(middle_border());
    out.push(box_line(&format!("Target:   {}", result.target.url)));
    if !result.dbms.is_empty() {
        let dbms = if result.dbms_version.is_empty() {
            result.dbms.clone()
        } else {
            format!("{} {}", result.dbms, result.dbms_version)
        };
        out.push(box_line(&format!("DBMS:     {}", dbms)));
    }
    out.push(box_line(&format!("Requests: {}", result.total_requests)));
    if let Some(ms) = result.duration_ms() {
        out.push(box_line(&format!("Duration: {:.1}s", ms as f64 / 1000.0)));
    }

    if findings.is_empty() {
        out.push(box_line("✅ No injectable parameters found"));
    } else {
        out.push(box_line(&format!("Findings: {}", findings.len())));
        for severity in [Severity::Critical, Severity::High, Severity::Medium, Severity::Low] {
            let n = findings.iter().filter(|f| f.severity == severity).count();
            if n > 0 {
                out.push(box_line(&format!("  {}: {}", severity, n)));
            }
        }
    }
    out.push(bottom_border());

    for (idx, f) in findings.iter().enumerate() {
        out.push(String::new());
        out.push("═".repeat(BOX_WIDTH));
        out.push(format!("FINDING #{}: {} [{}]", idx + 1, f.technique, f.severity));
        out.push("═".repeat(BOX_WIDTH));
        out.push(format!(
            "   Parameter:  {} ({})",
            f.parameter.name, f.parameter.location
        ));
        out.push(format!("   Confidence: {:.0}%", f.confidence * 100.0));
        if !f.dbms.is_empty() {
            out.push(format!("   Database:   {}", f.dbms));
        }
        if let Some(payload) = &f.payload {
            out.push(format!("   Payload:    {}", payload));
        }
        if !f.evidence.is_empty() {
            out.push(format!("   Evidence:   {}", f.evidence));
        }
    }

    if !result.errors.is_empty() {
        out.push(String::new());
        out.push(format!("{} non-fatal error(s):", result.errors.len()));
        for err in &result.errors {
            out.push(format!("   - {}", err));
        }
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqli::core::target::ScanTarget;

    #[test]
    fn test_box_lines_have_equal_width() {
        let plain = box_line("Findings: 1");
        let emoji = box_line("✅ No injectable parameters found");
        assert_eq!(visual_width(&plain), BOX_WIDTH);
        assert_eq!(visual_width(&emoji), BOX_WIDTH);
        assert_eq!(visual_width(&box_line_centered("SCAN COMPLETE")), BOX_WIDTH);
    }

    #[test]
    fn test_clean_scan() {
        let mut result = ScanResult::start(ScanTarget::new("http://shop.local/"));
        result.errors.push("heuristic: timeout".to_string());
        let text = render(&result);
        assert!(text.contains("No injectable parameters found"));
        assert!(text.contains("heuristic: timeout"));
        assert!(!text.contains("FINDING #"));
    }
}
