use crate::reporting::model::{ScanResult, Severity, Vulnerability};
use serde::Serialize;

#[derive(Serialize)]
struct Report<'a> {
    scan_metadata: ScanMetadata,
    summary: Summary,
    target: &'a str,
    dbms: &'a str,
    dbms_version: &'a str,
    started_at: String,
    finished_at: Option<String>,
    total_requests: u64,
    vulnerabilities: &'a [Vulnerability],
    errors: &'a [String],
}

#[derive(Serialize)]
struct ScanMetadata {
    tool: String,
    version: String,
    report_format: String,
}

#[derive(Serialize)]
struct Summary {
    total_findings: usize,
    critical: usize,
    high: usize,
    medium: usize,
    low: usize,
}

pub fn render(result: &ScanResult) -> anyhow::Result<String> {
    let findings = &result.vulnerabilities;
    let count = |s: Severity| findings.iter().filter(|f| f.severity == s).count();

    let report = Report {
        scan_metadata: ScanMetadata {
            tool: "anvil-sqli".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            report_format: "application/json".to_string(),
        },
        summary: Summary {
            total_findings: findings.len(),
            critical: count(Severity::Critical),
            high: count(Severity::High),
            medium: count(Severity::Medium),
            low: count(Severity::Low),
        },
        target: &result.target.url,
        dbms: &result.dbms,
        dbms_version: &result.dbms_version,
        started_at: result.started_at.to_rfc3339(),
        finished_at: result.finished_at.map(|t| t.to_rfc3339()),
        total_requests: result.total_requests,
        vulnerabilities: findings,
        errors: &result.errors,
    };

    let json = serde_json::to_string_pretty(&report)?;
    Ok(json)
}
