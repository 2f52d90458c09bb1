use crate::sqli::core::boundary::Payload;
use crate::sqli::core::target::{Parameter, ScanTarget};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= 0.9 {
            Severity::Critical
        } else if confidence >= 0.7 {
            Severity::High
        } else if confidence >= 0.5 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        };
        write!(f, "{}", s)
    }
}

/// One technique flagging one parameter
#[derive(Debug, Serialize, Clone)]
pub struct Vulnerability {
    pub parameter: Parameter,
    pub technique: String,
    /// Technique run order, used to pick the channel for extraction
    #[serde(skip)]
    pub priority: u8,
    pub dbms: String,
    pub payload: Option<Payload>,
    pub confidence: f32,
    pub severity: Severity,
    pub evidence: String,
    pub injectable: bool,
}

#[derive(Debug, Serialize, Clone)]
pub struct ScanResult {
    pub target: ScanTarget,
    pub vulnerabilities: Vec<Vulnerability>,
    pub dbms: String,
    pub dbms_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_requests: u64,
    /// Non-fatal failures met along the way
    pub errors: Vec<String>,
}

impl ScanResult {
    pub fn start(target: ScanTarget) -> Self {
        Self {
            target,
            vulnerabilities: Vec::new(),
            dbms: String::new(),
            dbms_version: String::new(),
            started_at: Utc::now(),
            finished_at: None,
            total_requests: 0,
            errors: Vec::new(),
        }
    }

    pub fn is_vulnerable(&self) -> bool {
        self.vulnerabilities.iter().any(|v| v.injectable)
    }

    /// Most reliable finding: lowest technique priority, then highest confidence
    pub fn best_finding(&self) -> Option<&Vulnerability> {
        self.vulnerabilities
            .iter()
            .filter(|v| v.injectable)
            .min_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(b.confidence.total_cmp(&a.confidence))
            })
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
