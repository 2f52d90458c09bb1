//! SQL injection techniques
//!
//! Every technique implements [`Technique`]: a detection verdict for one
//! parameter, and extraction of a single SQL expression through the same
//! side channel. Techniques hold only their tuning knobs, so one instance
//! serves every parameter and every worker of a scan.

pub mod blind;
pub mod error;
pub mod union;

pub use blind::{BooleanBlind, TimeBased};
pub use error::ErrorBased;
pub use union::UnionBased;

use crate::http::response::HttpResponse;
use crate::http::Transport;
use crate::sqli::core::boundary::Payload;
use crate::sqli::core::dialect::{self, Dialect};
use crate::sqli::core::target::{Parameter, ScanTarget};
use crate::sqli::error::{Result, SqliError};
use crate::sqli::request::Prober;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a technique needs to probe one parameter
#[derive(Clone)]
pub struct InjectionRequest {
    pub target: Arc<ScanTarget>,
    pub parameter: Parameter,
    pub baseline: HttpResponse,
    /// Dialect hint, empty when unknown
    pub dbms: String,
    pub transport: Arc<dyn Transport>,
}

impl InjectionRequest {
    pub fn prober<'a>(&'a self, cancel: &'a CancellationToken) -> Prober<'a> {
        Prober::new(cancel, self.transport.as_ref(), &self.target, &self.parameter)
    }

    /// The hinted dialect, or MySQL
    pub fn dialect(&self) -> &'static dyn Dialect {
        dialect::resolve(&self.dbms)
    }

    /// The hinted dialect alone, or every dialect when the hint is unknown
    pub fn dialects(&self) -> Vec<&'static dyn Dialect> {
        dialect::candidates(&self.dbms)
    }

    pub fn baseline_text(&self) -> String {
        self.baseline.body_text()
    }
}

impl std::fmt::Debug for InjectionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectionRequest")
            .field("url", &self.target.url)
            .field("parameter", &self.parameter.name)
            .field("dbms", &self.dbms)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub injection: InjectionRequest,
    /// SQL expression to evaluate, e.g. `@@version`
    pub query: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub injectable: bool,
    pub confidence: f32,
    pub technique: &'static str,
    pub payload: Option<Payload>,
    pub evidence: String,
    /// Dialect confirmed by the technique, empty when it could not tell
    pub dbms: String,
}

impl DetectionResult {
    pub fn negative(technique: &'static str) -> Self {
        Self {
            injectable: false,
            confidence: 0.0,
            technique,
            payload: None,
            evidence: String::new(),
            dbms: String::new(),
        }
    }

    pub fn positive(
        technique: &'static str,
        confidence: f32,
        payload: Payload,
        evidence: impl Into<String>,
    ) -> Self {
        Self {
            injectable: true,
            confidence,
            technique,
            payload: Some(payload),
            evidence: evidence.into(),
            dbms: String::new(),
        }
    }

    pub fn with_dbms(mut self, dbms: impl Into<String>) -> Self {
        self.dbms = dbms.into();
        self
    }
}

#[derive(Debug, Default)]
pub struct ExtractionResult {
    pub value: String,
    /// Set when extraction stopped before the full value was read
    pub partial: bool,
    pub requests: usize,
    pub error: Option<SqliError>,
}

impl ExtractionResult {
    pub fn complete(value: String, requests: usize) -> Self {
        Self {
            value,
            partial: false,
            requests,
            error: None,
        }
    }

    /// Keep the progress made so far alongside the failure
    pub fn interrupted(value: String, requests: usize, error: SqliError) -> Self {
        Self {
            value,
            partial: true,
            requests,
            error: Some(error),
        }
    }
}

#[async_trait]
pub trait Technique: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower runs first
    fn priority(&self) -> u8;

    async fn detect(
        &self,
        cancel: &CancellationToken,
        req: &InjectionRequest,
    ) -> Result<DetectionResult>;

    async fn extract(
        &self,
        cancel: &CancellationToken,
        req: &ExtractionRequest,
    ) -> Result<ExtractionResult>;
}

/// Transport failures make a single probe inconclusive; cancellation is fatal.
///
/// Returns `Ok(None)` for an inconclusive probe so callers move on to the
/// next candidate.
pub(crate) fn inconclusive<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            tracing::debug!("inconclusive probe: {}", err);
            Ok(None)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::http::mock::{page, MockTransport};
    use crate::sqli::core::enums::Location;
    use once_cell::sync::Lazy;
    use regex::Regex;

    pub const URL: &str = "http://shop.local/item?id=7";

    pub fn injection(transport: Arc<MockTransport>, baseline: &str, dbms: &str) -> InjectionRequest {
        let target = ScanTarget::new(URL)
            .with_parameter(Parameter::new("id", "7", Location::Query));
        InjectionRequest {
            parameter: target.parameters[0].clone(),
            target: Arc::new(target),
            baseline: page(baseline),
            dbms: dbms.to_string(),
            transport,
        }
    }

    pub fn extraction(injection: InjectionRequest, query: &str) -> ExtractionRequest {
        ExtractionRequest {
            injection,
            query: query.to_string(),
        }
    }

    static LENGTH_GT: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^LENGTH\(\((.+)\)\)>(\d+)$").unwrap());
    static ASCII_GT: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^ASCII\(SUBSTRING\(\((.+)\),(\d+),1\)\)>(\d+)$").unwrap());

    /// Evaluate the conditions the blind techniques emit against a secret value
    pub fn evaluate(condition: &str, secret: &str) -> Option<bool> {
        match condition {
            "1=1" | "'1'='1'" => return Some(true),
            "1=2" | "'1'='2'" => return Some(false),
            _ => {}
        }

        if let Some(caps) = LENGTH_GT.captures(condition) {
            let n: usize = caps[2].parse().ok()?;
            return Some(secret.chars().count() > n);
        }

        if let Some(caps) = ASCII_GT.captures(condition) {
            let position: usize = caps[2].parse().ok()?;
            let n: u32 = caps[3].parse().ok()?;
            let code = secret
                .chars()
                .nth(position.checked_sub(1)?)
                .map(|c| c as u32)
                .unwrap_or(0);
            return Some(code > n);
        }

        None
    }

    /// Condition injected into a numeric context by the bare boundary
    pub fn numeric_condition(value: &str) -> Option<&str> {
        value.strip_prefix("7 AND ")?.strip_suffix("-- -")
    }
}
