//! Collaborators consumed by the scan pipeline
//!
//! The [`Scanner`](crate::core::engine::Scanner) depends only on the traits
//! below. The default implementations live in the submodules and can be
//! swapped out through the scanner's builder.

pub mod fingerprint;
pub mod heuristic;
pub mod params;

pub use fingerprint::{BooleanFingerprinter, SignatureIdentifier};
pub use heuristic::ErrorHeuristic;
pub use params::QueryStringParser;

use crate::http::response::HttpResponse;
use crate::http::Transport;
use crate::sqli::core::enums::DBMS;
use crate::sqli::core::target::{Parameter, ScanTarget};
use crate::sqli::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Discovers parameters when the target was not pre-populated
pub trait ParameterParser: Send + Sync {
    fn parse(&self, url: &str, body: &str, content_type: &str) -> anyhow::Result<Vec<Parameter>>;
}

/// Pre-scan verdict for one parameter
#[derive(Debug, Clone)]
pub struct HeuristicResult {
    pub parameter: Parameter,
    pub baseline: HttpResponse,
    pub injectable: bool,
    /// DBMS error signatures seen in the syntax-breaking probe
    pub signatures: Vec<String>,
}

#[async_trait]
pub trait HeuristicDetector: Send + Sync {
    async fn detect(&self, cancel: &CancellationToken, target: &ScanTarget) -> Result<Vec<HeuristicResult>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbmsInfo {
    pub dbms: DBMS,
    pub version: String,
    /// How the DBMS was identified
    pub source: &'static str,
}

impl DbmsInfo {
    pub fn new(dbms: DBMS, source: &'static str) -> Self {
        Self {
            dbms,
            version: String::new(),
            source,
        }
    }

    pub fn name(&self) -> &'static str {
        self.dbms.name()
    }
}

/// Fast path: identify the DBMS from already-observed error signatures
pub trait DbmsIdentifier: Send + Sync {
    /// `signatures` maps parameter names to the signatures their probes produced
    fn identify(&self, signatures: &HashMap<String, Vec<String>>) -> Option<DbmsInfo>;
}

/// Slow path: identify the DBMS by probing one parameter
#[async_trait]
pub trait Fingerprinter: Send + Sync {
    async fn fingerprint(
        &self,
        cancel: &CancellationToken,
        target: &ScanTarget,
        parameter: &Parameter,
        baseline: &HttpResponse,
        transport: &dyn Transport,
    ) -> Result<Option<DbmsInfo>>;
}
