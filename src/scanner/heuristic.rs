//! Pre-scan heuristic: break the syntax and look for DBMS errors

use super::{HeuristicDetector, HeuristicResult};
use crate::http::Transport;
use crate::sqli::core::enums::DBMS;
use crate::sqli::core::settings::DEFAULT_SIMILARITY_THRESHOLD;
use crate::sqli::core::target::ScanTarget;
use crate::sqli::error::{Result, SqliError};
use crate::sqli::request::{similarity, Prober};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Appended to the original value to unbalance quotes and parentheses
pub const HEURISTIC_PROBE: &str = "'\")";

/// DBMS error signatures
pub const ERROR_PATTERNS: &[(&str, DBMS)] = &[
    // MySQL
    ("You have an error in your SQL syntax", DBMS::MySQL),
    ("mysql_fetch", DBMS::MySQL),
    ("mysql_num_rows", DBMS::MySQL),
    ("MySQL server version", DBMS::MySQL),
    ("mysqli_", DBMS::MySQL),
    ("Warning: mysql_", DBMS::MySQL),
    ("XPATH syntax error", DBMS::MySQL),
    // PostgreSQL
    ("pg_query", DBMS::PostgreSQL),
    ("pg_exec", DBMS::PostgreSQL),
    ("PostgreSQL query failed", DBMS::PostgreSQL),
    ("PSQLException", DBMS::PostgreSQL),
    ("ERROR: syntax error at or near", DBMS::PostgreSQL),
    ("unterminated quoted string at or near", DBMS::PostgreSQL),
    // MSSQL
    ("Microsoft SQL Server", DBMS::MSSQL),
    ("Unclosed quotation mark", DBMS::MSSQL),
    ("ODBC SQL Server Driver", DBMS::MSSQL),
    ("SQLServer JDBC Driver", DBMS::MSSQL),
    ("mssql_query", DBMS::MSSQL),
    ("[SQL Server]", DBMS::MSSQL),
    // Oracle
    ("ORA-0", DBMS::Oracle),
    ("ORA-1", DBMS::Oracle),
    ("Oracle error", DBMS::Oracle),
    ("quoted string not properly terminated", DBMS::Oracle),
    // SQLite
    ("SQLite/JDBCDriver", DBMS::SQLite),
    ("SQLite.Exception", DBMS::SQLite),
    ("sqlite3.OperationalError", DBMS::SQLite),
    ("SQLITE_ERROR", DBMS::SQLite),
    ("unrecognized token:", DBMS::SQLite),
    // Generic
    ("SQL syntax", DBMS::Unknown),
    ("syntax error", DBMS::Unknown),
    ("Invalid query", DBMS::Unknown),
];

/// Signatures present in `body`
pub fn matching_signatures(body: &str) -> Vec<&'static str> {
    let lower = body.to_lowercase();
    ERROR_PATTERNS
        .iter()
        .filter(|(pattern, _)| lower.contains(&pattern.to_lowercase()))
        .map(|(pattern, _)| *pattern)
        .collect()
}

/// DBMS a signature belongs to
pub fn signature_dbms(signature: &str) -> Option<DBMS> {
    ERROR_PATTERNS
        .iter()
        .find(|(pattern, _)| *pattern == signature)
        .map(|(_, dbms)| *dbms)
}

/// One baseline and one syntax-breaking probe per parameter
pub struct ErrorHeuristic {
    transport: Arc<dyn Transport>,
    threshold: f64,
}

impl ErrorHeuristic {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

#[async_trait]
impl HeuristicDetector for ErrorHeuristic {
    async fn detect(&self, cancel: &CancellationToken, target: &ScanTarget) -> Result<Vec<HeuristicResult>> {
        let mut results = Vec::with_capacity(target.parameters.len());

        for param in &target.parameters {
            let prober = Prober::new(cancel, self.transport.as_ref(), target, param);

            let baseline = prober.original().await.map_err(|err| match err {
                SqliError::Cancelled => SqliError::Cancelled,
                other => SqliError::Heuristic(format!("baseline for {}: {}", param.name, other)),
            })?;
            let broken = prober
                .query_page(&format!("{}{}", param.value, HEURISTIC_PROBE))
                .await
                .map_err(|err| match err {
                    SqliError::Cancelled => SqliError::Cancelled,
                    other => SqliError::Heuristic(format!("probe for {}: {}", param.name, other)),
                })?;

            let baseline_text = baseline.body_text();
            let broken_text = broken.body_text();
            let already = matching_signatures(&baseline_text);
            let signatures: Vec<String> = matching_signatures(&broken_text)
                .into_iter()
                .filter(|sig| !already.contains(sig))
                .map(str::to_string)
                .collect();

            let ratio = similarity(&broken_text, &baseline_text).await;
            let injectable = !signatures.is_empty() || ratio < self.threshold;

            tracing::debug!(
                param = %param.name,
                ratio,
                signatures = signatures.len(),
                "heuristic verdict: {}",
                if injectable { "candidate" } else { "unlikely" }
            );

            results.push(HeuristicResult {
                parameter: param.clone(),
                baseline,
                injectable,
                signatures,
            });
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::{page, MockTransport};
    use crate::sqli::core::enums::Location;
    use crate::sqli::core::target::Parameter;

    fn target() -> ScanTarget {
        ScanTarget::new("http://shop.local/item?id=7&sort=asc")
            .with_parameter(Parameter::new("id", "7", Location::Query))
            .with_parameter(Parameter::new("sort", "asc", Location::Query))
    }

    #[tokio::test]
    async fn test_flags_erroring_parameter() {
        let transport = Arc::new(MockTransport::new(|req| {
            let id = crate::http::mock::query_value(req, "id");
            if id.contains('\'') {
                page("You have an error in your SQL syntax; check the manual")
            } else {
                page("<html>item listing</html>")
            }
        }));
        let heuristic = ErrorHeuristic::new(transport);
        let results = heuristic
            .detect(&CancellationToken::new(), &target())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].injectable);
        assert!(results[0]
            .signatures
            .contains(&"You have an error in your SQL syntax".to_string()));
        assert!(!results[1].injectable);
        assert!(results[1].signatures.is_empty());
    }

    #[test]
    fn test_signature_lookup() {
        let sigs = matching_signatures("Warning: pg_query(): ERROR: syntax error at or near");
        assert!(sigs.contains(&"pg_query"));
        assert_eq!(signature_dbms("pg_query"), Some(DBMS::PostgreSQL));
        assert_eq!(signature_dbms("syntax error"), Some(DBMS::Unknown));
    }
}
