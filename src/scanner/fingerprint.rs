//! DBMS identification
//!
//! The fast path votes over error signatures the heuristic already saw. The
//! slow path finds a boolean boundary and asks which dialect's tautology the
//! backend accepts.

use super::heuristic::signature_dbms;
use super::{DbmsIdentifier, DbmsInfo, Fingerprinter};
use crate::http::response::HttpResponse;
use crate::http::Transport;
use crate::sqli::core::dialect;
use crate::sqli::core::enums::DBMS;
use crate::sqli::core::settings::DEFAULT_SIMILARITY_THRESHOLD;
use crate::sqli::core::target::{Parameter, ScanTarget};
use crate::sqli::error::Result;
use crate::sqli::request::{similarity, Prober};
use crate::sqli::techniques::{inconclusive, BooleanBlind};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Majority vote over DBMS-specific error signatures
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureIdentifier;

impl DbmsIdentifier for SignatureIdentifier {
    fn identify(&self, signatures: &HashMap<String, Vec<String>>) -> Option<DbmsInfo> {
        let mut votes: HashMap<DBMS, usize> = HashMap::new();
        for sig in signatures.values().flatten() {
            match signature_dbms(sig) {
                Some(DBMS::Unknown) | None => {}
                Some(dbms) => *votes.entry(dbms).or_default() += 1,
            }
        }

        // Ties go to the earlier dialect in registry order
        let mut winner: Option<(DBMS, usize)> = None;
        for d in dialect::all() {
            let count = votes.get(&d.dbms()).copied().unwrap_or(0);
            if count > 0 && winner.map_or(true, |(_, best)| count > best) {
                winner = Some((d.dbms(), count));
            }
        }

        winner.map(|(dbms, _)| DbmsInfo::new(dbms, "error signatures"))
    }
}

/// Probes per-dialect tautologies through a working boolean boundary
#[derive(Debug, Clone)]
pub struct BooleanFingerprinter {
    threshold: f64,
}

impl Default for BooleanFingerprinter {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl BooleanFingerprinter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

#[async_trait]
impl Fingerprinter for BooleanFingerprinter {
    async fn fingerprint(
        &self,
        cancel: &CancellationToken,
        target: &ScanTarget,
        parameter: &Parameter,
        baseline: &HttpResponse,
        transport: &dyn Transport,
    ) -> Result<Option<DbmsInfo>> {
        let prober = Prober::new(cancel, transport, target, parameter);
        let baseline = baseline.body_text();

        let boundary = match BooleanBlind::new(self.threshold)
            .find_boundary(&prober, &baseline)
            .await?
        {
            Some((boundary, _)) => boundary,
            None => return Ok(None),
        };

        for d in dialect::all() {
            let payload = boundary.and(&parameter.value, d.tautology());
            if let Some(resp) = inconclusive(prober.send(&payload).await)? {
                if similarity(&resp.body_text(), &baseline).await >= self.threshold {
                    tracing::debug!(param = %parameter.name, "{} tautology accepted", d.name());
                    return Ok(Some(DbmsInfo::new(d.dbms(), "boolean fingerprint")));
                }
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::{page, MockTransport};
    use crate::sqli::core::enums::Location;

    #[test]
    fn test_majority_vote() {
        let mut signatures = HashMap::new();
        signatures.insert(
            "id".to_string(),
            vec!["pg_query".to_string(), "syntax error".to_string()],
        );
        signatures.insert(
            "q".to_string(),
            vec!["PSQLException".to_string(), "mysql_fetch".to_string()],
        );

        let info = SignatureIdentifier.identify(&signatures).unwrap();
        assert_eq!(info.dbms, DBMS::PostgreSQL);
        assert_eq!(info.name(), "PostgreSQL");
    }

    #[test]
    fn test_generic_signatures_identify_nothing() {
        let mut signatures = HashMap::new();
        signatures.insert("id".to_string(), vec!["syntax error".to_string()]);
        assert!(SignatureIdentifier.identify(&signatures).is_none());
        assert!(SignatureIdentifier.identify(&HashMap::new()).is_none());
    }

    #[tokio::test]
    async fn test_postgres_tautology() {
        const BASE: &str = "<html><h1>Product 7</h1><p>Blue mug, dishwasher safe.</p></html>";
        let transport = MockTransport::on_query("id", |v| match v {
            "7" | "7 AND 1=1-- -" | "7 AND PG_BACKEND_PID()=PG_BACKEND_PID()-- -" => page(BASE),
            _ => page("error"),
        });
        let target = ScanTarget::new("http://shop.local/item?id=7")
            .with_parameter(Parameter::new("id", "7", Location::Query));

        let info = BooleanFingerprinter::default()
            .fingerprint(
                &CancellationToken::new(),
                &target,
                &target.parameters[0],
                &page(BASE),
                &transport,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.dbms, DBMS::PostgreSQL);
    }
}
