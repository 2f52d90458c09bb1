//! Error taxonomy for detection and extraction

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SqliError>;

#[derive(Debug, Error)]
pub enum SqliError {
    /// The scan-wide cancellation token fired
    #[error("scan cancelled")]
    Cancelled,

    /// A single probe failed at the network level; inconclusive, not fatal
    #[error("transport error: {0}")]
    Transport(anyhow::Error),

    /// The unmodified baseline request failed; nothing can run without it
    #[error("baseline request failed: {0}")]
    Baseline(anyhow::Error),

    #[error("not injectable: {0}")]
    NotInjectable(String),

    #[error("unknown dialect: {0}")]
    UnknownDialect(String),

    /// Extraction stopped part way through the value
    #[error("extraction stopped at position {position}")]
    Partial {
        position: usize,
        #[source]
        source: Box<SqliError>,
    },

    #[error("heuristic detection failed: {0}")]
    Heuristic(String),

    #[error("fingerprinting failed: {0}")]
    Fingerprint(String),
}

impl SqliError {
    /// Only cancellation aborts a scan mid-flight
    pub fn is_fatal(&self) -> bool {
        matches!(self, SqliError::Cancelled)
    }

    pub fn partial(position: usize, source: SqliError) -> Self {
        SqliError::Partial {
            position,
            source: Box::new(source),
        }
    }
}
