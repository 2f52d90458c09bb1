//! Core settings and constants for SQL injection

/// Similarity at or above which a probe page counts as "same as baseline"
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.95;

/// NULL value for SQL
pub const NULL: &str = "NULL";

/// Boolean-blind confirmation rounds after the boundary is found
pub const BOOLEAN_CONFIRM_ROUNDS: usize = 2;

/// Binary search ranges
pub const LENGTH_SEARCH_MAX: u32 = 1024;
pub const CHAR_SEARCH_MIN: u32 = 32;
pub const CHAR_SEARCH_MAX: u32 = 126;

/// Time-based defaults
pub const DEFAULT_TIME_DELAY: u64 = 5;
pub const DEFAULT_TIME_TOLERANCE: f64 = 0.7;
pub const DEFAULT_TIME_BASELINE_SAMPLES: usize = 2;

/// UNION settings
pub const UNION_MAX_COLUMNS: usize = 20;
pub const UNION_ERROR_LENGTH_RATIO: f64 = 0.4;
pub const UNION_MARKER: char = '~';

/// Random marker prefix for UNION sentinels
pub const SENTINEL_PREFIX: &str = "qvxvq";

/// Error-based chunked extraction cap
pub const ERROR_MAX_CHUNKS: usize = 64;

/// Error patterns for ORDER BY detection
pub const ORDER_BY_ERROR_PATTERNS: &[&str] = &[
    "unknown column",
    "out of range",
    "order by position",
    "order by term",
    "order clause",
    "invalid column",
    "is not in select list",
    "ora-01785",
];
