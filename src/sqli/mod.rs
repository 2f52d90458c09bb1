//! SQL injection detection and read-only extraction
//!
//! - core: enums, tunable settings, dialects, boundaries, scan target model
//! - request: probe construction and page comparison
//! - techniques: error-based, boolean-blind, time-based, union-based
//! - tamper: payload transforms applied at the transport layer

pub mod core;
pub mod error;
pub mod request;
pub mod tamper;
pub mod techniques;

pub use error::{Result, SqliError};
pub use techniques::{
    BooleanBlind, DetectionResult, ErrorBased, ExtractionRequest, ExtractionResult,
    InjectionRequest, Technique, TimeBased, UnionBased,
};
