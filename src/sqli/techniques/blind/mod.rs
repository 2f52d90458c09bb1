//! Blind techniques: boolean page differences and response timing
//!
//! Both share the binary-search inference in [`search`]; they differ only in
//! how a single TRUE/FALSE answer is read off a response.

pub mod boolean;
pub mod search;
pub mod time;

pub use boolean::BooleanBlind;
pub use search::{infer_value, search, Oracle};
pub use time::TimeBased;
