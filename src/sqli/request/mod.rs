//! Request module - probe building and page comparison

pub mod comparison;
pub mod connect;

pub use comparison::{page_ratio, similarity};
pub use connect::{build_original, build_probe, Prober};
