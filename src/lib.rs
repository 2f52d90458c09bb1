//! anvil-sqli: SQL injection detection and read-only extraction engine

pub mod cli;
pub mod core;
pub mod http;
pub mod reporting;
pub mod scanner;
pub mod sqli;
