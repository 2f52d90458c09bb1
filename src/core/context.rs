//! Scan configuration and CLI context

use crate::cli::args::Cli;
use crate::core::profile::ScanProfile;
use crate::core::scope::Scope;
use crate::sqli::core::dialect;
use crate::sqli::core::settings::{
    DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TIME_BASELINE_SAMPLES, DEFAULT_TIME_DELAY,
    DEFAULT_TIME_TOLERANCE, ERROR_MAX_CHUNKS, ORDER_BY_ERROR_PATTERNS, UNION_ERROR_LENGTH_RATIO,
    UNION_MAX_COLUMNS,
};
use crate::sqli::core::target::ScanTarget;
use crate::sqli::tamper::TamperChain;
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::time::Duration;

/// Tuning consumed by the scanner and its techniques
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub threads: usize,
    pub profile: ScanProfile,
    /// DBMS hint, empty when unknown
    pub dbms: String,
    /// Skip the heuristic pre-filter
    pub force_test: bool,
    /// Only test these parameter names (all when empty)
    pub parameters: Vec<String>,
    pub similarity_threshold: f64,
    pub time_delay: u64,
    pub time_tolerance: f64,
    pub time_baseline_samples: usize,
    pub union_length_ratio: f64,
    pub union_max_columns: usize,
    pub order_by_signatures: Vec<String>,
    pub error_max_chunks: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threads: 10,
            profile: ScanProfile::all(),
            dbms: String::new(),
            force_test: false,
            parameters: Vec::new(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            time_delay: DEFAULT_TIME_DELAY,
            time_tolerance: DEFAULT_TIME_TOLERANCE,
            time_baseline_samples: DEFAULT_TIME_BASELINE_SAMPLES,
            union_length_ratio: UNION_ERROR_LENGTH_RATIO,
            union_max_columns: UNION_MAX_COLUMNS,
            order_by_signatures: ORDER_BY_ERROR_PATTERNS.iter().map(|s| s.to_string()).collect(),
            error_max_chunks: ERROR_MAX_CHUNKS,
        }
    }
}

/// Read-only extraction requested on the command line
#[derive(Debug, Clone, Default)]
pub struct EnumerationConfig {
    pub banner: bool,
    pub current_user: bool,
    pub current_db: bool,
    pub hostname: bool,
    pub dbs: bool,
    pub tables: bool,
    pub columns: bool,
    /// Database for `tables`/`columns`, the current one when unset
    pub database: Option<String>,
    pub table: Option<String>,
    pub sql_query: Option<String>,
}

impl EnumerationConfig {
    pub fn has_any(&self) -> bool {
        self.banner
            || self.current_user
            || self.current_db
            || self.hostname
            || self.dbs
            || self.tables
            || self.columns
            || self.sql_query.is_some()
    }
}

pub struct Context {
    pub target: ScanTarget,
    pub config: ScanConfig,
    pub scope: Scope,
    pub rate_limit: u32,
    pub timeout: Duration,
    pub proxy: Option<String>,
    pub tamper: TamperChain,
    pub enumeration: EnumerationConfig,
    pub output_format: String,
    pub output_file: Option<String>,
}

/// `a=b; c=d` into a map
pub fn parse_cookies(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// `Name: value` lines into a map
pub fn parse_headers(raw: &[String]) -> HashMap<String, String> {
    raw.iter()
        .filter_map(|h| h.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn guess_content_type(body: &str) -> &'static str {
    if body.trim_start().starts_with('{') {
        "application/json"
    } else {
        "application/x-www-form-urlencoded"
    }
}

impl Context {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let scope = Scope::new(&cli.target)?;
        let profile = ScanProfile::from_letters(&cli.technique)?;

        let dbms = match cli.dbms.as_deref() {
            Some(name) => match dialect::lookup(name) {
                Some(d) => d.name().to_string(),
                None => bail!("unsupported DBMS '{}'", name),
            },
            None => String::new(),
        };

        if !(0.0..=1.0).contains(&cli.threshold) {
            bail!("--threshold must be between 0 and 1");
        }

        let tamper = match cli.tamper.as_deref() {
            Some(spec) => TamperChain::parse(spec)?,
            None => TamperChain::default(),
        };

        // Build the request under test
        let mut target = ScanTarget::new(cli.target.clone()).with_method(cli.method.clone());
        if let Some(data) = cli.data.as_deref() {
            let content_type = cli
                .content_type
                .clone()
                .unwrap_or_else(|| guess_content_type(data).to_string());
            target = target.with_body(data, content_type);
        }
        target.headers = parse_headers(&cli.headers);
        if let Some(cookie) = cli.cookie.as_deref() {
            target.cookies = parse_cookies(cookie);
        }

        let parameters = cli
            .param
            .as_deref()
            .map(|p| {
                p.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = ScanConfig {
            threads: cli.threads.max(1),
            profile,
            dbms,
            force_test: cli.force_test,
            parameters,
            similarity_threshold: cli.threshold,
            time_delay: cli.time_delay.max(1),
            time_tolerance: cli.time_tolerance,
            union_max_columns: cli.union_cols.max(1),
            ..ScanConfig::default()
        };

        let enumeration = EnumerationConfig {
            banner: cli.banner,
            current_user: cli.current_user,
            current_db: cli.current_db,
            hostname: cli.hostname,
            dbs: cli.dbs,
            tables: cli.tables,
            columns: cli.columns,
            database: cli.database,
            table: cli.table,
            sql_query: cli.sql_query,
        };

        Ok(Self {
            target,
            config,
            scope,
            rate_limit: cli.rate,
            timeout: Duration::from_secs(cli.timeout.max(1)),
            proxy: cli.proxy,
            tamper,
            enumeration,
            output_format: cli.format,
            output_file: cli.output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_from_cli() {
        let cli = Cli::parse_from([
            "anvil-sqli",
            "-t",
            "http://shop.local/login",
            "--method",
            "post",
            "--data",
            "user=a&pass=b",
            "--cookie",
            "session=abc; theme=dark",
            "-p",
            "user, pass",
            "--dbms",
            "postgres",
            "--technique",
            "EB",
            "--tamper",
            "space2comment",
        ]);
        let ctx = Context::from_cli(cli).unwrap();

        assert_eq!(ctx.target.method, "POST");
        assert_eq!(ctx.target.content_type, "application/x-www-form-urlencoded");
        assert_eq!(ctx.target.cookies.get("theme").map(String::as_str), Some("dark"));
        assert_eq!(ctx.config.parameters, vec!["user", "pass"]);
        assert_eq!(ctx.config.dbms, "PostgreSQL");
        assert_eq!(ctx.config.profile.letters(), "EB");
        assert_eq!(ctx.tamper.names(), vec!["space2comment"]);
    }

    #[test]
    fn test_schema_enumeration_is_requested() {
        let cli = Cli::parse_from(["anvil-sqli", "-t", "http://shop.local/?id=1", "--tables", "-D", "shop"]);
        let ctx = Context::from_cli(cli).unwrap();
        assert!(ctx.enumeration.has_any());
        assert_eq!(ctx.enumeration.database.as_deref(), Some("shop"));
    }

    #[test]
    fn test_rejects_unknown_dbms() {
        let cli = Cli::parse_from(["anvil-sqli", "-t", "http://shop.local/", "--dbms", "db2"]);
        assert!(Context::from_cli(cli).is_err());
    }

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers(&["Authorization: Bearer x:y".to_string()]);
        assert_eq!(headers["Authorization"], "Bearer x:y");
    }
}
