//! SQL dialect registry
//!
//! Each supported DBMS exposes its fragment generators, canned error-based
//! templates and a static capability profile through [`Dialect`]. Dialects
//! are stateless unit structs held in process-wide statics, so lookups hand
//! out `&'static dyn Dialect` without locking.

mod mssql;
mod mysql;
mod oracle;
mod postgres;
mod sqlite;

pub use mssql::MsSql;
pub use mysql::MySql;
pub use oracle::Oracle;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use super::enums::DBMS;
use super::settings::UNION_MARKER;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Static feature flags of a dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub stacked_queries: bool,
    pub error_based: bool,
    pub union: bool,
    pub file_io: bool,
    pub os_exec: bool,
    pub subqueries: bool,
    pub case_when: bool,
    pub limit_offset: bool,
}

/// Error-based payload template owned by a dialect.
///
/// `template` holds exactly one `{expr}` placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadTemplate {
    pub name: &'static str,
    pub template: &'static str,
    pub dbms: DBMS,
    pub columns: u8,
}

pub const EXPR_PLACEHOLDER: &str = "{expr}";

impl PayloadTemplate {
    pub fn render(&self, expr: &str) -> String {
        self.template.replacen(EXPR_PLACEHOLDER, expr, 1)
    }
}

pub trait Dialect: Send + Sync {
    fn dbms(&self) -> DBMS;

    fn name(&self) -> &'static str {
        self.dbms().name()
    }

    fn concatenate(&self, parts: &[&str]) -> String;

    /// 1-based substring
    fn substring(&self, expr: &str, start: usize, length: usize) -> String {
        format!("SUBSTRING(({}),{},{})", expr, start, length)
    }

    fn length(&self, expr: &str) -> String {
        format!("LENGTH(({}))", expr)
    }

    fn ascii(&self, expr: &str) -> String {
        format!("ASCII({})", expr)
    }

    fn char_of(&self, code: u32) -> String {
        format!("CHAR({})", code)
    }

    fn version_query(&self) -> &'static str;
    fn current_user_query(&self) -> &'static str;
    fn current_db_query(&self) -> &'static str;
    fn hostname_query(&self) -> &'static str;

    fn databases_query(&self) -> String;
    fn tables_query(&self, database: &str) -> String;
    fn columns_query(&self, database: &str, table: &str) -> String;

    /// Native sleep call, if the dialect has one usable inside an expression
    fn sleep_function(&self, seconds: u64) -> Option<String>;

    /// CPU-bound expression used when no sleep primitive is available
    fn heavy_query(&self, seconds: u64) -> String;

    fn if_then_else(&self, condition: &str, then: &str, otherwise: &str) -> String {
        format!("(CASE WHEN ({}) THEN {} ELSE {} END)", condition, then, otherwise)
    }

    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Table required in a FROM clause for constant SELECTs
    fn from_dummy(&self) -> Option<&'static str> {
        None
    }

    fn error_payloads(&self) -> &'static [PayloadTemplate] {
        &[]
    }

    /// Regex whose first capture group holds the leaked value
    fn error_pattern(&self) -> Option<&'static Regex> {
        None
    }

    /// Undo any escaping the DBMS applied to a leaked value
    fn decode_leak(&self, raw: &str) -> String {
        raw.to_string()
    }

    /// Maximum characters a single error message leaks, if truncated
    fn error_truncation(&self) -> Option<usize> {
        None
    }

    fn capabilities(&self) -> Capabilities;

    /// Always-true predicate only this dialect accepts
    fn tautology(&self) -> &'static str;

    /// Predicate that delays the response by roughly `seconds` when `condition` holds
    fn conditional_delay(&self, condition: &str, seconds: u64) -> String {
        let delay = self
            .sleep_function(seconds)
            .unwrap_or_else(|| self.heavy_query(seconds));
        format!("1={}", self.if_then_else(condition, &delay, "1"))
    }

    /// Wrap an expression in `~` markers for UNION extraction
    fn marker_wrap(&self, expr: &str) -> String {
        let marker = self.char_of(UNION_MARKER as u32);
        let inner = format!("({})", expr);
        self.concatenate(&[&marker, &inner, &marker])
    }
}

static MYSQL: MySql = MySql;
static POSTGRES: Postgres = Postgres;
static MSSQL: MsSql = MsSql;
static ORACLE: Oracle = Oracle;
static SQLITE: Sqlite = Sqlite;

static ALL: Lazy<Vec<&'static dyn Dialect>> = Lazy::new(|| {
    vec![
        &MYSQL as &'static dyn Dialect,
        &POSTGRES as &'static dyn Dialect,
        &MSSQL as &'static dyn Dialect,
        &ORACLE as &'static dyn Dialect,
        &SQLITE as &'static dyn Dialect,
    ]
});

static ALIASES: Lazy<HashMap<&'static str, &'static dyn Dialect>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, &'static dyn Dialect> = HashMap::new();
    for alias in ["mysql", "mariadb", "maria", "percona"] {
        map.insert(alias, &MYSQL);
    }
    for alias in ["postgresql", "postgres", "pgsql", "pg", "psql"] {
        map.insert(alias, &POSTGRES);
    }
    for alias in [
        "mssql",
        "sqlserver",
        "sql server",
        "microsoft sql server",
        "ms sql",
        "mssqlserver",
        "sybase",
    ] {
        map.insert(alias, &MSSQL);
    }
    for alias in ["oracle", "ora", "oracledb"] {
        map.insert(alias, &ORACLE);
    }
    for alias in ["sqlite", "sqlite3"] {
        map.insert(alias, &SQLITE);
    }
    map
});

/// Case-insensitive lookup accepting common aliases
pub fn lookup(name: &str) -> Option<&'static dyn Dialect> {
    let key = name.trim().to_lowercase();
    ALIASES.get(key.as_str()).copied()
}

/// Dialect for an optional hint, falling back to MySQL
pub fn resolve(hint: &str) -> &'static dyn Dialect {
    lookup(hint).unwrap_or_else(default_dialect)
}

pub fn default_dialect() -> &'static dyn Dialect {
    &MYSQL
}

/// Every registered dialect, MySQL first
pub fn all() -> &'static [&'static dyn Dialect] {
    ALL.as_slice()
}

/// Dialects to try for a hint: the hinted one, or all of them when unknown
pub fn candidates(hint: &str) -> Vec<&'static dyn Dialect> {
    match lookup(hint) {
        Some(dialect) => vec![dialect],
        None => all().to_vec(),
    }
}
