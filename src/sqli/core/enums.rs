//! Enumerations for SQL injection

use serde::Serialize;

/// Database Management System types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DBMS {
    MySQL,
    PostgreSQL,
    MSSQL,
    Oracle,
    SQLite,
    Unknown,
}

impl DBMS {
    /// Canonical dialect name, empty for `Unknown`
    pub fn name(&self) -> &'static str {
        match self {
            DBMS::MySQL => "MySQL",
            DBMS::PostgreSQL => "PostgreSQL",
            DBMS::MSSQL => "MSSQL",
            DBMS::Oracle => "Oracle",
            DBMS::SQLite => "SQLite",
            DBMS::Unknown => "",
        }
    }
}

impl std::fmt::Display for DBMS {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DBMS::MySQL => write!(f, "MySQL"),
            DBMS::PostgreSQL => write!(f, "PostgreSQL"),
            DBMS::MSSQL => write!(f, "Microsoft SQL Server"),
            DBMS::Oracle => write!(f, "Oracle"),
            DBMS::SQLite => write!(f, "SQLite"),
            DBMS::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Where a parameter lives in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Query,
    Body,
    Header,
    Cookie,
    Path,
    Json,
    GraphQl,
    Xml,
    Multipart,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Location::Query => "query",
            Location::Body => "body",
            Location::Header => "header",
            Location::Cookie => "cookie",
            Location::Path => "path",
            Location::Json => "json",
            Location::GraphQl => "graphql",
            Location::Xml => "xml",
            Location::Multipart => "multipart",
        };
        write!(f, "{}", name)
    }
}

/// Inferred value type. Advisory only: it picks which boundaries are tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Float,
}

impl ParamType {
    pub fn infer(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            ParamType::String
        } else if trimmed.parse::<i64>().is_ok() {
            ParamType::Integer
        } else if trimmed.parse::<f64>().is_ok() {
            ParamType::Float
        } else {
            ParamType::String
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ParamType::Integer | ParamType::Float)
    }
}
