//! Injection techniques selectable for a scan

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Capability {
    ErrorBased,
    BooleanBlind,
    TimeBased,
    UnionBased,
}

impl Capability {
    /// Parse a technique letter (`B`, `E`, `U`, `T`)
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'B' => Some(Capability::BooleanBlind),
            'E' => Some(Capability::ErrorBased),
            'U' => Some(Capability::UnionBased),
            'T' => Some(Capability::TimeBased),
            _ => None,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            Capability::BooleanBlind => 'B',
            Capability::ErrorBased => 'E',
            Capability::UnionBased => 'U',
            Capability::TimeBased => 'T',
        }
    }

    /// Check if this technique is paid for with response delays
    pub fn is_slow(&self) -> bool {
        matches!(self, Capability::TimeBased)
    }
}
