//! Scan profiles: which techniques run

use crate::core::capability::Capability;
use anyhow::{bail, Result};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProfile {
    pub enabled: BTreeSet<Capability>,
}

impl Default for ScanProfile {
    fn default() -> Self {
        Self::all()
    }
}

impl ScanProfile {
    /// Create an empty profile (no techniques enabled)
    pub fn empty() -> Self {
        Self {
            enabled: BTreeSet::new(),
        }
    }

    /// Every technique
    pub fn all() -> Self {
        use Capability::*;
        Self {
            enabled: [ErrorBased, BooleanBlind, TimeBased, UnionBased]
                .into_iter()
                .collect(),
        }
    }

    /// Build from a technique string such as `BEUT`
    pub fn from_letters(letters: &str) -> Result<Self> {
        let mut profile = Self::empty();
        for letter in letters.chars().filter(|c| !c.is_whitespace()) {
            match Capability::from_letter(letter) {
                Some(cap) => profile.enable(cap),
                None => bail!("unknown technique letter '{}' (expected B, E, U or T)", letter),
            }
        }
        if profile.enabled.is_empty() {
            bail!("no techniques selected");
        }
        Ok(profile)
    }

    /// Enable a specific capability
    pub fn enable(&mut self, cap: Capability) {
        self.enabled.insert(cap);
    }

    /// Check if a capability is enabled
    pub fn has(&self, cap: Capability) -> bool {
        self.enabled.contains(&cap)
    }

    pub fn letters(&self) -> String {
        self.enabled.iter().map(Capability::letter).collect()
    }
}
