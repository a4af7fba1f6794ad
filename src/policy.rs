//! Normalization Policy
//!
//! Selects how the normalizer stage runs so every run shares one pipeline
//! and one palette check.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::normalize::{normalize_bytes, normalize_loaded, NormalizeError, NormalizeOutcome, Normalized};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizePolicy {
    /// Strip color metadata and rewrite the file atomically.
    #[default]
    InPlace,
    /// Strip color metadata from the bytes being decoded only.
    InMemory,
    /// Decode the file as stored.
    Off,
}

impl NormalizePolicy {
    pub const ALL: [NormalizePolicy; 3] = [
        NormalizePolicy::InPlace,
        NormalizePolicy::InMemory,
        NormalizePolicy::Off,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NormalizePolicy::InPlace => "in-place",
            NormalizePolicy::InMemory => "in-memory",
            NormalizePolicy::Off => "off",
        }
    }

    pub fn touches_files(self) -> bool {
        self == NormalizePolicy::InPlace
    }

    /// Produce the bytes to decode for the program read from `path`.
    pub fn apply(self, path: &Path, bytes: Vec<u8>) -> Result<Normalized, NormalizeError> {
        match self {
            NormalizePolicy::InPlace => normalize_loaded(path, bytes),
            NormalizePolicy::InMemory => normalize_bytes(bytes),
            NormalizePolicy::Off => Ok(Normalized {
                bytes,
                outcome: NormalizeOutcome::Skipped,
            }),
        }
    }
}

impl fmt::Display for NormalizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NormalizePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown normalize policy {:?} (expected in-place, in-memory or off)", s))
    }
}
