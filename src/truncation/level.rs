//! The truncation ladder
//!
//! Levels are ordered from least to most aggressive. Each step keeps fewer
//! lines per patch, treats fewer files as "small", and truncates a wider
//! range of risk tiers, so every level truncates a superset of what the
//! previous one did.

use super::risk::FileRiskLevel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationLevel {
    Moderate,
    Aggressive,
    Extreme,
    Ultimate,
}

impl TruncationLevel {
    /// Full escalation ladder, least aggressive first
    pub const ALL: [TruncationLevel; 4] = [
        TruncationLevel::Moderate,
        TruncationLevel::Aggressive,
        TruncationLevel::Extreme,
        TruncationLevel::Ultimate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TruncationLevel::Moderate => "moderate",
            TruncationLevel::Aggressive => "aggressive",
            TruncationLevel::Extreme => "extreme",
            TruncationLevel::Ultimate => "ultimate",
        }
    }

    /// Lines kept from the head of a truncated patch
    pub fn keep_start(&self) -> usize {
        match self {
            TruncationLevel::Moderate => 80,
            TruncationLevel::Aggressive => 40,
            TruncationLevel::Extreme => 20,
            TruncationLevel::Ultimate => 8,
        }
    }

    /// Lines kept from the tail of a truncated patch
    pub fn keep_end(&self) -> usize {
        match self {
            TruncationLevel::Moderate => 40,
            TruncationLevel::Aggressive => 20,
            TruncationLevel::Extreme => 10,
            TruncationLevel::Ultimate => 4,
        }
    }

    /// Patches with fewer lines than this are left alone at this level
    pub fn small_file_line_threshold(&self) -> usize {
        match self {
            TruncationLevel::Moderate => 150,
            TruncationLevel::Aggressive => 100,
            TruncationLevel::Extreme => 50,
            TruncationLevel::Ultimate => 20,
        }
    }

    /// Whether files of this risk tier are truncated at this level
    pub fn truncates(&self, risk: FileRiskLevel) -> bool {
        match risk {
            FileRiskLevel::Low => true,
            FileRiskLevel::Medium => *self >= TruncationLevel::Aggressive,
            FileRiskLevel::High => *self >= TruncationLevel::Extreme,
            FileRiskLevel::Critical => false,
        }
    }
}

impl fmt::Display for TruncationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TruncationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|level| level.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|l| l.name()).collect();
                format!(
                    "unknown truncation level '{}' (expected one of: {})",
                    s,
                    names.join(", ")
                )
            })
    }
}
