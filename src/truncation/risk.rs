//! Path-based risk classification
//!
//! Decides how consequence-bearing a changed file is, which in turn decides
//! how long its patch survives truncation. Patterns are data, not code: the
//! defaults ship as an embedded JSON document and can be extended or
//! replaced by a user file.
//!
//! Pattern syntax (matched against the lower-cased, `/`-separated path):
//! - `*` matches any run of characters except `/`
//! - `**` matches any run of characters including `/`
//! - `?` matches a single character except `/`
//! - everything else is literal
//!
//! A pattern matches when it matches the whole path or any single path
//! segment, so `tests` matches `src/tests/foo.go` and `*.md` matches
//! `docs/guide.md`.

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const EMBEDDED_PATTERNS: &str = include_str!("risk_patterns.json");

/// Truncation priority of a file. `Critical` files are never truncated;
/// `Low` files are truncated first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRiskLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl FileRiskLevel {
    pub const ALL: [FileRiskLevel; 4] = [
        FileRiskLevel::Critical,
        FileRiskLevel::High,
        FileRiskLevel::Medium,
        FileRiskLevel::Low,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FileRiskLevel::Critical => "critical",
            FileRiskLevel::High => "high",
            FileRiskLevel::Medium => "medium",
            FileRiskLevel::Low => "low",
        }
    }
}

impl fmt::Display for FileRiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum RiskPatternError {
    #[error("failed to compile {tier} risk patterns: {source}")]
    Compile {
        tier: FileRiskLevel,
        #[source]
        source: regex::Error,
    },
    #[error("failed to read risk patterns from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed risk patterns in {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
}

/// How a user pattern file combines with the embedded defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternMode {
    #[default]
    Extend,
    Replace,
}

/// The four ordered pattern tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskPatterns {
    #[serde(default)]
    pub critical: Vec<String>,
    #[serde(default)]
    pub high: Vec<String>,
    #[serde(default)]
    pub medium: Vec<String>,
    #[serde(default)]
    pub low: Vec<String>,
}

impl RiskPatterns {
    /// The tables compiled into the binary
    pub fn embedded() -> Result<Self, RiskPatternError> {
        Self::from_json(EMBEDDED_PATTERNS, "embedded defaults")
    }

    pub fn from_json(json: &str, origin: &str) -> Result<Self, RiskPatternError> {
        serde_json::from_str(json).map_err(|source| RiskPatternError::Parse {
            origin: origin.to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, RiskPatternError> {
        let content = fs::read_to_string(path).map_err(|source| RiskPatternError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content, &path.display().to_string())
    }

    /// Embedded defaults combined with a user file according to `mode`
    pub fn with_overrides(path: &Path, mode: PatternMode) -> Result<Self, RiskPatternError> {
        let user = Self::load(path)?;
        match mode {
            PatternMode::Replace => Ok(user),
            PatternMode::Extend => {
                let mut patterns = Self::embedded()?;
                patterns.extend(user);
                Ok(patterns)
            }
        }
    }

    /// Append another set's patterns tier by tier
    pub fn extend(&mut self, other: RiskPatterns) {
        self.critical.extend(other.critical);
        self.high.extend(other.high);
        self.medium.extend(other.medium);
        self.low.extend(other.low);
    }

    fn tier(&self, level: FileRiskLevel) -> &[String] {
        match level {
            FileRiskLevel::Critical => &self.critical,
            FileRiskLevel::High => &self.high,
            FileRiskLevel::Medium => &self.medium,
            FileRiskLevel::Low => &self.low,
        }
    }
}

/// Compiled, immutable classifier. Build once and share.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    // Evaluation order: Critical, High, Medium, Low
    tiers: Vec<(FileRiskLevel, RegexSet)>,
}

impl RiskClassifier {
    pub fn new(patterns: &RiskPatterns) -> Result<Self, RiskPatternError> {
        let mut tiers = Vec::with_capacity(FileRiskLevel::ALL.len());
        for level in FileRiskLevel::ALL {
            let sources: Vec<String> = patterns
                .tier(level)
                .iter()
                .map(|p| glob_to_regex(&p.to_lowercase()))
                .collect();

            let set = RegexSet::new(&sources)
                .map_err(|source| RiskPatternError::Compile { tier: level, source })?;
            tiers.push((level, set));
        }
        Ok(Self { tiers })
    }

    /// Classifier over the embedded default tables
    pub fn with_default_patterns() -> Result<Self, RiskPatternError> {
        Self::new(&RiskPatterns::embedded()?)
    }

    /// Risk tier of a path. Total: unmatched paths are `Medium`.
    pub fn classify(&self, filename: &str) -> FileRiskLevel {
        let path = filename.to_lowercase().replace('\\', "/");
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        for (level, set) in &self.tiers {
            if set.is_match(&path) || segments.iter().any(|segment| set.is_match(segment)) {
                return *level;
            }
        }
        FileRiskLevel::Medium
    }
}

/// Translate a glob into an anchored regex
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RiskClassifier {
        RiskClassifier::with_default_patterns().unwrap()
    }

    #[test]
    fn test_embedded_patterns_cover_every_tier() {
        let patterns = RiskPatterns::embedded().unwrap();
        for level in FileRiskLevel::ALL {
            assert!(!patterns.tier(level).is_empty(), "{level} tier is empty");
        }
    }

    #[test]
    fn test_classify_critical_paths() {
        let c = classifier();
        assert_eq!(c.classify("internal/auth/session.go"), FileRiskLevel::Critical);
        assert_eq!(c.classify("db/migrations/0042_add_index.up.sql"), FileRiskLevel::Critical);
        assert_eq!(c.classify("Dockerfile"), FileRiskLevel::Critical);
        assert_eq!(c.classify("go.mod"), FileRiskLevel::Critical);
    }

    #[test]
    fn test_classify_high_paths() {
        let c = classifier();
        assert_eq!(c.classify("pkg/server/routes.go"), FileRiskLevel::High);
        assert_eq!(c.classify(".github/workflows/ci.yml"), FileRiskLevel::High);
        assert_eq!(c.classify("deploy/values.yaml"), FileRiskLevel::High);
    }

    #[test]
    fn test_classify_low_paths_via_segment_fallback() {
        let c = classifier();
        assert_eq!(c.classify("src/tests/foo.go"), FileRiskLevel::Low);
        assert_eq!(c.classify("docs/guide.md"), FileRiskLevel::Low);
        assert_eq!(c.classify("pkg/store/store_test.go"), FileRiskLevel::Low);
        assert_eq!(c.classify("Cargo.lock"), FileRiskLevel::Low);
        assert_eq!(c.classify("web/node_modules/left-pad/index.js"), FileRiskLevel::Low);
    }

    #[test]
    fn test_classify_defaults_to_medium() {
        let c = classifier();
        assert_eq!(c.classify("src/lib.rs"), FileRiskLevel::Medium);
        assert_eq!(c.classify(""), FileRiskLevel::Medium);
    }

    #[test]
    fn test_classify_is_case_insensitive_and_normalizes_separators() {
        let c = classifier();
        assert_eq!(c.classify("SRC\\Tests\\Foo.go"), FileRiskLevel::Low);
        assert_eq!(c.classify("README.MD"), FileRiskLevel::Low);
    }

    #[test]
    fn test_critical_wins_over_low() {
        // Both `*auth*` and `*_test.go` match; Critical is evaluated first.
        let c = classifier();
        assert_eq!(c.classify("pkg/auth/auth_test.go"), FileRiskLevel::Critical);
    }

    #[test]
    fn test_literal_pattern_matches_whole_segments_only() {
        let patterns = RiskPatterns {
            low: vec!["tests".to_string()],
            ..Default::default()
        };
        let c = RiskClassifier::new(&patterns).unwrap();
        assert_eq!(c.classify("src/tests/foo.go"), FileRiskLevel::Low);
        assert_eq!(c.classify("src/contests.go"), FileRiskLevel::Medium);
    }

    #[test]
    fn test_double_star_spans_directories() {
        let patterns = RiskPatterns {
            critical: vec!["infra/**/prod.tf".to_string()],
            ..Default::default()
        };
        let c = RiskClassifier::new(&patterns).unwrap();
        assert_eq!(c.classify("infra/aws/eu/prod.tf"), FileRiskLevel::Critical);
        assert_eq!(c.classify("infra/aws/eu/staging.tf"), FileRiskLevel::Medium);
    }

    #[test]
    fn test_extend_mode_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        fs::write(&path, r#"{"critical": ["ledger"]}"#).unwrap();

        let extended = RiskPatterns::with_overrides(&path, PatternMode::Extend).unwrap();
        let c = RiskClassifier::new(&extended).unwrap();
        assert_eq!(c.classify("src/ledger/post.rs"), FileRiskLevel::Critical);
        assert_eq!(c.classify("docs/guide.md"), FileRiskLevel::Low);

        let replaced = RiskPatterns::with_overrides(&path, PatternMode::Replace).unwrap();
        let c = RiskClassifier::new(&replaced).unwrap();
        assert_eq!(c.classify("src/ledger/post.rs"), FileRiskLevel::Critical);
        assert_eq!(c.classify("docs/guide.md"), FileRiskLevel::Medium);
    }

    #[test]
    fn test_malformed_pattern_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        fs::write(&path, "{not json").unwrap();

        let err = RiskPatterns::load(&path).unwrap_err();
        assert!(matches!(err, RiskPatternError::Parse { .. }));

        let missing = RiskPatterns::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, RiskPatternError::Read { .. }));
    }
}
