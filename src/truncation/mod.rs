//! Progressive, risk-aware diff truncation
//!
//! - [`risk`] classifies changed files into risk tiers
//! - [`level`] defines the escalation ladder
//! - [`patch`] shrinks a single patch to a head/tail window
//! - [`comparison`] applies both across one or many comparisons

pub mod comparison;
pub mod level;
pub mod patch;
pub mod risk;

pub use comparison::{TruncationMetadata, Truncator};
pub use level::TruncationLevel;
pub use patch::truncate_patch;
pub use risk::{FileRiskLevel, PatternMode, RiskClassifier, RiskPatternError, RiskPatterns};
