//! Risk-aware truncation of whole comparisons
//!
//! Every call works on a clone of its input and recomputes from scratch, so
//! escalating to a more aggressive level never re-truncates an already
//! truncated patch.

use super::level::TruncationLevel;
use super::patch::truncate_patch;
use super::risk::{FileRiskLevel, RiskClassifier};
use crate::diff::Comparison;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// What a truncation pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationMetadata {
    pub truncated: bool,
    pub level: String,
    pub total_files: usize,
    pub files_preserved: usize,
    pub files_truncated: usize,
    pub truncated_files_list: Vec<String>,
}

impl TruncationMetadata {
    pub fn empty(level: TruncationLevel) -> Self {
        Self {
            level: level.name().to_string(),
            ..Default::default()
        }
    }

    /// Fold another comparison's metadata into this one. The level name is kept.
    pub fn merge(&mut self, other: TruncationMetadata) {
        self.truncated |= other.truncated;
        self.total_files += other.total_files;
        self.files_preserved += other.files_preserved;
        self.files_truncated += other.files_truncated;
        self.truncated_files_list.extend(other.truncated_files_list);
    }

    fn preserve(&mut self) {
        self.total_files += 1;
        self.files_preserved += 1;
    }

    fn record_truncation(&mut self, filename: &str) {
        self.total_files += 1;
        self.files_truncated += 1;
        self.truncated = true;
        self.truncated_files_list.push(filename.to_string());
    }
}

/// Applies risk classification and patch truncation across comparisons
#[derive(Debug, Clone)]
pub struct Truncator {
    classifier: Arc<RiskClassifier>,
}

impl Truncator {
    pub fn new(classifier: Arc<RiskClassifier>) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &RiskClassifier {
        &self.classifier
    }

    /// Truncate one comparison at `level`, returning the reduced copy
    pub fn truncate_comparison(
        &self,
        comparison: &Comparison,
        level: TruncationLevel,
    ) -> (Comparison, TruncationMetadata) {
        let mut truncated = comparison.clone();
        let mut metadata = TruncationMetadata::empty(level);

        for file in &mut truncated.files {
            let Some(patch) = file.patch.as_deref().filter(|p| !p.is_empty()) else {
                metadata.preserve();
                continue;
            };

            let line_count = file.patch_line_count();
            if line_count < level.small_file_line_threshold() {
                metadata.preserve();
                continue;
            }

            let risk = self.classifier.classify(&file.filename);
            if !level.truncates(risk) {
                if risk == FileRiskLevel::Critical {
                    debug!(file = %file.filename, lines = line_count, "keeping critical file intact");
                }
                metadata.preserve();
                continue;
            }

            let reduced = truncate_patch(patch, level.keep_start(), level.keep_end());
            debug!(
                file = %file.filename,
                %risk,
                %level,
                lines = line_count,
                "truncated patch"
            );
            file.patch = Some(reduced);
            metadata.record_truncation(&file.filename);
        }

        (truncated, metadata)
    }

    /// Truncate every comparison independently and merge their metadata
    pub fn truncate_all(
        &self,
        comparisons: &[Comparison],
        level: TruncationLevel,
    ) -> (Vec<Comparison>, TruncationMetadata) {
        let results: Vec<(Comparison, TruncationMetadata)> = comparisons
            .par_iter()
            .map(|comparison| self.truncate_comparison(comparison, level))
            .collect();

        let mut combined = TruncationMetadata::empty(level);
        let mut truncated = Vec::with_capacity(results.len());
        for (comparison, metadata) in results {
            combined.merge(metadata);
            truncated.push(comparison);
        }

        debug!(
            %level,
            comparisons = truncated.len(),
            files_truncated = combined.files_truncated,
            files_preserved = combined.files_preserved,
            "truncated change set"
        );
        (truncated, combined)
    }
}
