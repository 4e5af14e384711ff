//! Comparison data model and diff formatting
//!
//! A [`Comparison`] is the difference between two git references in one
//! repository: its commits, its changed files (each with a unified-diff
//! patch) and aggregate stats. Comparisons are produced by an external fetch
//! step and loaded here from JSON; truncation always works on clones.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// How a file changed between the two references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
}

impl FileStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FileStatus::Added => "added",
            FileStatus::Modified => "modified",
            FileStatus::Removed => "removed",
            FileStatus::Renamed => "renamed",
        }
    }
}

/// A single changed file and its unified-diff patch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_filename: Option<String>,
    pub status: FileStatus,
    #[serde(default)]
    pub additions: u32,
    #[serde(default)]
    pub deletions: u32,
    #[serde(default)]
    pub changes: u32,
    /// Absent for binary files or when the host omits oversized patches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

impl FileChange {
    /// Number of lines in the patch (0 when there is none)
    pub fn patch_line_count(&self) -> usize {
        self.patch.as_deref().map(count_lines).unwrap_or(0)
    }

    fn has_patch(&self) -> bool {
        self.patch.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Count lines the way patches are split for truncation.
///
/// A single trailing newline terminates the last line rather than starting
/// a new, empty one.
pub fn count_lines(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.strip_suffix('\n').unwrap_or(text).split('\n').count()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl Commit {
    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }

    pub fn title(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonStats {
    pub total_files: u32,
    pub total_additions: u32,
    pub total_deletions: u32,
}

/// Everything that changed between two references of one repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub repository: String,
    #[serde(default)]
    pub commits: Vec<Commit>,
    #[serde(default)]
    pub files: Vec<FileChange>,
    #[serde(default)]
    pub stats: ComparisonStats,
}

impl Comparison {
    /// `owner/repo` for hosted URLs, otherwise the repository string as given
    pub fn repository_name(&self) -> String {
        match url::Url::parse(&self.repository) {
            Ok(parsed) if parsed.has_host() => {
                let path = parsed.path().trim_matches('/');
                let path = path.strip_suffix(".git").unwrap_or(path);
                if path.is_empty() {
                    self.repository.clone()
                } else {
                    path.to_string()
                }
            }
            _ => self.repository.clone(),
        }
    }
}

/// Load a JSON array of comparisons (or a single comparison object)
pub fn load_comparisons(path: &Path) -> Result<Vec<Comparison>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read comparisons from {}", path.display()))?;
    parse_comparisons(&content)
        .with_context(|| format!("Failed to parse comparisons in {}", path.display()))
}

pub fn parse_comparisons(content: &str) -> Result<Vec<Comparison>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    if value.is_array() {
        Ok(serde_json::from_value(value)?)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  DIFF FORMATTING
// ═══════════════════════════════════════════════════════════════════════════

/// Turns a (possibly truncated) change set into the diff block of the prompt
pub trait DiffFormatter: Send + Sync {
    fn format(&self, comparisons: &[Comparison]) -> String;
}

/// Markdown rendering: one section per repository, one fenced patch per file
#[derive(Debug, Clone, Copy, Default)]
pub struct UnifiedDiffFormatter;

impl DiffFormatter for UnifiedDiffFormatter {
    fn format(&self, comparisons: &[Comparison]) -> String {
        let mut out = String::new();
        for (i, comparison) in comparisons.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            write_comparison(&mut out, comparison);
        }
        out
    }
}

fn write_comparison(out: &mut String, comparison: &Comparison) {
    let stats = &comparison.stats;
    let _ = writeln!(out, "## Repository: {}", comparison.repository_name());
    let _ = writeln!(
        out,
        "{} files changed, +{} -{}",
        stats.total_files, stats.total_additions, stats.total_deletions
    );

    if !comparison.commits.is_empty() {
        out.push_str("\nCommits:\n");
        for commit in &comparison.commits {
            let _ = writeln!(out, "- {} {}", commit.short_sha(), commit.title());
        }
    }

    for file in &comparison.files {
        out.push('\n');
        let _ = write!(
            out,
            "### {} ({}, +{}/-{})",
            file.filename,
            file.status.label(),
            file.additions,
            file.deletions
        );
        if let Some(previous) = &file.previous_filename {
            let _ = write!(out, " renamed from {}", previous);
        }
        out.push('\n');

        match file.patch.as_deref() {
            Some(patch) if file.has_patch() => {
                out.push_str("```diff\n");
                out.push_str(patch);
                if !patch.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str("```\n");
            }
            _ => out.push_str("(no textual patch)\n"),
        }
    }
}
