//! Prompt rendering for release-confidence analysis
//!
//! The analysis loop hands the renderer the current diff text plus the
//! truncation metadata of the attempt (absent on the untruncated first try),
//! so the model can be told when content was cut.

use crate::truncation::TruncationMetadata;

/// Everything a prompt is built from
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub diff_text: &'a str,
    pub documentation: &'a str,
    pub guidance: &'a str,
    pub qe_testing_summary: &'a str,
    pub truncation: Option<&'a TruncationMetadata>,
}

pub trait PromptRenderer: Send + Sync {
    fn render(&self, inputs: &PromptInputs<'_>) -> String;
}

// ═══════════════════════════════════════════════════════════════════════════
//  TEMPLATE
// ═══════════════════════════════════════════════════════════════════════════

const TASK: &str = r#"Assess how confident we can be in releasing the change below.

Consider:
- Correctness and regression risk of the modified code
- Security, data, and migration impact
- Operational risk (configuration, deployment, rollback)
- Whether testing evidence covers the risky parts

Respond with a JSON object:
{"score": <0-100>, "summary": "...", "risks": ["..."], "recommendations": ["..."]}"#;

/// Maximum truncated filenames listed in the notice
const MAX_LISTED_TRUNCATED_FILES: usize = 50;

/// The default release-confidence prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct ReleasePromptTemplate;

impl PromptRenderer for ReleasePromptTemplate {
    fn render(&self, inputs: &PromptInputs<'_>) -> String {
        let mut prompt = String::from(TASK);

        if let Some(notice) = inputs.truncation.and_then(truncation_notice) {
            push_section(&mut prompt, "TRUNCATION NOTICE", &notice);
        }
        push_section(&mut prompt, "REVIEWER GUIDANCE", inputs.guidance);
        push_section(&mut prompt, "QE TESTING SUMMARY", inputs.qe_testing_summary);
        push_section(&mut prompt, "DOCUMENTATION", inputs.documentation);
        push_section(&mut prompt, "CODE CHANGES", inputs.diff_text);
        prompt
    }
}

fn push_section(prompt: &mut String, title: &str, body: &str) {
    let body = body.trim();
    if body.is_empty() {
        return;
    }
    prompt.push_str("\n\n");
    prompt.push_str(title);
    prompt.push_str(":\n");
    prompt.push_str(body);
}

/// Tells the model what was omitted. `None` when nothing was cut.
pub fn truncation_notice(metadata: &TruncationMetadata) -> Option<String> {
    if !metadata.truncated {
        return None;
    }

    let mut notice = format!(
        "The diff was too large for the model context and was truncated at the '{}' level. \
{} of {} files had the middle of their patch replaced by an omission marker; \
{} files are shown in full. Files judged critical (auth, security, payments, migrations, \
infrastructure) are never truncated. Do not assume omitted lines are safe; \
lower your confidence where truncation hides relevant changes.",
        metadata.level, metadata.files_truncated, metadata.total_files, metadata.files_preserved
    );

    notice.push_str("\n\nTruncated files:");
    for name in metadata
        .truncated_files_list
        .iter()
        .take(MAX_LISTED_TRUNCATED_FILES)
    {
        notice.push_str("\n- ");
        notice.push_str(name);
    }
    let hidden = metadata
        .truncated_files_list
        .len()
        .saturating_sub(MAX_LISTED_TRUNCATED_FILES);
    if hidden > 0 {
        notice.push_str(&format!("\n- ... and {} more", hidden));
    }
    Some(notice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs<'a>(truncation: Option<&'a TruncationMetadata>) -> PromptInputs<'a> {
        PromptInputs {
            diff_text: "## Repository: acme/api\n```diff\n+x\n```",
            documentation: "",
            guidance: "Focus on the billing flow.",
            qe_testing_summary: "  ",
            truncation,
        }
    }

    #[test]
    fn test_untruncated_prompt_has_no_notice_and_skips_empty_sections() {
        let prompt = ReleasePromptTemplate.render(&inputs(None));

        assert!(prompt.starts_with("Assess how confident"));
        assert!(!prompt.contains("TRUNCATION NOTICE"));
        assert!(!prompt.contains("DOCUMENTATION"));
        assert!(!prompt.contains("QE TESTING SUMMARY"));
        assert!(prompt.contains("REVIEWER GUIDANCE:\nFocus on the billing flow."));
        assert!(prompt.ends_with("CODE CHANGES:\n## Repository: acme/api\n```diff\n+x\n```"));
    }

    #[test]
    fn test_truncated_prompt_discloses_what_was_cut() {
        let metadata = TruncationMetadata {
            truncated: true,
            level: "aggressive".to_string(),
            total_files: 4,
            files_preserved: 2,
            files_truncated: 2,
            truncated_files_list: vec!["docs/a.md".to_string(), "src/lib.rs".to_string()],
        };
        let prompt = ReleasePromptTemplate.render(&inputs(Some(&metadata)));

        let notice_at = prompt.find("TRUNCATION NOTICE").unwrap();
        let diff_at = prompt.find("CODE CHANGES").unwrap();
        assert!(notice_at < diff_at);
        assert!(prompt.contains("'aggressive' level"));
        assert!(prompt.contains("2 of 4 files"));
        assert!(prompt.contains("- docs/a.md\n- src/lib.rs"));
    }

    #[test]
    fn test_metadata_without_truncation_adds_no_notice() {
        let metadata = TruncationMetadata {
            level: "moderate".to_string(),
            total_files: 3,
            files_preserved: 3,
            ..Default::default()
        };
        assert!(truncation_notice(&metadata).is_none());
        assert!(!ReleasePromptTemplate
            .render(&inputs(Some(&metadata)))
            .contains("TRUNCATION NOTICE"));
    }

    #[test]
    fn test_long_truncated_file_lists_are_capped() {
        let metadata = TruncationMetadata {
            truncated: true,
            level: "ultimate".to_string(),
            total_files: 60,
            files_preserved: 0,
            files_truncated: 60,
            truncated_files_list: (0..60).map(|i| format!("docs/{i}.md")).collect(),
        };
        let notice = truncation_notice(&metadata).unwrap();
        assert!(notice.contains("- docs/49.md"));
        assert!(!notice.contains("- docs/50.md"));
        assert!(notice.ends_with("- ... and 10 more"));
    }
}
