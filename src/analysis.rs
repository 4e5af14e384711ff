//! Analysis with progressive truncation
//!
//! The loop renders a prompt from the full diff and calls the model. When the
//! call fails because the prompt overflowed the model's context window, the
//! diff is truncated at the next, more aggressive level and the call is
//! retried:
//!
//! ```text
//! Initial ──ok──────────────────────────────▶ Succeeded (no metadata)
//!    │ overflow            fatal ──▶ Failed
//!    ▼
//! Level(0) ──ok──▶ Succeeded (metadata of level 0)
//!    │ overflow            fatal ──▶ Failed
//!    ▼
//!   ...
//! Level(n-1) ──overflow──▶ Exhausted
//! ```
//!
//! At most `levels.len() + 1` model calls are made. Every level truncates the
//! pristine input, never the previous attempt's output.

use crate::diff::{Comparison, DiffFormatter};
use crate::llm::{AttemptOutcome, ContextWindowClassifier, LlmAnalyzer, LlmError};
use crate::prompt::{PromptInputs, PromptRenderer};
use crate::truncation::{TruncationLevel, TruncationMetadata, Truncator};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Input of one analysis run
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub comparisons: Vec<Comparison>,
    pub documentation: String,
    pub guidance: String,
    pub qe_testing_summary: String,
}

/// A successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutcome {
    pub run_id: Uuid,
    pub response: String,
    /// Present only when the successful attempt used a truncated diff
    pub truncation: Option<TruncationMetadata>,
    pub attempts: usize,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A failure that truncation cannot fix; reported immediately
    #[error("LLM call failed{}: {source}", at_level(.level))]
    Llm {
        level: Option<TruncationLevel>,
        #[source]
        source: LlmError,
    },
    /// Every truncation level was tried and the prompt still did not fit
    #[error(
        "diff could not be reduced enough to fit the model context window after {attempts} attempts{}",
        at_level(.last_level)
    )]
    Exhausted {
        attempts: usize,
        last_level: Option<TruncationLevel>,
        #[source]
        source: LlmError,
    },
}

impl AnalysisError {
    /// The underlying model error
    pub fn llm_error(&self) -> &LlmError {
        match self {
            AnalysisError::Llm { source, .. } | AnalysisError::Exhausted { source, .. } => source,
        }
    }
}

fn at_level(level: &Option<TruncationLevel>) -> String {
    match level {
        Some(level) => format!(" at truncation level '{}'", level),
        None => String::new(),
    }
}

/// Runs an analysis, escalating truncation on context-window overflows
pub struct AnalysisRetryLoop {
    llm: Arc<dyn LlmAnalyzer>,
    renderer: Arc<dyn PromptRenderer>,
    formatter: Arc<dyn DiffFormatter>,
    truncator: Truncator,
    classifier: ContextWindowClassifier,
    levels: Vec<TruncationLevel>,
    attempt_timeout: Option<Duration>,
}

impl AnalysisRetryLoop {
    pub fn new(
        llm: Arc<dyn LlmAnalyzer>,
        renderer: Arc<dyn PromptRenderer>,
        formatter: Arc<dyn DiffFormatter>,
        truncator: Truncator,
    ) -> Self {
        Self {
            llm,
            renderer,
            formatter,
            truncator,
            classifier: ContextWindowClassifier::default(),
            levels: TruncationLevel::ALL.to_vec(),
            attempt_timeout: None,
        }
    }

    pub fn with_classifier(mut self, classifier: ContextWindowClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replace the escalation ladder (least aggressive first)
    pub fn with_levels(mut self, levels: Vec<TruncationLevel>) -> Self {
        self.levels = levels;
        self
    }

    /// Deadline for each individual model call
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn levels(&self) -> &[TruncationLevel] {
        &self.levels
    }

    pub async fn run(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome, AnalysisError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "analysis",
            %run_id,
            provider = self.llm.provider_name(),
            model = self.llm.model()
        );
        self.run_attempts(run_id, request).instrument(span).await
    }

    async fn run_attempts(
        &self,
        run_id: Uuid,
        request: &AnalysisRequest,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let prompt = self.render(&request.comparisons, request, None);
        let mut attempts = 1;
        info!(prompt_chars = prompt.len(), "analyzing untruncated diff");

        let mut last_overflow = match self.attempt(&prompt).await {
            AttemptOutcome::Success(response) => {
                info!(attempts, "analysis succeeded without truncation");
                return Ok(AnalysisOutcome {
                    run_id,
                    response,
                    truncation: None,
                    attempts,
                });
            }
            AttemptOutcome::Fatal(source) => {
                return Err(AnalysisError::Llm {
                    level: None,
                    source,
                })
            }
            AttemptOutcome::Overflow(err) => {
                warn!(error = %err, "prompt exceeded the context window; truncating");
                err
            }
        };
        let mut last_level = None;

        for &level in &self.levels {
            let (truncated, metadata) = self.truncator.truncate_all(&request.comparisons, level);
            let prompt = self.render(&truncated, request, Some(&metadata));
            attempts += 1;
            info!(
                %level,
                files_truncated = metadata.files_truncated,
                files_preserved = metadata.files_preserved,
                prompt_chars = prompt.len(),
                "retrying with truncated diff"
            );

            match self.attempt(&prompt).await {
                AttemptOutcome::Success(response) => {
                    info!(%level, attempts, "analysis succeeded after truncation");
                    return Ok(AnalysisOutcome {
                        run_id,
                        response,
                        truncation: Some(metadata),
                        attempts,
                    });
                }
                AttemptOutcome::Fatal(source) => {
                    return Err(AnalysisError::Llm {
                        level: Some(level),
                        source,
                    })
                }
                AttemptOutcome::Overflow(err) => {
                    warn!(%level, error = %err, "truncated prompt still exceeds the context window");
                    last_overflow = err;
                    last_level = Some(level);
                }
            }
        }

        Err(AnalysisError::Exhausted {
            attempts,
            last_level,
            source: last_overflow,
        })
    }

    fn render(
        &self,
        comparisons: &[Comparison],
        request: &AnalysisRequest,
        truncation: Option<&TruncationMetadata>,
    ) -> String {
        let diff_text = self.formatter.format(comparisons);
        self.renderer.render(&PromptInputs {
            diff_text: &diff_text,
            documentation: &request.documentation,
            guidance: &request.guidance,
            qe_testing_summary: &request.qe_testing_summary,
            truncation,
        })
    }

    async fn attempt(&self, prompt: &str) -> AttemptOutcome {
        let result = match self.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.llm.analyze(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout {
                    provider: self.llm.provider_name().to_string(),
                    timeout: limit,
                }),
            },
            None => self.llm.analyze(prompt).await,
        };
        self.classifier.classify(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{ComparisonStats, FileChange, FileStatus, UnifiedDiffFormatter};
    use crate::prompt::ReleasePromptTemplate;
    use crate::truncation::RiskClassifier;
    use futures::future::{BoxFuture, FutureExt};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted results and records every prompt it sees
    struct ScriptedLlm {
        script: Mutex<VecDeque<Result<String, LlmError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(script: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl LlmAnalyzer for ScriptedLlm {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        fn analyze<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("default".to_string()));
            async move { next }.boxed()
        }
    }

    struct SlowLlm;

    impl LlmAnalyzer for SlowLlm {
        fn provider_name(&self) -> &str {
            "slow"
        }

        fn model(&self) -> &str {
            "slow-model"
        }

        fn analyze<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>> {
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("too late".to_string())
            }
            .boxed()
        }
    }

    fn overflow() -> LlmError {
        LlmError::Api {
            provider: "scripted".to_string(),
            status: 400,
            message: "maximum context length exceeded".to_string(),
        }
    }

    fn server_error() -> LlmError {
        LlmError::Api {
            provider: "scripted".to_string(),
            status: 500,
            message: "internal error".to_string(),
        }
    }

    fn request() -> AnalysisRequest {
        let patch = (0..300).map(|i| format!("+doc {}", i)).collect::<Vec<_>>().join("\n");
        AnalysisRequest {
            comparisons: vec![Comparison {
                repository: "https://github.com/acme/api".to_string(),
                commits: Vec::new(),
                files: vec![FileChange {
                    filename: "docs/guide.md".to_string(),
                    previous_filename: None,
                    status: FileStatus::Modified,
                    additions: 300,
                    deletions: 0,
                    changes: 300,
                    patch: Some(patch),
                }],
                stats: ComparisonStats::default(),
            }],
            ..Default::default()
        }
    }

    fn retry_loop(llm: Arc<dyn LlmAnalyzer>) -> AnalysisRetryLoop {
        let classifier = Arc::new(RiskClassifier::with_default_patterns().unwrap());
        AnalysisRetryLoop::new(
            llm,
            Arc::new(ReleasePromptTemplate),
            Arc::new(UnifiedDiffFormatter),
            Truncator::new(classifier),
        )
    }

    #[tokio::test]
    async fn test_success_on_first_attempt_has_no_metadata() {
        let llm = ScriptedLlm::new(vec![Ok("ship it".to_string())]);
        let outcome = retry_loop(llm.clone()).run(&request()).await.unwrap();

        assert_eq!(outcome.response, "ship it");
        assert_eq!(outcome.truncation, None);
        assert_eq!(outcome.attempts, 1);
        assert!(!llm.prompts()[0].contains("TRUNCATION NOTICE"));
    }

    #[tokio::test]
    async fn test_overflow_escalates_until_success() {
        let llm = ScriptedLlm::new(vec![Err(overflow()), Err(overflow()), Ok("ok".to_string())]);
        let outcome = retry_loop(llm.clone()).run(&request()).await.unwrap();

        assert_eq!(outcome.attempts, 3);
        let metadata = outcome.truncation.unwrap();
        assert_eq!(metadata.level, "aggressive");
        assert_eq!(metadata.files_truncated, 1);

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1].contains("'moderate' level"));
        assert!(prompts[2].contains("'aggressive' level"));
        assert!(prompts[2].len() < prompts[1].len());
    }

    #[tokio::test]
    async fn test_fatal_error_after_truncation_stops_escalation() {
        let llm = ScriptedLlm::new(vec![Err(overflow()), Err(server_error())]);
        let err = retry_loop(llm.clone()).run(&request()).await.unwrap_err();

        match &err {
            AnalysisError::Llm { level, source } => {
                assert_eq!(*level, Some(TruncationLevel::Moderate));
                assert_eq!(source, &server_error());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("at truncation level 'moderate'"));
        assert_eq!(llm.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_ladder_reports_exhaustion_after_one_call() {
        let llm = ScriptedLlm::new(vec![Err(overflow())]);
        let err = retry_loop(llm.clone())
            .with_levels(Vec::new())
            .run(&request())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::Exhausted {
                attempts: 1,
                last_level: None,
                ..
            }
        ));
        assert_eq!(llm.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_custom_indicator_makes_error_retryable() {
        let custom = LlmError::Api {
            provider: "scripted".to_string(),
            status: 400,
            message: "payload exceeds model budget".to_string(),
        };
        let llm = ScriptedLlm::new(vec![Err(custom), Ok("ok".to_string())]);
        let outcome = retry_loop(llm)
            .with_classifier(ContextWindowClassifier::new().with_indicators(["exceeds model budget"]))
            .run(&request())
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_fatal() {
        let err = retry_loop(Arc::new(SlowLlm))
            .with_attempt_timeout(Duration::from_millis(20))
            .run(&request())
            .await
            .unwrap_err();

        match &err {
            AnalysisError::Llm {
                level: None,
                source: LlmError::Timeout { timeout, .. },
            } => assert_eq!(*timeout, Duration::from_millis(20)),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("timed out after 20ms"), "{err}");
    }
}
