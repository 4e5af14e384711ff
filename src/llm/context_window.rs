//! Context-window overflow detection
//!
//! Providers report "your prompt is too big" in wildly different shapes, so
//! detection is a status gate plus a case-insensitive substring scan of the
//! response body. The indicator list is provider-agnostic and extendable.

use super::LlmError;
use serde::Deserialize;

/// Statuses providers use for payload and limit errors
pub const CONTEXT_ERROR_STATUSES: [u16; 3] = [400, 413, 429];

/// Body fragments that mean the prompt exceeded the model's input budget
pub const DEFAULT_CONTEXT_INDICATORS: &[&str] = &[
    "context length",
    "context window",
    "context_length_exceeded",
    "token limit",
    "maximum context",
    "prompt is too long",
    "maximum tokens",
    "too many tokens",
    "exceeds maximum",
    "input is too long",
    "request too large",
];

/// Anthropic-style structured error body
#[derive(Deserialize)]
struct ProviderErrorEnvelope {
    error: ProviderErrorDetail,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

/// Result of one LLM attempt, tagged for the retry loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(String),
    /// The prompt did not fit; a smaller prompt may succeed
    Overflow(LlmError),
    /// Anything else; retrying with less content will not help
    Fatal(LlmError),
}

#[derive(Debug, Clone)]
pub struct ContextWindowClassifier {
    indicators: Vec<String>,
}

impl Default for ContextWindowClassifier {
    fn default() -> Self {
        Self {
            indicators: DEFAULT_CONTEXT_INDICATORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ContextWindowClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add provider-specific indicators on top of the defaults
    pub fn with_indicators<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for indicator in extra {
            let indicator = indicator.as_ref().trim().to_lowercase();
            if !indicator.is_empty() && !self.indicators.contains(&indicator) {
                self.indicators.push(indicator);
            }
        }
        self
    }

    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }

    /// Whether an HTTP failure is a context-window overflow
    pub fn is_context_window_error(&self, status: u16, body: &[u8]) -> bool {
        if !CONTEXT_ERROR_STATUSES.contains(&status) {
            return false;
        }
        if is_structured_prompt_too_long(body) {
            return true;
        }
        let body = String::from_utf8_lossy(body).to_lowercase();
        self.indicators
            .iter()
            .any(|indicator| body.contains(indicator.as_str()))
    }

    /// Only provider-reported errors can be overflows. Timeouts and transport
    /// failures are always fatal.
    pub fn is_overflow(&self, err: &LlmError) -> bool {
        match err {
            LlmError::Api {
                status, message, ..
            } => self.is_context_window_error(*status, message.as_bytes()),
            LlmError::Timeout { .. }
            | LlmError::Transport { .. }
            | LlmError::InvalidResponse { .. } => false,
        }
    }

    pub fn classify(&self, result: Result<String, LlmError>) -> AttemptOutcome {
        match result {
            Ok(response) => AttemptOutcome::Success(response),
            Err(err) if self.is_overflow(&err) => AttemptOutcome::Overflow(err),
            Err(err) => AttemptOutcome::Fatal(err),
        }
    }
}

fn is_structured_prompt_too_long(body: &[u8]) -> bool {
    match serde_json::from_slice::<ProviderErrorEnvelope>(body) {
        Ok(envelope) => {
            envelope.error.kind == "invalid_request_error"
                && envelope
                    .error
                    .message
                    .to_lowercase()
                    .contains("prompt is too long")
        }
        Err(_) => false,
    }
}
