//! LLM invocation contract
//!
//! The analysis loop only needs "send a prompt, get text back", plus enough
//! structure in the failure to tell a context-window overflow apart from
//! everything else. Provider specifics live behind [`LlmAnalyzer`].

pub mod client;
pub mod context_window;

pub use client::ChatCompletionsClient;
pub use context_window::{AttemptOutcome, ContextWindowClassifier};

use futures::future::BoxFuture;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single LLM call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// The provider answered with an error status (or an error body)
    #[error("{provider} API error {status}: {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },
    #[error("{provider} request timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
    #[error("{provider} transport error: {message}")]
    Transport { provider: String, message: String },
    #[error("{provider} returned an unusable response: {message}")]
    InvalidResponse { provider: String, message: String },
}

impl LlmError {
    pub fn provider(&self) -> &str {
        match self {
            LlmError::Api { provider, .. }
            | LlmError::Timeout { provider, .. }
            | LlmError::Transport { provider, .. }
            | LlmError::InvalidResponse { provider, .. } => provider,
        }
    }

    /// HTTP status for provider-reported errors
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Something that can turn a prompt into a model response
pub trait LlmAnalyzer: Send + Sync {
    /// Provider name for logging and error reporting
    fn provider_name(&self) -> &str;

    /// Model identifier reported alongside results
    fn model(&self) -> &str;

    /// Dropping the returned future cancels the call.
    fn analyze<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>>;
}
