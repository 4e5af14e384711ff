//! OpenAI-compatible chat-completions client
//!
//! Works against OpenRouter (the default), OpenAI, and any gateway speaking
//! the same `/chat/completions` shape. The client makes exactly one request
//! per call; deciding whether to retry belongs to the analysis loop.

use super::{LlmAnalyzer, LlmError};
use crate::config::LlmSettings;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Provider error bodies are kept for classification, but not unbounded.
const MAX_ERROR_BODY_CHARS: usize = 4000;

const SYSTEM_PROMPT: &str = "You are a release engineer assessing how safe a code change is to ship. \
Answer only from the material provided and say so when information is missing.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

/// Some gateways report upstream failures as `200 {"error": {...}}`
#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<serde_json::Value>,
}

pub struct ChatCompletionsClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
    model: String,
    provider: String,
    max_tokens: u32,
    timeout: Duration,
}

impl ChatCompletionsClient {
    pub fn new(settings: &LlmSettings, api_key: String) -> anyhow::Result<Self> {
        let endpoint = chat_completions_url(&settings.base_url)?;
        let timeout = Duration::from_secs(settings.timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            http,
            endpoint,
            api_key,
            model: settings.model.clone(),
            provider: settings.provider_name.clone(),
            max_tokens: settings.max_tokens,
            timeout,
        })
    }

    async fn send(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            stream: false,
        };

        debug!(
            provider = %self.provider,
            model = %self.model,
            prompt_chars = prompt.len(),
            "sending analysis request"
        );

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .header("X-Title", "release-confidence")
            .json(&request)
            .send()
            .await
            .map_err(|err| self.map_transport_error(err))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| self.map_transport_error(err))?;

        if !status.is_success() {
            return Err(self.api_error(status.as_u16(), &text));
        }

        if let Ok(err_body) = serde_json::from_str::<ErrorBody>(&text) {
            let code = err_body
                .error
                .code
                .as_ref()
                .and_then(status_from_code)
                .unwrap_or(400);
            return Err(self.api_error(code, &text));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse {
                provider: self.provider.clone(),
                message: format!("failed to parse response: {}", e),
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: self.provider.clone(),
                message: "response contained no content".to_string(),
            })
    }

    fn api_error(&self, status: u16, body: &str) -> LlmError {
        LlmError::Api {
            provider: self.provider.clone(),
            status,
            message: truncate_str(body, MAX_ERROR_BODY_CHARS).to_string(),
        }
    }

    fn map_transport_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout {
                provider: self.provider.clone(),
                timeout: self.timeout,
            }
        } else {
            LlmError::Transport {
                provider: self.provider.clone(),
                message: err.to_string(),
            }
        }
    }
}

impl LlmAnalyzer for ChatCompletionsClient {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn analyze<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, LlmError>> {
        self.send(prompt).boxed()
    }
}

/// `<base_url>/chat/completions`, tolerant of a trailing slash on the base
fn chat_completions_url(base_url: &str) -> anyhow::Result<Url> {
    let mut base = base_url.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)
        .and_then(|base| base.join("chat/completions"))
        .map_err(|e| anyhow::anyhow!("Invalid LLM base URL '{}': {}", base_url, e))
}

fn status_from_code(code: &serde_json::Value) -> Option<u16> {
    match code {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Truncate a string for display (Unicode-safe)
fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}
