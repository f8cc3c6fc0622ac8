//! LLM clients used by the research and generation stages.

mod claude;
mod openai;
mod perplexity;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub use claude::ClaudeClient;
pub use openai::OpenAiClient;
pub use perplexity::{PerplexityClient, RESEARCH_MODELS};

/// Structured citation returned alongside a research answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Citation {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct ResearchResponse {
    pub text: String,
    pub citations: Vec<Citation>,
    pub tokens_used: Option<u32>,
    pub model: String,
}

/// Search-augmented model that answers a research prompt with citations.
#[async_trait]
pub trait ResearchClient: Send + Sync {
    async fn research(&self, prompt: &str) -> Result<ResearchResponse>;
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub tokens_used: Option<u32>,
}

/// Chat model that drafts article text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<Generation>;
}

/// Sampling limits for article generation.
pub const GENERATION_MAX_TOKENS: u32 = 2500;
pub const GENERATION_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Claude,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Claude => "claude",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preferred provider if it has a key, otherwise whichever one does.
pub fn select_provider(
    preferred: Provider,
    openai_key: Option<&str>,
    claude_key: Option<&str>,
) -> Option<Provider> {
    let has_key = |key: Option<&str>| key.is_some_and(|k| !k.trim().is_empty());
    let available = |provider: Provider| match provider {
        Provider::OpenAi => has_key(openai_key),
        Provider::Claude => has_key(claude_key),
    };

    [preferred, Provider::OpenAi, Provider::Claude]
        .into_iter()
        .find(|p| available(*p))
}

/// The two interchangeable generation backends, chosen once at startup.
pub enum LlmBackend {
    OpenAi(OpenAiClient),
    Claude(ClaudeClient),
}

impl LlmBackend {
    pub fn build(
        preferred: Provider,
        openai_key: Option<&str>,
        claude_key: Option<&str>,
    ) -> Result<Option<Self>> {
        let backend = match select_provider(preferred, openai_key, claude_key) {
            Some(Provider::OpenAi) => Some(LlmBackend::OpenAi(OpenAiClient::new(
                openai_key.unwrap_or_default().to_string(),
            )?)),
            Some(Provider::Claude) => Some(LlmBackend::Claude(ClaudeClient::new(
                claude_key.unwrap_or_default().to_string(),
            )?)),
            None => None,
        };
        Ok(backend)
    }
}

#[async_trait]
impl TextGenerator for LlmBackend {
    fn provider(&self) -> Provider {
        match self {
            LlmBackend::OpenAi(_) => Provider::OpenAi,
            LlmBackend::Claude(_) => Provider::Claude,
        }
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<Generation> {
        match self {
            LlmBackend::OpenAi(client) => client.generate(system_prompt, user_prompt).await,
            LlmBackend::Claude(client) => client.generate(system_prompt, user_prompt).await,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Structured { message: String },
    Plain(String),
}

/// Turns a non-success response into a provider error, preferring the
/// API's own `error.message`.
pub(crate) async fn provider_error(service: &str, response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return AppError::Transport(e),
    };
    AppError::provider(service, error_message(status.as_u16(), &body))
}

fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: ErrorDetail::Structured { message } | ErrorDetail::Plain(message),
        }) => message,
        Err(_) => format!("HTTP {}: {}", status, body),
    }
}
