use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    provider_error, Generation, Provider, TextGenerator, GENERATION_MAX_TOKENS,
    GENERATION_TEMPERATURE,
};
use crate::error::{AppError, Result};

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const CLAUDE_MODEL: &str = "claude-3-5-sonnet-20241022";
const SERVICE: &str = "Claude";

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
    system: &'a str,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

pub struct ClaudeClient {
    client: Client,
    api_key: String,
}

impl ClaudeClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self { client, api_key })
    }

    pub fn model_version(&self) -> &'static str {
        CLAUDE_MODEL
    }
}

#[async_trait]
impl TextGenerator for ClaudeClient {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<Generation> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::Config("Claude API key not configured".to_string()));
        }

        let request = MessageRequest {
            model: CLAUDE_MODEL,
            max_tokens: GENERATION_MAX_TOKENS,
            temperature: GENERATION_TEMPERATURE,
            messages: vec![Message {
                role: "user",
                content: user_prompt,
            }],
            system: system_prompt,
        };

        let response = self
            .client
            .post(CLAUDE_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(SERVICE, response).await);
        }

        let message_response: MessageResponse = response.json().await?;

        let text = message_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(AppError::EmptyResult(SERVICE.to_string()));
        }

        Ok(Generation {
            text,
            tokens_used: message_response
                .usage
                .map(|u| u.input_tokens + u.output_tokens),
        })
    }
}
