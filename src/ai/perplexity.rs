use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{provider_error, Citation, ResearchClient, ResearchResponse};
use crate::error::{AppError, Result};

const PERPLEXITY_API_URL: &str = "https://api.perplexity.ai/chat/completions";
const SERVICE: &str = "Perplexity";

/// Tried in order until one answers.
pub const RESEARCH_MODELS: &[&str] = &["sonar-pro", "sonar", "sonar-reasoning"];

const RESEARCH_SYSTEM_PROMPT: &str = "You are a medical research assistant. \
Provide accurate, evidence-based information with citations from reputable medical sources. \
Prefer peer-reviewed research, official health organizations and established medical institutions.";

#[derive(Debug, Serialize)]
struct ResearchRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    return_citations: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResearchBody {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
    #[serde(default)]
    citations: Vec<CitationEntry>,
    #[serde(default)]
    search_results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

/// Citations arrive either as bare URLs or as objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CitationEntry {
    Url(String),
    Detailed {
        url: String,
        #[serde(default)]
        title: String,
        #[serde(default)]
        text: String,
    },
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

impl From<CitationEntry> for Citation {
    fn from(entry: CitationEntry) -> Self {
        match entry {
            CitationEntry::Url(url) => Citation {
                url,
                title: String::new(),
                snippet: String::new(),
            },
            CitationEntry::Detailed { url, title, text } => Citation {
                url,
                title,
                snippet: text,
            },
        }
    }
}

pub struct PerplexityClient {
    client: Client,
    api_key: String,
    models: Vec<String>,
}

impl PerplexityClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            api_key,
            models: RESEARCH_MODELS.iter().map(|m| m.to_string()).collect(),
        })
    }

    async fn query_model(&self, model: &str, prompt: &str) -> Result<ResearchResponse> {
        let request = ResearchRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: RESEARCH_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: 2000,
            temperature: 0.2,
            return_citations: true,
        };

        let response = self
            .client
            .post(PERPLEXITY_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(SERVICE, response).await);
        }

        let body: ResearchBody = response.json().await?;
        into_research_response(model, body)
    }

    /// Minimal request against the first model only.
    pub async fn check(&self) -> Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::Config(
                "Perplexity API key not configured".to_string(),
            ));
        }
        let model = self
            .models
            .first()
            .ok_or_else(|| AppError::provider(SERVICE, "No research models configured"))?;
        let response = self.query_model(model, "What is the WHO?").await?;
        Ok(response.model)
    }
}

fn into_research_response(model: &str, body: ResearchBody) -> Result<ResearchResponse> {
    let text = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::EmptyResult(format!("{} model {}", SERVICE, model)))?;

    let mut citations: Vec<Citation> = body.citations.into_iter().map(Citation::from).collect();
    for result in body.search_results {
        match citations.iter_mut().find(|c| c.url == result.url) {
            Some(existing) => {
                if existing.title.is_empty() {
                    existing.title = result.title;
                }
                if existing.snippet.is_empty() {
                    existing.snippet = result.snippet;
                }
            }
            None => citations.push(Citation {
                url: result.url,
                title: result.title,
                snippet: result.snippet,
            }),
        }
    }

    Ok(ResearchResponse {
        text,
        citations,
        tokens_used: body.usage.map(|u| u.total_tokens),
        model: model.to_string(),
    })
}

#[async_trait]
impl ResearchClient for PerplexityClient {
    async fn research(&self, prompt: &str) -> Result<ResearchResponse> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::Config(
                "Perplexity API key not configured".to_string(),
            ));
        }

        let mut last_error = None;
        for model in &self.models {
            debug!(model = %model, "Querying research model");
            match self.query_model(model, prompt).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(model = %model, error = %e, "Research model failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::provider(SERVICE, "No research models configured")))
    }
}
