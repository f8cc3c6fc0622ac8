use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cited source as seen by one research run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchSource {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub domain: String,
    pub credibility_score: u8,
}

impl ResearchSource {
    /// Bibliography label: title, then domain, then the bare URL.
    pub fn label(&self) -> &str {
        if !self.title.trim().is_empty() {
            self.title.trim()
        } else if !self.domain.is_empty() {
            &self.domain
        } else {
            &self.url
        }
    }
}

#[derive(Debug, Clone)]
pub struct Research {
    pub id: i64,
    pub headline_id: i64,
    pub query: String,
    pub response: String,
    pub sources: Vec<ResearchSource>,
    pub quality_score: Option<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewResearch {
    pub headline_id: i64,
    pub query: String,
    pub response: String,
    pub sources: Vec<ResearchSource>,
    pub quality_score: Option<u8>,
}
