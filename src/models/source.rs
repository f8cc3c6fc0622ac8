use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Globally deduplicated cited URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub url: String,
    pub domain: String,
    pub title: Option<String>,
    pub credibility_score: u8,
    pub last_verified: Option<DateTime<Utc>>,
    pub times_cited: i64,
    pub created_at: DateTime<Utc>,
}
