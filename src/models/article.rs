use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::text_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Draft,
    UnderReview,
    Approved,
    Rejected,
    Published,
}

text_enum!(ArticleStatus, "article status" {
    Draft => "draft",
    UnderReview => "under_review",
    Approved => "approved",
    Rejected => "rejected",
    Published => "published",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
    Publish,
    RequestChanges,
}

text_enum!(ReviewDecision, "review decision" {
    Approve => "approve",
    Reject => "reject",
    Publish => "publish",
    RequestChanges => "request_changes",
});

impl ReviewDecision {
    /// Whether an article in `status` can still take this decision. Only
    /// publishing goes past approval; rejected and published articles are
    /// final.
    pub fn accepts(self, status: ArticleStatus) -> bool {
        match self {
            Self::Publish => matches!(
                status,
                ArticleStatus::Draft | ArticleStatus::UnderReview | ArticleStatus::Approved
            ),
            Self::Approve | Self::Reject | Self::RequestChanges => {
                matches!(status, ArticleStatus::Draft | ArticleStatus::UnderReview)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub headline_id: i64,
    pub research_id: i64,
    /// Raw generator output; post-processing happens at publish time.
    pub content: String,
    pub llm_used: String,
    pub quality_score: Option<u8>,
    pub status: ArticleStatus,
    pub external_id: Option<i64>,
    pub reviewer: Option<String>,
    pub reviewer_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub headline_id: i64,
    pub research_id: i64,
    pub content: String,
    pub llm_used: String,
    pub quality_score: Option<u8>,
}

/// Article joined with the headline it was written for.
#[derive(Debug, Clone)]
pub struct ReviewQueueItem {
    pub article: Article,
    pub headline: String,
    pub category: Option<String>,
}
