use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::text_enum;

pub const DEFAULT_PRIORITY: u8 = 5;
pub const MOST_URGENT_PRIORITY: u8 = 1;
pub const LEAST_URGENT_PRIORITY: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadlineStatus {
    Pending,
    Processing,
    Researched,
    Generated,
    Approved,
    Published,
    Failed,
}

text_enum!(HeadlineStatus, "headline status" {
    Pending => "pending",
    Processing => "processing",
    Researched => "researched",
    Generated => "generated",
    Approved => "approved",
    Published => "published",
    Failed => "failed",
});

impl HeadlineStatus {
    /// Forward edges of the pipeline state machine.
    ///
    /// `Failed -> Pending` is absent: only the retry operation requeues a
    /// failed headline, through its own query.
    pub fn can_transition_to(self, next: HeadlineStatus) -> bool {
        use HeadlineStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Researched)
                | (Processing, Failed)
                | (Researched, Generated)
                | (Researched, Failed)
                | (Generated, Approved)
                | (Generated, Published)
                | (Generated, Failed)
                | (Approved, Published)
                | (Approved, Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadlineOrigin {
    Manual,
    BulkImport,
    Feed,
}

text_enum!(HeadlineOrigin, "headline origin" {
    Manual => "manual",
    BulkImport => "bulk_import",
    Feed => "feed",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Headline {
    pub id: i64,
    pub text: String,
    pub origin: HeadlineOrigin,
    /// 1 = urgent .. 6 = low.
    pub priority: u8,
    pub category: Option<String>,
    pub status: HeadlineStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewHeadline {
    pub text: String,
    pub origin: HeadlineOrigin,
    pub priority: u8,
    pub category: Option<String>,
}

impl NewHeadline {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: HeadlineOrigin::Manual,
            priority: DEFAULT_PRIORITY,
            category: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(MOST_URGENT_PRIORITY, LEAST_URGENT_PRIORITY);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        self.category = (!category.trim().is_empty()).then(|| category.trim().to_string());
        self
    }

    pub fn with_origin(mut self, origin: HeadlineOrigin) -> Self {
        self.origin = origin;
        self
    }
}
