use chrono::{DateTime, Utc};

use super::text_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessType {
    Research,
    Generation,
    Publish,
    Batch,
    Image,
    Error,
}

text_enum!(ProcessType, "process type" {
    Research => "research",
    Generation => "generation",
    Publish => "publish",
    Batch => "batch",
    Image => "image",
    Error => "error",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStatus {
    Started,
    Completed,
    Failed,
}

text_enum!(LogStatus, "log status" {
    Started => "started",
    Completed => "completed",
    Failed => "failed",
});

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub id: i64,
    pub headline_id: Option<i64>,
    pub process_type: ProcessType,
    pub status: LogStatus,
    pub message: Option<String>,
    pub execution_time: Option<f64>,
    pub tokens_used: Option<u32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub headline_id: Option<i64>,
    pub process_type: ProcessType,
    pub status: LogStatus,
    pub message: Option<String>,
    pub execution_time: Option<f64>,
    pub tokens_used: Option<u32>,
}

impl NewLogEntry {
    pub fn new(process_type: ProcessType, status: LogStatus, message: impl Into<String>) -> Self {
        Self {
            headline_id: None,
            process_type,
            status,
            message: Some(message.into()),
            execution_time: None,
            tokens_used: None,
        }
    }

    pub fn for_headline(mut self, headline_id: Option<i64>) -> Self {
        self.headline_id = headline_id;
        self
    }

    pub fn timed(mut self, seconds: f64) -> Self {
        self.execution_time = Some(seconds);
        self
    }

    pub fn tokens(mut self, tokens: Option<u32>) -> Self {
        self.tokens_used = tokens;
        self
    }
}
