use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingStats {
    pub headlines_processed: i64,
    pub articles_generated: i64,
    pub articles_published: i64,
    /// Generated articles per created headline, as a percentage.
    pub success_rate: f64,
    pub avg_processing_time: f64,
    pub total_tokens_used: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowStats {
    pub articles_pending_review: i64,
    pub articles_approved: i64,
    pub articles_published: i64,
    pub articles_rejected: i64,
    /// Minutes between creation and review, averaged.
    pub avg_review_minutes: f64,
}
