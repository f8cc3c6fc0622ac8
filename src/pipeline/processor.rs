use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::ai::{ResearchClient, TextGenerator};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{
    Headline, HeadlineStatus, LogStatus, NewArticle, NewLogEntry, ProcessType,
};
use crate::services::Notifier;

use super::generation::GenerationStage;
use super::research::ResearchStage;

/// Orchestrator knobs, taken from [`crate::config::Config`] at startup.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Pause between headlines in a batch.
    pub pacing: Duration,
    /// How long a failed headline waits before `retry_failed` picks it up.
    pub retry_backoff: chrono::Duration,
    pub notify_recipients: Vec<String>,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            pacing: Duration::from_secs(2),
            retry_backoff: chrono::Duration::hours(24),
            notify_recipients: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub headline_id: i64,
    pub success: bool,
    pub message: String,
    pub article_id: Option<i64>,
}

impl ProcessOutcome {
    fn failed(headline_id: i64, message: impl Into<String>) -> Self {
        Self {
            headline_id,
            success: false,
            message: message.into(),
            article_id: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<ProcessOutcome>,
}

impl BatchSummary {
    fn push(&mut self, outcome: ProcessOutcome) {
        self.processed += 1;
        if outcome.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.items.push(outcome);
    }

    pub fn message(&self) -> String {
        format!(
            "Processed {} headlines: {} succeeded, {} failed",
            self.processed, self.succeeded, self.failed
        )
    }
}

/// Where a processing attempt stopped.
enum StageError {
    Research(AppError),
    Generation(AppError),
    Unexpected(AppError),
}

/// Drives headlines through research and generation.
///
/// Every public entry point reports through [`ProcessOutcome`] or
/// [`BatchSummary`]; errors never escape to the caller.
pub struct HeadlineProcessor {
    repo: Repository,
    research: ResearchStage,
    generation: GenerationStage,
    notifier: Option<Arc<dyn Notifier>>,
    settings: ProcessorSettings,
}

impl HeadlineProcessor {
    pub fn new(
        repo: Repository,
        research_client: Arc<dyn ResearchClient>,
        generator: Option<Arc<dyn TextGenerator>>,
        notifier: Option<Arc<dyn Notifier>>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            research: ResearchStage::new(repo.clone(), research_client),
            generation: GenerationStage::new(repo.clone(), generator),
            repo,
            notifier,
            settings,
        }
    }

    pub async fn process_single(&self, headline_id: i64) -> ProcessOutcome {
        let headline = match self.repo.get_headline(headline_id).await {
            Ok(Some(headline)) => headline,
            Ok(None) => {
                return ProcessOutcome::failed(headline_id, format!("Headline {} not found", headline_id))
            }
            Err(e) => return ProcessOutcome::failed(headline_id, format!("Could not load headline: {}", e)),
        };

        if headline.status != HeadlineStatus::Pending {
            return ProcessOutcome::failed(
                headline_id,
                format!("Headline {} is {}, not pending", headline_id, headline.status),
            );
        }

        match self.repo.claim_headline(headline_id).await {
            Ok(true) => {}
            Ok(false) => {
                return ProcessOutcome::failed(
                    headline_id,
                    format!("Headline {} was claimed by another run", headline_id),
                )
            }
            Err(e) => return ProcessOutcome::failed(headline_id, format!("Could not claim headline: {}", e)),
        }

        info!(headline_id, "Processing headline");

        match self.run_stages(&headline).await {
            Ok(article_id) => {
                self.notify_reviewers(&headline, article_id).await;
                ProcessOutcome {
                    headline_id,
                    success: true,
                    message: format!("Article {} generated", article_id),
                    article_id: Some(article_id),
                }
            }
            Err(StageError::Research(e)) => {
                let reason = format!("Research failed: {}", e);
                self.mark_failed(headline_id, &reason).await;
                ProcessOutcome::failed(headline_id, reason)
            }
            Err(StageError::Generation(e)) => {
                let reason = format!("Article generation failed: {}", e);
                self.mark_failed(headline_id, &reason).await;
                ProcessOutcome::failed(headline_id, reason)
            }
            Err(StageError::Unexpected(e)) => {
                let reason = format!("Processing error: {}", e);
                error!(headline_id, error = %e, "Unexpected processing error");
                self.mark_failed(headline_id, &reason).await;
                self.log(
                    NewLogEntry::new(ProcessType::Error, LogStatus::Failed, reason.clone())
                        .for_headline(Some(headline_id)),
                )
                .await;
                ProcessOutcome::failed(headline_id, reason)
            }
        }
    }

    async fn run_stages(&self, headline: &Headline) -> std::result::Result<i64, StageError> {
        let research = self
            .research
            .run(headline.id, &headline.text)
            .await
            .map_err(StageError::Research)?;

        self.advance(headline.id, HeadlineStatus::Processing, HeadlineStatus::Researched)
            .await?;

        let generated = self
            .generation
            .run(headline.id, &headline.text, &research.text, &research.sources)
            .await
            .map_err(StageError::Generation)?;

        let article_id = self
            .repo
            .insert_article(NewArticle {
                headline_id: headline.id,
                research_id: research.research_id,
                content: generated.content,
                llm_used: generated.llm_used.to_string(),
                quality_score: Some(generated.quality_score),
            })
            .await
            .map_err(StageError::Unexpected)?;

        self.advance(headline.id, HeadlineStatus::Researched, HeadlineStatus::Generated)
            .await?;

        info!(headline_id = headline.id, article_id, quality = generated.quality_score, "Draft ready");
        Ok(article_id)
    }

    async fn advance(
        &self,
        headline_id: i64,
        from: HeadlineStatus,
        to: HeadlineStatus,
    ) -> std::result::Result<(), StageError> {
        match self.repo.transition_headline(headline_id, from, to, None).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(StageError::Unexpected(AppError::InvalidTransition {
                entity: "headline",
                from: from.to_string(),
                to: to.to_string(),
            })),
            Err(e) => Err(StageError::Unexpected(e)),
        }
    }

    async fn mark_failed(&self, headline_id: i64, reason: &str) {
        match self.repo.fail_headline(headline_id, reason).await {
            Ok(true) => warn!(headline_id, reason, "Headline failed"),
            Ok(false) => warn!(headline_id, "Headline left its in-flight state before it could be failed"),
            Err(e) => error!(headline_id, error = %e, "Could not record headline failure"),
        }
    }

    async fn notify_reviewers(&self, headline: &Headline, article_id: i64) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if self.settings.notify_recipients.is_empty() {
            return;
        }

        let subject = format!("New article ready for review: {}", headline.text);
        let body = format!(
            "A draft was generated for \"{}\".\n\nArticle id: {}\nReview it with: mednews review {} <decision>",
            headline.text, article_id, article_id
        );
        if let Err(e) = notifier
            .notify(&self.settings.notify_recipients, &subject, &body)
            .await
        {
            warn!(article_id, error = %e, "Reviewer notification failed");
        }
    }

    async fn log(&self, entry: NewLogEntry) {
        if let Err(e) = self.repo.insert_log(entry).await {
            warn!(error = %e, "Failed to write activity log");
        }
    }

    /// Processes up to `batch_size` pending headlines, most urgent and oldest
    /// first, one at a time.
    pub async fn process_batch(&self, batch_size: u32) -> BatchSummary {
        let headlines = match self.repo.pending_headlines(batch_size).await {
            Ok(headlines) => headlines,
            Err(e) => {
                error!(error = %e, "Could not load pending headlines");
                self.log(NewLogEntry::new(
                    ProcessType::Batch,
                    LogStatus::Failed,
                    format!("Batch could not start: {}", e),
                ))
                .await;
                return BatchSummary::default();
            }
        };

        let ids: Vec<i64> = headlines.iter().map(|h| h.id).collect();
        let summary = self.run_sequence(&ids).await;

        if !ids.is_empty() {
            self.log(NewLogEntry::new(ProcessType::Batch, LogStatus::Completed, summary.message()))
                .await;
        }
        info!("{}", summary.message());
        summary
    }

    async fn run_sequence(&self, ids: &[i64]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.pacing).await;
            }
            summary.push(self.process_single(*id).await);
        }
        summary
    }

    /// Re-queues failed headlines whose last attempt is older than the
    /// backoff window and processes them again.
    pub async fn retry_failed(&self, limit: u32) -> BatchSummary {
        let cutoff = Utc::now() - self.settings.retry_backoff;
        let candidates = match self.repo.retryable_headlines(cutoff, limit).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "Could not load failed headlines");
                return BatchSummary::default();
            }
        };

        let mut requeued = Vec::with_capacity(candidates.len());
        for headline in candidates {
            match self.repo.requeue_failed_headline(headline.id).await {
                Ok(true) => requeued.push(headline.id),
                Ok(false) => {}
                Err(e) => warn!(headline_id = headline.id, error = %e, "Could not requeue headline"),
            }
        }

        info!(count = requeued.len(), "Retrying failed headlines");
        let summary = self.run_sequence(&requeued).await;
        if !requeued.is_empty() {
            self.log(NewLogEntry::new(
                ProcessType::Batch,
                LogStatus::Completed,
                format!("Retry: {}", summary.message()),
            ))
            .await;
        }
        summary
    }

    /// Deletes generated and published headlines older than `days`, with
    /// their research and articles. Failed headlines are kept.
    pub async fn cleanup(&self, days: i64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let deleted = self
            .repo
            .delete_headlines_before(&[HeadlineStatus::Published, HeadlineStatus::Generated], cutoff)
            .await?;
        info!(deleted, days, "Old headlines cleaned up");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{Citation, ResearchResponse};
    use crate::models::{ArticleStatus, NewHeadline};
    use async_trait::async_trait;
    use crate::test_support::{test_repository, FakeGenerator, FakeNotifier, FakeResearch};
    use tokio_test::assert_ok;

    const VITAMIN_D: &str =
        "New study links vitamin D deficiency to increased respiratory infection risk";

    fn research_client() -> FakeResearch {
        FakeResearch::answering(
            "Vitamin D supports immune defence. See https://www.healthline.com/nutrition/vitamin-d \
             and https://unknown-health-blog.example/vitd for commentary.",
            vec![Citation {
                url: "https://www.who.int/news/vitamin-d".to_string(),
                title: "WHO: Vitamin D".to_string(),
                snippet: "Vitamin D deficiency is widespread.".to_string(),
            }],
        )
    }

    fn article_text() -> String {
        let mut paragraphs = vec!["# Vitamin D and respiratory infections".to_string()];
        let filler = vec!["word"; 200].join(" ");
        paragraphs.push(format!("{} [Source: https://www.who.int/news/vitamin-d]", filler));
        paragraphs.push(format!("{} [Source: https://www.healthline.com/nutrition/vitamin-d]", filler));
        paragraphs.push(format!(
            "{} [Source: https://unknown-health-blog.example/vitd]",
            vec!["word"; 230].join(" ")
        ));
        paragraphs.push("Always consult your healthcare provider.".to_string());
        paragraphs.join("\n\n")
    }

    fn processor(
        repo: &Repository,
        research: FakeResearch,
        generator: Option<FakeGenerator>,
    ) -> HeadlineProcessor {
        HeadlineProcessor::new(
            repo.clone(),
            Arc::new(research),
            generator.map(|g| Arc::new(g) as Arc<dyn TextGenerator>),
            None,
            ProcessorSettings::default(),
        )
    }

    #[tokio::test]
    async fn vitamin_d_headline_becomes_a_draft() {
        let (repo, _dir) = test_repository().await;
        let id = repo.insert_headline(NewHeadline::new(VITAMIN_D)).await.unwrap();
        let processor = processor(&repo, research_client(), Some(FakeGenerator::answering(&article_text())));

        let outcome = processor.process_single(id).await;
        assert!(outcome.success, "{}", outcome.message);

        let research = repo.research_for_headline(id).await.unwrap().unwrap();
        let scores: Vec<(String, u8)> = research
            .sources
            .iter()
            .map(|s| (s.domain.clone(), s.credibility_score))
            .collect();
        assert_eq!(
            scores,
            vec![
                ("who.int".to_string(), 9),
                ("healthline.com".to_string(), 7),
                ("unknown-health-blog.example".to_string(), 5),
            ]
        );

        let article = repo.get_article(outcome.article_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(article.status, ArticleStatus::Draft);
        assert_eq!(article.research_id, research.id);
        assert!(article.quality_score.unwrap() >= 8);

        let headline = repo.get_headline(id).await.unwrap().unwrap();
        assert_eq!(headline.status, HeadlineStatus::Generated);
    }

    #[tokio::test]
    async fn non_pending_headline_is_left_alone() {
        let (repo, _dir) = test_repository().await;
        let id = repo.insert_headline(NewHeadline::new(VITAMIN_D)).await.unwrap();
        assert_ok!(repo.claim_headline(id).await);

        let research = FakeResearch::answering("unused", Vec::new());
        let processor = HeadlineProcessor::new(
            repo.clone(),
            Arc::new(research),
            None,
            None,
            ProcessorSettings::default(),
        );

        let outcome = processor.process_single(id).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("not pending"));
        assert!(repo.research_for_headline(id).await.unwrap().is_none());
        assert!(repo.logs_for_headline(id).await.unwrap().is_empty());
        assert_eq!(
            repo.get_headline(id).await.unwrap().unwrap().status,
            HeadlineStatus::Processing
        );
    }

    #[tokio::test]
    async fn missing_headline_is_a_failure_outcome() {
        let (repo, _dir) = test_repository().await;
        let processor = processor(&repo, research_client(), None);
        let outcome = processor.process_single(42).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("not found"));
    }

    #[tokio::test]
    async fn research_failure_skips_generation() {
        let (repo, _dir) = test_repository().await;
        let id = repo.insert_headline(NewHeadline::new(VITAMIN_D)).await.unwrap();
        let generator = Arc::new(FakeGenerator::answering(&article_text()));
        let processor = HeadlineProcessor::new(
            repo.clone(),
            Arc::new(FakeResearch::failing("All models failed")),
            Some(generator.clone()),
            None,
            ProcessorSettings::default(),
        );

        let outcome = processor.process_single(id).await;
        assert!(!outcome.success);
        assert_eq!(generator.calls(), 0);

        let headline = repo.get_headline(id).await.unwrap().unwrap();
        assert_eq!(headline.status, HeadlineStatus::Failed);
        assert!(headline.notes.unwrap().contains("All models failed"));
    }

    #[tokio::test]
    async fn missing_generator_fails_after_research() {
        let (repo, _dir) = test_repository().await;
        let id = repo.insert_headline(NewHeadline::new(VITAMIN_D)).await.unwrap();
        let processor = processor(&repo, research_client(), None);

        let outcome = processor.process_single(id).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("No LLM API keys configured"));

        assert!(repo.research_for_headline(id).await.unwrap().is_some());
        assert!(repo.articles_for_headline(id).await.unwrap().is_empty());
        assert_eq!(
            repo.get_headline(id).await.unwrap().unwrap().status,
            HeadlineStatus::Failed
        );
    }

    /// Answers normally but moves the headline on behind the processor's back.
    struct ConcurrentRun {
        inner: FakeResearch,
        repo: Repository,
        headline_id: i64,
    }

    #[async_trait]
    impl ResearchClient for ConcurrentRun {
        async fn research(&self, prompt: &str) -> Result<ResearchResponse> {
            let response = self.inner.research(prompt).await?;
            self.repo
                .transition_headline(
                    self.headline_id,
                    HeadlineStatus::Processing,
                    HeadlineStatus::Researched,
                    None,
                )
                .await?;
            Ok(response)
        }
    }

    #[tokio::test]
    async fn lost_state_change_fails_headline_and_logs_error() {
        let (repo, _dir) = test_repository().await;
        let id = repo.insert_headline(NewHeadline::new(VITAMIN_D)).await.unwrap();
        let generator = Arc::new(FakeGenerator::answering(&article_text()));
        let processor = HeadlineProcessor::new(
            repo.clone(),
            Arc::new(ConcurrentRun {
                inner: research_client(),
                repo: repo.clone(),
                headline_id: id,
            }),
            Some(generator.clone()),
            None,
            ProcessorSettings::default(),
        );

        let outcome = processor.process_single(id).await;
        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Processing error"));
        assert_eq!(generator.calls(), 0);

        let headline = repo.get_headline(id).await.unwrap().unwrap();
        assert_eq!(headline.status, HeadlineStatus::Failed);
        assert!(headline.notes.unwrap().contains("Processing error"));

        let logs = repo.logs_for_headline(id).await.unwrap();
        assert!(logs
            .iter()
            .any(|l| l.process_type == ProcessType::Error && l.status == LogStatus::Failed));
    }

    #[tokio::test]
    async fn reviewers_are_notified_and_failures_swallowed() {
        let (repo, _dir) = test_repository().await;
        let first = repo.insert_headline(NewHeadline::new(VITAMIN_D)).await.unwrap();
        let second = repo
            .insert_headline(NewHeadline::new("Flu vaccine uptake rises among adults"))
            .await
            .unwrap();
        let settings = ProcessorSettings {
            notify_recipients: vec!["editor@example.org".to_string()],
            ..ProcessorSettings::default()
        };

        let notifier = Arc::new(FakeNotifier::default());
        let processor = HeadlineProcessor::new(
            repo.clone(),
            Arc::new(research_client()),
            Some(Arc::new(FakeGenerator::answering(&article_text()))),
            Some(notifier.clone()),
            settings.clone(),
        );
        assert!(processor.process_single(first).await.success);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);

        let broken = HeadlineProcessor::new(
            repo.clone(),
            Arc::new(research_client()),
            Some(Arc::new(FakeGenerator::answering(&article_text()))),
            Some(Arc::new(FakeNotifier {
                fail: true,
                ..FakeNotifier::default()
            })),
            settings,
        );
        assert!(broken.process_single(second).await.success);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_reports_every_headline_and_paces_calls() {
        let (repo, _dir) = test_repository().await;
        for text in [
            "Hospital admissions for measles rise sharply",
            "Doctors report FAILME cases of new virus",
            "Clinical trial shows promise for heart failure drug",
            "Cancer screening uptake improves after campaign",
        ] {
            repo.insert_headline(NewHeadline::new(text)).await.unwrap();
        }

        let research = FakeResearch::answering("Findings.", Vec::new()).failing_when("FAILME");
        let settings = ProcessorSettings {
            pacing: Duration::from_secs(2),
            ..ProcessorSettings::default()
        };
        let processor = HeadlineProcessor::new(
            repo.clone(),
            Arc::new(research),
            Some(Arc::new(FakeGenerator::answering(&article_text()))),
            None,
            settings,
        );

        let started = tokio::time::Instant::now();
        let summary = processor.process_batch(10).await;
        let elapsed = started.elapsed();

        assert_eq!(summary.processed, 4);
        assert_eq!(summary.items.len(), 4);
        assert_eq!(summary.succeeded + summary.failed, 4);
        assert_eq!(summary.failed, 1);
        assert!(elapsed >= Duration::from_secs(6));
        assert!(elapsed < Duration::from_secs(8));
    }

    #[tokio::test]
    async fn batch_takes_most_urgent_first_and_respects_size() {
        let (repo, _dir) = test_repository().await;
        let low = repo
            .insert_headline(NewHeadline::new("Routine hospital report").with_priority(6))
            .await
            .unwrap();
        let urgent = repo
            .insert_headline(NewHeadline::new("Outbreak of measles declared").with_priority(1))
            .await
            .unwrap();

        let processor = HeadlineProcessor::new(
            repo.clone(),
            Arc::new(research_client()),
            Some(Arc::new(FakeGenerator::answering(&article_text()))),
            None,
            ProcessorSettings {
                pacing: Duration::ZERO,
                ..ProcessorSettings::default()
            },
        );

        let summary = processor.process_batch(1).await;
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.items[0].headline_id, urgent);
        assert_eq!(
            repo.get_headline(low).await.unwrap().unwrap().status,
            HeadlineStatus::Pending
        );
    }

    #[tokio::test]
    async fn retry_only_picks_failures_past_the_backoff() {
        let (repo, _dir) = test_repository().await;
        let old = repo.insert_headline(NewHeadline::new(VITAMIN_D)).await.unwrap();
        let recent = repo
            .insert_headline(NewHeadline::new("Heart disease deaths fall again"))
            .await
            .unwrap();
        for id in [old, recent] {
            repo.claim_headline(id).await.unwrap();
            repo.fail_headline(id, "Research failed: timeout").await.unwrap();
        }
        repo.set_headline_processed_at(old, Utc::now() - chrono::Duration::hours(25))
            .await
            .unwrap();
        repo.set_headline_processed_at(recent, Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();

        let processor = HeadlineProcessor::new(
            repo.clone(),
            Arc::new(research_client()),
            Some(Arc::new(FakeGenerator::answering(&article_text()))),
            None,
            ProcessorSettings {
                pacing: Duration::ZERO,
                ..ProcessorSettings::default()
            },
        );

        let summary = processor.retry_failed(10).await;
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.items[0].headline_id, old);
        assert!(summary.items[0].success);

        let retried = repo.get_headline(old).await.unwrap().unwrap();
        assert_eq!(retried.status, HeadlineStatus::Generated);
        assert!(retried.notes.unwrap().contains("[Retrying]"));
        assert_eq!(
            repo.get_headline(recent).await.unwrap().unwrap().status,
            HeadlineStatus::Failed
        );
    }

    #[tokio::test]
    async fn cleanup_never_removes_failed_headlines() {
        let (repo, _dir) = test_repository().await;
        let done = repo.insert_headline(NewHeadline::new(VITAMIN_D)).await.unwrap();
        let failed = repo
            .insert_headline(NewHeadline::new("Vaccine trial halted after review"))
            .await
            .unwrap();

        let processor = processor(
            &repo,
            research_client(),
            Some(FakeGenerator::answering(&article_text())),
        );
        assert!(processor.process_single(done).await.success);
        repo.claim_headline(failed).await.unwrap();
        repo.fail_headline(failed, "Research failed").await.unwrap();

        let long_ago = Utc::now() - chrono::Duration::days(90);
        repo.set_headline_processed_at(done, long_ago).await.unwrap();
        repo.set_headline_processed_at(failed, long_ago).await.unwrap();

        assert_eq!(processor.cleanup(30).await.unwrap(), 1);
        assert!(repo.get_headline(done).await.unwrap().is_none());
        assert!(repo.research_for_headline(done).await.unwrap().is_none());
        assert!(repo.get_headline(failed).await.unwrap().is_some());
    }
}
