use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::ai::{ClaudeClient, LlmBackend, OpenAiClient, PerplexityClient, TextGenerator};
use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{
    Headline, HeadlineOrigin, ProcessingStats, ReviewDecision, ReviewQueueItem, WorkflowStats,
};
use crate::pipeline::{
    self, content, BatchSummary, HeadlineProcessor, ImportReport, ProcessOutcome,
    ProcessorSettings, ReviewOutcome, WorkflowManager,
};
use crate::services::{
    ImageSource, Notifier, PublishTarget, UnsplashClient, WebhookNotifier, WordPressClient,
};

/// Result of one `check` run.
#[derive(Debug, Clone)]
pub struct ConnectionCheck {
    pub service: String,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct CleanupReport {
    pub headlines: usize,
    pub rejected_articles: usize,
}

/// Everything the command line needs, built once from [`Config`].
pub struct App {
    config: Config,
    pub repository: Repository,
    research: Arc<PerplexityClient>,
    processor: HeadlineProcessor,
    workflow: WorkflowManager,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;

        let research = Arc::new(PerplexityClient::new(
            config.perplexity_api_key.clone().unwrap_or_default(),
        )?);

        let generator = LlmBackend::build(
            config.preferred_llm,
            config.openai_api_key.as_deref(),
            config.claude_api_key.as_deref(),
        )?
        .map(|backend| Arc::new(backend) as Arc<dyn TextGenerator>);
        if generator.is_none() {
            warn!("No LLM API keys configured, article generation will fail");
        }

        let notifier = match &config.notification_webhook {
            Some(url) if config.notifications_enabled() => {
                Some(Arc::new(WebhookNotifier::new(url.clone())?) as Arc<dyn Notifier>)
            }
            _ => None,
        };

        let settings = ProcessorSettings {
            pacing: Duration::from_secs(config.pacing_seconds),
            retry_backoff: chrono::Duration::hours(config.retry_backoff_hours),
            notify_recipients: config.notification_recipients.clone(),
        };

        let processor = HeadlineProcessor::new(
            repository.clone(),
            research.clone(),
            generator,
            notifier,
            settings,
        );

        let target = config
            .wordpress
            .as_ref()
            .map(WordPressClient::new)
            .transpose()?
            .map(|client| Arc::new(client) as Arc<dyn PublishTarget>);

        let images = config
            .unsplash_access_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .map(|key| UnsplashClient::new(key.to_string()))
            .transpose()?
            .map(|client| Arc::new(client) as Arc<dyn ImageSource>);

        let author_id = config.wordpress.as_ref().and_then(|wp| wp.author_id);
        let workflow = WorkflowManager::new(repository.clone(), target, images, author_id);

        Ok(Self {
            config,
            repository,
            research,
            processor,
            workflow,
        })
    }

    pub async fn add_headline(
        &self,
        text: &str,
        priority: Option<u8>,
        category: Option<&str>,
    ) -> Result<i64> {
        pipeline::add_headline(&self.repository, text, HeadlineOrigin::Manual, priority, category)
            .await
    }

    pub async fn import_file(&self, path: &Path) -> Result<ImportReport> {
        let content = tokio::fs::read_to_string(path).await?;
        pipeline::import_headlines(&self.repository, content.lines()).await
    }

    pub async fn list_headlines(&self, limit: u32) -> Result<Vec<Headline>> {
        self.repository.list_headlines(limit).await
    }

    pub async fn review_queue(&self, limit: u32) -> Result<Vec<ReviewQueueItem>> {
        self.repository.articles_for_review(limit).await
    }

    pub async fn process(&self, batch_size: Option<u32>) -> BatchSummary {
        self.processor
            .process_batch(batch_size.unwrap_or(self.config.batch_size))
            .await
    }

    /// Cron entry point. Returns `None` when automatic processing is off.
    pub async fn process_scheduled(&self) -> Option<BatchSummary> {
        if !self.config.auto_process {
            info!("Automatic processing disabled, skipping scheduled run");
            return None;
        }
        Some(self.process(None).await)
    }

    pub async fn process_one(&self, headline_id: i64) -> ProcessOutcome {
        self.processor.process_single(headline_id).await
    }

    pub async fn retry(&self, limit: u32) -> BatchSummary {
        self.processor.retry_failed(limit).await
    }

    pub async fn cleanup(&self, days: Option<i64>) -> Result<CleanupReport> {
        let headlines = self
            .processor
            .cleanup(days.unwrap_or(self.config.retention_days))
            .await?;
        let rejected_articles = self
            .workflow
            .cleanup_rejected_articles(self.config.rejected_retention_days)
            .await?;
        Ok(CleanupReport {
            headlines,
            rejected_articles,
        })
    }

    pub async fn review(
        &self,
        article_id: i64,
        decision: ReviewDecision,
        notes: Option<String>,
        reviewer: Option<String>,
    ) -> Result<ReviewOutcome> {
        self.workflow
            .apply_decision(article_id, decision, notes, reviewer)
            .await
    }

    /// Renders the article as it would be published, as terminal text.
    pub async fn preview(&self, article_id: i64, width: usize) -> Result<String> {
        let article = self
            .repository
            .get_article(article_id)
            .await?
            .ok_or(AppError::NotFound {
                entity: "article",
                id: article_id,
            })?;
        let research = self
            .repository
            .get_research(article.research_id)
            .await?
            .ok_or(AppError::NotFound {
                entity: "research",
                id: article.research_id,
            })?;

        let processed = content::process(&article.content, &research.sources);
        let body = html2text::from_read(processed.html.as_bytes(), width)
            .map_err(|e| anyhow::anyhow!("Could not render preview: {}", e))?;

        Ok(match processed.title {
            Some(title) => format!("{}\n{}\n\n{}", title, "=".repeat(title.chars().count()), body),
            None => body,
        })
    }

    pub async fn stats(&self, days: i64) -> Result<(ProcessingStats, WorkflowStats)> {
        let since = Utc::now() - chrono::Duration::days(days);
        let processing = self.repository.processing_stats(since).await?;
        let workflow = self.repository.workflow_stats(since).await?;
        Ok((processing, workflow))
    }

    /// Checks the research service and every generation provider with a key.
    pub async fn check_connections(&self) -> Vec<ConnectionCheck> {
        let mut checks = vec![connection_check("Perplexity", self.research.check().await)];

        if let Some(key) = self.config.openai_api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            let result = match OpenAiClient::new(key.to_string()) {
                Ok(client) => generation_check(&client).await,
                Err(e) => Err(e),
            };
            checks.push(connection_check("OpenAI", result));
        }

        if let Some(key) = self.config.claude_api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            let result = match ClaudeClient::new(key.to_string()) {
                Ok(client) => generation_check(&client).await,
                Err(e) => Err(e),
            };
            checks.push(connection_check("Claude", result));
        }

        checks
    }
}

async fn generation_check(generator: &dyn TextGenerator) -> Result<String> {
    generator
        .generate("Answer in one word.", "Reply with OK.")
        .await
        .map(|g| g.text.trim().to_string())
}

fn connection_check(service: &str, result: Result<String>) -> ConnectionCheck {
    match result {
        Ok(detail) => ConnectionCheck {
            service: service.to_string(),
            ok: true,
            detail,
        },
        Err(e) => ConnectionCheck {
            service: service.to_string(),
            ok: false,
            detail: e.to_string(),
        },
    }
}
