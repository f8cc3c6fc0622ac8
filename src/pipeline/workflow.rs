use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::db::{ArticleReview, HeadlineTransition, Repository};
use crate::error::{AppError, Result};
use crate::models::{
    Article, ArticleStatus, Headline, HeadlineStatus, LogStatus, NewLogEntry, ProcessType,
    Research, ReviewDecision,
};
use crate::services::{DocumentMetadata, DocumentStatus, ImageSource, NewDocument, PublishTarget};

use super::content;

#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub article_id: i64,
    pub status: ArticleStatus,
    pub external_id: Option<i64>,
    pub permalink: Option<String>,
    pub message: String,
}

/// Applies editorial decisions and hands approved articles to the publish
/// target.
pub struct WorkflowManager {
    repo: Repository,
    target: Option<Arc<dyn PublishTarget>>,
    images: Option<Arc<dyn ImageSource>>,
    author_id: Option<i64>,
}

impl WorkflowManager {
    pub fn new(
        repo: Repository,
        target: Option<Arc<dyn PublishTarget>>,
        images: Option<Arc<dyn ImageSource>>,
        author_id: Option<i64>,
    ) -> Self {
        Self {
            repo,
            target,
            images,
            author_id,
        }
    }

    pub async fn apply_decision(
        &self,
        article_id: i64,
        decision: ReviewDecision,
        notes: Option<String>,
        reviewer: Option<String>,
    ) -> Result<ReviewOutcome> {
        let article = self
            .repo
            .get_article(article_id)
            .await?
            .ok_or(AppError::NotFound {
                entity: "article",
                id: article_id,
            })?;

        if !decision.accepts(article.status) {
            return Err(AppError::InvalidTransition {
                entity: "article",
                from: article.status.to_string(),
                to: decision.to_string(),
            });
        }

        let headline = self
            .repo
            .get_headline(article.headline_id)
            .await?
            .ok_or(AppError::NotFound {
                entity: "headline",
                id: article.headline_id,
            })?;

        let review = Review {
            article: &article,
            headline: &headline,
            notes,
            reviewer,
        };

        let outcome = match decision {
            ReviewDecision::Approve => self.approve(review).await?,
            ReviewDecision::Publish => self.publish(review).await?,
            ReviewDecision::Reject => self.reject(review).await?,
            ReviewDecision::RequestChanges => self.request_changes(review).await?,
        };

        info!(article_id, decision = %decision, status = %outcome.status, "Review applied");
        Ok(outcome)
    }

    async fn approve(&self, review: Review<'_>) -> Result<ReviewOutcome> {
        let Review { article, headline, .. } = review;
        require_status(headline, &[HeadlineStatus::Generated], HeadlineStatus::Approved)?;

        let target = self.target()?;
        let research = self.research_for(article).await?;
        let document_id = self
            .create_document(target, &review, &research, DocumentStatus::Draft)
            .await?;

        self.record_document(
            &review,
            ArticleStatus::Approved,
            document_id,
            false,
            HeadlineStatus::Approved,
        )
        .await?;

        self.log(
            headline.id,
            ProcessType::Publish,
            LogStatus::Completed,
            format!("Draft document {} created for article {}", document_id, article.id),
        )
        .await;

        Ok(ReviewOutcome {
            article_id: article.id,
            status: ArticleStatus::Approved,
            external_id: Some(document_id),
            permalink: self.permalink(target, document_id).await,
            message: "Article approved and saved as a draft".to_string(),
        })
    }

    async fn publish(&self, review: Review<'_>) -> Result<ReviewOutcome> {
        let Review { article, headline, .. } = review;
        require_status(
            headline,
            &[HeadlineStatus::Generated, HeadlineStatus::Approved],
            HeadlineStatus::Published,
        )?;

        let target = self.target()?;
        let document_id = match article.external_id {
            Some(existing) => {
                target.update_status(existing, DocumentStatus::Publish).await?;
                existing
            }
            None => {
                let research = self.research_for(article).await?;
                self.create_document(target, &review, &research, DocumentStatus::Publish)
                    .await?
            }
        };

        self.record_document(
            &review,
            ArticleStatus::Published,
            document_id,
            true,
            HeadlineStatus::Published,
        )
        .await?;

        self.log(
            headline.id,
            ProcessType::Publish,
            LogStatus::Completed,
            format!("Article published as document {}", document_id),
        )
        .await;

        Ok(ReviewOutcome {
            article_id: article.id,
            status: ArticleStatus::Published,
            external_id: Some(document_id),
            permalink: self.permalink(target, document_id).await,
            message: "Article published".to_string(),
        })
    }

    async fn reject(&self, review: Review<'_>) -> Result<ReviewOutcome> {
        let headline = review.headline;
        require_status(headline, &[HeadlineStatus::Generated], HeadlineStatus::Failed)?;

        let reason = format!(
            "Article rejected: {}",
            review.notes.as_deref().unwrap_or("no reason given")
        );
        self.record(
            &review,
            ArticleStatus::Rejected,
            None,
            false,
            Some(HeadlineTransition {
                headline_id: headline.id,
                from: headline.status,
                to: HeadlineStatus::Failed,
                notes: Some(reason),
            }),
        )
        .await?;

        Ok(ReviewOutcome {
            article_id: review.article.id,
            status: ArticleStatus::Rejected,
            external_id: review.article.external_id,
            permalink: None,
            message: "Article rejected".to_string(),
        })
    }

    async fn request_changes(&self, review: Review<'_>) -> Result<ReviewOutcome> {
        self.record(&review, ArticleStatus::UnderReview, None, false, None)
            .await?;

        Ok(ReviewOutcome {
            article_id: review.article.id,
            status: ArticleStatus::UnderReview,
            external_id: review.article.external_id,
            permalink: None,
            message: "Changes requested, article marked for revision".to_string(),
        })
    }

    fn target(&self) -> Result<&Arc<dyn PublishTarget>> {
        self.target
            .as_ref()
            .ok_or_else(|| AppError::Config("No publish target configured".to_string()))
    }

    async fn research_for(&self, article: &Article) -> Result<Research> {
        self.repo
            .get_research(article.research_id)
            .await?
            .ok_or(AppError::NotFound {
                entity: "research",
                id: article.research_id,
            })
    }

    async fn create_document(
        &self,
        target: &Arc<dyn PublishTarget>,
        review: &Review<'_>,
        research: &Research,
        status: DocumentStatus,
    ) -> Result<i64> {
        let processed = content::process(&review.article.content, &research.sources);
        let document = NewDocument {
            title: processed
                .title
                .unwrap_or_else(|| review.headline.text.clone()),
            body: processed.html,
            status,
            author: self.author_id,
            category: review.headline.category.clone(),
            metadata: DocumentMetadata {
                original_headline: review.headline.text.clone(),
                sources: research.sources.clone(),
                generated_by: review.article.llm_used.clone(),
                quality_score: review.article.quality_score,
                reviewer_notes: review.notes.clone(),
            },
        };

        let document_id = target.create_document(&document).await.inspect_err(|e| {
            warn!(article_id = review.article.id, error = %e, "Document creation failed");
        })?;
        self.attach_images(target, review.headline, &review.article.content, document_id)
            .await;
        Ok(document_id)
    }

    /// Best effort: failures are logged and never stop publication.
    async fn attach_images(
        &self,
        target: &Arc<dyn PublishTarget>,
        headline: &Headline,
        content: &str,
        document_id: i64,
    ) {
        let Some(source) = &self.images else {
            return;
        };

        let images = match source
            .article_images(&headline.text, headline.category.as_deref(), content)
            .await
        {
            Ok(images) => images,
            Err(e) => {
                warn!(document_id, error = %e, "Image search failed");
                self.log(
                    headline.id,
                    ProcessType::Image,
                    LogStatus::Failed,
                    format!("Image search failed: {}", e),
                )
                .await;
                return;
            }
        };

        let featured = images.featured.into_iter().map(|image| (image, true));
        let inline = images.content.into_iter().map(|image| (image, false));
        for (image, is_featured) in featured.chain(inline) {
            match target.attach_image(&image, document_id, is_featured).await {
                Ok(attachment_id) => {
                    info!(document_id, attachment_id, featured = is_featured, "Image attached")
                }
                Err(e) => {
                    warn!(document_id, url = %image.url, error = %e, "Image attachment failed");
                    self.log(
                        headline.id,
                        ProcessType::Image,
                        LogStatus::Failed,
                        format!("Image attachment failed: {}", e),
                    )
                    .await;
                }
            }
        }
    }

    /// Records a decision that already reached the publish target. If the
    /// database write fails the document stays behind, so it is logged by id.
    async fn record_document(
        &self,
        review: &Review<'_>,
        status: ArticleStatus,
        document_id: i64,
        published: bool,
        headline_to: HeadlineStatus,
    ) -> Result<()> {
        let headline = review.headline;
        let transition = HeadlineTransition {
            headline_id: headline.id,
            from: headline.status,
            to: headline_to,
            notes: None,
        };
        let recorded = self
            .record(review, status, Some(document_id), published, Some(transition))
            .await;

        if let Err(e) = &recorded {
            warn!(
                article_id = review.article.id,
                document_id,
                error = %e,
                "Document left on publish target without a recorded review"
            );
            self.log(
                headline.id,
                ProcessType::Publish,
                LogStatus::Failed,
                format!(
                    "Orphaned document {}: review of article {} was not recorded: {}",
                    document_id, review.article.id, e
                ),
            )
            .await;
        }
        recorded
    }

    async fn record(
        &self,
        review: &Review<'_>,
        status: ArticleStatus,
        external_id: Option<i64>,
        published: bool,
        transition: Option<HeadlineTransition>,
    ) -> Result<()> {
        let applied = self
            .repo
            .apply_review(
                review.article.id,
                ArticleReview {
                    from: review.article.status,
                    status,
                    reviewer: review.reviewer.clone(),
                    notes: review.notes.clone(),
                    external_id,
                    published,
                },
                transition,
            )
            .await?;

        if applied {
            return Ok(());
        }

        // Someone else moved the article or its headline since it was loaded.
        let current = self.repo.get_article(review.article.id).await?;
        Err(match current {
            Some(article) if article.status != review.article.status => AppError::InvalidTransition {
                entity: "article",
                from: article.status.to_string(),
                to: status.to_string(),
            },
            _ => AppError::InvalidTransition {
                entity: "headline",
                from: review.headline.status.to_string(),
                to: status.to_string(),
            },
        })
    }

    async fn permalink(&self, target: &Arc<dyn PublishTarget>, document_id: i64) -> Option<String> {
        match target.permalink(document_id).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(document_id, error = %e, "Could not fetch permalink");
                None
            }
        }
    }

    async fn log(&self, headline_id: i64, kind: ProcessType, status: LogStatus, message: String) {
        let entry = NewLogEntry::new(kind, status, message).for_headline(Some(headline_id));
        if let Err(e) = self.repo.insert_log(entry).await {
            warn!(headline_id, error = %e, "Failed to write activity log");
        }
    }

    /// Deletes rejected articles reviewed more than `days` ago.
    pub async fn cleanup_rejected_articles(&self, days: i64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let deleted = self.repo.delete_rejected_articles_before(cutoff).await?;
        info!(deleted, days, "Rejected articles cleaned up");
        Ok(deleted)
    }
}

struct Review<'a> {
    article: &'a Article,
    headline: &'a Headline,
    notes: Option<String>,
    reviewer: Option<String>,
}

fn require_status(headline: &Headline, allowed: &[HeadlineStatus], to: HeadlineStatus) -> Result<()> {
    if allowed.contains(&headline.status) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition {
            entity: "headline",
            from: headline.status.to_string(),
            to: to.to_string(),
        })
    }
}
