use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    Article, ArticleStatus, Headline, HeadlineStatus, LogEntry, NewArticle, NewHeadline,
    NewLogEntry, NewResearch, ParseEnumError, ProcessingStats, Research, ResearchSource,
    ReviewQueueItem, Source, WorkflowStats,
};

use super::schema::SCHEMA;

const HEADLINE_COLUMNS: &str =
    "id, headline, origin, priority, category, status, created_at, processed_at, notes";

const ARTICLE_COLUMNS: &str = "id, headline_id, research_id, content, llm_used, quality_score, \
     status, external_id, reviewer, reviewer_notes, created_at, reviewed_at, published_at";

const RESEARCH_COLUMNS: &str =
    "id, headline_id, query, response, sources_json, quality_score, created_at";

/// Outcome of an editorial decision, written to the article row.
#[derive(Debug, Clone)]
pub struct ArticleReview {
    /// Status the decision was made against; the update only applies while
    /// the article still has it.
    pub from: ArticleStatus,
    pub status: ArticleStatus,
    pub reviewer: Option<String>,
    pub notes: Option<String>,
    pub external_id: Option<i64>,
    pub published: bool,
}

/// Conditional headline status change applied alongside a review.
#[derive(Debug, Clone)]
pub struct HeadlineTransition {
    pub headline_id: i64,
    pub from: HeadlineStatus,
    pub to: HeadlineStatus,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Headline operations

    pub async fn insert_headline(&self, headline: NewHeadline) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO headlines (headline, origin, priority, category, status) VALUES (?1, ?2, ?3, ?4, 'pending')",
                    params![
                        headline.text,
                        headline.origin.as_str(),
                        headline.priority,
                        headline.category
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn get_headline(&self, id: i64) -> Result<Option<Headline>> {
        let headline = self
            .conn
            .call(move |conn| {
                let headline = conn
                    .query_row(
                        &format!("SELECT {HEADLINE_COLUMNS} FROM headlines WHERE id = ?1"),
                        params![id],
                        headline_from_row,
                    )
                    .optional()?;
                Ok(headline)
            })
            .await?;
        Ok(headline)
    }

    pub async fn headline_exists(&self, text: &str) -> Result<bool> {
        let text = text.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM headlines WHERE headline = ?1",
                    params![text],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await?;
        Ok(exists)
    }

    /// Pending headlines, most urgent first, oldest first within a priority.
    pub async fn pending_headlines(&self, limit: u32) -> Result<Vec<Headline>> {
        self.query_headlines(
            format!(
                "SELECT {HEADLINE_COLUMNS} FROM headlines WHERE status = 'pending' \
                 ORDER BY priority ASC, created_at ASC, id ASC LIMIT ?1"
            ),
            vec![i64::from(limit).into()],
        )
        .await
    }

    /// Operator listing: in-flight work first, then urgency, then newest.
    pub async fn list_headlines(&self, limit: u32) -> Result<Vec<Headline>> {
        self.query_headlines(
            format!(
                "SELECT {HEADLINE_COLUMNS} FROM headlines ORDER BY \
                 CASE status WHEN 'pending' THEN 1 WHEN 'processing' THEN 2 \
                 WHEN 'researched' THEN 3 WHEN 'generated' THEN 4 ELSE 5 END, \
                 priority ASC, created_at DESC, id DESC LIMIT ?1"
            ),
            vec![i64::from(limit).into()],
        )
        .await
    }

    /// Failed headlines whose last attempt happened before `cutoff`.
    pub async fn retryable_headlines(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Headline>> {
        self.query_headlines(
            format!(
                "SELECT {HEADLINE_COLUMNS} FROM headlines WHERE status = 'failed' \
                 AND processed_at IS NOT NULL AND processed_at < ?1 \
                 ORDER BY processed_at ASC, id ASC LIMIT ?2"
            ),
            vec![sql_datetime(cutoff).into(), i64::from(limit).into()],
        )
        .await
    }

    async fn query_headlines(
        &self,
        sql: String,
        values: Vec<rusqlite::types::Value>,
    ) -> Result<Vec<Headline>> {
        let headlines = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let headlines = stmt
                    .query_map(rusqlite::params_from_iter(values), headline_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(headlines)
            })
            .await?;
        Ok(headlines)
    }

    /// Atomically flips `pending` to `processing`.
    ///
    /// Returns false when the headline is missing or not pending, which is
    /// the single-attempt gate for concurrent processors.
    pub async fn claim_headline(&self, id: i64) -> Result<bool> {
        self.transition_headline(id, HeadlineStatus::Pending, HeadlineStatus::Processing, None)
            .await
    }

    /// Moves a headline along one state-machine edge if it is still in `from`.
    pub async fn transition_headline(
        &self,
        id: i64,
        from: HeadlineStatus,
        to: HeadlineStatus,
        notes: Option<String>,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(AppError::InvalidTransition {
                entity: "headline",
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE headlines SET status = ?1, processed_at = datetime('now'), notes = COALESCE(?2, notes) \
                     WHERE id = ?3 AND status = ?4",
                    params![to.as_str(), notes, id, from.as_str()],
                )?;
                Ok(updated)
            })
            .await?;
        Ok(updated > 0)
    }

    /// Marks an in-flight headline as failed with the reason in its notes.
    pub async fn fail_headline(&self, id: i64, reason: &str) -> Result<bool> {
        let reason = reason.to_string();
        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE headlines SET status = 'failed', processed_at = datetime('now'), notes = ?1 \
                     WHERE id = ?2 AND status IN ('processing', 'researched', 'generated', 'approved')",
                    params![reason, id],
                )?;
                Ok(updated)
            })
            .await?;
        Ok(updated > 0)
    }

    /// Resets a failed headline to pending. Only the retry path calls this.
    pub async fn requeue_failed_headline(&self, id: i64) -> Result<bool> {
        let updated = self
            .conn
            .call(move |conn| {
                let updated = conn.execute(
                    "UPDATE headlines SET status = 'pending', notes = COALESCE(notes, '') || ' [Retrying]' \
                     WHERE id = ?1 AND status = 'failed'",
                    params![id],
                )?;
                Ok(updated)
            })
            .await?;
        Ok(updated > 0)
    }

    /// Deletes headlines in the given states processed before `cutoff`.
    /// Research and article rows go with them through the cascade.
    pub async fn delete_headlines_before(
        &self,
        statuses: &[HeadlineStatus],
        cutoff: DateTime<Utc>,
    ) -> Result<usize> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let cutoff = sql_datetime(cutoff);
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut deleted = 0;
                for status in &statuses {
                    deleted += tx.execute(
                        "DELETE FROM headlines WHERE status = ?1 AND processed_at IS NOT NULL AND processed_at < ?2",
                        params![status, cutoff],
                    )?;
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted)
    }

    // Research operations

    pub async fn insert_research(&self, research: NewResearch) -> Result<i64> {
        let sources_json = serde_json::to_string(&research.sources)?;
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO research (headline_id, query, response, sources_json, quality_score) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        research.headline_id,
                        research.query,
                        research.response,
                        sources_json,
                        research.quality_score
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn get_research(&self, id: i64) -> Result<Option<Research>> {
        let research = self
            .conn
            .call(move |conn| {
                let research = conn
                    .query_row(
                        &format!("SELECT {RESEARCH_COLUMNS} FROM research WHERE id = ?1"),
                        params![id],
                        research_from_row,
                    )
                    .optional()?;
                Ok(research)
            })
            .await?;
        Ok(research)
    }

    pub async fn research_for_headline(&self, headline_id: i64) -> Result<Option<Research>> {
        let research = self
            .conn
            .call(move |conn| {
                let research = conn
                    .query_row(
                        &format!(
                            "SELECT {RESEARCH_COLUMNS} FROM research WHERE headline_id = ?1 ORDER BY id DESC LIMIT 1"
                        ),
                        params![headline_id],
                        research_from_row,
                    )
                    .optional()?;
                Ok(research)
            })
            .await?;
        Ok(research)
    }

    // Article operations

    pub async fn insert_article(&self, article: NewArticle) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO articles (headline_id, research_id, content, llm_used, quality_score, status) VALUES (?1, ?2, ?3, ?4, ?5, 'draft')",
                    params![
                        article.headline_id,
                        article.research_id,
                        article.content,
                        article.llm_used,
                        article.quality_score
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn get_article(&self, id: i64) -> Result<Option<Article>> {
        let article = self
            .conn
            .call(move |conn| {
                let article = conn
                    .query_row(
                        &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1"),
                        params![id],
                        article_from_row,
                    )
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    pub async fn articles_for_headline(&self, headline_id: i64) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles WHERE headline_id = ?1 ORDER BY id"
                ))?;
                let articles = stmt
                    .query_map(params![headline_id], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    /// Drafts and articles sent back for changes, newest first.
    pub async fn articles_for_review(&self, limit: u32) -> Result<Vec<ReviewQueueItem>> {
        let items = self
            .conn
            .call(move |conn| {
                let columns = ARTICLE_COLUMNS
                    .split(", ")
                    .map(|c| format!("a.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut stmt = conn.prepare(&format!(
                    "SELECT {columns}, h.headline, h.category FROM articles a \
                     JOIN headlines h ON a.headline_id = h.id \
                     WHERE a.status IN ('draft', 'under_review') \
                     ORDER BY a.created_at DESC, a.id DESC LIMIT ?1"
                ))?;
                let items = stmt
                    .query_map(params![limit], |row| {
                        Ok(ReviewQueueItem {
                            article: article_from_row(row)?,
                            headline: row.get(13)?,
                            category: row.get(14)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    /// Records an editorial decision and, in the same transaction, the
    /// headline transition it implies.
    ///
    /// Returns false (and writes nothing) when the article or the headline is
    /// no longer in the expected state.
    pub async fn apply_review(
        &self,
        article_id: i64,
        review: ArticleReview,
        transition: Option<HeadlineTransition>,
    ) -> Result<bool> {
        if let Some(t) = &transition {
            if !t.from.can_transition_to(t.to) {
                return Err(AppError::InvalidTransition {
                    entity: "headline",
                    from: t.from.to_string(),
                    to: t.to.to_string(),
                });
            }
        }

        let applied = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                if let Some(t) = &transition {
                    let moved = tx.execute(
                        "UPDATE headlines SET status = ?1, processed_at = datetime('now'), notes = COALESCE(?2, notes) \
                         WHERE id = ?3 AND status = ?4",
                        params![t.to.as_str(), t.notes, t.headline_id, t.from.as_str()],
                    )?;
                    if moved == 0 {
                        return Ok(false);
                    }
                }

                let reviewed = tx.execute(
                    "UPDATE articles SET status = ?1, reviewer = ?2, reviewer_notes = ?3, \
                     external_id = COALESCE(?4, external_id), reviewed_at = datetime('now'), \
                     published_at = CASE WHEN ?5 THEN datetime('now') ELSE published_at END \
                     WHERE id = ?6 AND status = ?7",
                    params![
                        review.status.as_str(),
                        review.reviewer,
                        review.notes,
                        review.external_id,
                        review.published,
                        article_id,
                        review.from.as_str()
                    ],
                )?;
                if reviewed == 0 {
                    return Ok(false);
                }

                tx.commit()?;
                Ok(true)
            })
            .await?;
        Ok(applied)
    }

    pub async fn delete_rejected_articles_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cutoff = sql_datetime(cutoff);
        let deleted = self
            .conn
            .call(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM articles WHERE status = 'rejected' AND reviewed_at < ?1",
                    params![cutoff],
                )?;
                Ok(deleted)
            })
            .await?;
        Ok(deleted)
    }

    // Source operations

    /// Inserts a first sighting or bumps the citation counter.
    ///
    /// The credibility score written on first sight is never recomputed.
    pub async fn record_source_sighting(&self, source: &ResearchSource) -> Result<()> {
        let source = source.clone();
        self.conn
            .call(move |conn| {
                let title = (!source.title.trim().is_empty()).then(|| source.title.trim().to_string());
                conn.execute(
                    r#"INSERT INTO sources (url, domain, title, credibility_score, times_cited, last_verified)
                       VALUES (?1, ?2, ?3, ?4, 1, datetime('now'))
                       ON CONFLICT(url) DO UPDATE SET
                           times_cited = times_cited + 1,
                           last_verified = datetime('now')"#,
                    params![source.url, source.domain, title, source.credibility_score],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_source(&self, url: &str) -> Result<Option<Source>> {
        let url = url.to_string();
        let source = self
            .conn
            .call(move |conn| {
                let source = conn
                    .query_row(
                        "SELECT id, url, domain, title, credibility_score, last_verified, times_cited, created_at \
                         FROM sources WHERE url = ?1",
                        params![url],
                        source_from_row,
                    )
                    .optional()?;
                Ok(source)
            })
            .await?;
        Ok(source)
    }

    // Log operations

    pub async fn insert_log(&self, entry: NewLogEntry) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO logs (headline_id, process_type, status, message, execution_time, tokens_used) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        entry.headline_id,
                        entry.process_type.as_str(),
                        entry.status.as_str(),
                        entry.message,
                        entry.execution_time,
                        entry.tokens_used
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn logs_for_headline(&self, headline_id: i64) -> Result<Vec<LogEntry>> {
        let logs = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, headline_id, process_type, status, message, execution_time, tokens_used, created_at \
                     FROM logs WHERE headline_id = ?1 ORDER BY id",
                )?;
                let logs = stmt
                    .query_map(params![headline_id], log_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(logs)
            })
            .await?;
        Ok(logs)
    }

    // Statistics

    pub async fn processing_stats(&self, since: DateTime<Utc>) -> Result<ProcessingStats> {
        let since = sql_datetime(since);
        let stats = self
            .conn
            .call(move |conn| {
                let count = |sql: &str| -> rusqlite::Result<i64> {
                    conn.query_row(sql, params![since], |row| row.get(0))
                };

                let headlines_processed =
                    count("SELECT COUNT(*) FROM headlines WHERE processed_at >= ?1")?;
                let articles_generated =
                    count("SELECT COUNT(*) FROM articles WHERE created_at >= ?1")?;
                let articles_published =
                    count("SELECT COUNT(*) FROM articles WHERE published_at >= ?1")?;
                let headlines_created =
                    count("SELECT COUNT(*) FROM headlines WHERE created_at >= ?1")?;

                let avg_time: Option<f64> = conn.query_row(
                    "SELECT AVG(execution_time) FROM logs WHERE created_at >= ?1 AND execution_time IS NOT NULL",
                    params![since],
                    |row| row.get(0),
                )?;
                let tokens: Option<i64> = conn.query_row(
                    "SELECT SUM(tokens_used) FROM logs WHERE created_at >= ?1 AND tokens_used IS NOT NULL",
                    params![since],
                    |row| row.get(0),
                )?;

                let success_rate = if headlines_created > 0 {
                    round_to(articles_generated as f64 / headlines_created as f64 * 100.0, 1)
                } else {
                    0.0
                };

                Ok(ProcessingStats {
                    headlines_processed,
                    articles_generated,
                    articles_published,
                    success_rate,
                    avg_processing_time: round_to(avg_time.unwrap_or(0.0), 2),
                    total_tokens_used: tokens.unwrap_or(0),
                })
            })
            .await?;
        Ok(stats)
    }

    pub async fn workflow_stats(&self, since: DateTime<Utc>) -> Result<WorkflowStats> {
        let since = sql_datetime(since);
        let stats = self
            .conn
            .call(move |conn| {
                let articles_pending_review: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM articles WHERE status IN ('draft', 'under_review')",
                    [],
                    |row| row.get(0),
                )?;
                let count = |sql: &str| -> rusqlite::Result<i64> {
                    conn.query_row(sql, params![since], |row| row.get(0))
                };
                let articles_approved = count(
                    "SELECT COUNT(*) FROM articles WHERE status = 'approved' AND reviewed_at >= ?1",
                )?;
                let articles_published = count(
                    "SELECT COUNT(*) FROM articles WHERE status = 'published' AND published_at >= ?1",
                )?;
                let articles_rejected = count(
                    "SELECT COUNT(*) FROM articles WHERE status = 'rejected' AND reviewed_at >= ?1",
                )?;
                let avg_review: Option<f64> = conn.query_row(
                    "SELECT AVG((julianday(reviewed_at) - julianday(created_at)) * 1440.0) \
                     FROM articles WHERE reviewed_at IS NOT NULL AND reviewed_at >= ?1",
                    params![since],
                    |row| row.get(0),
                )?;

                Ok(WorkflowStats {
                    articles_pending_review,
                    articles_approved,
                    articles_published,
                    articles_rejected,
                    avg_review_minutes: round_to(avg_review.unwrap_or(0.0), 1),
                })
            })
            .await?;
        Ok(stats)
    }

    #[cfg(test)]
    pub(crate) async fn set_headline_processed_at(
        &self,
        id: i64,
        processed_at: DateTime<Utc>,
    ) -> Result<()> {
        let processed_at = sql_datetime(processed_at);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE headlines SET processed_at = ?1 WHERE id = ?2",
                    params![processed_at, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn count_rows(&self, table: &'static str) -> Result<i64> {
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }
}

const SQL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQLite `datetime('now')` layout, so text comparisons order correctly.
fn sql_datetime(dt: DateTime<Utc>) -> String {
    dt.format(SQL_DATETIME_FORMAT).to_string()
}

/// Inverse of [`sql_datetime`]. Every timestamp column is written in that
/// layout, so nothing else is accepted.
fn parse_datetime(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, SQL_DATETIME_FORMAT).map(|naive| naive.and_utc())
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn text_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn datetime_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_datetime_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_datetime(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn score_column(row: &Row, idx: usize) -> rusqlite::Result<Option<u8>> {
    Ok(row
        .get::<_, Option<i64>>(idx)?
        .map(|score| score.clamp(0, 10) as u8))
}

fn headline_from_row(row: &Row) -> rusqlite::Result<Headline> {
    Ok(Headline {
        id: row.get(0)?,
        text: row.get(1)?,
        origin: text_column(row, 2)?,
        priority: row.get::<_, i64>(3)?.clamp(1, 6) as u8,
        category: row.get(4)?,
        status: text_column(row, 5)?,
        created_at: datetime_column(row, 6)?,
        processed_at: optional_datetime_column(row, 7)?,
        notes: row.get(8)?,
    })
}

fn research_from_row(row: &Row) -> rusqlite::Result<Research> {
    let sources_json: String = row.get(4)?;
    let sources = serde_json::from_str(&sources_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(Research {
        id: row.get(0)?,
        headline_id: row.get(1)?,
        query: row.get(2)?,
        response: row.get(3)?,
        sources,
        quality_score: score_column(row, 5)?,
        created_at: datetime_column(row, 6)?,
    })
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        headline_id: row.get(1)?,
        research_id: row.get(2)?,
        content: row.get(3)?,
        llm_used: row.get(4)?,
        quality_score: score_column(row, 5)?,
        status: text_column(row, 6)?,
        external_id: row.get(7)?,
        reviewer: row.get(8)?,
        reviewer_notes: row.get(9)?,
        created_at: datetime_column(row, 10)?,
        reviewed_at: optional_datetime_column(row, 11)?,
        published_at: optional_datetime_column(row, 12)?,
    })
}

fn source_from_row(row: &Row) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get(0)?,
        url: row.get(1)?,
        domain: row.get(2)?,
        title: row.get(3)?,
        credibility_score: score_column(row, 4)?.unwrap_or(5),
        last_verified: optional_datetime_column(row, 5)?,
        times_cited: row.get(6)?,
        created_at: datetime_column(row, 7)?,
    })
}

fn log_from_row(row: &Row) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get(0)?,
        headline_id: row.get(1)?,
        process_type: text_column(row, 2)?,
        status: text_column(row, 3)?,
        message: row.get(4)?,
        execution_time: row.get(5)?,
        tokens_used: row.get(6)?,
        created_at: datetime_column(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HeadlineOrigin, LogStatus, ProcessType};
    use crate::test_support::test_repository;

    fn source(url: &str, score: u8) -> ResearchSource {
        ResearchSource {
            url: url.to_string(),
            title: "Title".to_string(),
            snippet: String::new(),
            domain: "example.org".to_string(),
            credibility_score: score,
        }
    }

    #[tokio::test]
    async fn pending_headlines_are_ordered_by_urgency_then_age() {
        let (repo, _dir) = test_repository().await;
        let normal = repo
            .insert_headline(NewHeadline::new("Normal study on heart health"))
            .await
            .unwrap();
        let urgent = repo
            .insert_headline(NewHeadline::new("Urgent outbreak in hospital").with_priority(1))
            .await
            .unwrap();
        let low = repo
            .insert_headline(NewHeadline::new("Low priority vaccine study").with_priority(6))
            .await
            .unwrap();

        let ids: Vec<i64> = repo
            .pending_headlines(10)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec![urgent, normal, low]);

        let limited = repo.pending_headlines(1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn claim_is_a_single_attempt_gate() {
        let (repo, _dir) = test_repository().await;
        let id = repo
            .insert_headline(NewHeadline::new("Drug trial shows promise"))
            .await
            .unwrap();

        assert!(repo.claim_headline(id).await.unwrap());
        assert!(!repo.claim_headline(id).await.unwrap());

        let headline = repo.get_headline(id).await.unwrap().unwrap();
        assert_eq!(headline.status, HeadlineStatus::Processing);
        assert_eq!(headline.origin, HeadlineOrigin::Manual);
        assert!(headline.processed_at.is_some());
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected_before_touching_the_row() {
        let (repo, _dir) = test_repository().await;
        let id = repo
            .insert_headline(NewHeadline::new("Clinical study on sleep"))
            .await
            .unwrap();

        let err = repo
            .transition_headline(id, HeadlineStatus::Failed, HeadlineStatus::Pending, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidTransition);
    }

    #[tokio::test]
    async fn source_sightings_keep_first_score_and_count_citations() {
        let (repo, _dir) = test_repository().await;
        repo.record_source_sighting(&source("https://example.org/a", 9))
            .await
            .unwrap();
        repo.record_source_sighting(&source("https://example.org/a", 2))
            .await
            .unwrap();

        let stored = repo.get_source("https://example.org/a").await.unwrap().unwrap();
        assert_eq!(stored.credibility_score, 9);
        assert_eq!(stored.times_cited, 2);
        assert!(stored.last_verified.is_some());
    }

    #[tokio::test]
    async fn deleting_a_headline_cascades_to_research_and_articles() {
        let (repo, _dir) = test_repository().await;
        let headline_id = repo
            .insert_headline(NewHeadline::new("Cancer screening study"))
            .await
            .unwrap();
        let research_id = repo
            .insert_research(NewResearch {
                headline_id,
                query: "q".to_string(),
                response: "r".to_string(),
                sources: vec![source("https://example.org/b", 5)],
                quality_score: Some(6),
            })
            .await
            .unwrap();
        repo.insert_article(NewArticle {
            headline_id,
            research_id,
            content: "body".to_string(),
            llm_used: "openai".to_string(),
            quality_score: Some(7),
        })
        .await
        .unwrap();
        repo.record_source_sighting(&source("https://example.org/b", 5))
            .await
            .unwrap();

        repo.claim_headline(headline_id).await.unwrap();
        repo.transition_headline(
            headline_id,
            HeadlineStatus::Processing,
            HeadlineStatus::Researched,
            None,
        )
        .await
        .unwrap();
        repo.transition_headline(
            headline_id,
            HeadlineStatus::Researched,
            HeadlineStatus::Generated,
            None,
        )
        .await
        .unwrap();
        repo.set_headline_processed_at(headline_id, Utc::now() - chrono::Duration::days(40))
            .await
            .unwrap();

        let deleted = repo
            .delete_headlines_before(&[HeadlineStatus::Generated], Utc::now() - chrono::Duration::days(30))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(repo.count_rows("research").await.unwrap(), 0);
        assert_eq!(repo.count_rows("articles").await.unwrap(), 0);
        // sources are shared reference data and survive
        assert_eq!(repo.count_rows("sources").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn research_sources_round_trip_through_json() {
        let (repo, _dir) = test_repository().await;
        let headline_id = repo
            .insert_headline(NewHeadline::new("Vaccine research update"))
            .await
            .unwrap();
        let sources = vec![source("https://who.int/x", 9), source("https://example.org/y", 5)];
        let id = repo
            .insert_research(NewResearch {
                headline_id,
                query: "query".to_string(),
                response: "response".to_string(),
                sources: sources.clone(),
                quality_score: None,
            })
            .await
            .unwrap();

        let research = repo.get_research(id).await.unwrap().unwrap();
        assert_eq!(research.sources, sources);
        assert_eq!(research.quality_score, None);
        let latest = repo.research_for_headline(headline_id).await.unwrap().unwrap();
        assert_eq!(latest.id, id);
    }

    #[tokio::test]
    async fn logs_are_appended_and_feed_stats() {
        let (repo, _dir) = test_repository().await;
        repo.insert_log(
            NewLogEntry::new(ProcessType::Generation, LogStatus::Completed, "ok")
                .for_headline(Some(3))
                .timed(1.5)
                .tokens(Some(120)),
        )
        .await
        .unwrap();
        repo.insert_log(
            NewLogEntry::new(ProcessType::Research, LogStatus::Failed, "boom")
                .for_headline(Some(3))
                .timed(0.5),
        )
        .await
        .unwrap();

        let logs = repo.logs_for_headline(3).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].process_type, ProcessType::Generation);
        assert_eq!(logs[1].status, LogStatus::Failed);

        let stats = repo
            .processing_stats(Utc::now() - chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(stats.total_tokens_used, 120);
        assert!((stats.avg_processing_time - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn review_only_applies_to_the_status_it_was_made_against() {
        let (repo, _dir) = test_repository().await;
        let headline_id = repo
            .insert_headline(NewHeadline::new("Flu season arrives early"))
            .await
            .unwrap();
        let research_id = repo
            .insert_research(NewResearch {
                headline_id,
                query: "q".to_string(),
                response: "r".to_string(),
                sources: Vec::new(),
                quality_score: None,
            })
            .await
            .unwrap();
        let article_id = repo
            .insert_article(NewArticle {
                headline_id,
                research_id,
                content: "Body".to_string(),
                llm_used: "openai".to_string(),
                quality_score: None,
            })
            .await
            .unwrap();
        let review = |from| ArticleReview {
            from,
            status: ArticleStatus::Rejected,
            reviewer: Some("ana".to_string()),
            notes: None,
            external_id: None,
            published: false,
        };

        let stale = repo
            .apply_review(article_id, review(ArticleStatus::Approved), None)
            .await
            .unwrap();
        assert!(!stale);
        let article = repo.get_article(article_id).await.unwrap().unwrap();
        assert_eq!(article.status, ArticleStatus::Draft);
        assert!(article.reviewer.is_none());

        assert!(repo
            .apply_review(article_id, review(ArticleStatus::Draft), None)
            .await
            .unwrap());
        assert!(!repo
            .apply_review(article_id, review(ArticleStatus::Draft), None)
            .await
            .unwrap());
        let article = repo.get_article(article_id).await.unwrap().unwrap();
        assert_eq!(article.status, ArticleStatus::Rejected);
        assert!(article.reviewed_at.is_some());
    }

    #[test]
    fn timestamps_use_the_sqlite_layout_only() {
        let parsed = parse_datetime("2026-01-11 12:34:56").unwrap();
        assert_eq!(sql_datetime(parsed), "2026-01-11 12:34:56");
        assert!(parse_datetime("2026-01-11T12:34:56+00:00").is_err());
        assert!(parse_datetime("").is_err());
    }
}
