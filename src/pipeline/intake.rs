use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{HeadlineOrigin, NewHeadline};

const MIN_LENGTH: usize = 10;
const MAX_LENGTH: usize = 500;

/// Topic words a headline must mention to be worth researching. Agency
/// acronyms only count as whole words.
static MEDICAL_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:who|cdc|fda)\b|health|medical|medicine|disease|treatment|therapy|hospital|doctor|patient|clinical|study|research|vaccine|drug|medication|diagnosis|symptoms|cancer|diabetes|heart|brain|surgery|virus|bacteria|pandemic|epidemic|outbreak",
    )
    .expect("valid medical terms regex")
});

/// Checks a candidate headline and reports every problem at once.
pub async fn validate_headline(repo: &Repository, text: &str) -> Result<()> {
    let text = text.trim();
    let mut problems = Vec::new();

    let length = text.chars().count();
    if length < MIN_LENGTH {
        problems.push(format!("Headline must be at least {} characters", MIN_LENGTH));
    }
    if length > MAX_LENGTH {
        problems.push(format!("Headline must be at most {} characters", MAX_LENGTH));
    }
    if !MEDICAL_TERMS.is_match(text) {
        problems.push("Headline does not appear to be medical news".to_string());
    }
    if !text.is_empty() && repo.headline_exists(text).await? {
        problems.push("Headline already exists".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(problems))
    }
}

/// Validates and queues a headline as pending. Returns the new id.
pub async fn add_headline(
    repo: &Repository,
    text: &str,
    origin: HeadlineOrigin,
    priority: Option<u8>,
    category: Option<&str>,
) -> Result<i64> {
    validate_headline(repo, text).await?;

    let mut headline = NewHeadline::new(text.trim()).with_origin(origin);
    if let Some(priority) = priority {
        headline = headline.with_priority(priority);
    }
    if let Some(category) = category {
        headline = headline.with_category(category);
    }

    let id = repo.insert_headline(headline).await?;
    info!(headline_id = id, origin = %origin, "Headline queued");
    Ok(id)
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<i64>,
    /// (1-based line number, reason)
    pub skipped: Vec<(usize, String)>,
}

impl ImportReport {
    pub fn message(&self) -> String {
        format!(
            "Imported {} headlines, skipped {}",
            self.imported.len(),
            self.skipped.len()
        )
    }
}

/// Bulk intake: one headline per non-empty line at normal priority.
pub async fn import_headlines<'a, I>(repo: &Repository, lines: I) -> Result<ImportReport>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut report = ImportReport::default();

    for (index, line) in lines.into_iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match add_headline(repo, line, HeadlineOrigin::BulkImport, None, None).await {
            Ok(id) => report.imported.push(id),
            Err(AppError::Validation(problems)) => {
                warn!(line = index + 1, "Skipping headline: {}", problems.join("; "));
                report.skipped.push((index + 1, problems.join("; ")));
            }
            Err(e) => return Err(e),
        }
    }

    info!("{}", report.message());
    Ok(report)
}
