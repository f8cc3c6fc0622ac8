use std::sync::{Arc, LazyLock};
use std::time::Instant;

use regex::Regex;
use tracing::{info, warn};

use crate::ai::{Provider, TextGenerator};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{LogStatus, NewLogEntry, ProcessType, ResearchSource};

static CITATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[Source:.*?\]").expect("valid citation regex"));

const SYSTEM_PROMPT: &str = "You are an experienced medical journalist who writes accurate, \
engaging and accessible health articles. Your writing is scientifically accurate and evidence-based, \
accessible to readers without a medical background, properly attributed to its sources, objective, \
and clear about the limits and uncertainties of medical research. Never make claims beyond what \
the source material supports.";

const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub content: String,
    pub llm_used: Provider,
    pub quality_score: u8,
    pub tokens_used: Option<u32>,
}

pub struct GenerationStage {
    repo: Repository,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl GenerationStage {
    /// `generator` is `None` when no provider has a credential.
    pub fn new(repo: Repository, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { repo, generator }
    }

    pub async fn run(
        &self,
        headline_id: i64,
        headline: &str,
        research: &str,
        sources: &[ResearchSource],
    ) -> Result<GenerationOutcome> {
        let started = Instant::now();
        let outcome = self.generate(headline, research, sources).await;
        let elapsed = started.elapsed().as_secs_f64();

        let entry = match &outcome {
            Ok(done) => NewLogEntry::new(
                ProcessType::Generation,
                LogStatus::Completed,
                format!(
                    "Article generated with {} (quality {})",
                    done.llm_used, done.quality_score
                ),
            )
            .tokens(done.tokens_used),
            Err(e) => NewLogEntry::new(
                ProcessType::Generation,
                LogStatus::Failed,
                format!("Generation failed: {}", e),
            ),
        };
        if let Err(e) = self
            .repo
            .insert_log(entry.for_headline(Some(headline_id)).timed(elapsed))
            .await
        {
            warn!(headline_id, error = %e, "Failed to write generation log");
        }

        outcome
    }

    async fn generate(
        &self,
        headline: &str,
        research: &str,
        sources: &[ResearchSource],
    ) -> Result<GenerationOutcome> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| AppError::Config("No LLM API keys configured".to_string()))?;

        let prompt = build_article_prompt(headline, research, sources);
        let generation = generator.generate(SYSTEM_PROMPT, &prompt).await?;

        if generation.text.trim().is_empty() {
            return Err(AppError::EmptyResult(generator.provider().to_string()));
        }

        let quality_score = quality_score(&generation.text);
        info!(provider = %generator.provider(), quality_score, "Article generated");

        Ok(GenerationOutcome {
            content: generation.text,
            llm_used: generator.provider(),
            quality_score,
            tokens_used: generation.tokens_used,
        })
    }
}

pub fn build_article_prompt(headline: &str, research: &str, sources: &[ResearchSource]) -> String {
    format!(
        "Write a comprehensive medical news article based on the following information:\n\n\
         **HEADLINE:** {headline}\n\n\
         **RESEARCH DATA:**\n{research}\n\n\
         **SOURCES TO CITE:**\n{sources}\n\n\
         **REQUIREMENTS:**\n\
         1. Write a complete news article of 500-800 words\n\
         2. Use an engaging but professional tone suitable for general readers\n\
         3. Cite sources with the format [Source: URL] after the statements they support\n\
         4. Structure it with a clear title, a lead paragraph, body paragraphs and a conclusion\n\
         5. Include relevant medical context and background\n\
         6. Explain technical terms for a general audience\n\
         7. Keep journalistic objectivity and accuracy\n\
         8. Use only information from the provided research and sources\n\
         9. Close with a short disclaimer advising readers to consult a healthcare professional\n\n\
         Write the article now:",
        sources = format_sources(sources),
    )
}

/// Numbered source list with short excerpts.
pub fn format_sources(sources: &[ResearchSource]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            let mut line = format!("{}. ", i + 1);
            if !source.title.is_empty() {
                line.push_str(&source.title);
                line.push_str(" - ");
            }
            line.push_str(&source.url);
            if !source.domain.is_empty() {
                line.push_str(&format!(" ({})", source.domain));
            }
            if !source.snippet.is_empty() {
                let excerpt: String = source.snippet.chars().take(EXCERPT_CHARS).collect();
                line.push_str(&format!("\n   Excerpt: {}...", excerpt));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Heuristic 0-10 rating of a draft's length, sourcing and structure.
pub fn quality_score(content: &str) -> u8 {
    let mut score: usize = 5;

    let words = content.split_whitespace().count();
    if (500..=800).contains(&words) {
        score += 2;
    } else if (300..500).contains(&words) {
        score += 1;
    }

    score += CITATION_MARKER.find_iter(content).count().min(3);

    let lower = content.to_lowercase();
    if lower.contains("consult") && lower.contains("healthcare") {
        score += 1;
    }

    if content.matches("\n\n").count() + 1 >= 3 {
        score += 1;
    }

    score.min(10) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::NewHeadline;
    use crate::test_support::{test_repository, FakeGenerator};

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn empty_content_scores_base() {
        assert_eq!(quality_score(""), 5);
    }

    #[test]
    fn word_band_credit() {
        assert_eq!(quality_score(&words(650)), 7);
        assert_eq!(quality_score(&words(350)), 6);
        assert_eq!(quality_score(&words(900)), 5);
    }

    #[test]
    fn citations_are_monotonic_and_capped() {
        let mut previous = 0;
        for n in 0..8 {
            let text = (0..n)
                .map(|i| format!("Claim [Source: https://a.org/{}]", i))
                .collect::<Vec<_>>()
                .join(" ");
            let score = quality_score(&text);
            assert!(score >= previous);
            previous = score;
        }
        assert_eq!(previous, 8);
    }

    #[test]
    fn score_is_clamped_for_huge_input() {
        let mut text = words(650);
        text.push_str("\n\n[Source: a] [Source: b] [Source: c] [Source: d]\n\n");
        text.push_str("Consult your healthcare provider.");
        assert_eq!(quality_score(&text), 10);
        assert!(quality_score(&"[Source: x]\n\n".repeat(100_000)) <= 10);
    }

    #[test]
    fn source_list_is_numbered_with_truncated_excerpt() {
        let sources = vec![ResearchSource {
            url: "https://www.who.int/vitd".to_string(),
            title: "WHO".to_string(),
            snippet: "x".repeat(300),
            domain: "who.int".to_string(),
            credibility_score: 9,
        }];
        let formatted = format_sources(&sources);
        assert!(formatted.starts_with("1. WHO - https://www.who.int/vitd (who.int)"));
        assert!(formatted.ends_with(&format!("Excerpt: {}...", "x".repeat(200))));
    }

    #[tokio::test]
    async fn missing_generator_is_configuration_error() {
        let (repo, _dir) = test_repository().await;
        let id = repo
            .insert_headline(NewHeadline::new("Diabetes drug trial results"))
            .await
            .unwrap();
        let stage = GenerationStage::new(repo.clone(), None);

        let err = stage.run(id, "Diabetes drug trial results", "", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let logs = repo.logs_for_headline(id).await.unwrap();
        assert_eq!(logs[0].status, LogStatus::Failed);
    }

    #[tokio::test]
    async fn blank_generation_is_empty_result() {
        let (repo, _dir) = test_repository().await;
        let id = repo
            .insert_headline(NewHeadline::new("Heart surgery advances"))
            .await
            .unwrap();
        let generator = FakeGenerator::answering("   ");
        let stage = GenerationStage::new(repo, Some(Arc::new(generator)));

        let err = stage.run(id, "Heart surgery advances", "", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResult);
    }

    #[tokio::test]
    async fn successful_generation_logs_tokens() {
        let (repo, _dir) = test_repository().await;
        let id = repo
            .insert_headline(NewHeadline::new("Cancer screening guidance updated"))
            .await
            .unwrap();
        let generator = FakeGenerator::answering(&words(650)).with_tokens(1500);
        let stage = GenerationStage::new(repo.clone(), Some(Arc::new(generator)));

        let outcome = stage
            .run(id, "Cancer screening guidance updated", "research", &[])
            .await
            .unwrap();
        assert_eq!(outcome.quality_score, 7);
        assert_eq!(outcome.llm_used, Provider::OpenAi);

        let logs = repo.logs_for_headline(id).await.unwrap();
        assert_eq!(logs[0].process_type, ProcessType::Generation);
        assert_eq!(logs[0].tokens_used, Some(1500));
    }
}
