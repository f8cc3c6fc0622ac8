use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::ai::ResearchClient;
use crate::db::Repository;
use crate::error::Result;
use crate::models::{LogStatus, NewLogEntry, NewResearch, ProcessType, ResearchSource};

use super::sources::extract_sources;

/// Result of a successful research run, already persisted.
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub research_id: i64,
    pub text: String,
    pub sources: Vec<ResearchSource>,
    pub query: String,
    pub tokens_used: Option<u32>,
}

pub struct ResearchStage {
    repo: Repository,
    client: Arc<dyn ResearchClient>,
}

impl ResearchStage {
    pub fn new(repo: Repository, client: Arc<dyn ResearchClient>) -> Self {
        Self { repo, client }
    }

    /// Researches one headline and stores the Research row. Source
    /// bookkeeping failures are logged and ignored.
    pub async fn run(&self, headline_id: i64, headline: &str) -> Result<ResearchOutcome> {
        let started = Instant::now();
        let query = build_research_prompt(headline);

        let outcome = self.research_and_store(headline_id, &query).await;
        let elapsed = started.elapsed().as_secs_f64();

        let entry = match &outcome {
            Ok(done) => NewLogEntry::new(
                ProcessType::Research,
                LogStatus::Completed,
                format!("Research completed with {} sources", done.sources.len()),
            )
            .tokens(done.tokens_used),
            Err(e) => NewLogEntry::new(
                ProcessType::Research,
                LogStatus::Failed,
                format!("Research failed: {}", e),
            ),
        };
        if let Err(e) = self
            .repo
            .insert_log(entry.for_headline(Some(headline_id)).timed(elapsed))
            .await
        {
            warn!(headline_id, error = %e, "Failed to write research log");
        }

        outcome
    }

    async fn research_and_store(&self, headline_id: i64, query: &str) -> Result<ResearchOutcome> {
        let response = self.client.research(query).await?;
        debug!(model = %response.model, citations = response.citations.len(), "Research answer received");

        let sources = extract_sources(&response.text, &response.citations);
        let quality = research_quality(&response.text, &sources);

        let research_id = self
            .repo
            .insert_research(NewResearch {
                headline_id,
                query: query.to_string(),
                response: response.text.clone(),
                sources: sources.clone(),
                quality_score: Some(quality),
            })
            .await?;

        for source in &sources {
            if let Err(e) = self.repo.record_source_sighting(source).await {
                warn!(url = %source.url, error = %e, "Failed to record source sighting");
            }
        }

        info!(headline_id, research_id, sources = sources.len(), quality, "Research stored");

        Ok(ResearchOutcome {
            research_id,
            text: response.text,
            sources,
            query: query.to_string(),
            tokens_used: response.tokens_used,
        })
    }
}

pub fn build_research_prompt(headline: &str) -> String {
    format!(
        "Research the following medical news headline thoroughly. Provide comprehensive information covering:\n\n\
         1. Key medical facts and details\n\
         2. Recent developments or studies related to this topic\n\
         3. Expert opinions or statements\n\
         4. Statistical data where available\n\
         5. Context and background information\n\
         6. Potential public health implications\n\n\
         Focus on credible medical sources, research institutions, health organizations and peer-reviewed studies.\n\n\
         Headline: {}\n\n\
         Provide detailed research with proper source citations:",
        headline
    )
}

/// Heuristic 1-10 rating of how much usable material a research run produced.
pub fn research_quality(text: &str, sources: &[ResearchSource]) -> u8 {
    let mut score: u32 = 5;

    let length = text.chars().count();
    if length > 1000 {
        score += 2;
    } else if length > 500 {
        score += 1;
    }

    if sources.len() >= 5 {
        score += 2;
    } else if sources.len() >= 3 {
        score += 1;
    }

    if !sources.is_empty() {
        let total: u32 = sources.iter().map(|s| u32::from(s.credibility_score)).sum();
        let mean = total as f64 / sources.len() as f64;
        if mean >= 8.0 {
            score += 2;
        } else if mean >= 6.0 {
            score += 1;
        }
    }

    score.min(10) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Citation;
    use crate::error::ErrorKind;
    use crate::models::{NewHeadline, ProcessType};
    use crate::test_support::{test_repository, FakeResearch};

    fn source(score: u8) -> ResearchSource {
        ResearchSource {
            url: format!("https://example{}.org", score),
            title: String::new(),
            snippet: String::new(),
            domain: String::new(),
            credibility_score: score,
        }
    }

    #[test]
    fn research_quality_rewards_length_sources_and_credibility() {
        assert_eq!(research_quality("short", &[]), 5);
        assert_eq!(research_quality(&"a".repeat(600), &[]), 6);
        let strong: Vec<_> = (0..5).map(|_| source(9)).collect();
        assert_eq!(research_quality(&"a".repeat(1200), &strong), 10);
        let mixed = vec![source(5), source(7), source(7)];
        assert_eq!(research_quality("short", &mixed), 7);
    }

    #[test]
    fn prompt_embeds_headline() {
        let prompt = build_research_prompt("Measles outbreak reported in Athens");
        assert!(prompt.contains("Headline: Measles outbreak reported in Athens"));
        assert!(prompt.contains("public health implications"));
    }

    #[tokio::test]
    async fn stores_research_and_counts_sightings() {
        let (repo, _dir) = test_repository().await;
        let id = repo
            .insert_headline(NewHeadline::new("New vaccine study published"))
            .await
            .unwrap();

        let client = FakeResearch::answering(
            "Findings from https://www.cdc.gov/flu and more.",
            vec![Citation {
                url: "https://www.who.int/flu".to_string(),
                title: "WHO".to_string(),
                snippet: String::new(),
            }],
        );
        let stage = ResearchStage::new(repo.clone(), Arc::new(client));

        let outcome = stage.run(id, "New vaccine study published").await.unwrap();
        assert_eq!(outcome.sources.len(), 2);
        assert_eq!(outcome.sources[0].credibility_score, 9);

        let stored = repo.research_for_headline(id).await.unwrap().unwrap();
        assert_eq!(stored.id, outcome.research_id);
        assert_eq!(stored.sources, outcome.sources);
        assert!(stored.query.contains("New vaccine study published"));

        let cdc = repo.get_source("https://www.cdc.gov/flu").await.unwrap().unwrap();
        assert_eq!(cdc.times_cited, 1);

        let logs = repo.logs_for_headline(id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].process_type, ProcessType::Research);
        assert_eq!(logs[0].status, LogStatus::Completed);
    }

    #[tokio::test]
    async fn failure_is_logged_and_returned() {
        let (repo, _dir) = test_repository().await;
        let id = repo
            .insert_headline(NewHeadline::new("Hospital reports new virus cases"))
            .await
            .unwrap();
        let stage = ResearchStage::new(repo.clone(), Arc::new(FakeResearch::failing("quota exceeded")));

        let err = stage.run(id, "Hospital reports new virus cases").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(repo.research_for_headline(id).await.unwrap().is_none());

        let logs = repo.logs_for_headline(id).await.unwrap();
        assert_eq!(logs[0].status, LogStatus::Failed);
        assert!(logs[0].message.as_deref().unwrap().contains("quota exceeded"));
    }
}
