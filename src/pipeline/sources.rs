//! Source extraction from research responses.
//!
//! Three inputs are merged in order: structured citations returned by the
//! API, bare URLs in the text, and numbered reference lists. The first
//! sighting of a URL wins; a later sighting only fills in a missing title.

use std::sync::LazyLock;

use regex::Regex;

use crate::ai::Citation;
use crate::models::ResearchSource;

use super::credibility::{domain_of, score_url};

static BARE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s\[\]<>"'()]+"#).expect("bare url pattern")
});

/// `1. **Title:** URL`, `[1] Title - URL`, `1. Title (URL)`, `1. Title: URL`
static REFERENCE_LINES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)^\s*\d+\.\s*\*\*([^:*\n]+):?\*\*:?\s*(https?://\S+)",
        r"(?m)^\s*\[\d+\]\s*([^\n]+?)\s+-\s+(https?://\S+)",
        r"(?m)^\s*\d+\.\s*([^(\n]+?)\s*\((https?://[^)\s]+)\)",
        r"(?m)^\s*\d+\.\s*([^:\n]+?):\s*(https?://\S+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("reference line pattern"))
    .collect()
});

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '*', '`', '>', ')'];

/// Strips markdown and sentence punctuation glued to the end of a URL.
pub fn clean_url(raw: &str) -> String {
    raw.trim().trim_end_matches(TRAILING_PUNCTUATION).to_string()
}

pub fn inline_urls(text: &str) -> Vec<String> {
    BARE_URL
        .find_iter(text)
        .map(|m| clean_url(m.as_str()))
        .filter(|url| !url.is_empty())
        .collect()
}

/// `(title, url)` pairs from reference-list lines, pattern by pattern.
pub fn reference_entries(text: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for pattern in REFERENCE_LINES.iter() {
        for captures in pattern.captures_iter(text) {
            let title = captures[1].trim().trim_matches('*').trim().to_string();
            let url = clean_url(&captures[2]);
            if !url.is_empty() {
                entries.push((title, url));
            }
        }
    }
    entries
}

pub fn extract_sources(text: &str, citations: &[Citation]) -> Vec<ResearchSource> {
    let mut sources = Vec::new();

    for citation in citations {
        merge_source(&mut sources, &citation.url, &citation.title, &citation.snippet);
    }
    for url in inline_urls(text) {
        merge_source(&mut sources, &url, "", "");
    }
    for (title, url) in reference_entries(text) {
        merge_source(&mut sources, &url, &title, "");
    }

    sources
}

fn merge_source(sources: &mut Vec<ResearchSource>, url: &str, title: &str, snippet: &str) {
    let url = clean_url(url);
    if url.is_empty() {
        return;
    }

    if let Some(existing) = sources.iter_mut().find(|s| s.url == url) {
        if existing.title.is_empty() && !title.trim().is_empty() {
            existing.title = title.trim().to_string();
        }
        return;
    }

    sources.push(ResearchSource {
        domain: domain_of(&url).unwrap_or_default(),
        credibility_score: score_url(&url),
        title: title.trim().to_string(),
        snippet: snippet.trim().to_string(),
        url,
    });
}
