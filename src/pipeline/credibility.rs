//! Static trust scoring for cited domains.

use url::Url;

pub const HIGH_CREDIBILITY_SCORE: u8 = 9;
pub const MEDIUM_CREDIBILITY_SCORE: u8 = 7;
pub const INSTITUTIONAL_SCORE: u8 = 8;
pub const NEUTRAL_SCORE: u8 = 5;

/// Public-health bodies, indexes, major journals and academic medical centres.
const HIGH_CREDIBILITY: &[&str] = &[
    "who.int",
    "cdc.gov",
    "nih.gov",
    "pubmed.ncbi.nlm.nih.gov",
    "nejm.org",
    "thelancet.com",
    "bmj.com",
    "jama.jamanetwork.com",
    "nature.com",
    "cell.com",
    "science.org",
    "pnas.org",
    "mayoclinic.org",
    "clevelandclinic.org",
    "hopkinsmedicine.org",
];

/// General health publishers and news outlets.
const MEDIUM_CREDIBILITY: &[&str] = &[
    "healthline.com",
    "webmd.com",
    "medscape.com",
    "reuters.com",
    "bbc.com",
    "cnn.com",
    "nytimes.com",
    "washingtonpost.com",
];

/// Lowercased host with any leading `www.` removed.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Scores a URL 0..=10. Total: unparseable or empty input gets the neutral score.
pub fn score_url(url: &str) -> u8 {
    match domain_of(url) {
        Some(domain) => score_domain(&domain),
        None => NEUTRAL_SCORE,
    }
}

pub fn score_domain(domain: &str) -> u8 {
    if HIGH_CREDIBILITY.contains(&domain) {
        HIGH_CREDIBILITY_SCORE
    } else if MEDIUM_CREDIBILITY.contains(&domain) {
        MEDIUM_CREDIBILITY_SCORE
    } else if domain.split('.').any(|label| label == "gov" || label == "edu") {
        INSTITUTIONAL_SCORE
    } else {
        NEUTRAL_SCORE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_lists_take_precedence() {
        assert_eq!(score_url("https://www.who.int/news/item/1"), 9);
        assert_eq!(score_url("https://pubmed.ncbi.nlm.nih.gov/123/"), 9);
        // on the high list even though it is also .gov
        assert_eq!(score_url("https://cdc.gov/flu"), 9);
        assert_eq!(score_url("https://www.healthline.com/nutrition"), 7);
    }

    #[test]
    fn institutional_domains_score_eight() {
        assert_eq!(score_url("https://med.stanford.edu/news.html"), 8);
        assert_eq!(score_url("https://www.fda.gov/drugs"), 8);
        assert_eq!(score_url("https://www.gov.uk/guidance"), 8);
    }

    #[test]
    fn unknown_and_malformed_urls_are_neutral() {
        assert_eq!(score_url("https://some-health-blog.example/post"), 5);
        assert_eq!(score_url(""), 5);
        assert_eq!(score_url("not a url"), 5);
        assert_eq!(score_url("https://government-news.com/x"), 5);
    }

    #[test]
    fn domain_strips_www_and_case() {
        assert_eq!(domain_of("https://WWW.BMJ.com/a").as_deref(), Some("bmj.com"));
        assert_eq!(domain_of("mailto:x"), None);
    }
}
