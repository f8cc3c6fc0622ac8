use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::ai::provider_error;
use crate::error::{AppError, Result};

const UNSPLASH_SEARCH_URL: &str = "https://api.unsplash.com/search/photos";
const SERVICE: &str = "Unsplash";
const CONTENT_IMAGES: usize = 2;

/// Words in an image description that suggest identifiable people.
const PEOPLE_WORDS: &[&str] = &[
    "patient",
    "patients",
    "person",
    "people",
    "man",
    "men",
    "woman",
    "women",
    "face",
    "faces",
    "individual",
];

/// Topic detection keywords and the stock-photo queries used for each topic.
const TOPICS: &[ImageTopic] = &[
    ImageTopic {
        keywords: &["heart", "cardiac", "cardiovascular", "blood pressure", "coronary"],
        featured: "heart health medical illustration",
        content: &["stethoscope", "ECG monitor", "healthy lifestyle"],
    },
    ImageTopic {
        keywords: &["cancer", "tumor", "oncology", "chemotherapy", "radiation"],
        featured: "medical research laboratory",
        content: &["microscope", "medical test tubes", "laboratory equipment"],
    },
    ImageTopic {
        keywords: &["brain", "neurology", "alzheimer", "parkinson", "stroke"],
        featured: "brain scan medical",
        content: &["medical imaging", "neuroscience", "hospital corridor"],
    },
    ImageTopic {
        keywords: &["diabetes", "insulin", "glucose", "blood sugar"],
        featured: "diabetes medical care",
        content: &["healthy food", "blood glucose meter", "medical check up"],
    },
    ImageTopic {
        keywords: &["lung", "respiratory", "asthma", "copd", "breathing"],
        featured: "respiratory health",
        content: &["lung health", "medical examination", "inhaler"],
    },
    ImageTopic {
        keywords: &["depression", "anxiety", "mental health", "psychiatric"],
        featured: "mental health support",
        content: &["meditation wellness", "mental wellbeing", "calm nature"],
    },
    ImageTopic {
        keywords: &["bone", "joint", "arthritis", "osteoporosis"],
        featured: "orthopedic medical care",
        content: &["x-ray medical", "physical therapy", "joint health"],
    },
];

const GENERAL_TOPIC: ImageTopic = ImageTopic {
    keywords: &[],
    featured: "medical research",
    content: &["medical equipment", "pharmacy", "hospital building"],
};

struct ImageTopic {
    keywords: &'static [&'static str],
    featured: &'static str,
    content: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub url: String,
    pub alt_text: String,
    pub credit: Option<String>,
    pub credit_url: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleImages {
    pub featured: Option<Image>,
    pub content: Vec<Image>,
}

impl ArticleImages {
    pub fn is_empty(&self) -> bool {
        self.featured.is_none() && self.content.is_empty()
    }
}

/// Finds topical imagery for an article. Attachment is done by the
/// publish target.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn article_images(
        &self,
        headline: &str,
        category: Option<&str>,
        content: &str,
    ) -> Result<ArticleImages>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    urls: PhotoUrls,
    description: Option<String>,
    alt_description: Option<String>,
    user: Option<Photographer>,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    regular: String,
}

#[derive(Debug, Deserialize)]
struct Photographer {
    name: Option<String>,
    links: Option<PhotographerLinks>,
}

#[derive(Debug, Deserialize)]
struct PhotographerLinks {
    html: Option<String>,
}

pub struct UnsplashClient {
    client: Client,
    access_key: String,
}

impl UnsplashClient {
    pub fn new(access_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, access_key })
    }

    async fn search(&self, query: &str, orientation: &str) -> Result<Option<Image>> {
        let response = self
            .client
            .get(UNSPLASH_SEARCH_URL)
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .header("Accept-Version", "v1")
            .query(&[
                ("query", query),
                ("per_page", "5"),
                ("orientation", orientation),
                ("content_filter", "high"),
                ("order_by", "relevant"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(SERVICE, response).await);
        }

        let search: SearchResponse = response.json().await?;
        debug!(query, results = search.results.len(), "Image search");
        Ok(pick_photo(search.results))
    }
}

#[async_trait]
impl ImageSource for UnsplashClient {
    async fn article_images(
        &self,
        headline: &str,
        category: Option<&str>,
        content: &str,
    ) -> Result<ArticleImages> {
        if self.access_key.trim().is_empty() {
            return Err(AppError::Config("Unsplash access key not configured".to_string()));
        }

        let topic = detect_topic(headline, category, content);
        let featured = self.search(topic.featured, "landscape").await?;

        let mut images = Vec::new();
        for query in topic.content.iter().take(CONTENT_IMAGES) {
            match self.search(query, "squarish").await {
                Ok(Some(image)) => images.push(image),
                Ok(None) => {}
                Err(e) => warn!(query, error = %e, "Content image search failed"),
            }
        }

        Ok(ArticleImages {
            featured,
            content: images,
        })
    }
}

fn detect_topic(headline: &str, category: Option<&str>, content: &str) -> &'static ImageTopic {
    let text = format!("{} {} {}", headline, category.unwrap_or_default(), content).to_lowercase();
    TOPICS
        .iter()
        .find(|topic| topic.keywords.iter().any(|k| text.contains(k)))
        .unwrap_or(&GENERAL_TOPIC)
}

fn shows_people(description: &str) -> bool {
    description
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| PEOPLE_WORDS.contains(&word))
}

fn pick_photo(photos: Vec<Photo>) -> Option<Image> {
    photos
        .into_iter()
        .find(|photo| {
            let described = [&photo.description, &photo.alt_description];
            !described
                .iter()
                .any(|d| d.as_deref().is_some_and(shows_people))
        })
        .map(|photo| {
            let (credit, credit_url) = match photo.user {
                Some(user) => (user.name, user.links.and_then(|l| l.html)),
                None => (None, None),
            };
            Image {
                url: photo.urls.regular,
                alt_text: photo
                    .alt_description
                    .unwrap_or_else(|| "Medical illustration".to_string()),
                credit,
                credit_url,
                source: SERVICE.to_lowercase(),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_follows_first_matching_keyword_group() {
        assert_eq!(
            detect_topic("Vitamin D and lung infections", None, "").featured,
            "respiratory health"
        );
        assert_eq!(
            detect_topic("New findings", Some("Heart health"), "").featured,
            "heart health medical illustration"
        );
        assert_eq!(detect_topic("Hospital funding", None, "").featured, "medical research");
    }

    #[test]
    fn photos_of_people_are_skipped() {
        let photos: Vec<Photo> = serde_json::from_str(
            r#"[
                {"urls": {"regular": "https://img/1"}, "alt_description": "a woman holding pills"},
                {"urls": {"regular": "https://img/2"}, "description": "Manufacturing line", "alt_description": "stethoscope on desk",
                 "user": {"name": "Ana", "links": {"html": "https://unsplash.com/@ana"}}}
            ]"#,
        )
        .unwrap();
        let image = pick_photo(photos).unwrap();
        assert_eq!(image.url, "https://img/2");
        assert_eq!(image.alt_text, "stethoscope on desk");
        assert_eq!(image.credit.as_deref(), Some("Ana"));
        assert_eq!(image.source, "unsplash");
    }

    #[test]
    fn nothing_picked_when_every_photo_shows_people() {
        let photos: Vec<Photo> = serde_json::from_str(
            r#"[{"urls": {"regular": "https://img/1"}, "description": "Patient in bed"}]"#,
        )
        .unwrap();
        assert!(pick_photo(photos).is_none());
    }
}
