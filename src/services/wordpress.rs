use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::unsplash::Image;
use crate::ai::provider_error;
use crate::config::WordPressConfig;
use crate::error::{AppError, Result};
use crate::models::ResearchSource;

const SERVICE: &str = "WordPress";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Publish,
}

/// Provenance stored alongside a published document.
#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub original_headline: String,
    pub sources: Vec<ResearchSource>,
    pub generated_by: String,
    pub quality_score: Option<u8>,
    pub reviewer_notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub body: String,
    pub status: DocumentStatus,
    pub author: Option<i64>,
    /// Looked up by name on the target and created if missing.
    pub category: Option<String>,
    pub metadata: DocumentMetadata,
}

/// Where reviewed articles end up.
#[async_trait]
pub trait PublishTarget: Send + Sync {
    async fn create_document(&self, document: &NewDocument) -> Result<i64>;

    async fn update_status(&self, document_id: i64, status: DocumentStatus) -> Result<()>;

    /// Uploads `image` and links it to the document. Returns the attachment id.
    async fn attach_image(&self, image: &Image, document_id: i64, featured: bool) -> Result<i64>;

    async fn permalink(&self, document_id: i64) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct CreatePostRequest<'a> {
    title: &'a str,
    content: &'a str,
    status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    categories: Vec<i64>,
    meta: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    id: i64,
    #[serde(default)]
    link: String,
}

#[derive(Debug, Deserialize)]
struct Category {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    id: i64,
}

pub struct WordPressClient {
    client: Client,
    api_base: String,
    username: String,
    app_password: String,
    // Category ids by lowercase name
    categories: Mutex<HashMap<String, i64>>,
}

impl WordPressClient {
    pub fn new(config: &WordPressConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() || config.username.trim().is_empty() {
            return Err(AppError::Config(
                "WordPress base_url and username are required".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_base: format!("{}/wp-json/wp/v2", config.base_url.trim_end_matches('/')),
            username: config.username.clone(),
            app_password: config.app_password.clone(),
            categories: Mutex::new(HashMap::new()),
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, Some(&self.app_password))
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.authed(request).send().await?;
        if !response.status().is_success() {
            return Err(provider_error(SERVICE, response).await);
        }
        Ok(response.json().await?)
    }

    /// Id of the named category, creating it on first use.
    pub async fn ensure_category(&self, name: &str) -> Result<i64> {
        let key = name.trim().to_lowercase();
        let mut cache = self.categories.lock().await;
        if let Some(id) = cache.get(&key) {
            return Ok(*id);
        }

        let found: Vec<Category> = self
            .send_json(
                self.client
                    .get(format!("{}/categories", self.api_base))
                    .query(&[("search", name.trim()), ("per_page", "100")]),
            )
            .await?;

        let id = match found.iter().find(|c| c.name.trim().to_lowercase() == key) {
            Some(category) => category.id,
            None => {
                debug!(category = name, "Creating category");
                let created: Category = self
                    .send_json(
                        self.client
                            .post(format!("{}/categories", self.api_base))
                            .json(&json!({ "name": name.trim() })),
                    )
                    .await?;
                created.id
            }
        };

        cache.insert(key, id);
        Ok(id)
    }
}

fn meta_fields(metadata: &DocumentMetadata) -> Result<Map<String, Value>> {
    let mut meta = Map::new();
    meta.insert(
        "mednews_original_headline".to_string(),
        Value::from(metadata.original_headline.clone()),
    );
    meta.insert(
        "mednews_research_sources".to_string(),
        Value::from(serde_json::to_string(&metadata.sources)?),
    );
    meta.insert(
        "mednews_generated_by".to_string(),
        Value::from(metadata.generated_by.clone()),
    );
    if let Some(score) = metadata.quality_score {
        meta.insert("mednews_quality_score".to_string(), Value::from(score));
    }
    if let Some(notes) = &metadata.reviewer_notes {
        meta.insert("mednews_reviewer_notes".to_string(), Value::from(notes.clone()));
    }
    meta.insert(
        "mednews_processed_date".to_string(),
        Value::from(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()),
    );
    Ok(meta)
}

#[async_trait]
impl PublishTarget for WordPressClient {
    async fn create_document(&self, document: &NewDocument) -> Result<i64> {
        let mut categories = Vec::new();
        if let Some(name) = document.category.as_deref().filter(|n| !n.trim().is_empty()) {
            match self.ensure_category(name).await {
                Ok(id) => categories.push(id),
                Err(e) => warn!(category = name, error = %e, "Category lookup failed, publishing uncategorised"),
            }
        }

        let request = CreatePostRequest {
            title: &document.title,
            content: &document.body,
            status: document.status,
            author: document.author,
            categories,
            meta: meta_fields(&document.metadata)?,
        };

        let post: PostResponse = self
            .send_json(
                self.client
                    .post(format!("{}/posts", self.api_base))
                    .json(&request),
            )
            .await?;
        Ok(post.id)
    }

    async fn update_status(&self, document_id: i64, status: DocumentStatus) -> Result<()> {
        let _: PostResponse = self
            .send_json(
                self.client
                    .post(format!("{}/posts/{}", self.api_base, document_id))
                    .json(&json!({ "status": status })),
            )
            .await?;
        Ok(())
    }

    async fn attach_image(&self, image: &Image, document_id: i64, featured: bool) -> Result<i64> {
        let download = self.client.get(&image.url).send().await?;
        if !download.status().is_success() {
            return Err(AppError::provider(
                "Image download",
                format!("HTTP {} for {}", download.status(), image.url),
            ));
        }
        let content_type = download
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = download.bytes().await?;
        if bytes.is_empty() {
            return Err(AppError::EmptyResult("Image download".to_string()));
        }

        let filename = format!(
            "medical-{}-{}.jpg",
            document_id,
            Utc::now().timestamp_millis()
        );
        let media: MediaResponse = self
            .send_json(
                self.client
                    .post(format!("{}/media", self.api_base))
                    .header(reqwest::header::CONTENT_TYPE, content_type)
                    .header(
                        reqwest::header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", filename),
                    )
                    .body(bytes),
            )
            .await?;

        let caption = image
            .credit
            .as_ref()
            .map(|name| format!("Photo: {} / {}", name, image.source))
            .unwrap_or_default();
        let _: MediaResponse = self
            .send_json(
                self.client
                    .post(format!("{}/media/{}", self.api_base, media.id))
                    .json(&json!({
                        "alt_text": image.alt_text,
                        "caption": caption,
                        "post": document_id,
                    })),
            )
            .await?;

        if featured {
            let _: PostResponse = self
                .send_json(
                    self.client
                        .post(format!("{}/posts/{}", self.api_base, document_id))
                        .json(&json!({ "featured_media": media.id })),
                )
                .await?;
        }

        Ok(media.id)
    }

    async fn permalink(&self, document_id: i64) -> Result<String> {
        let post: PostResponse = self
            .send_json(
                self.client
                    .get(format!("{}/posts/{}", self.api_base, document_id))
                    .query(&[("_fields", "id,link")]),
            )
            .await?;
        Ok(post.link)
    }
}
