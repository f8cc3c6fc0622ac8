//! Shared fixtures for unit tests: a throwaway database and in-memory
//! stand-ins for every external service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::ai::{Citation, Generation, Provider, ResearchClient, ResearchResponse, TextGenerator};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::services::{
    ArticleImages, DocumentStatus, Image, ImageSource, NewDocument, Notifier, PublishTarget,
};

pub async fn test_repository() -> (Repository, TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.db");
    let repo = Repository::new(path.to_str().expect("utf-8 path"))
        .await
        .expect("open test database");
    (repo, dir)
}

pub struct FakeResearch {
    text: String,
    citations: Vec<Citation>,
    error: Option<String>,
    fail_when: Option<String>,
    calls: AtomicUsize,
}

impl FakeResearch {
    pub fn answering(text: &str, citations: Vec<Citation>) -> Self {
        Self {
            text: text.to_string(),
            citations,
            error: None,
            fail_when: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::answering("", Vec::new())
        }
    }

    /// Fails only for prompts containing `needle`.
    pub fn failing_when(mut self, needle: &str) -> Self {
        self.fail_when = Some(needle.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResearchClient for FakeResearch {
    async fn research(&self, prompt: &str) -> Result<ResearchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.error {
            return Err(AppError::provider("Perplexity", message.clone()));
        }
        if self.fail_when.as_deref().is_some_and(|n| prompt.contains(n)) {
            return Err(AppError::provider("Perplexity", "All models failed"));
        }
        Ok(ResearchResponse {
            text: self.text.clone(),
            citations: self.citations.clone(),
            tokens_used: Some(900),
            model: "sonar-pro".to_string(),
        })
    }
}

pub struct FakeGenerator {
    text: String,
    provider: Provider,
    tokens: Option<u32>,
    error: Option<String>,
    calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn answering(text: &str) -> Self {
        Self {
            text: text.to_string(),
            provider: Provider::OpenAi,
            tokens: None,
            error: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::answering("")
        }
    }

    pub fn with_tokens(mut self, tokens: u32) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn generate(&self, _system_prompt: &str, _user_prompt: &str) -> Result<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.error {
            return Err(AppError::provider(self.provider.as_str(), message.clone()));
        }
        Ok(Generation {
            text: self.text.clone(),
            tokens_used: self.tokens,
        })
    }
}

#[derive(Default)]
pub struct FakePublishTarget {
    pub documents: Mutex<Vec<NewDocument>>,
    pub status_updates: Mutex<Vec<(i64, DocumentStatus)>>,
    pub attachments: Mutex<Vec<(String, i64, bool)>>,
    pub fail_attachments: bool,
}

impl FakePublishTarget {
    pub fn failing_attachments() -> Self {
        Self {
            fail_attachments: true,
            ..Self::default()
        }
    }

    pub fn document_count(&self) -> usize {
        self.documents.lock().unwrap().len()
    }
}

#[async_trait]
impl PublishTarget for FakePublishTarget {
    async fn create_document(&self, document: &NewDocument) -> Result<i64> {
        let mut documents = self.documents.lock().unwrap();
        documents.push(document.clone());
        Ok(100 + documents.len() as i64)
    }

    async fn update_status(&self, document_id: i64, status: DocumentStatus) -> Result<()> {
        self.status_updates.lock().unwrap().push((document_id, status));
        Ok(())
    }

    async fn attach_image(&self, image: &Image, document_id: i64, featured: bool) -> Result<i64> {
        if self.fail_attachments {
            return Err(AppError::provider("WordPress", "upload rejected"));
        }
        let mut attachments = self.attachments.lock().unwrap();
        attachments.push((image.url.clone(), document_id, featured));
        Ok(500 + attachments.len() as i64)
    }

    async fn permalink(&self, document_id: i64) -> Result<String> {
        Ok(format!("https://news.example/?p={}", document_id))
    }
}

pub struct FakeImages {
    images: Option<ArticleImages>,
}

impl FakeImages {
    pub fn with_featured(url: &str) -> Self {
        Self {
            images: Some(ArticleImages {
                featured: Some(image(url)),
                content: vec![image(&format!("{}-content", url))],
            }),
        }
    }

    pub fn failing() -> Self {
        Self { images: None }
    }
}

fn image(url: &str) -> Image {
    Image {
        url: url.to_string(),
        alt_text: "Laboratory equipment".to_string(),
        credit: Some("Ana".to_string()),
        credit_url: None,
        source: "unsplash".to_string(),
    }
}

#[async_trait]
impl ImageSource for FakeImages {
    async fn article_images(
        &self,
        _headline: &str,
        _category: Option<&str>,
        _content: &str,
    ) -> Result<ArticleImages> {
        self.images
            .clone()
            .ok_or_else(|| AppError::provider("Unsplash", "rate limited"))
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub sent: Mutex<Vec<(Vec<String>, String)>>,
    pub fail: bool,
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, recipients: &[String], subject: &str, _body: &str) -> Result<()> {
        if self.fail {
            return Err(AppError::provider("Notification webhook", "HTTP 500"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipients.to_vec(), subject.to_string()));
        Ok(())
    }
}
