//! External collaborators a job runs through.
//!
//! ```text
//! ArticleExtractor → Converter → Mailer
//! ```
//!
//! Each is a trait so the dispatcher can be exercised with fakes; the
//! concrete clients here are deliberately thin.

pub mod kindlegen;
pub mod mercury;
pub mod postmark;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::inbound::BounceEvent;
use crate::job::JobId;

pub use kindlegen::KindlegenConverter;
pub use mercury::MercuryClient;
pub use postmark::PostmarkClient;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service rejected request: {0}")]
    Rejected(String),

    #[error("article has no readable content")]
    EmptyArticle,

    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Readable article content.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Article {
    pub fn title_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(fallback)
    }
}

/// A converted e-book ready to attach.
#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    pub title: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ArticleExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<Article, CollaboratorError>;
}

#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, id: &JobId, article: &Article) -> Result<Document, CollaboratorError>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send the document and return the provider's message id.
    async fn deliver(&self, to: &str, document: &Document) -> Result<String, CollaboratorError>;

    /// Lift the provider's suppression of a bounced recipient.
    async fn reactivate(&self, bounce: &BounceEvent) -> Result<(), CollaboratorError>;
}
