//! In-process fakes for the collaborators, shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::bounce::BounceGuard;
use crate::collab::{Article, ArticleExtractor, CollaboratorError, Converter, Document, Mailer};
use crate::dispatch::Pipeline;
use crate::inbound::BounceEvent;
use crate::job::JobId;
use crate::status::{is_terminal, StatusStore};
use crate::store::MemoryStore;

/// Fails for URLs containing `fail-extract`.
pub struct FakeExtractor;

#[async_trait]
impl ArticleExtractor for FakeExtractor {
    async fn extract(&self, url: &str) -> Result<Article, CollaboratorError> {
        if url.contains("fail-extract") {
            return Err(CollaboratorError::EmptyArticle);
        }
        Ok(Article {
            title: Some(format!("Title of {}", url)),
            content: Some("<p>content</p>".to_string()),
            url: Some(url.to_string()),
        })
    }
}

/// Panics for articles whose URL contains `panic-convert`.
pub struct FakeConverter;

#[async_trait]
impl Converter for FakeConverter {
    async fn convert(&self, _id: &JobId, article: &Article) -> Result<Document, CollaboratorError> {
        if article.url.as_deref().unwrap_or_default().contains("panic-convert") {
            panic!("converter blew up");
        }
        Ok(Document {
            filename: "article.mobi".to_string(),
            title: article.title_or("Article").to_string(),
            bytes: b"MOBI".to_vec(),
        })
    }
}

#[derive(Default)]
pub struct FakeMailer {
    delivered: Mutex<Vec<String>>,
    reactivated: Mutex<Vec<String>>,
    sent: AtomicUsize,
    reject: bool,
    fail_reactivation: bool,
    gate: Option<Arc<Semaphore>>,
}

impl FakeMailer {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn failing_reactivation() -> Self {
        Self {
            fail_reactivation: true,
            ..Default::default()
        }
    }

    /// Every delivery waits for a permit from `gate`.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn reactivated(&self) -> Vec<String> {
        self.reactivated.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn deliver(&self, to: &str, _document: &Document) -> Result<String, CollaboratorError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.reject {
            return Err(CollaboratorError::Rejected("inactive recipient".to_string()));
        }
        let n = self.sent.fetch_add(1, Ordering::SeqCst);
        self.delivered.lock().unwrap().push(to.to_string());
        Ok(format!("msg-{}", n))
    }

    async fn reactivate(&self, bounce: &BounceEvent) -> Result<(), CollaboratorError> {
        if self.fail_reactivation {
            return Err(CollaboratorError::Rejected("cannot reactivate".to_string()));
        }
        self.reactivated.lock().unwrap().push(bounce.email.clone());
        Ok(())
    }
}

/// Pipeline over fresh in-memory stores and the fake collaborators.
pub fn pipeline(mailer: Arc<FakeMailer>) -> Pipeline {
    let store = Arc::new(MemoryStore::new());
    Pipeline {
        extractor: Arc::new(FakeExtractor),
        converter: Arc::new(FakeConverter),
        mailer,
        statuses: StatusStore::new(store.clone(), Duration::from_secs(3600)),
        bounces: BounceGuard::new(store, Duration::from_secs(3600)),
    }
}

/// Poll until the job's status is terminal, or give up after five seconds.
pub async fn wait_terminal(statuses: &StatusStore, id: &JobId) -> String {
    let poll = async {
        loop {
            if let Ok(message) = statuses.get(id).await {
                if is_terminal(&message) {
                    return message;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .expect("job did not finish in time")
}

/// Poll until the job's status equals `expected`.
pub async fn wait_status(statuses: &StatusStore, id: &JobId, expected: &str) {
    let poll = async {
        loop {
            if statuses.get(id).await.ok().as_deref() == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .expect("status never reached expected value");
}
