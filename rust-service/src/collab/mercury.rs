//! Article extraction over the Mercury parser API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{error, info};

use super::{Article, ArticleExtractor, CollaboratorError};

pub struct MercuryClient {
    client: Client,
    endpoint: String,
    token: String,
    timeout: Duration,
}

impl MercuryClient {
    pub fn new(client: Client, endpoint: String, token: String, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            token,
            timeout,
        }
    }
}

#[async_trait]
impl ArticleExtractor for MercuryClient {
    async fn extract(&self, url: &str) -> Result<Article, CollaboratorError> {
        info!(url = %url, "mercury_extract_starting");

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("url", url)])
            .header("x-api-key", &self.token)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(url = %url, status_code = status.as_u16(), "mercury_extract_rejected");
            let preview: String = body.chars().take(200).collect();
            return Err(CollaboratorError::Rejected(format!("{}: {}", status, preview)));
        }

        let article: Article = resp.json().await?;

        let has_content = article
            .content
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false);
        if !has_content {
            return Err(CollaboratorError::EmptyArticle);
        }

        info!(
            url = %url,
            title = ?article.title,
            content_length = article.content.as_ref().map(|c| c.len()).unwrap_or(0),
            "mercury_extract_complete"
        );

        Ok(article)
    }
}
