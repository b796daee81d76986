//! Bounce idempotency.
//!
//! When a result email goes out, the worker records which article URL it
//! carried, keyed by the provider's message id and the recipient. A later
//! bounce for that pair recovers the URL and triggers at most one resend,
//! no matter how often the provider redelivers the notification.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::store::{KvStore, StoreError};

#[derive(Debug, Error)]
pub enum BounceError {
    #[error("no submission on record for message {message_id} to {email}")]
    NotFound { message_id: String, email: String },

    #[error("message {message_id} to {email} was already resent")]
    AlreadyResent { message_id: String, email: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Guards resends behind an atomic per-(message, recipient) claim.
#[derive(Clone)]
pub struct BounceGuard {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl BounceGuard {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn base_key(message_id: &str, email: &str) -> String {
        format!(
            "bounce:{}:{}",
            message_id.trim(),
            email.trim().to_lowercase()
        )
    }

    fn url_key(message_id: &str, email: &str) -> String {
        format!("{}:url", Self::base_key(message_id, email))
    }

    fn resent_key(message_id: &str, email: &str) -> String {
        format!("{}:resent", Self::base_key(message_id, email))
    }

    /// Remember which URL an outbound message carried.
    pub async fn record_submission(
        &self,
        message_id: &str,
        email: &str,
        url: &str,
    ) -> Result<(), BounceError> {
        self.store
            .set_ex(&Self::url_key(message_id, email), url, self.ttl)
            .await?;

        info!(message_id = %message_id, email = %email, url = %url, "bounce_submission_recorded");
        Ok(())
    }

    /// Whether a resend has already been claimed for this pair.
    pub async fn already_resent(&self, message_id: &str, email: &str) -> Result<bool, BounceError> {
        let marker = self
            .store
            .get(&Self::resent_key(message_id, email))
            .await?;
        Ok(marker.is_some())
    }

    /// Claim the resend for this pair and return the original URL.
    ///
    /// Exactly one caller per pair gets `Ok`; everyone after it gets
    /// `AlreadyResent`. A pair with no recorded submission yields `NotFound`
    /// and claims nothing.
    pub async fn mark_resent(&self, message_id: &str, email: &str) -> Result<String, BounceError> {
        let url = self
            .store
            .get(&Self::url_key(message_id, email))
            .await?
            .ok_or_else(|| BounceError::NotFound {
                message_id: message_id.to_string(),
                email: email.to_string(),
            })?;

        let claimed = self
            .store
            .set_if_absent(&Self::resent_key(message_id, email), "1", self.ttl)
            .await?;

        if !claimed {
            warn!(message_id = %message_id, email = %email, "bounce_claim_lost");
            return Err(BounceError::AlreadyResent {
                message_id: message_id.to_string(),
                email: email.to_string(),
            });
        }

        info!(message_id = %message_id, email = %email, url = %url, "bounce_marked_resent");
        Ok(url)
    }
}
