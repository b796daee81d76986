//! Job creation and identity derivation.
//!
//! A `Job` pairs a destination email with an article URL. Its identity is
//! handed back to the submitter for status polling, so it must be unique
//! across concurrent submissions and safe to embed in a URL path.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Number of digest bytes kept in an identity.
const ID_BYTES: usize = 16;

/// Rejected submission.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Email address {0:?} is invalid")]
    InvalidEmail(String),

    #[error("URL {0:?} is invalid")]
    InvalidUrl(String),
}

/// Opaque job identity, 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Derive a fresh identity for the given submission.
    ///
    /// The digest mixes the pair with the wall clock and random bytes, so two
    /// identical submissions never share an identity.
    fn derive(email: &str, url: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();

        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut hasher = Sha256::new();
        hasher.update(email.as_bytes());
        hasher.update(b"\n");
        hasher.update(url.as_bytes());
        hasher.update(b"\n");
        hasher.update(nanos.to_be_bytes());
        hasher.update(b"\n");
        hasher.update(nonce);
        let digest = hasher.finalize();

        JobId(hex::encode(&digest[..ID_BYTES]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(raw: String) -> Self {
        JobId(raw)
    }
}

impl From<&str> for JobId {
    fn from(raw: &str) -> Self {
        JobId(raw.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One queued article conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    email: String,
    url: String,
    id: JobId,
}

impl Job {
    /// Validate a submission and mint a job for it.
    pub fn new(email: &str, url: &str) -> Result<Self, ValidationError> {
        let email = email.trim();
        let url = url.trim();

        if !is_plausible_email(email) {
            return Err(ValidationError::InvalidEmail(email.to_string()));
        }
        if !is_plausible_url(url) {
            return Err(ValidationError::InvalidUrl(url.to_string()));
        }

        Ok(Job {
            id: JobId::derive(email, url),
            email: email.to_string(),
            url: url.to_string(),
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }
}

/// A single `@`, a non-empty local part, and a dotted domain.
fn is_plausible_email(email: &str) -> bool {
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Absolute http(s) URL with a host.
fn is_plausible_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().map(|h| !h.is_empty()).unwrap_or(false)
        }
        Err(_) => false,
    }
}
