//! Alias address encoding.
//!
//! An inbound address such as `75736572406578616d706c652e636f6d@in.example.com`
//! carries the destination email hex-encoded in its local part. The first
//! line of the message body is the article URL.

use thiserror::Error;
use tracing::info;

use super::types::InboundEmail;

/// Failure to decode an inbound alias or message body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("alias address is empty")]
    EmptyAlias,

    #[error("failed decoding email from hex: {0}")]
    InvalidHex(String),

    #[error("decoded email is not valid UTF-8")]
    InvalidUtf8,

    #[error("message has no recipient")]
    MissingRecipient,

    #[error("failed reading line from email body")]
    EmptyBody,
}

/// Encode a destination email as an alias local part.
pub fn encode(email: &str) -> String {
    hex::encode(email.as_bytes())
}

/// Decode the destination email from an alias address or bare local part.
pub fn decode(alias: &str) -> Result<String, DecodeError> {
    let local = alias.split('@').next().unwrap_or_default().trim();
    if local.is_empty() {
        return Err(DecodeError::EmptyAlias);
    }

    let bytes = hex::decode(local).map_err(|e| DecodeError::InvalidHex(e.to_string()))?;
    String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)
}

/// Read the article URL from the first line of a message body.
pub fn extract_url(body: &str) -> Result<String, DecodeError> {
    body.trim()
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or(DecodeError::EmptyBody)
}

/// Pull the destination email and article URL out of an inbound email.
pub fn extract_parts(inbound: &InboundEmail) -> Result<(String, String), DecodeError> {
    let recipient = inbound
        .to_full
        .first()
        .ok_or(DecodeError::MissingRecipient)?;

    let email = decode(&recipient.email)?;
    let url = extract_url(&inbound.text_body)?;

    info!(
        alias = %recipient.email,
        email = %email,
        url = %url,
        "inbound_parts_extracted"
    );

    Ok((email, url))
}
