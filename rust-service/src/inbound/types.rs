//! Webhook payload types from the mail provider.
//!
//! Field names follow the provider's PascalCase JSON.

use serde::{Deserialize, Serialize};

/// A recipient entry of an inbound email.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Recipient {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

/// Inbound email webhook payload.
///
/// Only the recipient list and the plain text body are consumed; the
/// remaining fields are accepted so the payload deserializes cleanly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InboundEmail {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    /// Parsed recipients. The first one carries the alias address.
    #[serde(default)]
    pub to_full: Vec<Recipient>,
    #[serde(default, rename = "MessageID")]
    pub message_id: String,
    /// Plain text body; its first line is the article URL
    #[serde(default)]
    pub text_body: String,
}

/// Bounce webhook payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BounceEvent {
    /// Provider bounce identifier, needed to reactivate the recipient
    #[serde(default, rename = "ID")]
    pub id: Option<i64>,
    /// Message id of the outbound email that bounced
    #[serde(rename = "MessageID")]
    pub message_id: String,
    /// Recipient that bounced
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(default, rename = "Type")]
    pub kind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_email_deserialization() {
        let json = r#"{
            "From": "reader@example.com",
            "Subject": "article",
            "ToFull": [{"Email": "7573@in.example.com", "Name": ""}],
            "MessageID": "abc-123",
            "TextBody": "http://example.com/a\n",
            "HtmlBody": "<p>ignored</p>",
            "Headers": []
        }"#;

        let inbound: InboundEmail = serde_json::from_str(json).unwrap();
        assert_eq!(inbound.to_full.len(), 1);
        assert_eq!(inbound.to_full[0].email, "7573@in.example.com");
        assert_eq!(inbound.text_body, "http://example.com/a\n");
        assert_eq!(inbound.message_id, "abc-123");
    }

    #[test]
    fn test_inbound_email_minimal() {
        let inbound: InboundEmail = serde_json::from_str("{}").unwrap();
        assert!(inbound.to_full.is_empty());
        assert!(inbound.text_body.is_empty());
    }

    #[test]
    fn test_bounce_deserialization() {
        let json = r#"{
            "ID": 4323372036854775807,
            "Type": "HardBounce",
            "MessageID": "883953f4-6105-42a2-a16a-77a8eac79483",
            "Email": "user@example.com",
            "Description": "The server was unable to deliver your message"
        }"#;

        let bounce: BounceEvent = serde_json::from_str(json).unwrap();
        assert_eq!(bounce.id, Some(4323372036854775807));
        assert_eq!(bounce.message_id, "883953f4-6105-42a2-a16a-77a8eac79483");
        assert_eq!(bounce.email, "user@example.com");
        assert_eq!(bounce.kind.as_deref(), Some("HardBounce"));
    }

    #[test]
    fn test_bounce_requires_message_id() {
        let result: Result<BounceEvent, _> = serde_json::from_str(r#"{"Email": "a@b.com"}"#);
        assert!(result.is_err());
    }
}
