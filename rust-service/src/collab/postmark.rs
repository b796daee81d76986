//! Result delivery and bounce reactivation over the Postmark API.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{CollaboratorError, Document, Mailer};
use crate::inbound::BounceEvent;

const TOKEN_HEADER: &str = "X-Postmark-Server-Token";
const MOBI_CONTENT_TYPE: &str = "application/x-mobipocket-ebook";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct OutboundEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text_body: String,
    attachments: Vec<Attachment<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Attachment<'a> {
    name: &'a str,
    content: String,
    content_type: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendResponse {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    message: String,
    #[serde(default, rename = "MessageID")]
    message_id: Option<String>,
}

pub struct PostmarkClient {
    client: Client,
    base_url: String,
    token: String,
    from: String,
    timeout: Duration,
}

impl PostmarkClient {
    pub fn new(
        client: Client,
        base_url: String,
        token: String,
        from: String,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            from,
            timeout,
        }
    }

    fn build_email<'a>(&'a self, to: &'a str, document: &'a Document) -> OutboundEmail<'a> {
        OutboundEmail {
            from: &self.from,
            to,
            subject: "convert",
            text_body: format!("Here is your article: {}", document.title),
            attachments: vec![Attachment {
                name: &document.filename,
                content: STANDARD.encode(&document.bytes),
                content_type: MOBI_CONTENT_TYPE,
            }],
        }
    }
}

#[async_trait]
impl Mailer for PostmarkClient {
    async fn deliver(&self, to: &str, document: &Document) -> Result<String, CollaboratorError> {
        let email = self.build_email(to, document);

        let resp = self
            .client
            .post(format!("{}/email", self.base_url))
            .header(TOKEN_HEADER, &self.token)
            .header("Accept", "application/json")
            .json(&email)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        let body: SendResponse = resp.json().await?;

        match body.message_id {
            Some(message_id) if status.is_success() && body.error_code == 0 => {
                info!(
                    to = %to,
                    message_id = %message_id,
                    attachment_size = document.bytes.len(),
                    "postmark_delivered"
                );
                Ok(message_id)
            }
            _ => {
                error!(
                    to = %to,
                    status_code = status.as_u16(),
                    error_code = body.error_code,
                    message = %body.message,
                    "postmark_delivery_rejected"
                );
                Err(CollaboratorError::Rejected(format!(
                    "{} ({})",
                    body.message, body.error_code
                )))
            }
        }
    }

    async fn reactivate(&self, bounce: &BounceEvent) -> Result<(), CollaboratorError> {
        let id = bounce.id.ok_or_else(|| {
            CollaboratorError::Rejected(format!(
                "bounce for message {} has no ID to reactivate",
                bounce.message_id
            ))
        })?;

        let resp = self
            .client
            .put(format!("{}/bounces/{}/activate", self.base_url, id))
            .header(TOKEN_HEADER, &self.token)
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            return Err(CollaboratorError::Rejected(format!("{}: {}", status, preview)));
        }

        info!(bounce_id = id, email = %bounce.email, "postmark_bounce_reactivated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PostmarkClient {
        PostmarkClient::new(
            Client::new(),
            "https://api.example.com/".to_string(),
            "token".to_string(),
            "kindling@example.com".to_string(),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_base_url_trimmed() {
        assert_eq!(client().base_url, "https://api.example.com");
    }

    #[test]
    fn test_outbound_email_shape() {
        let client = client();
        let document = Document {
            filename: "An-Article.mobi".to_string(),
            title: "An Article".to_string(),
            bytes: b"MOBI".to_vec(),
        };

        let json = serde_json::to_value(client.build_email("user@example.com", &document)).unwrap();

        assert_eq!(json["From"], "kindling@example.com");
        assert_eq!(json["To"], "user@example.com");
        assert_eq!(json["Attachments"][0]["Name"], "An-Article.mobi");
        assert_eq!(json["Attachments"][0]["Content"], "TU9CSQ==");
        assert_eq!(json["Attachments"][0]["ContentType"], MOBI_CONTENT_TYPE);
    }

    #[test]
    fn test_send_response_deserialization() {
        let json = r#"{
            "To": "user@example.com",
            "SubmittedAt": "2014-02-17T07:25:01.4178645-05:00",
            "MessageID": "0a129aee-e1cd-480d-b08d-4f48548ff48d",
            "ErrorCode": 0,
            "Message": "OK"
        }"#;

        let resp: SendResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.error_code, 0);
        assert_eq!(
            resp.message_id.as_deref(),
            Some("0a129aee-e1cd-480d-b08d-4f48548ff48d")
        );
    }

    #[tokio::test]
    async fn test_reactivate_without_id_is_rejected() {
        let bounce = BounceEvent {
            id: None,
            message_id: "m".to_string(),
            email: "user@example.com".to_string(),
            kind: None,
        };

        let result = client().reactivate(&bounce).await;
        assert!(matches!(result, Err(CollaboratorError::Rejected(_))));
    }
}
