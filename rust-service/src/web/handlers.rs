//! HTTP endpoint handlers.
//!
//! Submission endpoints answer with JSON and HTTP 200 even when the
//! submission is rejected; the `message` field tells the user why. The two
//! provider webhooks always answer `ok` so the provider never retries.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::inbound::{BounceEvent, InboundEmail};
use crate::intake::{Intake, IntakeError};
use crate::job::JobId;
use crate::status::{is_terminal, StatusError, StatusStore};

pub const SUBMITTED_MESSAGE: &str = "Submitted! Hang tight...";
pub const NOT_FOUND_MESSAGE: &str = "No job with that ID found.";
const WEBHOOK_ACK: &str = "ok";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub intake: Intake,
    pub statuses: StatusStore,
}

impl AppState {
    pub fn new(intake: Intake, statuses: StatusStore) -> Self {
        Self { intake, statuses }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Submission
// =============================================================================

/// Form or query-string submission.
#[derive(Debug, Default, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub email: String,
}

/// Submission response.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

async fn submit(state: &AppState, submission: Submission) -> Json<SubmitResponse> {
    info!(url = %submission.url, email = %submission.email, "submit_received");

    let response = match state.intake.submit(&submission.email, &submission.url).await {
        Ok(id) => SubmitResponse {
            message: SUBMITTED_MESSAGE.to_string(),
            id: Some(id.to_string()),
        },
        Err(IntakeError::Validation(e)) => {
            warn!(error = %e, "submit_invalid");
            SubmitResponse {
                message: e.to_string(),
                id: None,
            }
        }
        Err(e) => {
            error!(error = %e, "submit_failed");
            SubmitResponse {
                message: format!("Sorry, the submission failed: {}", e),
                id: None,
            }
        }
    };

    Json(response)
}

/// JSON submission endpoint.
///
/// An undecodable body is treated as an empty submission, which then fails
/// validation with a readable message.
pub async fn submit_json(
    State(state): State<AppState>,
    payload: Result<Json<Submission>, JsonRejection>,
) -> Json<SubmitResponse> {
    let submission = match payload {
        Ok(Json(submission)) => submission,
        Err(e) => {
            warn!(error = %e, "submit_decode_failed");
            Submission::default()
        }
    };

    submit(&state, submission).await
}

/// Legacy bookmarklet endpoint taking `url` and `email` query parameters.
pub async fn submit_query(
    State(state): State<AppState>,
    Query(submission): Query<Submission>,
) -> Json<SubmitResponse> {
    submit(&state, submission).await
}

// =============================================================================
// Status
// =============================================================================

/// Status poll response.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub message: String,
    pub done: bool,
}

/// Status endpoint. The path segment is the job id, optionally suffixed
/// with `.json`.
pub async fn status(
    State(state): State<AppState>,
    Path(segment): Path<String>,
) -> Json<StatusResponse> {
    let id = JobId::from(segment.strip_suffix(".json").unwrap_or(&segment));

    let response = match state.statuses.get(&id).await {
        Ok(message) => StatusResponse {
            done: is_terminal(&message),
            message,
        },
        Err(StatusError::NotFound(_)) => StatusResponse {
            message: NOT_FOUND_MESSAGE.to_string(),
            done: true,
        },
        Err(e) => {
            error!(job_id = %id, error = %e, "status_lookup_failed");
            StatusResponse {
                message: NOT_FOUND_MESSAGE.to_string(),
                done: true,
            }
        }
    };

    Json(response)
}

// =============================================================================
// Provider Webhooks
// =============================================================================

/// Inbound email webhook.
pub async fn inbound_webhook(State(state): State<AppState>, body: Bytes) -> &'static str {
    let inbound: InboundEmail = match serde_json::from_slice(&body) {
        Ok(inbound) => inbound,
        Err(e) => {
            error!(
                error = %e,
                body_preview = %String::from_utf8_lossy(&body[..body.len().min(500)]),
                "inbound_decode_failed"
            );
            return WEBHOOK_ACK;
        }
    };

    info!(
        from = %inbound.from,
        recipients = inbound.to_full.len(),
        body_length = inbound.text_body.len(),
        "inbound_webhook_received"
    );

    if let Err(e) = state.intake.submit_inbound(&inbound).await {
        warn!(from = %inbound.from, error = %e, "inbound_rejected");
    }

    WEBHOOK_ACK
}

/// Bounce webhook.
pub async fn bounce_webhook(State(state): State<AppState>, body: Bytes) -> &'static str {
    let bounce: BounceEvent = match serde_json::from_slice(&body) {
        Ok(bounce) => bounce,
        Err(e) => {
            error!(
                error = %e,
                body_preview = %String::from_utf8_lossy(&body[..body.len().min(500)]),
                "bounce_decode_failed"
            );
            return WEBHOOK_ACK;
        }
    };

    info!(
        message_id = %bounce.message_id,
        email = %bounce.email,
        kind = ?bounce.kind,
        "bounce_webhook_received"
    );

    match state.intake.resend_after_bounce(&bounce).await {
        Ok(_) | Err(IntakeError::AlreadyResent { .. }) => {}
        Err(e) => warn!(message_id = %bounce.message_id, error = %e, "bounce_resend_aborted"),
    }

    WEBHOOK_ACK
}
