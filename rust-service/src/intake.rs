//! Submission flows shared by the HTTP handlers.
//!
//! ```text
//! form / query     → Job::new → Dispatcher::queue
//! inbound email    → extract_parts → Job::new → Dispatcher::queue
//! bounce           → BounceGuard → reactivate → mark_resent → Job::new → queue
//! ```

use thiserror::Error;
use tracing::{error, info};

use crate::bounce::{BounceError, BounceGuard};
use crate::collab::CollaboratorError;
use crate::dispatch::{DispatchError, Dispatcher};
use crate::inbound::{extract_parts, BounceEvent, DecodeError, InboundEmail};
use crate::job::{Job, JobId, ValidationError};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Bounce(#[from] BounceError),

    #[error("message {message_id} to {email} was already resent")]
    AlreadyResent { message_id: String, email: String },

    #[error("failed reactivating bounced recipient: {0}")]
    Reactivate(#[from] CollaboratorError),
}

#[derive(Clone)]
pub struct Intake {
    dispatcher: Dispatcher,
    bounces: BounceGuard,
}

impl Intake {
    pub fn new(dispatcher: Dispatcher, bounces: BounceGuard) -> Self {
        Self {
            dispatcher,
            bounces,
        }
    }

    #[cfg(test)]
    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Validate a form submission and queue it.
    pub async fn submit(&self, email: &str, url: &str) -> Result<JobId, IntakeError> {
        let job = Job::new(email, url)?;
        let id = self.dispatcher.queue(job).await?;

        info!(job_id = %id, email = %email, url = %url, "submit_queued");
        Ok(id)
    }

    /// Queue the article named by an inbound email to its alias address.
    pub async fn submit_inbound(&self, inbound: &InboundEmail) -> Result<JobId, IntakeError> {
        let (email, url) = extract_parts(inbound)?;
        let job = Job::new(&email, &url)?;
        let id = self.dispatcher.queue(job).await?;

        info!(job_id = %id, email = %email, url = %url, "inbound_queued");
        Ok(id)
    }

    /// Resend the article behind a bounced message, at most once.
    pub async fn resend_after_bounce(&self, bounce: &BounceEvent) -> Result<JobId, IntakeError> {
        if self
            .bounces
            .already_resent(&bounce.message_id, &bounce.email)
            .await?
        {
            info!(message_id = %bounce.message_id, email = %bounce.email, "bounce_resend_skipped");
            return Err(IntakeError::AlreadyResent {
                message_id: bounce.message_id.clone(),
                email: bounce.email.clone(),
            });
        }

        self.dispatcher.reactivate(bounce).await?;

        let url = match self
            .bounces
            .mark_resent(&bounce.message_id, &bounce.email)
            .await
        {
            Ok(url) => url,
            Err(BounceError::AlreadyResent { message_id, email }) => {
                info!(message_id = %message_id, email = %email, "bounce_resend_skipped");
                return Err(IntakeError::AlreadyResent { message_id, email });
            }
            Err(e) => return Err(e.into()),
        };

        // The claim is spent from here on.
        let queued = match Job::new(&bounce.email, &url) {
            Ok(job) => self.dispatcher.queue(job).await.map_err(IntakeError::from),
            Err(e) => Err(e.into()),
        };
        let id = queued.map_err(|e| {
            error!(
                message_id = %bounce.message_id,
                email = %bounce.email,
                url = %url,
                error = %e,
                "bounce_resend_lost"
            );
            e
        })?;

        info!(
            job_id = %id,
            message_id = %bounce.message_id,
            email = %bounce.email,
            url = %url,
            "bounce_resend_queued"
        );
        Ok(id)
    }
}
