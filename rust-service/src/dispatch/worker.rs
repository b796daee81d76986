//! Per-job processing.
//!
//! A worker owns one `Job` from dequeue to its final status write. Every
//! collaborator failure ends up as a terminal status message; nothing
//! escapes to the pool.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::bounce::BounceGuard;
use crate::collab::{ArticleExtractor, Converter, Mailer};
use crate::job::{Job, JobId};
use crate::status::StatusStore;

pub const EXTRACTING_MESSAGE: &str = "Extracting article...";
pub const CONVERTING_MESSAGE: &str = "Converting to e-book...";
pub const EMAILING_MESSAGE: &str = "Emailing...";
pub const DONE_MESSAGE: &str = "Done! Emailed.";

/// Everything a worker needs to run a job.
#[derive(Clone)]
pub struct Pipeline {
    pub extractor: Arc<dyn ArticleExtractor>,
    pub converter: Arc<dyn Converter>,
    pub mailer: Arc<dyn Mailer>,
    pub statuses: StatusStore,
    pub bounces: BounceGuard,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Delivered { message_id: String },
    Failed { message: String },
}

impl Pipeline {
    async fn report(&self, id: &JobId, message: &str) {
        if let Err(e) = self.statuses.set_progress(id, message).await {
            warn!(job_id = %id, error = %e, "status_write_failed");
        }
    }

    pub(crate) async fn fail(&self, id: &JobId, message: String) -> JobOutcome {
        error!(job_id = %id, message = %message, "job_failed");
        if let Err(e) = self.statuses.fail(id, &message).await {
            warn!(job_id = %id, error = %e, "status_write_failed");
        }
        JobOutcome::Failed { message }
    }

    /// Run one job through extraction, conversion and delivery.
    pub async fn process(&self, job: Job) -> JobOutcome {
        let id = job.id();

        info!(job_id = %id, email = %job.email(), url = %job.url(), "job_started");

        self.report(id, EXTRACTING_MESSAGE).await;
        let article = match self.extractor.extract(job.url()).await {
            Ok(article) => article,
            Err(e) => {
                return self
                    .fail(id, format!("Sorry, the article could not be extracted: {}", e))
                    .await
            }
        };

        self.report(id, CONVERTING_MESSAGE).await;
        let document = match self.converter.convert(id, &article).await {
            Ok(document) => document,
            Err(e) => {
                return self
                    .fail(id, format!("Sorry, conversion failed: {}", e))
                    .await
            }
        };

        self.report(id, EMAILING_MESSAGE).await;
        let message_id = match self.mailer.deliver(job.email(), &document).await {
            Ok(message_id) => message_id,
            Err(e) => {
                return self
                    .fail(id, format!("Sorry, the email could not be sent: {}", e))
                    .await
            }
        };

        // A lost record only costs bounce recovery for this message.
        if let Err(e) = self
            .bounces
            .record_submission(&message_id, job.email(), job.url())
            .await
        {
            warn!(job_id = %id, message_id = %message_id, error = %e, "bounce_record_failed");
        }

        if let Err(e) = self.statuses.finish(id, DONE_MESSAGE).await {
            warn!(job_id = %id, error = %e, "status_write_failed");
        }

        info!(
            job_id = %id,
            message_id = %message_id,
            size = document.bytes.len(),
            "job_delivered"
        );

        JobOutcome::Delivered { message_id }
    }
}
