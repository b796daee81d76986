//! Kindling - article-to-e-reader delivery service.
//!
//! Users submit an article URL (web form, bookmarklet, or an email to their
//! hex alias address). The article is extracted, converted to an e-book,
//! and emailed back. Bounced deliveries are resent at most once.
//!
//! ## Architecture
//!
//! ```text
//! HTTP / webhooks → Intake → Dispatcher queue → workers → extract → convert → email
//!                                                   ↘ StatusStore   ↘ BounceGuard
//! ```

pub mod bounce;
pub mod collab;
pub mod config;
pub mod dispatch;
pub mod inbound;
pub mod intake;
pub mod job;
pub mod status;
pub mod store;
pub mod web;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use bounce::{BounceError, BounceGuard};
pub use config::Config;
pub use dispatch::{DispatchError, Dispatcher, Pipeline};
pub use inbound::{BounceEvent, DecodeError, InboundEmail};
pub use intake::{Intake, IntakeError};
pub use job::{Job, JobId, ValidationError};
pub use status::{is_terminal, StatusError, StatusStore};
pub use store::{KvStore, MemoryStore, StoreError};
pub use web::AppState;
