//! Inbound webhook payloads and the alias address convention.
//!
//! ```text
//! InboundEmail → extract_parts() → (destination email, article URL)
//! ```

pub mod alias;
pub mod types;

pub use alias::{decode, encode, extract_parts, extract_url, DecodeError};
pub use types::{BounceEvent, InboundEmail, Recipient};
