//! Configuration module for environment variable parsing.
//!
//! Everything is read once at startup and treated as fixed for the lifetime
//! of the process.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Redis connection URL. `None` selects the in-process store.
    pub redis_url: Option<String>,

    // =========================================================================
    // Collaborators
    // =========================================================================

    /// API key for the article extraction service
    pub mercury_token: String,

    /// Article extraction endpoint
    pub mercury_url: String,

    /// Server token for the delivery API
    pub postmark_token: String,

    /// Base URL of the delivery API
    pub postmark_url: String,

    /// Sender address on outbound result emails
    pub from: String,

    /// Path or name of the e-book conversion binary
    pub kindlegen_binary: String,

    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    // =========================================================================
    // Dispatcher
    // =========================================================================

    /// Number of concurrently running workers
    pub worker_concurrency: usize,

    /// Capacity of the bounded job queue
    pub queue_capacity: usize,

    // =========================================================================
    // Retention
    // =========================================================================

    /// How long status records stay visible, in seconds
    pub status_ttl_secs: u64,

    /// How long bounce records are kept, in seconds
    pub bounce_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Config {
            port: parse_or("PORT", 8080),

            redis_url: non_empty("REDIS_URL").or_else(|| non_empty("REDISCLOUD_URL")),

            mercury_token: env::var("MERCURY_TOKEN").unwrap_or_default(),

            mercury_url: env::var("MERCURY_URL")
                .unwrap_or_else(|_| "https://mercury.postlight.com/parser".to_string()),

            postmark_token: env::var("POSTMARK_TOKEN").unwrap_or_default(),

            postmark_url: env::var("POSTMARK_URL")
                .unwrap_or_else(|_| "https://api.postmarkapp.com".to_string()),

            from: env::var("FROM").unwrap_or_else(|_| "kindling@localhost".to_string()),

            kindlegen_binary: env::var("KINDLEGEN_BINARY")
                .unwrap_or_else(|_| format!("kindlegen-{}", env::consts::OS)),

            request_timeout_ms: parse_or("REQUEST_TIMEOUT_MS", 30_000),

            worker_concurrency: parse_or("WORKER_CONCURRENCY", default_workers).max(1),

            queue_capacity: parse_or("QUEUE_CAPACITY", 10).max(1),

            status_ttl_secs: parse_or("STATUS_TTL_SECS", 3600),

            bounce_ttl_secs: parse_or("BOUNCE_TTL_SECS", 7 * 24 * 3600),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }

    pub fn bounce_ttl(&self) -> Duration {
        Duration::from_secs(self.bounce_ttl_secs)
    }
}

/// Parse a variable, falling back to `default` when unset or malformed.
fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

/// Read a variable, treating blank values as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
