//! Bot configuration.
//!
//! One immutable value built at startup and shared read-only for the life
//! of the process. Connection endpoints and the token come from the
//! environment; the composition tunables have defaults and env overrides.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Immutable configuration for the bot process.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// WebSocket endpoint delivering the user event stream.
    pub stream_url: String,
    /// Base URL of the platform REST API.
    pub api_base: String,
    /// Bearer token for the platform API.
    pub token: String,
    /// Face recognizer endpoint (accepts a data-URI JPEG, returns faces).
    pub recognizer_url: String,
    /// Label registry endpoint for the `follow` subcommand.
    pub labels_url: Option<String>,
    /// Minimum top-candidate confidence for a face to be accepted.
    pub accept_threshold: f64,
    /// Maximum number of face crops attached to one reply.
    pub max_attachments: usize,
    /// Platform character limit for a post.
    pub platform_limit: usize,
    /// Codepoints reserved for platform-added content (e.g. a shortened
    /// link). Replies carry no link, so this defaults to 0.
    pub reserved_url_length: usize,
    /// Maximum concurrent in-flight replies.
    pub max_concurrency: usize,
    /// Timeout applied to every external call.
    pub request_timeout: Duration,
    /// How long to wait for in-flight replies on shutdown.
    pub shutdown_grace: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            stream_url: String::new(),
            api_base: String::new(),
            token: String::new(),
            recognizer_url: String::new(),
            labels_url: None,
            accept_threshold: 0.5,
            max_attachments: 4,
            platform_limit: 140,
            reserved_url_length: 0,
            max_concurrency: 4,
            request_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl BotConfig {
    /// Load configuration from the environment.
    ///
    /// `FACEREPLY_STREAM_URL`, `FACEREPLY_API_BASE`, `FACEREPLY_TOKEN`, and
    /// `RECOGNIZER_ENDPOINT_URL` are required; the tunables fall back to
    /// their defaults when unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            stream_url: require("FACEREPLY_STREAM_URL")?,
            api_base: require("FACEREPLY_API_BASE")?,
            token: require("FACEREPLY_TOKEN")?,
            recognizer_url: require("RECOGNIZER_ENDPOINT_URL")?,
            labels_url: env::var("LABELS_ENDPOINT_URL").ok(),
            accept_threshold: parse_or("FACEREPLY_ACCEPT_THRESHOLD", defaults.accept_threshold)?,
            max_attachments: parse_or("FACEREPLY_MAX_ATTACHMENTS", defaults.max_attachments)?,
            platform_limit: parse_or("FACEREPLY_PLATFORM_LIMIT", defaults.platform_limit)?,
            reserved_url_length: parse_or(
                "FACEREPLY_RESERVED_URL_LENGTH",
                defaults.reserved_url_length,
            )?,
            max_concurrency: parse_or("FACEREPLY_MAX_CONCURRENCY", defaults.max_concurrency)?,
            request_timeout: Duration::from_secs(parse_or(
                "FACEREPLY_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            shutdown_grace: Duration::from_secs(parse_or(
                "FACEREPLY_SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace.as_secs(),
            )?),
        })
    }

    /// Codepoints available for reply text after platform reservations.
    #[must_use]
    pub fn budget(&self) -> crate::budget::CharBudget {
        crate::budget::CharBudget::with_limit(self.platform_limit, self.reserved_url_length)
    }
}

fn require(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("missing required environment variable {key}"))
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw}")),
        Err(_) => Ok(default),
    }
}
