use std::path::PathBuf;
use thiserror::Error;

/// Failure downloading a single artifact. Retried up to the configured
/// attempt bound by the fetcher; the final attempt's error surfaces here.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected status {status} from {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("empty body from {url}")]
    EmptyBody { url: String },
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure fetching metadata from the remote platform. Auth failures are a
/// distinct variant so callers never have to string-match error text.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("session invalid or expired: {0}")]
    AuthInvalid(String),
    #[error("metadata request failed: {0}")]
    Http(String),
    #[error("unexpected metadata payload: {0}")]
    Parse(String),
}

const AUTH_PHRASES: [&str; 4] = ["登录", "login", "cookie", "unauthorized"];

impl MetadataError {
    pub fn is_auth(&self) -> bool {
        matches!(self, MetadataError::AuthInvalid(_))
    }

    /// Classify a platform-reported failure message. The platform only gives
    /// free text, so known session-expiry phrases map to `AuthInvalid`.
    pub fn from_platform_message(msg: &str) -> Self {
        let lower = msg.to_lowercase();
        if AUTH_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
            MetadataError::AuthInvalid(msg.to_string())
        } else {
            MetadataError::Http(msg.to_string())
        }
    }
}
