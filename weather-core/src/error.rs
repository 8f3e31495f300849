//! Error taxonomy for weather lookups.

use thiserror::Error;

/// Failure reported by a [`crate::provider::WeatherProvider`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// HTTP status reported by the upstream, if the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            ProviderError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("fetch failed for '{city}': {source}")]
    Fetch {
        city: String,
        #[source]
        source: ProviderError,
    },
    #[error("configuration error: {0}")]
    Config(String),
}
