use std::time::Duration;
use thiserror::Error;

/// Failure of a single provider fetch.
///
/// Absorbed by the aggregator: recorded against the provider and logged,
/// never surfaced to callers of the aggregation entry points.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed payload: {0}")]
    Parse(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider task panicked: {0}")]
    Panicked(String),
}

impl ProviderError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout(_) | ProviderError::Transport(_) => true,
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Unavailable(_) => true,
            ProviderError::Parse(_) | ProviderError::Panicked(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Parse(e.to_string())
        } else if e.is_timeout() {
            ProviderError::Timeout(Duration::ZERO)
        } else if let Some(status) = e.status() {
            ProviderError::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ProviderError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(ProviderError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(!ProviderError::Status { status: 404, body: String::new() }.is_retryable());
        assert!(!ProviderError::Parse("bad".into()).is_retryable());
        assert!(!ProviderError::Panicked("boom".into()).is_retryable());
    }
}
