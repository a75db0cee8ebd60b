use thiserror::Error;

/// Why a single attempt against an audio source failed
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rate limited by audio source")]
    RateLimited,

    #[error("network error: {0}")]
    Network(String),

    #[error("audio source responded with HTTP {status}")]
    Http { status: u16 },

    #[error("no match found for '{0}'")]
    NoMatch(String),

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, SourceError::RateLimited)
    }

    /// network trouble or a gateway that may recover on its own
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Network(_) => true,
            SourceError::Http { status } => matches!(status, 502..=504),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                SourceError::RateLimited
            }
            Some(status) => SourceError::Http {
                status: status.as_u16(),
            },
            None => SourceError::Network(err.to_string()),
        }
    }
}

/// A track could not be fetched within its retry budget.
#[derive(Debug, Error)]
#[error("failed to fetch '{query}' after {attempts} attempt(s): {source}")]
pub struct FetchError {
    pub query: String,
    pub attempts: u32,
    #[source]
    pub source: SourceError,
}
