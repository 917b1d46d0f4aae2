#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Failed to call {call}: {source}")]
    Transport {
        call: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{call} returned {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Status {
        call: String,
        status: u16,
        message: Option<String>,
    },
    #[error("Failed to parse {call} response: {source}")]
    Decode {
        call: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    /// Errors that say nothing about the request itself, only that the
    /// backend could not be reached.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_connect() || source.is_timeout(),
            Self::Unavailable(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
