use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        /// Seconds from a `Retry-After` header, when the server sent one.
        retry_after: Option<u64>,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network(e) if e.is_timeout())
    }
}
