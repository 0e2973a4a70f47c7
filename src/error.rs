use thiserror::Error;

/// Why the portal refused a request, derived from the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiException {
    /// Expired or malformed bearer token
    InvalidToken,
    /// The account has no access to this EAN / meter
    Forbidden,
    /// Too many requests
    TooManyRequests,
    UnknownError,
}

impl ApiException {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ApiException::InvalidToken,
            403 => ApiException::Forbidden,
            429 => ApiException::TooManyRequests,
            _ => ApiException::UnknownError,
        }
    }
}

#[derive(Error, Debug)]
pub enum FluviusError {
    /// A required option is missing
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The login collaborator rejected the credentials
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The token endpoint could not be reached
    #[error("network error while fetching token: {0}")]
    TokenTransport(String),

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("request failed with HTTP {status} ({reason:?}): {body}")]
    HttpStatus {
        status: u16,
        reason: ApiException,
        body: String,
    },

    #[error("failed to parse JSON response: {0}")]
    ResponseParse(serde_json::Error),

    #[error("unexpected response: {0}")]
    UnexpectedShape(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize records: {0}")]
    Serialize(serde_json::Error),
}

impl FluviusError {
    /// Transport-level failures, as opposed to rejected or malformed data.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            FluviusError::Transport(_)
                | FluviusError::TokenTransport(_)
                | FluviusError::HttpStatus { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FluviusError>;
