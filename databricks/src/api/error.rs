use thiserror::Error;

/// Error codes the platform uses when the addressed object does not exist
const MISSING_ERROR_CODES: &[&str] = &["RESOURCE_DOES_NOT_EXIST", "NOT_FOUND"];

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// The addressed object does not exist (HTTP 404 or a not-found error code)
    #[error("{message}")]
    Missing {
        status: u16,
        error_code: Option<String>,
        message: String,
    },

    #[error("API returned error (HTTP {status}): {message}")]
    ApiError {
        status: u16,
        error_code: Option<String>,
        message: String,
    },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Invalid host: {0}")]
    InvalidHost(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Too many requests, rate limited")]
    RateLimited,

    #[error("Service unavailable, retry later")]
    ServiceUnavailable,

    #[error("Request cancelled")]
    Cancelled,
}

impl ApiError {
    /// Builds the error for a non-success response, classifying not-found
    /// responses as `Missing`
    pub fn from_response(status: u16, error_code: Option<String>, message: String) -> Self {
        let missing = status == 404
            || error_code
                .as_deref()
                .is_some_and(|code| MISSING_ERROR_CODES.contains(&code));

        if missing {
            ApiError::Missing {
                status,
                error_code,
                message,
            }
        } else {
            ApiError::ApiError {
                status,
                error_code,
                message,
            }
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, ApiError::Missing { .. })
    }
}
