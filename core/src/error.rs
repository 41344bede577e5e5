use thiserror::Error;

/// Failure of one call against the Cogniz memory API.
///
/// `Display` renders the exact sentence handed back to the assistant host.
/// Every variant maps to one fixed, actionable message and never carries
/// transport internals beyond the configured endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Error: Resource not found. Please check the ID is correct.")]
    NotFound,
    #[error("Error: Permission denied. Check your API key has access to this resource.")]
    Forbidden,
    #[error("Error: Rate limit exceeded. Please wait before making more requests.")]
    RateLimited,
    #[error("Error: Authentication failed. Please check your API key is valid.")]
    Unauthenticated,
    #[error("Error: Request timed out. Please try again.")]
    Timeout,
    #[error("Error: Could not connect to {endpoint}. Please check the URL is correct.")]
    UnreachableHost { endpoint: String },
    #[error("Error: API request failed with status {code}: {status_text}")]
    HttpStatus { code: u16, status_text: String },
    #[error("Error: {0}")]
    Unknown(String),
}

impl ApiError {
    /// Classify a non-2xx status returned by the memory API.
    pub fn from_status(code: u16, status_text: impl Into<String>) -> Self {
        match code {
            401 => Self::Unauthenticated,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            _ => Self::HttpStatus {
                code,
                status_text: status_text.into(),
            },
        }
    }

    /// Machine-readable code, used in logs only.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => codes::NOT_FOUND,
            Self::Forbidden => codes::FORBIDDEN,
            Self::RateLimited => codes::RATE_LIMITED,
            Self::Unauthenticated => codes::UNAUTHORIZED,
            Self::Timeout => codes::TIMEOUT,
            Self::UnreachableHost { .. } => codes::CONNECTION_ERROR,
            Self::HttpStatus { .. } => codes::HTTP_ERROR,
            Self::Unknown(_) => codes::INTERNAL_ERROR,
        }
    }
}

/// Error codes used across the servers
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const AUTH_REQUIRED: &str = "auth_required";
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
    pub const NOT_FOUND: &str = "not_found";
    pub const FORBIDDEN: &str = "forbidden";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const TIMEOUT: &str = "timeout";
    pub const CONNECTION_ERROR: &str = "connection_error";
    pub const HTTP_ERROR: &str = "http_error";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_statuses_map_to_fixed_sentences() {
        let cases = [
            (
                401,
                "Error: Authentication failed. Please check your API key is valid.",
            ),
            (
                403,
                "Error: Permission denied. Check your API key has access to this resource.",
            ),
            (
                404,
                "Error: Resource not found. Please check the ID is correct.",
            ),
            (
                429,
                "Error: Rate limit exceeded. Please wait before making more requests.",
            ),
        ];
        for (status, expected) in cases {
            let err = ApiError::from_status(status, "ignored");
            assert!(
                !matches!(err, ApiError::HttpStatus { .. }),
                "{status} must not fall through to the generic branch"
            );
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn other_statuses_use_generic_sentence() {
        let err = ApiError::from_status(500, "Internal Server Error");
        assert_eq!(
            err.to_string(),
            "Error: API request failed with status 500: Internal Server Error"
        );
        assert_eq!(err.code(), codes::HTTP_ERROR);

        let err = ApiError::from_status(400, "Bad Request");
        assert_eq!(
            err.to_string(),
            "Error: API request failed with status 400: Bad Request"
        );
    }

    #[test]
    fn transport_failures_render_actionable_text() {
        assert_eq!(
            ApiError::Timeout.to_string(),
            "Error: Request timed out. Please try again."
        );
        assert_eq!(
            ApiError::UnreachableHost {
                endpoint: "https://cogniz.example".to_string()
            }
            .to_string(),
            "Error: Could not connect to https://cogniz.example. Please check the URL is correct."
        );
        assert_eq!(
            ApiError::Unknown("boom".to_string()).to_string(),
            "Error: boom"
        );
    }
}
