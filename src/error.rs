use thiserror::Error;

/// Type alias for Result with TriageError
pub type Result<T> = std::result::Result<T, TriageError>;

/// Error types for the triage pipeline
#[derive(Error, Debug)]
pub enum TriageError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Credential is missing, expired or rejected (HTTP 401)
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Resource already exists (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid message format or parsing error
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Label-related errors
    #[error("Label error: {0}")]
    LabelError(String),

    /// Classifier unavailable or returned a malformed response
    #[error("Classification error: {0}")]
    ClassificationError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic catch-all error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl TriageError {
    /// Check if the error means the credential was rejected.
    ///
    /// 401 and 403 both count: Gmail answers 403 for tokens that lost a scope.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, TriageError::AuthError(_) | TriageError::Forbidden(_))
    }

    /// Check if a create call failed because the resource already exists
    pub fn is_already_exists(&self) -> bool {
        matches!(self, TriageError::Conflict(_))
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// The Retry-After header can be specified in two formats:
/// 1. Delay-seconds: An integer indicating seconds to wait (e.g., "120")
/// 2. HTTP-date: An HTTP date format (e.g., "Wed, 21 Oct 2015 07:28:00 GMT")
///
/// Returns the number of seconds to wait. If the header is missing or invalid,
/// returns a default of 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    let Some(value) = response
        .headers()
        .get(hyper::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
    else {
        return DEFAULT_RETRY_AFTER;
    };

    if let Ok(seconds) = value.parse::<u64>() {
        return seconds;
    }

    httpdate::parse_http_date(value)
        .ok()
        .and_then(|when| when.duration_since(std::time::SystemTime::now()).ok())
        .map(|d| d.as_secs())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

impl From<google_gmail1::Error> for TriageError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    401 => TriageError::AuthError(message),
                    403 => TriageError::Forbidden(message),
                    404 => TriageError::MessageNotFound("Resource not found".to_string()),
                    409 => TriageError::Conflict(message),
                    429 => TriageError::RateLimitExceeded {
                        retry_after: parse_retry_after_header(response),
                    },
                    400 => TriageError::BadRequest(message),
                    500..=599 => TriageError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => TriageError::ApiError(message),
                }
            }
            // Gmail reports structured errors (e.g. "Label name exists") through BadRequest
            google_gmail1::Error::BadRequest(ref err) => {
                let code = err
                    .get("error")
                    .and_then(|e| e.get("code"))
                    .and_then(|c| c.as_u64());
                match code {
                    Some(401) => TriageError::AuthError(err.to_string()),
                    Some(403) => TriageError::Forbidden(err.to_string()),
                    Some(409) => TriageError::Conflict(err.to_string()),
                    _ => TriageError::BadRequest(err.to_string()),
                }
            }
            google_gmail1::Error::MissingToken(ref err) => {
                TriageError::AuthError(format!("No access token: {}", err))
            }
            google_gmail1::Error::HttpError(ref err) => {
                TriageError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(ref err) => TriageError::NetworkError(err.to_string()),
            _ => TriageError::ApiError(error.to_string()),
        }
    }
}

impl From<reqwest::Error> for TriageError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            TriageError::NetworkError(error.to_string())
        } else {
            TriageError::ClassificationError(error.to_string())
        }
    }
}
