//! Error types for the embedding gateway

use std::time::Duration;

/// Result type for gateway operations.
///
/// This is a convenience type alias that uses [`GatewayError`] as the error type.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors raised by a single call to a remote embedding or completion service.
///
/// The gateway never retries on its own; every variant describes exactly one
/// failed call, and the caller (usually the batch scheduler) decides whether to
/// try again.
///
/// # Error Categories
///
/// - **Configuration Errors**: rejected before any request is sent
/// - **Transport Errors**: connection failures and timeouts
/// - **Service Errors**: the service answered, but not with what we asked for
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Error when the gateway configuration is invalid
    #[error("Invalid gateway configuration: {message}")]
    InvalidConfig { message: String },

    /// More texts were submitted in one call than the provider accepts
    #[error("Batch of {size} texts exceeds the provider limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// The request could not be delivered, or the response could not be read
    #[error("Transport error: {source}")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The service rejected our credentials
    #[error("Authentication failed (HTTP {status}): {body}")]
    Authentication { status: u16, body: String },

    /// Any other non-success HTTP status
    #[error("Service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// No response within the configured timeout
    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The response parsed but does not match the request, e.g. the wrong
    /// number of vectors or vectors of inconsistent length
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },
}

impl GatewayError {
    /// Create an invalid configuration error with a custom message.
    ///
    /// # Arguments
    /// * `message` - What is wrong with the configuration
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a malformed response error with a custom message.
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Wrap any error as a transport failure.
    pub fn transport<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            source: Box::new(source),
        }
    }

    /// Classify a `reqwest` error.
    ///
    /// Timeouts become [`GatewayError::Timeout`], body decoding failures become
    /// [`GatewayError::MalformedResponse`], everything else is a transport error.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout }
        } else if err.is_decode() {
            Self::malformed(format!("could not decode response body: {err}"))
        } else {
            Self::transport(err)
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Self::Authentication {
                    status: status.as_u16(),
                    body,
                }
            }
            _ => Self::Http {
                status: status.as_u16(),
                body,
            },
        }
    }
}
