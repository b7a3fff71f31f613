//! Error types for the Kawaii client.

use thiserror::Error;

/// Result type for Kawaii operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Message used when the server answers json mode with a non-JSON body.
pub(crate) const UNKNOWN_URL: &str = "Unknown URL";

/// Message used when a JSON error body carries no `error` field.
pub(crate) const UNKNOWN_ERROR: &str = "Unknown error";

/// Error types for the Kawaii client.
#[derive(Error, Debug)]
pub enum Error {
    /// The API rejected the request or returned an unusable body.
    ///
    /// Carries the upstream `error` field, the raw text body, or
    /// `"Unknown URL"` on a content-type mismatch.
    #[error("Kawaii API error: {0}")]
    Api(String),

    /// Request timed out.
    #[error("Request timed out")]
    Timeout,

    /// Network or HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Text body was not valid UTF-8.
    #[error("Invalid UTF-8 in response body: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    /// The request could not be built from the given arguments.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Map a transport error, splitting timeouts out of the generic case.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Http(err)
        }
    }

    /// The API message, if this is an [`Error::Api`].
    pub fn api_message(&self) -> Option<&str> {
        match self {
            Error::Api(message) => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_message() {
        let err = Error::Api("bad token".into());
        assert_eq!(err.api_message(), Some("bad token"));
        assert_eq!(err.to_string(), "Kawaii API error: bad token");

        assert_eq!(Error::Timeout.api_message(), None);
        assert_eq!(
            Error::Config("token is required".into()).to_string(),
            "Configuration error: token is required"
        );
    }
}
