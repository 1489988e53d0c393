//! HTTP client trait abstraction.
//!
//! Provides a trait-based abstraction for the HTTP requests the status
//! client makes (job-info lookups), enabling dependency injection and
//! mocking in tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

/// HTTP headers represented as a key-value map.
pub type Headers = HashMap<String, String>;

/// HTTP response wrapper.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// Response body
    pub body: Bytes,
}

impl Response {
    /// Create a new response.
    pub fn new(status: u16, body: Bytes) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body,
        }
    }

    /// Create a new response with headers.
    pub fn with_headers(status: u16, headers: Headers, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Check if the response indicates success (2xx status).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get the response body as a string.
    pub fn text(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.to_vec())
    }

    /// Parse the response body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// HTTP client errors.
#[derive(Debug, Clone)]
pub enum HttpError {
    /// Connection failed
    ConnectionFailed(String),
    /// Request timeout
    Timeout(String),
    /// Server returned an error status
    ServerError { status: u16, message: String },
    /// Response body could not be decoded
    InvalidResponse(String),
    /// Invalid URL
    InvalidUrl(String),
    /// Other error
    Other(String),
}

impl HttpError {
    /// Whether retrying the same request later might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::ConnectionFailed(_) | HttpError::Timeout(_) => true,
            HttpError::ServerError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            HttpError::Timeout(msg) => write!(f, "Request timeout: {}", msg),
            HttpError::ServerError { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }
            HttpError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            HttpError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            HttpError::Other(msg) => write!(f, "HTTP error: {}", msg),
        }
    }
}

impl std::error::Error for HttpError {}

/// Trait for HTTP client operations.
///
/// # Example
///
/// ```ignore
/// use wepp_status::traits::{HttpClient, Headers, HttpError};
///
/// async fn fetch<C: HttpClient>(client: &C) -> Result<String, HttpError> {
///     let response = client.get("https://wepp.cloud/weppcloud/rq/api/jobinfo/42", &Headers::new()).await?;
///     response.text().map_err(|e| HttpError::InvalidResponse(e.to_string()))
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform a GET request.
    async fn get(&self, url: &str, headers: &Headers) -> Result<Response, HttpError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_is_success() {
        assert!(Response::new(200, Bytes::new()).is_success());
        assert!(Response::new(204, Bytes::new()).is_success());
        assert!(!Response::new(404, Bytes::new()).is_success());
        assert!(!Response::new(500, Bytes::new()).is_success());
    }

    #[test]
    fn test_response_json() {
        let response = Response::new(200, Bytes::from(r#"{"exc_info":"Traceback"}"#));
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["exc_info"], "Traceback");
    }

    #[test]
    fn test_http_error_display() {
        assert_eq!(
            HttpError::ServerError {
                status: 502,
                message: "bad gateway".to_string()
            }
            .to_string(),
            "Server error (502): bad gateway"
        );
        assert_eq!(
            HttpError::InvalidResponse("not json".to_string()).to_string(),
            "Invalid response: not json"
        );
    }

    #[test]
    fn test_http_error_transient() {
        assert!(HttpError::Timeout("10s".to_string()).is_transient());
        assert!(HttpError::ServerError {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(!HttpError::ServerError {
            status: 404,
            message: String::new()
        }
        .is_transient());
        assert!(!HttpError::InvalidUrl("x".to_string()).is_transient());
    }
}
