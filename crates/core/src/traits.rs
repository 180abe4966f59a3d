use async_trait::async_trait;
use std::time::Duration;

use crate::config::ConfigError;

// ---------------------------------------------------------------------------
// HTTP Transport Trait
// ---------------------------------------------------------------------------

/// Errors raised below the exchange envelope: the call never produced a
/// usable body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Malformed response: {0}")]
    Decode(String),
    #[error("Transport error: {0}")]
    Other(String),
}

/// Request method. Every account endpoint used here is a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
        }
    }
}

/// A fully prepared outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Absolute URL including the query string.
    pub url: String,
    /// Endpoint path, e.g. `/v5/position/list`.
    pub path: String,
    /// Query pairs in the order they appear in `url`.
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends prepared requests over the wire.
///
/// Implementations must honor `request.timeout`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

// ---------------------------------------------------------------------------
// Clock Sync
// ---------------------------------------------------------------------------

/// Why a server-time probe did not produce an offset. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockSyncError {
    #[error("Time sync transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("Time sync returned HTTP {0}")]
    Status(u16),
    #[error("Time sync response malformed: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The only hard failure of a snapshot: it could not be attempted at all.
/// Upstream failures degrade individual sections instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_lookups() {
        let req = HttpRequest {
            method: HttpMethod::Get,
            url: "https://example.test/v5/x?a=1&b=2".to_string(),
            path: "/v5/x".to_string(),
            query: vec![("a".into(), "1".into()), ("b".into(), "2".into())],
            headers: vec![("X-BAPI-SIGN".into(), "abc".into())],
            timeout: Duration::from_secs(1),
        };
        assert_eq!(req.header("x-bapi-sign"), Some("abc"));
        assert_eq!(req.query_param("b"), Some("2"));
        assert_eq!(req.query_param("c"), None);
        assert_eq!(req.method.as_str(), "GET");
    }

    #[test]
    fn test_snapshot_error_from_config() {
        let err: SnapshotError = ConfigError::MissingApiSecret.into();
        assert!(err.to_string().contains("API secret"));
    }
}
