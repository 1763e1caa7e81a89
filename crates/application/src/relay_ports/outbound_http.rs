use async_trait::async_trait;
use pixelrelay_core::AppResult;
use serde_json::Value;

/// One outbound JSON POST to a platform API.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// Fully qualified endpoint, including any query-string credentials.
    pub url: String,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Value,
}

impl OutboundRequest {
    /// Creates a request without extra headers.
    #[must_use]
    pub fn new(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    /// Adds one header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Final HTTP response after any retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text.
    pub body: String,
}

impl OutboundResponse {
    /// Returns whether the platform accepted the request.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Port for the bounded-timeout, limited-retry outbound transport.
#[async_trait]
pub trait OutboundHttpClient: Send + Sync {
    /// Posts a JSON body.
    ///
    /// Returns the final response for any HTTP status; returns an error only
    /// when no response was obtained.
    async fn post_json(&self, request: OutboundRequest) -> AppResult<OutboundResponse>;
}
