use std::time::Duration;

use async_trait::async_trait;
use pixelrelay_application::{OutboundHttpClient, OutboundRequest, OutboundResponse};
use pixelrelay_core::{AppError, AppResult};
use tracing::warn;

const MAX_ATTEMPTS: u8 = 2;

/// Outbound JSON transport with a strict per-call timeout and one retry.
///
/// Transport errors and 5xx responses are retried once after a fixed delay.
/// Every other status, 429 included, is returned as-is on the first attempt.
#[derive(Clone)]
pub struct ReqwestOutboundHttpClient {
    http_client: reqwest::Client,
    retry_delay: Duration,
}

impl ReqwestOutboundHttpClient {
    /// Builds a client whose every attempt is capped at `timeout`.
    pub fn new(timeout: Duration, retry_delay: Duration) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

        Ok(Self::with_client(http_client, retry_delay))
    }

    /// Wraps an already configured client.
    #[must_use]
    pub fn with_client(http_client: reqwest::Client, retry_delay: Duration) -> Self {
        Self {
            http_client,
            retry_delay,
        }
    }

    fn build(&self, request: &OutboundRequest) -> reqwest::RequestBuilder {
        let mut builder = self.http_client.post(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.json(&request.body)
    }
}

#[async_trait]
impl OutboundHttpClient for ReqwestOutboundHttpClient {
    async fn post_json(&self, request: OutboundRequest) -> AppResult<OutboundResponse> {
        let mut attempt = 0_u8;

        loop {
            attempt = attempt.saturating_add(1);
            let retries_left = attempt < MAX_ATTEMPTS;

            match self.build(&request).send().await {
                Ok(response) if response.status().is_server_error() && retries_left => {
                    warn!(
                        status = response.status().as_u16(),
                        attempt,
                        "platform returned server error; retrying"
                    );
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
                    return Ok(OutboundResponse { status, body });
                }
                Err(error) if retries_left => {
                    warn!(attempt, error = %error, "platform transport error; retrying");
                }
                Err(error) => {
                    return Err(AppError::Unavailable(format!(
                        "platform request failed after {attempt} attempts: {error}"
                    )));
                }
            }

            tokio::time::sleep(self.retry_delay).await;
        }
    }
}
