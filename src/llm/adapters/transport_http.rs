//! HTTP transport backed by reqwest
//!
//! The response body is exposed as a byte stream so NDJSON and SSE bodies can
//! be consumed incrementally.

use futures::StreamExt;
use std::time::Duration;
use tracing::debug;

use crate::llm::adapters::transport_types::{AdapterError, StreamResponse};

/// Real HTTP transport
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport with an overall request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Configuration(e.to_string()))?;
        Ok(Self { client })
    }

    pub async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<StreamResponse, AdapterError> {
        debug!("POST {} ({} bytes)", url, body.len());

        let mut request = self.client.post(url).body(body.to_string());
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();

        let mut chunks = response.bytes_stream();
        let body = async_stream::try_stream! {
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk.map_err(|e| AdapterError::Network(e.to_string()))?;
                yield chunk.to_vec();
            }
        };

        Ok(StreamResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}
