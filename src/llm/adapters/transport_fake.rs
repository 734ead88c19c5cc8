//! Fake transport for testing
//!
//! Serves scripted responses instead of real HTTP calls and records every
//! request it receives.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::llm::adapters::transport_types::{AdapterError, StreamResponse};

/// A request captured by [`FakeTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct FakeRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl FakeRequest {
    /// Body parsed as JSON (`Null` when it isn't)
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A scripted response
#[derive(Debug, Clone, PartialEq)]
pub struct FakeResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Body chunks, delivered in order
    pub chunks: Vec<String>,
    /// Delay before each chunk
    pub chunk_delay: Option<Duration>,
    /// Keep the body open after the last chunk
    pub hang: bool,
    /// Fail the request with a network error instead of responding
    pub network_error: Option<String>,
}

impl FakeResponse {
    /// 200 response delivering `chunks` one by one
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            status: 200,
            headers: Vec::new(),
            chunks: chunks.into_iter().map(Into::into).collect(),
            chunk_delay: None,
            hang: false,
            network_error: None,
        }
    }

    /// 200 NDJSON response, one chunk per non-empty line
    pub fn ndjson(body: &str) -> Self {
        Self::chunks(
            body.lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| format!("{}\n", l)),
        )
    }

    /// Response with a status code and a single body chunk
    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            ..Self::chunks([body])
        }
    }

    pub fn network_error(msg: &str) -> Self {
        Self {
            network_error: Some(msg.to_string()),
            ..Self::chunks(Vec::<String>::new())
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }
}

type Responder = dyn Fn(&FakeRequest) -> FakeResponse + Send + Sync;

/// Fake transport for testing
#[derive(Clone)]
pub struct FakeTransport {
    responder: Arc<Responder>,
    requests: Arc<Mutex<Vec<FakeRequest>>>,
}

impl std::fmt::Debug for FakeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeTransport")
            .field("requests", &self.request_count())
            .finish()
    }
}

impl FakeTransport {
    /// Transport answering every request through `responder`
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&FakeRequest) -> FakeResponse + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Same NDJSON body for every request
    pub fn with_stream(body: &str) -> Self {
        let response = FakeResponse::ndjson(body);
        Self::new(move |_| response.clone())
    }

    /// Responses served in order; a 500 once the script runs out
    pub fn scripted(responses: Vec<FakeResponse>) -> Self {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::new(move |_| {
            queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .unwrap_or_else(|| FakeResponse::status(500, "no scripted response left"))
        })
    }

    /// Every request fails with a network error
    pub fn with_error(msg: &str) -> Self {
        let msg = msg.to_string();
        Self::new(move |_| FakeResponse::network_error(&msg))
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<FakeRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<StreamResponse, AdapterError> {
        let request = FakeRequest {
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.to_string(),
        };
        let response = (self.responder)(&request);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        if let Some(msg) = response.network_error {
            return Err(AdapterError::Network(msg));
        }

        let FakeResponse {
            status,
            headers,
            chunks,
            chunk_delay,
            hang,
            ..
        } = response;

        let body = async_stream::stream! {
            for chunk in chunks {
                if let Some(delay) = chunk_delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok::<Vec<u8>, AdapterError>(chunk.into_bytes());
            }
            if hang {
                std::future::pending::<()>().await;
            }
        };

        Ok(StreamResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}
