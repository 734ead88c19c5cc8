//! HTTP transport for the model endpoint and the tool service
//!
//! Async client with streaming bodies. Tests swap in [`FakeTransport`].

pub use crate::llm::adapters::transport_fake::{FakeRequest, FakeResponse, FakeTransport};
pub use crate::llm::adapters::transport_http::HttpTransport;
pub use crate::llm::adapters::transport_types::{AdapterError, ByteStream, StreamResponse};

/// Concrete transport enum
///
/// Wraps all transport types, avoiding dyn compatibility issues with async
/// methods.
#[derive(Debug, Clone)]
pub enum Transport {
    Real(HttpTransport),
    Fake(FakeTransport),
}

impl Transport {
    /// POST `body` and return the response with its body still streaming
    pub async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<StreamResponse, AdapterError> {
        match self {
            Transport::Real(t) => t.post(url, headers, body).await,
            Transport::Fake(t) => t.post(url, headers, body).await,
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Transport::Real(HttpTransport::new())
    }
}

impl From<FakeTransport> for Transport {
    fn from(fake: FakeTransport) -> Self {
        Transport::Fake(fake)
    }
}
