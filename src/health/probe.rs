// ABOUTME: HTTP probe against a single instance's health endpoint.
// ABOUTME: Trait seam so the gate is testable without real network calls.

use async_trait::async_trait;
use thiserror::Error;

use crate::httpapi::{HttpClient, HttpError};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe request failed: {0}")]
    Request(String),
}

/// Issues one health probe and reports the HTTP status.
#[async_trait]
pub trait ProbeOps: Send + Sync {
    async fn probe(&self, base_url: &str, path: &str) -> Result<u16, ProbeError>;
}

#[async_trait]
impl<P: ProbeOps + ?Sized> ProbeOps for &P {
    async fn probe(&self, base_url: &str, path: &str) -> Result<u16, ProbeError> {
        (**self).probe(base_url, path).await
    }
}

/// Probes instances over plain HTTP/1.
pub struct HyperProbe {
    client: HttpClient,
}

impl HyperProbe {
    pub fn new() -> Self {
        Self {
            client: HttpClient::new(),
        }
    }
}

impl Default for HyperProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeOps for HyperProbe {
    async fn probe(&self, base_url: &str, path: &str) -> Result<u16, ProbeError> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), path);
        match self.client.get(&url).await {
            Ok((status, _body)) => Ok(status),
            Err(HttpError::BadUrl(u)) => Err(ProbeError::Request(format!("invalid URL {u}"))),
            Err(HttpError::Request(e)) => Err(ProbeError::Request(e)),
        }
    }
}
