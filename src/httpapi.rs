// ABOUTME: Minimal hyper client shared by the boundary HTTP adapters.
// ABOUTME: GET and JSON POST with collected bodies; no retries, no pooling config.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    BadUrl(String),

    #[error("request failed: {0}")]
    Request(String),
}

pub(crate) struct HttpClient {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    pub async fn get(&self, url: &str) -> Result<(u16, Bytes), HttpError> {
        self.request(Method::GET, url, None).await
    }

    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<(u16, Bytes), HttpError> {
        let bytes = Bytes::from(body.to_string());
        self.request(Method::POST, url, Some(bytes)).await
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
    ) -> Result<(u16, Bytes), HttpError> {
        let uri: Uri = url
            .parse()
            .map_err(|_| HttpError::BadUrl(url.to_string()))?;

        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let request = builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| HttpError::Request(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| HttpError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| HttpError::Request(e.to_string()))?
            .to_bytes();
        Ok((status, bytes))
    }
}
