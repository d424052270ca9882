// ABOUTME: HTTP adapter for the routing boundary's alias API.
// ABOUTME: Rebind and weight changes are single calls the boundary applies atomically.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::httpapi::HttpClient;
use crate::types::EnvId;

use super::{RoutingError, RoutingOps};

#[derive(Debug, Deserialize)]
struct AliasState {
    target: EnvId,
}

/// Talks to the load balancer / routing control API.
pub struct HttpRouting {
    client: HttpClient,
    base_url: String,
    atomic_rebind: bool,
}

impl HttpRouting {
    pub fn new(base_url: &str, atomic_rebind: bool) -> Self {
        Self {
            client: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            atomic_rebind,
        }
    }

    fn alias_url(&self, alias: &str) -> String {
        format!("{}/aliases/{}", self.base_url, alias)
    }
}

#[async_trait]
impl RoutingOps for HttpRouting {
    fn atomic_rebind_supported(&self) -> bool {
        self.atomic_rebind
    }

    async fn rebind(&self, alias: &str, to: EnvId) -> Result<(), RoutingError> {
        let url = format!("{}/rebind", self.alias_url(alias));
        let body = json!({ "target": to.as_str() });

        let (status, response) = self
            .client
            .post_json(&url, &body)
            .await
            .map_err(|e| RoutingError::Boundary(e.to_string()))?;

        match status {
            200..=299 => Ok(()),
            404 => Err(RoutingError::AliasNotFound(alias.to_string())),
            409 => Err(RoutingError::Rejected(
                String::from_utf8_lossy(&response).into_owned(),
            )),
            _ => Err(RoutingError::Boundary(format!(
                "rebind returned status {status}"
            ))),
        }
    }

    async fn set_weights(
        &self,
        alias: &str,
        blue: u32,
        green: u32,
    ) -> Result<(), RoutingError> {
        let url = format!("{}/weights", self.alias_url(alias));
        let body = json!({ "blue": blue, "green": green });

        let (status, response) = self
            .client
            .post_json(&url, &body)
            .await
            .map_err(|e| RoutingError::Boundary(e.to_string()))?;

        match status {
            200..=299 => Ok(()),
            404 => Err(RoutingError::AliasNotFound(alias.to_string())),
            _ => Err(RoutingError::Rejected(format!(
                "status {status}: {}",
                String::from_utf8_lossy(&response)
            ))),
        }
    }

    async fn active_target(&self, alias: &str) -> Result<EnvId, RoutingError> {
        let (status, response) = self
            .client
            .get(&self.alias_url(alias))
            .await
            .map_err(|e| RoutingError::Boundary(e.to_string()))?;

        match status {
            200..=299 => {
                let state: AliasState = serde_json::from_slice(&response)
                    .map_err(|e| RoutingError::Boundary(format!("bad alias state: {e}")))?;
                Ok(state.target)
            }
            404 => Err(RoutingError::AliasNotFound(alias.to_string())),
            _ => Err(RoutingError::Boundary(format!(
                "alias query returned status {status}"
            ))),
        }
    }
}
