// ABOUTME: HTTP adapter for the provisioning layer's instance-group API.
// ABOUTME: POST /roll-forward with the tag; GET /instances for readiness.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;

use crate::config::EnvironmentsConfig;
use crate::httpapi::HttpClient;
use crate::types::{ArtifactTag, EnvId};

use super::{InstanceGroupError, InstanceGroupOps, InstanceInfo};

/// Drives instance groups through the provisioner's control API. Each
/// group has its own environment-specific base endpoint from config.
pub struct HttpInstanceGroup {
    client: HttpClient,
    endpoints: HashMap<String, String>,
}

impl HttpInstanceGroup {
    pub fn new(endpoints: HashMap<String, String>) -> Self {
        let endpoints = endpoints
            .into_iter()
            .map(|(group, url)| (group, url.trim_end_matches('/').to_string()))
            .collect();
        Self {
            client: HttpClient::new(),
            endpoints,
        }
    }

    pub fn from_config(environments: &EnvironmentsConfig) -> Self {
        let endpoints = EnvId::ALL
            .into_iter()
            .map(|env| {
                let entry = environments.entry(env);
                (entry.instance_group.clone(), entry.control_endpoint.clone())
            })
            .collect();
        Self::new(endpoints)
    }

    fn endpoint(&self, group: &str) -> Result<&str, InstanceGroupError> {
        self.endpoints
            .get(group)
            .map(String::as_str)
            .ok_or_else(|| InstanceGroupError::GroupNotFound(group.to_string()))
    }
}

#[async_trait]
impl InstanceGroupOps for HttpInstanceGroup {
    async fn roll_forward(
        &self,
        group: &str,
        tag: &ArtifactTag,
    ) -> Result<(), InstanceGroupError> {
        let url = format!("{}/roll-forward", self.endpoint(group)?);
        let body = json!({ "group": group, "tag": tag.as_str() });

        let (status, response) = self
            .client
            .post_json(&url, &body)
            .await
            .map_err(|e| InstanceGroupError::Boundary(e.to_string()))?;

        match status {
            200..=299 => Ok(()),
            404 => Err(InstanceGroupError::GroupNotFound(group.to_string())),
            _ => Err(InstanceGroupError::RollForwardRejected(format!(
                "status {status}: {}",
                String::from_utf8_lossy(&response)
            ))),
        }
    }

    async fn instances(&self, group: &str) -> Result<Vec<InstanceInfo>, InstanceGroupError> {
        let url = format!("{}/instances", self.endpoint(group)?);

        let (status, response) = self
            .client
            .get(&url)
            .await
            .map_err(|e| InstanceGroupError::Boundary(e.to_string()))?;

        match status {
            200..=299 => serde_json::from_slice(&response)
                .map_err(|e| InstanceGroupError::Boundary(format!("bad instance list: {e}"))),
            404 => Err(InstanceGroupError::GroupNotFound(group.to_string())),
            _ => Err(InstanceGroupError::Boundary(format!(
                "instance query returned status {status}"
            ))),
        }
    }
}
