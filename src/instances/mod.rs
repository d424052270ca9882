// ABOUTME: Instance-group boundary: roll forward to a tag, query readiness.
// ABOUTME: Provided by the external provisioning layer; HTTP impl included.

mod http;

pub use http::HttpInstanceGroup;

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::types::ArtifactTag;

#[derive(Debug, Error)]
pub enum InstanceGroupError {
    #[error("instance group {0} not found")]
    GroupNotFound(String),

    #[error("roll-forward rejected: {0}")]
    RollForwardRejected(String),

    #[error("provisioner request failed: {0}")]
    Boundary(String),
}

/// One instance in a group, as reported by the provisioning layer.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceInfo {
    pub id: String,
    /// Tag the instance is currently running, if known.
    pub tag: Option<ArtifactTag>,
    /// Whether the load balancer has the instance in service.
    pub registered: bool,
    /// Base URL for probing this instance directly.
    pub address: String,
}

/// Commands against one environment's instance group.
#[async_trait]
pub trait InstanceGroupOps: Send + Sync {
    /// Instruct the group to roll forward to the given tag. The
    /// provisioning layer performs the rolling replacement itself.
    async fn roll_forward(&self, group: &str, tag: &ArtifactTag)
    -> Result<(), InstanceGroupError>;

    /// Current instances, including ones not yet registered.
    async fn instances(&self, group: &str) -> Result<Vec<InstanceInfo>, InstanceGroupError>;
}

/// Wait until at least one instance running `tag` is registered with
/// the load balancer. Returns false if the deadline elapses first.
pub async fn wait_for_registration<I: InstanceGroupOps + ?Sized>(
    ops: &I,
    group: &str,
    tag: &ArtifactTag,
    timeout: Duration,
    interval: Duration,
) -> Result<bool, InstanceGroupError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let listed = ops.instances(group).await?;
        if listed
            .iter()
            .any(|i| i.registered && i.tag.as_ref() == Some(tag))
        {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        let next = tokio::time::Instant::now() + interval;
        tokio::time::sleep_until(next.min(deadline)).await;
    }
}
