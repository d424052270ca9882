// ABOUTME: Top-level coordinator: consumes triggers and drives promotion attempts.
// ABOUTME: Wires the registry, build/push, instance group, gate, and switch together.

use chrono::Utc;

use crate::artifacts::{ArtifactBuilder, ArtifactRegistryOps, TagEntry};
use crate::config::Config;
use crate::environments::{EnvironmentRegistry, EnvironmentStatus};
use crate::health::{HealthGate, ProbeOps};
use crate::instances::InstanceGroupOps;
use crate::routing::{RoutingOps, TrafficSwitch};
use crate::types::{ArtifactTag, Digest, EnvId};

use super::Promotion;
use super::attempt::DeploymentAttempt;
use super::error::PromoteError;
use super::rollback::RollbackContext;
use super::state::Pushed;
use super::trigger::{TriggerEvent, resolve_target, tag_for};

/// Summary of a finished promotion, for the operator surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PromotionReport {
    pub attempt: DeploymentAttempt,
    pub digest: Option<Digest>,
    /// Which environment the live alias resolves to afterwards.
    pub live: EnvId,
}

/// Drives one promotion attempt per trigger. Attempts against distinct
/// environments may run concurrently; the registry's per-environment
/// locks serialize attempts within one environment.
pub struct Coordinator<'a, B, A, I, P, R> {
    config: &'a Config,
    registry: &'a EnvironmentRegistry,
    builder: &'a B,
    artifacts: &'a A,
    instances: &'a I,
    gate: &'a HealthGate<P>,
    switch: &'a TrafficSwitch<R>,
}

impl<'a, B, A, I, P, R> Coordinator<'a, B, A, I, P, R>
where
    B: ArtifactBuilder,
    A: ArtifactRegistryOps,
    I: InstanceGroupOps,
    P: ProbeOps,
    R: RoutingOps,
{
    pub fn new(
        config: &'a Config,
        registry: &'a EnvironmentRegistry,
        builder: &'a B,
        artifacts: &'a A,
        instances: &'a I,
        gate: &'a HealthGate<P>,
        switch: &'a TrafficSwitch<R>,
    ) -> Self {
        Self {
            config,
            registry,
            builder,
            artifacts,
            instances,
            gate,
            switch,
        }
    }

    /// Handle a trigger event: resolve the target environment, build
    /// and push (or select the explicit tag), then promote.
    pub async fn handle_trigger(
        &self,
        trigger: TriggerEvent,
    ) -> Result<PromotionReport, PromoteError> {
        let env = resolve_target(&self.config.mapping, &trigger)?;
        let tag = tag_for(env, &trigger, Utc::now().date_naive())?;
        let group = self.config.environments.entry(env).instance_group.clone();

        if trigger.explicit_tag.is_some() {
            // Operator-selected artifact; it must already be pushed.
            self.ensure_tag_exists(&tag).await?;
            let promotion = Promotion::open_existing(self.registry, env, tag, None)?;
            return self.drive(promotion, &group).await;
        }

        let promotion = Promotion::open(self.registry, env, tag)?;
        let promotion = promotion.begin(self.registry)?;
        let promotion = promotion
            .push(self.builder, self.artifacts, &trigger.commit, self.registry)
            .await?;
        self.drive(promotion, &group).await
    }

    /// Operator-forced rollback: a fresh attempt promoting an explicit
    /// historical tag, or the previous tag of the environment's last
    /// attempt when none is given.
    pub async fn force_rollback(
        &self,
        env: EnvId,
        explicit: Option<ArtifactTag>,
    ) -> Result<PromotionReport, PromoteError> {
        let target = match explicit {
            Some(tag) => {
                if tag.env() != env {
                    return Err(PromoteError::TagScope {
                        env,
                        tag_env: tag.env(),
                        tag: tag.to_string(),
                    });
                }
                self.ensure_tag_exists(&tag).await?;
                tag
            }
            None => self
                .registry
                .latest_attempt(env)
                .and_then(|a| a.previous)
                .ok_or_else(|| {
                    PromoteError::UnknownTag(format!("no previous deployment recorded for {env}"))
                })?,
        };

        let group = self.config.environments.entry(env).instance_group.clone();
        let promotion = Promotion::open_existing(self.registry, env, target, None)?;
        self.drive(promotion, &group).await
    }

    pub fn status(&self, env: EnvId) -> EnvironmentStatus {
        self.registry.status(env)
    }

    pub async fn tags(&self, prefix: &str) -> Result<Vec<TagEntry>, PromoteError> {
        self.artifacts
            .list_tags(prefix)
            .await
            .map_err(|e| PromoteError::Upstream(e.to_string()))
    }

    /// Deploy, gate, and finalize an already-pushed attempt.
    async fn drive(
        &self,
        promotion: Promotion<Pushed>,
        group: &str,
    ) -> Result<PromotionReport, PromoteError> {
        let ctx = RollbackContext {
            registry: self.registry,
            instances: self.instances,
            group,
            gate: self.gate,
            policy: &self.config.health,
            readiness_timeout: self.config.readiness_timeout,
        };

        let deploying = match promotion.deploy(self.instances, group, self.registry).await {
            Ok(deploying) => deploying,
            Err((deploying, error)) => {
                deploying.roll_back(&error, &ctx).await?;
                return Err(error);
            }
        };

        let checking = match deploying
            .await_ready(
                self.instances,
                group,
                self.config.readiness_timeout,
                self.config.health.interval,
                self.registry,
            )
            .await
        {
            Ok(checking) => checking,
            Err((deploying, error)) => {
                deploying.roll_back(&error, &ctx).await?;
                return Err(error);
            }
        };

        let promoted = match checking
            .promote(
                self.instances,
                group,
                self.gate,
                &self.config.health,
                self.switch,
                self.registry,
            )
            .await
        {
            Ok(promoted) => promoted,
            Err((checking, error)) => {
                match &error {
                    // Stale routing is unsafe to auto-resolve; the new
                    // tag passed its gate, so nothing is reverted.
                    PromoteError::SwapConflict(_) | PromoteError::Registry(_) => {
                        checking.finalize_failed(self.registry, &error);
                    }
                    _ => {
                        checking.roll_back(&error, &ctx).await?;
                    }
                }
                return Err(error);
            }
        };

        Ok(PromotionReport {
            digest: promoted.digest().cloned(),
            live: self.registry.active_env(),
            attempt: promoted.attempt().clone(),
        })
    }

    async fn ensure_tag_exists(&self, tag: &ArtifactTag) -> Result<(), PromoteError> {
        let exists = self
            .artifacts
            .tag_exists(tag)
            .await
            .map_err(|e| PromoteError::Upstream(e.to_string()))?;
        if !exists {
            return Err(PromoteError::UnknownTag(tag.to_string()));
        }
        Ok(())
    }
}
