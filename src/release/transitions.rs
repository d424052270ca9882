// ABOUTME: State transition methods for the promotion state machine.
// ABOUTME: Each method consumes self and returns the next state on success.

use std::time::Duration;

use crate::artifacts::{ArtifactBuilder, ArtifactRegistryOps};
use crate::environments::EnvironmentRegistry;
use crate::health::{HealthGate, ProbeOps, Verdict};
use crate::instances::{InstanceGroupOps, wait_for_registration};
use crate::routing::{RoutingOps, TrafficSwitch};
use crate::types::{CommitRef, EnvId};

use super::Promotion;
use super::attempt::AttemptState;
use super::error::PromoteError;
use super::state::{Building, Deploying, HealthChecking, Pending, Promoted, Pushed};

/// Result type for transitions that leave the environment mutated and
/// therefore hand the failed state back for mandatory rollback.
pub type TransitionResult<T, S> = Result<Promotion<T>, (Promotion<S>, PromoteError)>;

// =============================================================================
// Pending -> Building
// =============================================================================

impl Promotion<Pending> {
    /// Hand the attempt to the build step.
    #[must_use = "promotion state must be used"]
    pub fn begin(mut self, registry: &EnvironmentRegistry) -> Result<Promotion<Building>, PromoteError> {
        self.attempt.advance(AttemptState::Building);
        self.record(registry)?;
        Ok(self.transition())
    }
}

// =============================================================================
// Building -> Pushed
// =============================================================================

impl Promotion<Building> {
    /// Await the build, then push the artifact under this attempt's tag.
    ///
    /// A build without an artifact is a `BuildFailure`, a rejected push
    /// a `PushFailure`; both are terminal, release the lock immediately,
    /// and deploy nothing — the environment never changed.
    #[must_use = "promotion state must be used"]
    pub async fn push<B, A>(
        mut self,
        builder: &B,
        artifacts: &A,
        commit: &CommitRef,
        registry: &EnvironmentRegistry,
    ) -> Result<Promotion<Pushed>, PromoteError>
    where
        B: ArtifactBuilder + ?Sized,
        A: ArtifactRegistryOps + ?Sized,
    {
        let local_ref = match builder.build(commit).await {
            Ok(local_ref) => local_ref,
            Err(e) => {
                let error = PromoteError::BuildFailure(e.to_string());
                self.finalize_failed(registry, &error);
                return Err(error);
            }
        };

        let outcome = match artifacts.push(&local_ref, &self.attempt.tag).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = PromoteError::PushFailure(e.to_string());
                self.finalize_failed(registry, &error);
                return Err(error);
            }
        };

        tracing::info!(tag = %self.attempt.tag, digest = %outcome.digest(), "artifact available");
        self.digest = Some(outcome.digest().clone());
        self.attempt.advance(AttemptState::Pushed);
        self.record(registry)?;
        Ok(self.transition())
    }
}

// =============================================================================
// Pushed -> Deploying
// =============================================================================

impl Promotion<Pushed> {
    /// Instruct the instance group to adopt the new tag. The rolling
    /// replacement itself is the provisioning layer's job.
    #[must_use = "promotion state must be used"]
    pub async fn deploy<I>(
        mut self,
        instances: &I,
        group: &str,
        registry: &EnvironmentRegistry,
    ) -> TransitionResult<Deploying, Deploying>
    where
        I: InstanceGroupOps + ?Sized,
    {
        self.attempt.advance(AttemptState::Deploying);
        if let Err(e) = self.record(registry) {
            return Err((self.transition(), e));
        }

        let deploying: Promotion<Deploying> = self.transition();
        if let Err(e) = instances.roll_forward(group, &deploying.attempt.tag).await {
            // The group may be partially mutated; the caller must roll back.
            return Err((deploying, PromoteError::Upstream(e.to_string())));
        }
        Ok(deploying)
    }
}

// =============================================================================
// Deploying -> HealthChecking
// =============================================================================

impl Promotion<Deploying> {
    /// Wait for the instance group to report new-tag instances
    /// registered with the load balancer.
    #[must_use = "promotion state must be used"]
    pub async fn await_ready<I>(
        mut self,
        instances: &I,
        group: &str,
        timeout: Duration,
        interval: Duration,
        registry: &EnvironmentRegistry,
    ) -> TransitionResult<HealthChecking, Deploying>
    where
        I: InstanceGroupOps + ?Sized,
    {
        match wait_for_registration(instances, group, &self.attempt.tag, timeout, interval).await
        {
            Ok(true) => {}
            Ok(false) => {
                return Err((
                    self,
                    PromoteError::HealthCheckTimeout(timeout.as_secs()),
                ));
            }
            Err(e) => return Err((self, PromoteError::Upstream(e.to_string()))),
        }

        self.attempt.advance(AttemptState::HealthChecking);
        if let Err(e) = self.record(registry) {
            return Err((self, e));
        }
        Ok(self.transition())
    }
}

// =============================================================================
// HealthChecking -> Promoted
// =============================================================================

impl Promotion<HealthChecking> {
    /// Run the health gate; on pass, finalize the promotion.
    ///
    /// Only a `green` promotion touches the routing alias — staging and
    /// blue are isolated lanes. A refused swap is returned without
    /// rollback; the caller surfaces it as fatal, since the new tag is
    /// healthy and live routing was never changed.
    #[must_use = "promotion state must be used"]
    pub async fn promote<I, P, R>(
        mut self,
        instances: &I,
        group: &str,
        gate: &HealthGate<P>,
        policy: &crate::config::HealthPolicy,
        switch: &TrafficSwitch<R>,
        registry: &EnvironmentRegistry,
    ) -> TransitionResult<Promoted, HealthChecking>
    where
        I: InstanceGroupOps + ?Sized,
        P: ProbeOps,
        R: RoutingOps,
    {
        let outcome = match gate.check(instances, group, &self.attempt.tag, policy).await {
            Ok(outcome) => outcome,
            Err(e) => return Err((self, PromoteError::Upstream(e.to_string()))),
        };

        for round in &outcome.rounds {
            self.attempt.record_verdict(round.healthy, round.detail.clone());
        }

        match outcome.verdict {
            Verdict::Pass => {}
            Verdict::Fail => {
                let detail = outcome
                    .rounds
                    .iter()
                    .rev()
                    .find(|r| !r.healthy)
                    .map(|r| r.detail.clone())
                    .unwrap_or_else(|| "gate reported failure".to_string());
                return Err((self, PromoteError::HealthCheckFail(detail)));
            }
            Verdict::Timeout => {
                return Err((
                    self,
                    PromoteError::HealthCheckTimeout(policy.timeout.as_secs()),
                ));
            }
        }

        if self.attempt.env == EnvId::Green {
            let from = registry.active_env();
            if let Err(e) = switch.swap(from, EnvId::Green).await {
                return Err((self, PromoteError::SwapConflict(e.to_string())));
            }
            if let Err(e) = registry.set_active_env(EnvId::Green) {
                return Err((self, PromoteError::Registry(e)));
            }
        }

        let token = match self.token.as_ref() {
            Some(token) => token,
            None => {
                let env = self.attempt.env;
                return Err((
                    self,
                    PromoteError::Registry(crate::environments::RegistryError::NotLocked(env)),
                ));
            }
        };
        if let Err(e) = registry.set_current_tag(token, self.attempt.tag.clone()) {
            return Err((self, PromoteError::Registry(e)));
        }

        self.attempt.advance(AttemptState::Promoted);
        if let Err(e) = self.record(registry) {
            return Err((self, e));
        }

        let mut promoted: Promotion<Promoted> = self.transition();
        promoted.release_lock(registry);
        tracing::info!(
            env = %promoted.attempt.env,
            tag = %promoted.attempt.tag,
            "promotion complete"
        );
        Ok(promoted)
    }
}
