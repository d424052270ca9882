// ABOUTME: Rollback controller: reinstate the attempt's previous tag.
// ABOUTME: One reduced health check, no retries; a failed rollback is fatal.

use std::time::Duration;

use crate::config::HealthPolicy;
use crate::environments::EnvironmentRegistry;
use crate::health::{HealthGate, ProbeOps, Verdict};
use crate::instances::{InstanceGroupOps, wait_for_registration};

use super::Promotion;
use super::attempt::AttemptState;
use super::error::PromoteError;
use super::state::{Deploying, HealthChecking, RolledBack};

/// Collaborators the rollback controller needs. Bundled so both
/// rollback-capable states share one signature.
pub struct RollbackContext<'a, I: ?Sized, P> {
    pub registry: &'a EnvironmentRegistry,
    pub instances: &'a I,
    pub group: &'a str,
    pub gate: &'a HealthGate<P>,
    pub policy: &'a HealthPolicy,
    pub readiness_timeout: Duration,
}

impl Promotion<Deploying> {
    /// Revert after a failed roll-forward or readiness wait.
    #[must_use = "promotion state must be used"]
    pub async fn roll_back<I, P>(
        self,
        cause: &PromoteError,
        ctx: &RollbackContext<'_, I, P>,
    ) -> Result<Promotion<RolledBack>, PromoteError>
    where
        I: InstanceGroupOps + ?Sized,
        P: ProbeOps,
    {
        execute(self, cause, ctx).await
    }
}

impl Promotion<HealthChecking> {
    /// Revert after a failed or timed-out health gate.
    #[must_use = "promotion state must be used"]
    pub async fn roll_back<I, P>(
        self,
        cause: &PromoteError,
        ctx: &RollbackContext<'_, I, P>,
    ) -> Result<Promotion<RolledBack>, PromoteError>
    where
        I: InstanceGroupOps + ?Sized,
        P: ProbeOps,
    {
        execute(self, cause, ctx).await
    }
}

/// Drive the Failed -> RollingBack -> RolledBack sub-machine.
///
/// Always targets the `previous` tag recorded on the attempt, never
/// "two versions back"; deeper rollback takes a fresh operator-triggered
/// attempt naming an explicit historical tag.
async fn execute<S, I, P>(
    mut promotion: Promotion<S>,
    cause: &PromoteError,
    ctx: &RollbackContext<'_, I, P>,
) -> Result<Promotion<RolledBack>, PromoteError>
where
    I: InstanceGroupOps + ?Sized,
    P: ProbeOps,
{
    promotion
        .attempt
        .fail(AttemptState::Failed, cause.to_string());
    promotion.record(ctx.registry)?;

    let Some(previous) = promotion.attempt.previous.clone() else {
        // First deploy: there is no known-healthy tag to reinstate.
        tracing::error!(
            env = %promotion.attempt.env,
            "cannot roll back, no previous tag recorded"
        );
        promotion.release_lock(ctx.registry);
        return Err(PromoteError::RollbackFailure(
            "no previous tag recorded (first deploy)".to_string(),
        ));
    };

    tracing::warn!(
        env = %promotion.attempt.env,
        from = %promotion.attempt.tag,
        to = %previous,
        "rolling back"
    );
    promotion.attempt.advance(AttemptState::RollingBack);
    promotion.record(ctx.registry)?;

    if let Err(e) = ctx.instances.roll_forward(ctx.group, &previous).await {
        return Err(fatal(promotion, ctx, format!("roll-forward to {previous} rejected: {e}")));
    }

    match wait_for_registration(
        ctx.instances,
        ctx.group,
        &previous,
        ctx.readiness_timeout,
        ctx.policy.interval,
    )
    .await
    {
        Ok(true) => {}
        Ok(false) => {
            return Err(fatal(
                promotion,
                ctx,
                format!("previous tag {previous} never registered"),
            ));
        }
        Err(e) => return Err(fatal(promotion, ctx, e.to_string())),
    }

    // Single verdict, no retries: a second automatic rollback would
    // only flap.
    let outcome = match ctx
        .gate
        .check_once(ctx.instances, ctx.group, &previous, ctx.policy)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => return Err(fatal(promotion, ctx, e.to_string())),
    };
    for round in &outcome.rounds {
        promotion
            .attempt
            .record_verdict(round.healthy, round.detail.clone());
    }
    if outcome.verdict != Verdict::Pass {
        return Err(fatal(
            promotion,
            ctx,
            format!("previous tag {previous} failed its verification probe"),
        ));
    }

    let token = match promotion.token.as_ref() {
        Some(token) => token,
        None => {
            let env = promotion.attempt.env;
            return Err(PromoteError::Registry(
                crate::environments::RegistryError::NotLocked(env),
            ));
        }
    };
    ctx.registry.set_current_tag(token, previous.clone())?;

    promotion.attempt.advance(AttemptState::RolledBack);
    promotion.record(ctx.registry)?;

    let mut rolled_back: Promotion<RolledBack> = promotion.transition();
    rolled_back.release_lock(ctx.registry);
    tracing::info!(
        env = %rolled_back.attempt.env,
        tag = %previous,
        "rollback complete"
    );
    Ok(rolled_back)
}

/// A rollback that cannot complete is terminal and never retried.
fn fatal<S, I, P>(
    mut promotion: Promotion<S>,
    ctx: &RollbackContext<'_, I, P>,
    detail: String,
) -> PromoteError
where
    I: InstanceGroupOps + ?Sized,
    P: ProbeOps,
{
    tracing::error!(env = %promotion.attempt.env, "rollback failed: {detail}");
    promotion
        .attempt
        .fail(AttemptState::Failed, format!("rollback failed: {detail}"));
    if let Err(e) = promotion.record(ctx.registry) {
        tracing::warn!("failed to record rollback failure: {e}");
    }
    promotion.release_lock(ctx.registry);
    PromoteError::RollbackFailure(detail)
}
