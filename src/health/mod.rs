// ABOUTME: Health gate: polls new-tag instances until a pass/fail/timeout verdict.
// ABOUTME: Requires a minimum fraction of the group on the new tag before judging.

mod probe;

pub use probe::{HyperProbe, ProbeError, ProbeOps};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::HealthPolicy;
use crate::instances::InstanceGroupOps;
use crate::types::ArtifactTag;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("instance group query failed during health check: {0}")]
    Upstream(String),
}

/// Final verdict of one gate run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    Timeout,
}

/// One recorded probe round across the new-tag instances.
#[derive(Debug, Clone)]
pub struct ProbeRound {
    pub at: DateTime<Utc>,
    pub healthy: bool,
    pub detail: String,
}

/// A completed gate run: the verdict plus the full round history for
/// the attempt's audit record.
#[derive(Debug)]
pub struct GateOutcome {
    pub verdict: Verdict,
    pub rounds: Vec<ProbeRound>,
}

/// Decides whether a freshly deployed environment is fit for traffic.
///
/// The gate probes the *new* instances specifically, never an average
/// over the whole fleet: during a rolling update old healthy instances
/// would otherwise mask a failed rollout.
pub struct HealthGate<P> {
    probe: P,
}

impl<P: ProbeOps> HealthGate<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    /// Poll until the policy's consecutive-success count is reached,
    /// its failure threshold trips, or the deadline elapses.
    pub async fn check<I: InstanceGroupOps + ?Sized>(
        &self,
        instances: &I,
        group: &str,
        tag: &ArtifactTag,
        policy: &HealthPolicy,
    ) -> Result<GateOutcome, GateError> {
        let deadline = tokio::time::Instant::now() + policy.timeout;
        let mut rounds: Vec<ProbeRound> = Vec::new();
        let mut consecutive_ok: u32 = 0;
        let mut consecutive_fail: u32 = 0;

        loop {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(%group, %tag, "health gate timed out");
                return Ok(GateOutcome {
                    verdict: Verdict::Timeout,
                    rounds,
                });
            }

            let listed = instances
                .instances(group)
                .await
                .map_err(|e| GateError::Upstream(e.to_string()))?;
            let total = listed.len();
            let fresh: Vec<_> = listed
                .iter()
                .filter(|i| i.registered && i.tag.as_ref() == Some(tag))
                .collect();

            let fraction = if total == 0 {
                0.0
            } else {
                fresh.len() as f64 / total as f64
            };

            if fraction < policy.min_new_fraction {
                // Not enough of the fleet on the new tag yet; no verdict
                // can be trusted, so this round does not count either way.
                tracing::debug!(
                    %group,
                    %tag,
                    fresh = fresh.len(),
                    total,
                    "waiting for rollout before judging"
                );
                rounds.push(ProbeRound {
                    at: Utc::now(),
                    healthy: false,
                    detail: format!("rollout at {}/{} instances on {}", fresh.len(), total, tag),
                });
                self.sleep_bounded(deadline, policy).await;
                continue;
            }

            let (healthy, detail) = self.probe_round(&fresh, policy).await;
            rounds.push(ProbeRound {
                at: Utc::now(),
                healthy,
                detail,
            });

            if healthy {
                consecutive_ok += 1;
                consecutive_fail = 0;
                if consecutive_ok >= policy.consecutive_successes {
                    tracing::info!(%group, %tag, rounds = rounds.len(), "health gate passed");
                    return Ok(GateOutcome {
                        verdict: Verdict::Pass,
                        rounds,
                    });
                }
            } else {
                consecutive_fail += 1;
                consecutive_ok = 0;
                if consecutive_fail >= policy.failure_threshold {
                    tracing::warn!(%group, %tag, "health gate failed");
                    return Ok(GateOutcome {
                        verdict: Verdict::Fail,
                        rounds,
                    });
                }
            }

            self.sleep_bounded(deadline, policy).await;
        }
    }

    /// The reduced gate used after a rollback: a single verdict with no
    /// retries, so a broken rollback cannot flap.
    pub async fn check_once<I: InstanceGroupOps + ?Sized>(
        &self,
        instances: &I,
        group: &str,
        tag: &ArtifactTag,
        policy: &HealthPolicy,
    ) -> Result<GateOutcome, GateError> {
        self.check(instances, group, tag, &policy.reduced()).await
    }

    /// Probe every new-tag instance once; the round succeeds only if
    /// all of them answer within range.
    async fn probe_round(
        &self,
        fresh: &[&crate::instances::InstanceInfo],
        policy: &HealthPolicy,
    ) -> (bool, String) {
        for instance in fresh {
            let result = tokio::time::timeout(
                policy.probe_timeout,
                self.probe.probe(&instance.address, &policy.path),
            )
            .await;

            match result {
                Ok(Ok(status)) if policy.status.contains(status) => {}
                Ok(Ok(status)) => {
                    return (
                        false,
                        format!("instance {} answered {}", instance.id, status),
                    );
                }
                Ok(Err(e)) => {
                    return (false, format!("instance {} unreachable: {}", instance.id, e));
                }
                Err(_) => {
                    return (false, format!("instance {} probe timed out", instance.id));
                }
            }
        }
        (true, format!("{} instance(s) healthy", fresh.len()))
    }

    async fn sleep_bounded(&self, deadline: tokio::time::Instant, policy: &HealthPolicy) {
        let next = tokio::time::Instant::now() + policy.interval;
        tokio::time::sleep_until(next.min(deadline)).await;
    }
}
