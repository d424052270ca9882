// ABOUTME: Health gate verdict behavior against scripted probes.
// ABOUTME: Consecutive-success counting, failure threshold, timeout, fleet fraction.

mod support;

use std::time::Duration;

use anodos::health::{HealthGate, Verdict};
use anodos::instances::InstanceInfo;
use anodos::types::ArtifactTag;

use support::{FakeInstances, FakeProbe, fast_policy};

fn new_tag() -> ArtifactTag {
    ArtifactTag::parse("staging-abc123def456").unwrap()
}

fn old_tag() -> ArtifactTag {
    ArtifactTag::parse("staging-fedcba654321").unwrap()
}

/// One registered instance already on the new tag.
fn converged(tag: &ArtifactTag) -> FakeInstances {
    let instances = FakeInstances::new();
    instances.set_instances("app-staging", FakeInstances::running(tag, 1));
    instances
}

/// With requiredConsecutiveSuccesses = 3, a pass-fail-pass prefix must
/// not produce Pass; only three uninterrupted successes do.
#[tokio::test]
async fn interrupted_successes_reset_the_counter() {
    let tag = new_tag();
    let instances = converged(&tag);
    let mut policy = fast_policy();
    policy.consecutive_successes = 3;
    policy.failure_threshold = 5;

    let gate = HealthGate::new(FakeProbe::scripted(&[200, 500, 200, 200, 200], 200));
    let outcome = gate
        .check(&instances, "app-staging", &tag, &policy)
        .await
        .unwrap();

    assert_eq!(outcome.verdict, Verdict::Pass);
    // Round 2 failed, so the pass lands on round 5, not round 4.
    assert_eq!(outcome.rounds.len(), 5);
    assert!(!outcome.rounds[1].healthy);
}

#[tokio::test]
async fn consecutive_failures_trip_the_threshold() {
    let tag = new_tag();
    let instances = converged(&tag);
    let mut policy = fast_policy();
    policy.failure_threshold = 2;

    let gate = HealthGate::new(FakeProbe::unhealthy());
    let outcome = gate
        .check(&instances, "app-staging", &tag, &policy)
        .await
        .unwrap();

    assert_eq!(outcome.verdict, Verdict::Fail);
    assert_eq!(outcome.rounds.len(), 2);
}

/// A fleet that never reaches the minimum new-tag fraction yields
/// Timeout without a single probe: old healthy instances must not be
/// allowed to vouch for a stalled rollout.
#[tokio::test]
async fn stalled_rollout_times_out_unjudged() {
    let tag = new_tag();
    let old = old_tag();
    let instances = FakeInstances::new();
    let mut fleet = FakeInstances::running(&old, 3);
    fleet.extend(FakeInstances::running(&tag, 1));
    instances.set_instances("app-staging", fleet);

    let mut policy = fast_policy();
    policy.min_new_fraction = 0.5;
    policy.timeout = Duration::from_millis(50);

    let probe = FakeProbe::healthy();
    let gate = HealthGate::new(probe);
    let outcome = gate
        .check(&instances, "app-staging", &tag, &policy)
        .await
        .unwrap();

    assert_eq!(outcome.verdict, Verdict::Timeout);
    // Rounds only narrate rollout progress; nothing was probed.
    assert!(outcome.rounds.iter().all(|r| !r.healthy));
}

/// Once the fraction is met, only new-tag instances are probed.
#[tokio::test]
async fn only_new_instances_are_probed() {
    let tag = new_tag();
    let old = old_tag();
    let instances = FakeInstances::new();
    let mut fleet = FakeInstances::running(&old, 2);
    fleet.extend(FakeInstances::running(&tag, 2));
    instances.set_instances("app-staging", fleet);

    // Old instances would answer 500 if anyone asked them.
    let probe = FakeProbe::healthy();
    probe.rule(old.as_str(), 500);
    let gate = HealthGate::new(&probe);

    let outcome = gate
        .check(&instances, "app-staging", &tag, &fast_policy())
        .await
        .unwrap();

    assert_eq!(outcome.verdict, Verdict::Pass);
    let seen = probe.seen.lock().clone();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|addr| addr.contains(tag.as_str())));
}

/// An unregistered instance on the new tag does not count towards the
/// verdict fraction.
#[tokio::test]
async fn unregistered_instances_do_not_count() {
    let tag = new_tag();
    let instances = FakeInstances::new();
    let mut fleet = vec![InstanceInfo {
        id: "i-0000".to_string(),
        tag: Some(tag.clone()),
        registered: false,
        address: format!("http://{}-0.internal:8000", tag),
    }];
    fleet.extend(FakeInstances::running(&old_tag(), 1));
    instances.set_instances("app-staging", fleet);

    let mut policy = fast_policy();
    policy.timeout = Duration::from_millis(50);

    let gate = HealthGate::new(FakeProbe::healthy());
    let outcome = gate
        .check(&instances, "app-staging", &tag, &policy)
        .await
        .unwrap();

    assert_eq!(outcome.verdict, Verdict::Timeout);
}

/// The reduced rollback gate takes a single verdict, no retries.
#[tokio::test]
async fn reduced_gate_returns_a_single_verdict() {
    let tag = new_tag();
    let instances = converged(&tag);

    let gate = HealthGate::new(FakeProbe::healthy());
    let outcome = gate
        .check_once(&instances, "app-staging", &tag, &fast_policy())
        .await
        .unwrap();
    assert_eq!(outcome.verdict, Verdict::Pass);
    assert_eq!(outcome.rounds.len(), 1);

    let gate = HealthGate::new(FakeProbe::unhealthy());
    let outcome = gate
        .check_once(&instances, "app-staging", &tag, &fast_policy())
        .await
        .unwrap();
    assert_eq!(outcome.verdict, Verdict::Fail);
    assert_eq!(outcome.rounds.len(), 1);
}

/// A probe slower than the per-probe deadline counts as a failed round.
#[tokio::test]
async fn slow_probes_count_as_failures() {
    struct StuckProbe;

    #[async_trait::async_trait]
    impl anodos::health::ProbeOps for StuckProbe {
        async fn probe(
            &self,
            _base_url: &str,
            _path: &str,
        ) -> Result<u16, anodos::health::ProbeError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(200)
        }
    }

    let tag = new_tag();
    let instances = converged(&tag);
    let mut policy = fast_policy();
    policy.probe_timeout = Duration::from_millis(10);
    policy.failure_threshold = 1;

    let gate = HealthGate::new(StuckProbe);
    let outcome = gate
        .check(&instances, "app-staging", &tag, &policy)
        .await
        .unwrap();

    assert_eq!(outcome.verdict, Verdict::Fail);
    assert!(outcome.rounds[0].detail.contains("timed out"));
}
