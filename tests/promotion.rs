// ABOUTME: End-to-end promotion scenarios driven through the Coordinator.
// ABOUTME: Fake collaborators replace every boundary system.

mod support;

use anodos::environments::EnvironmentRegistry;
use anodos::health::HealthGate;
use anodos::release::{AttemptState, Coordinator, PromoteError, PromoteErrorKind, TriggerEvent};
use anodos::routing::TrafficSwitch;
use anodos::types::{ArtifactTag, EnvId};

use support::{FakeArtifacts, FakeBuilder, FakeInstances, FakeProbe, FakeRouting, commit, test_config};

const OLD_GREEN: &str = "green-2024-01-01-xyz987";

fn seed_current_tag(registry: &EnvironmentRegistry, env: EnvId, tag: &str) {
    let token = registry.acquire_lock(env, false).expect("seed lock");
    registry
        .set_current_tag(&token, ArtifactTag::parse(tag).expect("seed tag"))
        .expect("seed tag write");
    registry.release_lock(token).expect("seed unlock");
}

/// Scenario: stable-line trigger; build succeeds; health passes after
/// two polls; green ends promoted, live, and bound to the new tag.
#[tokio::test]
async fn stable_line_promotion_goes_live_on_green() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let registry = EnvironmentRegistry::open(dir.path(), EnvId::Green).unwrap();
    seed_current_tag(&registry, EnvId::Green, OLD_GREEN);
    registry.set_active_env(EnvId::Blue).unwrap();

    let builder = FakeBuilder::new();
    let artifacts = FakeArtifacts::new();
    let instances = FakeInstances::new();
    let gate = HealthGate::new(FakeProbe::healthy());
    let switch = TrafficSwitch::new(FakeRouting::new(EnvId::Blue), "app-live");
    let coordinator =
        Coordinator::new(&config, &registry, &builder, &artifacts, &instances, &gate, &switch);

    let trigger = TriggerEvent::new("refs/heads/main", commit("abc123def4567890"));
    let report = coordinator.handle_trigger(trigger).await.expect("promotion succeeds");

    assert_eq!(report.attempt.state, AttemptState::Promoted);
    assert_eq!(report.attempt.env, EnvId::Green);
    let tag = report.attempt.tag.as_str();
    assert!(tag.starts_with("green-") && tag.ends_with("-abc123def456"), "scheme: {tag}");
    assert_eq!(report.attempt.previous.as_ref().unwrap().as_str(), OLD_GREEN);
    // Two consecutive successes required, so at least two verdicts.
    assert!(report.attempt.verdicts.iter().filter(|v| v.healthy).count() >= 2);

    assert_eq!(registry.current_tag(EnvId::Green).unwrap().as_str(), tag);
    assert_eq!(registry.active_env(), EnvId::Green);
    assert_eq!(report.live, EnvId::Green);
    // The lock is free again.
    let token = registry.acquire_lock(EnvId::Green, false).unwrap();
    registry.release_lock(token).unwrap();
}

/// Scenario: same setup but the gate times out; the attempt ends
/// RolledBack, the tag reverts, and no swap is performed.
#[tokio::test]
async fn health_timeout_rolls_green_back_without_swap() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    // Keep both counters out of reach so the deadline decides.
    config.health.consecutive_successes = 1000;
    config.health.failure_threshold = 1000;
    config.health.timeout = std::time::Duration::from_millis(100);
    let registry = EnvironmentRegistry::open(dir.path(), EnvId::Green).unwrap();
    seed_current_tag(&registry, EnvId::Green, OLD_GREEN);
    registry.set_active_env(EnvId::Blue).unwrap();

    let builder = FakeBuilder::new();
    let artifacts = FakeArtifacts::new();
    let instances = FakeInstances::new();
    // The previous tag's instances stay healthy; the new ones never are.
    let probe = FakeProbe::unhealthy();
    probe.rule(OLD_GREEN, 200);
    let gate = HealthGate::new(probe);
    let routing = FakeRouting::new(EnvId::Blue);
    let switch = TrafficSwitch::new(routing, "app-live");
    let coordinator =
        Coordinator::new(&config, &registry, &builder, &artifacts, &instances, &gate, &switch);

    let trigger = TriggerEvent::new("refs/heads/main", commit("abc123def4567890"));
    let err = coordinator.handle_trigger(trigger).await.unwrap_err();
    assert!(matches!(err, PromoteError::HealthCheckTimeout(_)), "got {err}");

    let attempt = registry.latest_attempt(EnvId::Green).unwrap();
    assert_eq!(attempt.state, AttemptState::RolledBack);
    assert_eq!(registry.current_tag(EnvId::Green).unwrap().as_str(), OLD_GREEN);
    // No swap: the alias still points at blue.
    assert_eq!(registry.active_env(), EnvId::Blue);
    assert_eq!(instances.rolls_to(OLD_GREEN), 1);
}

/// Pushing the same digest under the same tag twice is idempotent.
#[tokio::test]
async fn rerunning_a_trigger_does_not_push_twice() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let registry = EnvironmentRegistry::open(dir.path(), EnvId::Green).unwrap();

    let builder = FakeBuilder::new();
    let artifacts = FakeArtifacts::new();
    let instances = FakeInstances::new();
    let gate = HealthGate::new(FakeProbe::healthy());
    let switch = TrafficSwitch::new(FakeRouting::new(EnvId::Green), "app-live");
    let coordinator =
        Coordinator::new(&config, &registry, &builder, &artifacts, &instances, &gate, &switch);

    let trigger = TriggerEvent::new("refs/heads/develop", commit("abc123def4567890"));
    let first = coordinator.handle_trigger(trigger.clone()).await.unwrap();
    let second = coordinator.handle_trigger(trigger).await.unwrap();

    assert_eq!(*artifacts.pushes.lock(), 1, "second push must be a no-op");
    assert_eq!(first.digest, second.digest);
    assert_eq!(second.attempt.state, AttemptState::Promoted);
}

/// Scenario: a second trigger while the first holds the lock is
/// rejected outright, and no new attempt is recorded.
#[tokio::test]
async fn trigger_against_locked_environment_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let registry = EnvironmentRegistry::open(dir.path(), EnvId::Green).unwrap();

    // An in-flight attempt owns staging.
    let held = registry.acquire_lock(EnvId::Staging, false).unwrap();

    let builder = FakeBuilder::new();
    let artifacts = FakeArtifacts::new();
    let instances = FakeInstances::new();
    let gate = HealthGate::new(FakeProbe::healthy());
    let switch = TrafficSwitch::new(FakeRouting::new(EnvId::Green), "app-live");
    let coordinator =
        Coordinator::new(&config, &registry, &builder, &artifacts, &instances, &gate, &switch);

    let trigger = TriggerEvent::new("refs/heads/develop", commit("abc123def4567890"));
    let err = coordinator.handle_trigger(trigger).await.unwrap_err();
    assert_eq!(err.kind(), PromoteErrorKind::Conflict);
    assert!(registry.attempt_history(EnvId::Staging).is_empty());

    // Independent environments still deploy concurrently.
    let trigger = TriggerEvent::new("refs/heads/release/1.2.0", commit("abc123def4567890"));
    let report = coordinator.handle_trigger(trigger).await.unwrap();
    assert_eq!(report.attempt.env, EnvId::Blue);
    assert_eq!(report.attempt.state, AttemptState::Promoted);

    registry.release_lock(held).unwrap();
}

/// A build without an artifact is terminal: nothing deployed, lock
/// released immediately.
#[tokio::test]
async fn build_failure_releases_the_lock_and_deploys_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let registry = EnvironmentRegistry::open(dir.path(), EnvId::Green).unwrap();

    let builder = FakeBuilder::failing();
    let artifacts = FakeArtifacts::new();
    let instances = FakeInstances::new();
    let gate = HealthGate::new(FakeProbe::healthy());
    let switch = TrafficSwitch::new(FakeRouting::new(EnvId::Green), "app-live");
    let coordinator =
        Coordinator::new(&config, &registry, &builder, &artifacts, &instances, &gate, &switch);

    let trigger = TriggerEvent::new("refs/heads/develop", commit("abc123def4567890"));
    let err = coordinator.handle_trigger(trigger).await.unwrap_err();
    assert!(matches!(err, PromoteError::BuildFailure(_)));

    let attempt = registry.latest_attempt(EnvId::Staging).unwrap();
    assert_eq!(attempt.state, AttemptState::Failed);
    assert_eq!(registry.current_tag(EnvId::Staging), None);
    assert!(instances.rolls.lock().is_empty());

    let token = registry.acquire_lock(EnvId::Staging, false).expect("lock released");
    registry.release_lock(token).unwrap();
}

#[tokio::test]
async fn push_failure_is_terminal_without_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let registry = EnvironmentRegistry::open(dir.path(), EnvId::Green).unwrap();

    let builder = FakeBuilder::new();
    let artifacts = FakeArtifacts::new();
    artifacts.set_fail_push(true);
    let instances = FakeInstances::new();
    let gate = HealthGate::new(FakeProbe::healthy());
    let switch = TrafficSwitch::new(FakeRouting::new(EnvId::Green), "app-live");
    let coordinator =
        Coordinator::new(&config, &registry, &builder, &artifacts, &instances, &gate, &switch);

    let trigger = TriggerEvent::new("refs/heads/develop", commit("abc123def4567890"));
    let err = coordinator.handle_trigger(trigger).await.unwrap_err();
    assert!(matches!(err, PromoteError::PushFailure(_)));
    assert!(instances.rolls.lock().is_empty());
    assert_eq!(
        registry.latest_attempt(EnvId::Staging).unwrap().state,
        AttemptState::Failed
    );
}

/// A refused swap is fatal but must not trigger a rollback: the new
/// tag is healthy and live routing never changed.
#[tokio::test]
async fn refused_swap_is_fatal_without_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let registry = EnvironmentRegistry::open(dir.path(), EnvId::Green).unwrap();
    seed_current_tag(&registry, EnvId::Green, OLD_GREEN);
    registry.set_active_env(EnvId::Blue).unwrap();

    let builder = FakeBuilder::new();
    let artifacts = FakeArtifacts::new();
    let instances = FakeInstances::new();
    let gate = HealthGate::new(FakeProbe::healthy());
    let routing = FakeRouting::new(EnvId::Blue);
    routing.set_fail_rebind(true);
    let switch = TrafficSwitch::new(routing, "app-live");
    let coordinator =
        Coordinator::new(&config, &registry, &builder, &artifacts, &instances, &gate, &switch);

    let trigger = TriggerEvent::new("refs/heads/main", commit("abc123def4567890"));
    let err = coordinator.handle_trigger(trigger).await.unwrap_err();
    assert!(matches!(err, PromoteError::SwapConflict(_)));

    let attempt = registry.latest_attempt(EnvId::Green).unwrap();
    assert_eq!(attempt.state, AttemptState::Failed);
    // No rollback roll-forward was issued.
    assert_eq!(instances.rolls_to(OLD_GREEN), 0);
    // The environment binding was never advanced.
    assert_eq!(registry.current_tag(EnvId::Green).unwrap().as_str(), OLD_GREEN);
    assert_eq!(registry.active_env(), EnvId::Blue);
}

/// Blue is an isolated lane: promoting it never touches the alias.
#[tokio::test]
async fn blue_promotion_leaves_the_alias_alone() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let registry = EnvironmentRegistry::open(dir.path(), EnvId::Green).unwrap();

    let builder = FakeBuilder::new();
    let artifacts = FakeArtifacts::new();
    let instances = FakeInstances::new();
    let gate = HealthGate::new(FakeProbe::healthy());
    let routing = FakeRouting::new(EnvId::Green);
    let switch = TrafficSwitch::new(routing, "app-live");
    let coordinator =
        Coordinator::new(&config, &registry, &builder, &artifacts, &instances, &gate, &switch);

    let trigger = TriggerEvent::new("refs/heads/release/2.0.0", commit("abc123def4567890"));
    let report = coordinator.handle_trigger(trigger).await.unwrap();

    assert_eq!(report.attempt.state, AttemptState::Promoted);
    assert_eq!(report.attempt.tag.as_str(), "blue-2.0.0-abc123def456");
    assert_eq!(registry.active_env(), EnvId::Green);
}
