// ABOUTME: Shared fake collaborators for integration tests.
// ABOUTME: In-memory artifact registry, instance groups, probe, and routing.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use anodos::artifacts::{
    ArtifactBuilder, ArtifactError, ArtifactRegistryOps, BuildError, PushOutcome, TagEntry,
};
use anodos::config::{Config, HealthPolicy, StatusRange};
use anodos::instances::{InstanceGroupError, InstanceGroupOps, InstanceInfo};
use anodos::routing::{RoutingError, RoutingOps};
use anodos::types::{ArtifactTag, CommitRef, Digest, EnvId};

/// Deterministic digest derived from the pushed reference.
pub fn fake_digest(seed: &str) -> Digest {
    let mut hex = String::with_capacity(64);
    for (i, byte) in seed.bytes().cycle().take(32).enumerate() {
        hex.push_str(&format!("{:02x}", byte.wrapping_add(i as u8)));
    }
    Digest::parse(&format!("sha256:{hex}")).expect("generated digest is well-formed")
}

pub fn commit(sha: &str) -> CommitRef {
    CommitRef::parse(sha).expect("test commit is valid")
}

/// A health policy with test-friendly timings.
pub fn fast_policy() -> HealthPolicy {
    HealthPolicy {
        path: "/health".to_string(),
        status: StatusRange { min: 200, max: 299 },
        consecutive_successes: 2,
        failure_threshold: 2,
        interval: Duration::from_millis(5),
        probe_timeout: Duration::from_millis(50),
        timeout: Duration::from_millis(500),
        min_new_fraction: 0.5,
    }
}

/// A config wired for tests: fast health policy, short readiness wait,
/// state under the given directory.
pub fn test_config(state_dir: &std::path::Path) -> Config {
    let mut config = Config::template();
    config.state_dir = Some(state_dir.to_path_buf());
    config.health = fast_policy();
    config.readiness_timeout = Duration::from_millis(200);
    config
}

// =============================================================================
// Artifact registry + builder
// =============================================================================

#[derive(Default)]
pub struct FakeArtifacts {
    pub tags: Mutex<Vec<(ArtifactTag, Digest)>>,
    pub fail_push: Mutex<bool>,
    pub pushes: Mutex<u32>,
}

impl FakeArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(self, tag: &str) -> Self {
        let tag = ArtifactTag::parse(tag).expect("test tag is valid");
        let digest = fake_digest(tag.as_str());
        self.tags.lock().push((tag, digest));
        self
    }

    pub fn set_fail_push(&self, fail: bool) {
        *self.fail_push.lock() = fail;
    }

    pub fn digest_of(&self, tag: &str) -> Option<Digest> {
        self.tags
            .lock()
            .iter()
            .find(|(t, _)| t.as_str() == tag)
            .map(|(_, d)| d.clone())
    }
}

#[async_trait]
impl ArtifactRegistryOps for FakeArtifacts {
    async fn push(
        &self,
        local_ref: &str,
        tag: &ArtifactTag,
    ) -> Result<PushOutcome, ArtifactError> {
        if *self.fail_push.lock() {
            return Err(ArtifactError::PushFailed {
                tag: tag.to_string(),
                message: "registry rejected push".to_string(),
            });
        }

        let digest = fake_digest(local_ref);
        let mut tags = self.tags.lock();
        if let Some((_, existing)) = tags.iter().find(|(t, _)| t == tag) {
            if *existing == digest {
                return Ok(PushOutcome::AlreadyPresent(existing.clone()));
            }
            // Tags are immutable once pushed.
            return Err(ArtifactError::PushFailed {
                tag: tag.to_string(),
                message: "tag already points at a different digest".to_string(),
            });
        }
        tags.push((tag.clone(), digest.clone()));
        *self.pushes.lock() += 1;
        Ok(PushOutcome::Pushed(digest))
    }

    async fn tag_exists(&self, tag: &ArtifactTag) -> Result<bool, ArtifactError> {
        Ok(self.tags.lock().iter().any(|(t, _)| t == tag))
    }

    async fn list_tags(&self, prefix: &str) -> Result<Vec<TagEntry>, ArtifactError> {
        let tags = self.tags.lock();
        Ok(tags
            .iter()
            .rev()
            .filter(|(t, _)| t.as_str().starts_with(prefix))
            .map(|(t, d)| TagEntry {
                tag: t.clone(),
                digest: Some(d.clone()),
                created_at: None,
            })
            .collect())
    }
}

#[derive(Default)]
pub struct FakeBuilder {
    pub fail: bool,
}

impl FakeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl ArtifactBuilder for FakeBuilder {
    async fn build(&self, commit: &CommitRef) -> Result<String, BuildError> {
        if self.fail {
            return Err(BuildError::Spawn("compiler exploded".to_string()));
        }
        Ok(format!("app:{}", commit.short()))
    }
}

// =============================================================================
// Instance groups
// =============================================================================

pub struct FakeInstances {
    groups: Mutex<HashMap<String, Vec<InstanceInfo>>>,
    /// When true, a roll-forward immediately registers new-tag instances.
    pub converge: Mutex<bool>,
    pub rolls: Mutex<Vec<(String, ArtifactTag)>>,
    pub fail_roll_forward: Mutex<bool>,
}

impl FakeInstances {
    pub fn new() -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            converge: Mutex::new(true),
            rolls: Mutex::new(Vec::new()),
            fail_roll_forward: Mutex::new(false),
        }
    }

    pub fn set_converge(&self, converge: bool) {
        *self.converge.lock() = converge;
    }

    pub fn set_fail_roll_forward(&self, fail: bool) {
        *self.fail_roll_forward.lock() = fail;
    }

    pub fn set_instances(&self, group: &str, instances: Vec<InstanceInfo>) {
        self.groups.lock().insert(group.to_string(), instances);
    }

    pub fn running(tag: &ArtifactTag, count: usize) -> Vec<InstanceInfo> {
        (0..count)
            .map(|i| InstanceInfo {
                id: format!("i-{i:04}"),
                tag: Some(tag.clone()),
                registered: true,
                // The tag in the address lets probes discriminate by fleet.
                address: format!("http://{}-{}.internal:8000", tag, i + 1),
            })
            .collect()
    }

    pub fn rolls_to(&self, tag: &str) -> usize {
        self.rolls
            .lock()
            .iter()
            .filter(|(_, t)| t.as_str() == tag)
            .count()
    }
}

#[async_trait]
impl InstanceGroupOps for FakeInstances {
    async fn roll_forward(
        &self,
        group: &str,
        tag: &ArtifactTag,
    ) -> Result<(), InstanceGroupError> {
        if *self.fail_roll_forward.lock() {
            return Err(InstanceGroupError::RollForwardRejected(
                "provisioner refused".to_string(),
            ));
        }
        self.rolls.lock().push((group.to_string(), tag.clone()));
        if *self.converge.lock() {
            self.groups
                .lock()
                .insert(group.to_string(), Self::running(tag, 2));
        }
        Ok(())
    }

    async fn instances(&self, group: &str) -> Result<Vec<InstanceInfo>, InstanceGroupError> {
        Ok(self.groups.lock().get(group).cloned().unwrap_or_default())
    }
}

// =============================================================================
// Health probe
// =============================================================================

pub struct FakeProbe {
    /// Statuses consumed in order; the default answers afterwards.
    script: Mutex<VecDeque<u16>>,
    /// Address-substring overrides, checked before the script.
    rules: Mutex<Vec<(String, u16)>>,
    default: u16,
    pub probes: Mutex<u32>,
    pub seen: Mutex<Vec<String>>,
}

impl FakeProbe {
    fn with_default(default: u16) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            rules: Mutex::new(Vec::new()),
            default,
            probes: Mutex::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn healthy() -> Self {
        Self::with_default(200)
    }

    pub fn unhealthy() -> Self {
        Self::with_default(503)
    }

    pub fn scripted(statuses: &[u16], default: u16) -> Self {
        let probe = Self::with_default(default);
        *probe.script.lock() = statuses.iter().copied().collect();
        probe
    }

    /// Answer `status` for any address containing `needle`.
    pub fn rule(&self, needle: &str, status: u16) {
        self.rules.lock().push((needle.to_string(), status));
    }
}

#[async_trait]
impl anodos::health::ProbeOps for FakeProbe {
    async fn probe(
        &self,
        base_url: &str,
        _path: &str,
    ) -> Result<u16, anodos::health::ProbeError> {
        *self.probes.lock() += 1;
        self.seen.lock().push(base_url.to_string());

        if let Some((_, status)) = self
            .rules
            .lock()
            .iter()
            .find(|(needle, _)| base_url.contains(needle))
        {
            return Ok(*status);
        }
        Ok(self.script.lock().pop_front().unwrap_or(self.default))
    }
}

// =============================================================================
// Routing
// =============================================================================

pub struct FakeRouting {
    pub active: Mutex<EnvId>,
    pub atomic: bool,
    pub fail_rebind: Mutex<bool>,
    /// Every weight pair the boundary was asked to apply, in order.
    pub weight_log: Mutex<Vec<(u32, u32)>>,
    pub rebinds: Mutex<u32>,
}

impl FakeRouting {
    pub fn new(active: EnvId) -> Self {
        Self {
            active: Mutex::new(active),
            atomic: true,
            fail_rebind: Mutex::new(false),
            weight_log: Mutex::new(Vec::new()),
            rebinds: Mutex::new(0),
        }
    }

    pub fn weighted(active: EnvId) -> Self {
        Self {
            atomic: false,
            ..Self::new(active)
        }
    }

    pub fn set_fail_rebind(&self, fail: bool) {
        *self.fail_rebind.lock() = fail;
    }
}

#[async_trait]
impl RoutingOps for FakeRouting {
    fn atomic_rebind_supported(&self) -> bool {
        self.atomic
    }

    async fn rebind(&self, _alias: &str, to: EnvId) -> Result<(), RoutingError> {
        if *self.fail_rebind.lock() {
            return Err(RoutingError::Rejected("listener update in progress".to_string()));
        }
        *self.rebinds.lock() += 1;
        *self.active.lock() = to;
        Ok(())
    }

    async fn set_weights(&self, _alias: &str, blue: u32, green: u32) -> Result<(), RoutingError> {
        self.weight_log.lock().push((blue, green));
        // The alias resolves to whichever side carries weight; with both
        // weighted it stays observable on the previous side until drained.
        let mut active = self.active.lock();
        *active = match (blue, green) {
            (0, _) => EnvId::Green,
            (_, 0) => EnvId::Blue,
            _ => *active,
        };
        Ok(())
    }

    async fn active_target(&self, _alias: &str) -> Result<EnvId, RoutingError> {
        Ok(*self.active.lock())
    }
}
