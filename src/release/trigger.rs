// ABOUTME: Trigger events and their deterministic resolution to environment and tag.
// ABOUTME: Pure functions of trigger metadata plus the configured mapping.

use chrono::NaiveDate;
use nonempty::NonEmpty;

use crate::config::{MappingRule, resolve_environment, version_from_ref};
use crate::types::{ArtifactTag, CommitRef, EnvId};

use super::error::PromoteError;

/// A branch push or tag event, as delivered by the forge.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub git_ref: String,
    pub commit: CommitRef,
    /// Operator override; skips the mapping.
    pub env_override: Option<EnvId>,
    /// Operator-supplied tag to promote instead of building one.
    pub explicit_tag: Option<ArtifactTag>,
}

impl TriggerEvent {
    pub fn new(git_ref: &str, commit: CommitRef) -> Self {
        Self {
            git_ref: git_ref.to_string(),
            commit,
            env_override: None,
            explicit_tag: None,
        }
    }

    pub fn with_env(mut self, env: EnvId) -> Self {
        self.env_override = Some(env);
        self
    }

    pub fn with_tag(mut self, tag: ArtifactTag) -> Self {
        self.explicit_tag = Some(tag);
        self
    }
}

/// Resolve the target environment: the override wins, otherwise the
/// first matching mapping rule. An unmatched ref drops the event.
pub fn resolve_target(
    mapping: &NonEmpty<MappingRule>,
    trigger: &TriggerEvent,
) -> Result<EnvId, PromoteError> {
    if let Some(env) = trigger.env_override {
        return Ok(env);
    }
    resolve_environment(mapping.iter(), &trigger.git_ref)
        .ok_or_else(|| PromoteError::UnmappedRef(trigger.git_ref.clone()))
}

/// Compute the environment-scoped tag for this trigger.
///
/// An explicit tag must already be scoped to the target environment.
/// Otherwise: staging tags carry the short commit; blue tags carry the
/// version from the release ref (date-based fallback keeps the tag
/// unique when the ref has no version segment); green tags carry the
/// build date. Every scheme embeds the short commit, which is what
/// guarantees uniqueness across schemes.
pub fn tag_for(
    env: EnvId,
    trigger: &TriggerEvent,
    today: NaiveDate,
) -> Result<ArtifactTag, PromoteError> {
    if let Some(ref tag) = trigger.explicit_tag {
        if tag.env() != env {
            return Err(PromoteError::TagScope {
                env,
                tag_env: tag.env(),
                tag: tag.to_string(),
            });
        }
        return Ok(tag.clone());
    }

    let tag = match env {
        EnvId::Staging => ArtifactTag::staging(&trigger.commit),
        EnvId::Blue => {
            let version = version_from_ref(&trigger.git_ref)
                .unwrap_or_else(|| today.format("%Y-%m-%d").to_string());
            ArtifactTag::blue(&version, &trigger.commit)
                .map_err(|e| PromoteError::UnknownTag(e.to_string()))?
        }
        EnvId::Green => ArtifactTag::green(today, &trigger.commit),
    };
    Ok(tag)
}
