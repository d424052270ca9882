// ABOUTME: DeploymentAttempt audit record and its lifecycle states.
// ABOUTME: Immutable once terminal; persisted by the environment registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ArtifactTag, EnvId};

/// Lifecycle state of one promotion try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptState {
    Pending,
    Building,
    Pushed,
    Deploying,
    HealthChecking,
    Promoted,
    Failed,
    RollingBack,
    RolledBack,
}

impl AttemptState {
    /// States after which the attempt record never changes again.
    /// `Failed` is special-cased by the registry: it may still move to
    /// `RollingBack` (rollback is mandatory after a health failure), but
    /// nothing else.
    pub fn is_sealed(&self) -> bool {
        matches!(self, AttemptState::Promoted | AttemptState::RolledBack)
    }

    /// Whether a deployment is currently mutating the environment.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            AttemptState::Pending
                | AttemptState::Building
                | AttemptState::Pushed
                | AttemptState::Deploying
                | AttemptState::HealthChecking
                | AttemptState::RollingBack
        )
    }
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttemptState::Pending => "pending",
            AttemptState::Building => "building",
            AttemptState::Pushed => "pushed",
            AttemptState::Deploying => "deploying",
            AttemptState::HealthChecking => "health-checking",
            AttemptState::Promoted => "promoted",
            AttemptState::Failed => "failed",
            AttemptState::RollingBack => "rolling-back",
            AttemptState::RolledBack => "rolled-back",
        };
        f.write_str(s)
    }
}

/// One recorded health-probe round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub at: DateTime<Utc>,
    pub healthy: bool,
    pub detail: String,
}

/// One promotion try against a single environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentAttempt {
    pub id: u64,
    pub env: EnvId,
    pub tag: ArtifactTag,
    /// The environment's tag when this attempt started; rollback target.
    pub previous: Option<ArtifactTag>,
    pub state: AttemptState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Health-check verdict history, oldest first.
    pub verdicts: Vec<VerdictRecord>,
    /// Context for a terminal failure, if any.
    pub failure: Option<String>,
}

impl DeploymentAttempt {
    pub fn new(id: u64, env: EnvId, tag: ArtifactTag, previous: Option<ArtifactTag>) -> Self {
        Self {
            id,
            env,
            tag,
            previous,
            state: AttemptState::Pending,
            started_at: Utc::now(),
            finished_at: None,
            verdicts: Vec::new(),
            failure: None,
        }
    }

    pub fn advance(&mut self, state: AttemptState) {
        self.state = state;
        if state.is_sealed() || state == AttemptState::Failed {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn record_verdict(&mut self, healthy: bool, detail: impl Into<String>) {
        self.verdicts.push(VerdictRecord {
            at: Utc::now(),
            healthy,
            detail: detail.into(),
        });
    }

    pub fn fail(&mut self, state: AttemptState, context: impl Into<String>) {
        self.failure = Some(context.into());
        self.advance(state);
    }
}
