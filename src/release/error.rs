// ABOUTME: Error taxonomy for promotion attempts.
// ABOUTME: Kinds map to the operator surface's result codes.

use chrono::{DateTime, Utc};

use crate::environments::RegistryError;
use crate::types::EnvId;

/// Everything that can terminate a promotion attempt abnormally.
#[derive(Debug, thiserror::Error)]
pub enum PromoteError {
    /// The build step yielded no artifact. Terminal; nothing changed,
    /// so no rollback is needed.
    #[error("build produced no artifact: {0}")]
    BuildFailure(String),

    /// The registry rejected the push. Terminal; retried only by a
    /// fresh trigger.
    #[error("artifact push failed: {0}")]
    PushFailure(String),

    /// The environment already has an in-flight deployment. The event
    /// is dropped, never queued.
    #[error("environment {env} is busy: locked by {holder} (pid {pid}) since {since}")]
    LockConflict {
        env: EnvId,
        holder: String,
        pid: u32,
        since: DateTime<Utc>,
    },

    #[error("no mapping rule matches ref {0}")]
    UnmappedRef(String),

    #[error("tag {tag} is scoped to {tag_env}, not {env}")]
    TagScope {
        env: EnvId,
        tag_env: EnvId,
        tag: String,
    },

    #[error("unknown tag: {0}")]
    UnknownTag(String),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    /// Health gate returned Fail. Triggers mandatory rollback.
    #[error("health check failed: {0}")]
    HealthCheckFail(String),

    /// Health gate (or a readiness wait) exceeded its deadline.
    /// Triggers mandatory rollback.
    #[error("health check timed out after {0} seconds")]
    HealthCheckTimeout(u64),

    /// The traffic switch boundary refused the rebind. Fatal: stale
    /// routing is unsafe to auto-resolve, so no rollback is attempted.
    #[error("traffic swap refused: {0}")]
    SwapConflict(String),

    /// A rollback failed. Fatal; never retried automatically, to
    /// bound cascading failures.
    #[error("rollback failed: {0}; manual intervention required")]
    RollbackFailure(String),

    /// A boundary system (provisioner, routing, registry daemon)
    /// answered with an error.
    #[error("boundary system error: {0}")]
    Upstream(String),

    /// Local registry/state failure.
    #[error("environment registry error: {0}")]
    Registry(RegistryError),
}

/// Coarse classification for exit codes and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteErrorKind {
    /// Lock held; the caller may re-send the trigger later.
    Conflict,
    /// Unknown tag, environment, or unmapped ref.
    NotFound,
    /// A boundary system failed, or the deployed artifact failed its
    /// gate; not retried internally.
    Upstream,
    /// Local state error.
    Internal,
}

impl PromoteError {
    pub fn kind(&self) -> PromoteErrorKind {
        match self {
            PromoteError::LockConflict { .. } => PromoteErrorKind::Conflict,
            PromoteError::UnmappedRef(_)
            | PromoteError::UnknownTag(_)
            | PromoteError::UnknownEnvironment(_)
            | PromoteError::TagScope { .. } => PromoteErrorKind::NotFound,
            PromoteError::BuildFailure(_)
            | PromoteError::PushFailure(_)
            | PromoteError::HealthCheckFail(_)
            | PromoteError::HealthCheckTimeout(_)
            | PromoteError::SwapConflict(_)
            | PromoteError::RollbackFailure(_)
            | PromoteError::Upstream(_) => PromoteErrorKind::Upstream,
            PromoteError::Registry(e) if e.is_lock_conflict() => PromoteErrorKind::Conflict,
            PromoteError::Registry(_) => PromoteErrorKind::Internal,
        }
    }
}

impl From<RegistryError> for PromoteError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AlreadyLocked {
                env,
                holder,
                pid,
                since,
            } => PromoteError::LockConflict {
                env,
                holder,
                pid,
                since,
            },
            other => PromoteError::Registry(other),
        }
    }
}
