// ABOUTME: Error types for the environment registry.
// ABOUTME: Lock conflicts carry holder info for operator-facing messages.

use chrono::{DateTime, Utc};

use crate::types::EnvId;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The environment already has an in-flight deployment.
    #[error("environment {env} is locked by {holder} (pid {pid}) since {since}")]
    AlreadyLocked {
        env: EnvId,
        holder: String,
        pid: u32,
        since: DateTime<Utc>,
    },

    /// A lock exists but its metadata could not be read back.
    #[error("environment {0} is locked (holder unknown)")]
    AlreadyLockedOpaque(EnvId),

    #[error("environment {0} is not locked")]
    NotLocked(EnvId),

    #[error("lock token does not match the lock held on {0}")]
    TokenMismatch(EnvId),

    #[error("tag {tag} is scoped to {tag_env}, not {env}")]
    TagScopeMismatch {
        env: EnvId,
        tag_env: EnvId,
        tag: String,
    },

    #[error("deployment attempt {0} not found")]
    UnknownAttempt(u64),

    #[error("deployment attempt {0} already reached a terminal state")]
    AttemptSealed(u64),

    #[error("state file corrupted: {0}")]
    CorruptState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    /// Whether this error is a lock conflict the caller may retry later.
    pub fn is_lock_conflict(&self) -> bool {
        matches!(
            self,
            RegistryError::AlreadyLocked { .. } | RegistryError::AlreadyLockedOpaque(_)
        )
    }
}
