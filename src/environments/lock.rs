// ABOUTME: Per-environment deploy lock with atomic file creation.
// ABOUTME: Lock info identifies the holder; stale locks auto-break after 1 hour.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::types::EnvId;

/// Information about who holds an environment lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// Environment being deployed.
    pub env: EnvId,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(env: EnvId) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            env,
        }
    }

    /// Check if this lock is stale (older than 1 hour).
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }

    /// Path to the lock file for an environment.
    pub fn lock_path(state_dir: &Path, env: EnvId) -> PathBuf {
        state_dir.join(format!("{env}.lock"))
    }
}

/// Proof of holding an environment's lock. Not clonable; surrendered
/// back to the registry on release.
#[derive(Debug)]
pub struct LockToken {
    pub(crate) env: EnvId,
    pub(crate) id: u64,
}

impl LockToken {
    pub fn env(&self) -> EnvId {
        self.env
    }
}

/// Atomically create the lock file. Returns false if it already exists.
pub(crate) fn try_create_lock_file(path: &Path, info: &LockInfo) -> std::io::Result<bool> {
    let json = serde_json::to_string(info).map_err(std::io::Error::other)?;
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(mut file) => {
            file.write_all(json.as_bytes())?;
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// Read back the holder info from an existing lock file.
/// None if the file is missing or its content is unreadable.
pub(crate) fn read_lock_file(path: &Path) -> Option<LockInfo> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}
