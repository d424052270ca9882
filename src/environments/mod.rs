// ABOUTME: Environment registry: the single serialization point for deployments.
// ABOUTME: Per-environment locks, current tags, traffic route, attempt audit log.

mod error;
mod lock;
mod state;

pub use error::RegistryError;
pub use lock::{LockInfo, LockToken};
pub use state::{EnvState, PersistedState};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::release::{AttemptState, DeploymentAttempt};
use crate::types::{ArtifactTag, EnvId, EnvRole};

use self::lock::{read_lock_file, try_create_lock_file};
use self::state::{load_state, save_state};

/// Point-in-time view of one environment, for the operator surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EnvironmentStatus {
    pub env: EnvId,
    pub role: EnvRole,
    pub current_tag: Option<ArtifactTag>,
    pub locked_by: Option<LockInfo>,
    /// Whether the routing alias points here. Always false for staging.
    pub live: bool,
    pub last_attempt: Option<DeploymentAttempt>,
}

struct HeldLock {
    id: u64,
    info: LockInfo,
}

struct Inner {
    state: PersistedState,
    held: HashMap<EnvId, HeldLock>,
    next_token: u64,
}

/// Holds the declarative environment set and serializes deployments
/// per environment. Independent environments deploy concurrently; a
/// single environment's attempts are strictly ordered by its lock.
pub struct EnvironmentRegistry {
    state_dir: PathBuf,
    inner: Mutex<Inner>,
}

impl EnvironmentRegistry {
    /// Open (or initialize) the registry under the given state directory.
    pub fn open(state_dir: &Path, initial_active: EnvId) -> Result<Self, RegistryError> {
        std::fs::create_dir_all(state_dir)?;
        let state = load_state(state_dir, initial_active)?;
        save_state(state_dir, &state)?;
        Ok(Self {
            state_dir: state_dir.to_path_buf(),
            inner: Mutex::new(Inner {
                state,
                held: HashMap::new(),
                next_token: 1,
            }),
        })
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Acquire the deployment lock for an environment.
    ///
    /// Conflicts are not queued: the caller gets the holder's identity
    /// and must retry after the in-flight attempt terminates. Stale
    /// locks (over an hour old) are broken with a warning; `force`
    /// breaks any lock.
    pub fn acquire_lock(&self, env: EnvId, force: bool) -> Result<LockToken, RegistryError> {
        let mut inner = self.inner.lock();

        match inner.held.get(&env) {
            Some(held) if !force => {
                return Err(RegistryError::AlreadyLocked {
                    env,
                    holder: held.info.holder.clone(),
                    pid: held.info.pid,
                    since: held.info.started_at,
                });
            }
            Some(_) => {
                tracing::warn!(%env, "force-breaking in-process lock");
                inner.held.remove(&env);
                let _ = std::fs::remove_file(LockInfo::lock_path(&self.state_dir, env));
            }
            None => {}
        }

        let info = LockInfo::new(env);
        let path = LockInfo::lock_path(&self.state_dir, env);

        if !try_create_lock_file(&path, &info)? {
            let should_break = match read_lock_file(&path) {
                Some(existing) if force => {
                    tracing::warn!(
                        %env,
                        holder = %existing.holder,
                        pid = existing.pid,
                        "breaking lock held since {}",
                        existing.started_at
                    );
                    true
                }
                Some(existing) if existing.is_stale() => {
                    tracing::warn!(
                        %env,
                        holder = %existing.holder,
                        pid = existing.pid,
                        "auto-breaking stale lock held since {}",
                        existing.started_at
                    );
                    true
                }
                Some(existing) => {
                    return Err(RegistryError::AlreadyLocked {
                        env,
                        holder: existing.holder,
                        pid: existing.pid,
                        since: existing.started_at,
                    });
                }
                None => {
                    tracing::warn!(%env, "lock info unreadable, breaking lock");
                    true
                }
            };

            if !should_break {
                return Err(RegistryError::AlreadyLockedOpaque(env));
            }

            std::fs::remove_file(&path)?;
            if !try_create_lock_file(&path, &info)? {
                return Err(RegistryError::AlreadyLockedOpaque(env));
            }
        }

        let id = inner.next_token;
        inner.next_token += 1;
        inner.held.insert(env, HeldLock { id, info });

        Ok(LockToken { env, id })
    }

    /// Release a held lock. The token is consumed.
    pub fn release_lock(&self, token: LockToken) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        let held_id = match inner.held.get(&token.env) {
            Some(held) => held.id,
            None => return Err(RegistryError::NotLocked(token.env)),
        };
        if held_id != token.id {
            return Err(RegistryError::TokenMismatch(token.env));
        }
        inner.held.remove(&token.env);
        drop(inner);
        std::fs::remove_file(LockInfo::lock_path(&self.state_dir, token.env))?;
        Ok(())
    }

    pub fn current_tag(&self, env: EnvId) -> Option<ArtifactTag> {
        let inner = self.inner.lock();
        inner.state.env(env).and_then(|e| e.current_tag.clone())
    }

    /// Bind an environment to a new tag. Only callable while holding
    /// that environment's lock.
    pub fn set_current_tag(
        &self,
        token: &LockToken,
        tag: ArtifactTag,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        self.verify_token(&inner, token)?;
        self.verify_scope(token.env, &tag)?;
        inner.state.env_mut(token.env).current_tag = Some(tag);
        save_state(&self.state_dir, &inner.state)
    }

    /// Which environment the live routing alias points at.
    pub fn active_env(&self) -> EnvId {
        self.inner.lock().state.active
    }

    /// Record a completed swap of the routing alias.
    pub fn set_active_env(&self, env: EnvId) -> Result<(), RegistryError> {
        debug_assert!(env.in_live_pair());
        let mut inner = self.inner.lock();
        inner.state.active = env;
        save_state(&self.state_dir, &inner.state)
    }

    /// Open a new DeploymentAttempt for the locked environment,
    /// capturing the current tag as the rollback target.
    pub fn new_attempt(
        &self,
        token: &LockToken,
        tag: ArtifactTag,
    ) -> Result<DeploymentAttempt, RegistryError> {
        let mut inner = self.inner.lock();
        self.verify_token(&inner, token)?;
        self.verify_scope(token.env, &tag)?;

        let previous = inner
            .state
            .env(token.env)
            .and_then(|e| e.current_tag.clone());
        let id = inner.state.next_attempt_id;
        inner.state.next_attempt_id += 1;

        let attempt = DeploymentAttempt::new(id, token.env, tag, previous);
        inner.state.attempts.push(attempt.clone());
        save_state(&self.state_dir, &inner.state)?;
        Ok(attempt)
    }

    /// Persist an attempt's new state. Attempts in a terminal state are
    /// immutable, with one exception: `Failed` may move to `RollingBack`
    /// because rollback is mandatory after a health failure.
    pub fn update_attempt(&self, attempt: &DeploymentAttempt) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        let stored = inner
            .state
            .attempts
            .iter_mut()
            .find(|a| a.id == attempt.id)
            .ok_or(RegistryError::UnknownAttempt(attempt.id))?;

        if stored.state.is_sealed() {
            return Err(RegistryError::AttemptSealed(attempt.id));
        }
        if stored.state == AttemptState::Failed && attempt.state != AttemptState::RollingBack {
            return Err(RegistryError::AttemptSealed(attempt.id));
        }

        *stored = attempt.clone();
        save_state(&self.state_dir, &inner.state)
    }

    pub fn latest_attempt(&self, env: EnvId) -> Option<DeploymentAttempt> {
        let inner = self.inner.lock();
        inner
            .state
            .attempts
            .iter()
            .rev()
            .find(|a| a.env == env)
            .cloned()
    }

    pub fn attempt_history(&self, env: EnvId) -> Vec<DeploymentAttempt> {
        let inner = self.inner.lock();
        inner
            .state
            .attempts
            .iter()
            .filter(|a| a.env == env)
            .cloned()
            .collect()
    }

    pub fn status(&self, env: EnvId) -> EnvironmentStatus {
        let inner = self.inner.lock();
        // Another process may hold the lock; the lock file is the truth.
        let locked_by = inner
            .held
            .get(&env)
            .map(|h| h.info.clone())
            .or_else(|| read_lock_file(&LockInfo::lock_path(&self.state_dir, env)));
        EnvironmentStatus {
            env,
            role: env.role(),
            current_tag: inner.state.env(env).and_then(|e| e.current_tag.clone()),
            locked_by,
            live: env.in_live_pair() && inner.state.active == env,
            last_attempt: inner
                .state
                .attempts
                .iter()
                .rev()
                .find(|a| a.env == env)
                .cloned(),
        }
    }

    fn verify_token(&self, inner: &Inner, token: &LockToken) -> Result<(), RegistryError> {
        match inner.held.get(&token.env) {
            Some(held) if held.id == token.id => Ok(()),
            Some(_) => Err(RegistryError::TokenMismatch(token.env)),
            None => Err(RegistryError::NotLocked(token.env)),
        }
    }

    fn verify_scope(&self, env: EnvId, tag: &ArtifactTag) -> Result<(), RegistryError> {
        if tag.env() != env {
            return Err(RegistryError::TagScopeMismatch {
                env,
                tag_env: tag.env(),
                tag: tag.as_str().to_string(),
            });
        }
        Ok(())
    }
}
