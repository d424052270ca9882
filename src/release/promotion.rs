// ABOUTME: Generic promotion struct parameterized by state marker.
// ABOUTME: Carries the attempt record, lock token, and pushed digest.

use std::marker::PhantomData;

use crate::environments::{EnvironmentRegistry, LockToken};
use crate::types::{ArtifactTag, Digest, EnvId};

use super::attempt::DeploymentAttempt;
use super::error::PromoteError;
use super::state::{Pending, Pushed};

/// A promotion attempt in progress, parameterized by its current state.
///
/// Transitions consume `self` and return the next state, so an attempt
/// can never skip its health gate or roll back twice.
#[derive(Debug)]
pub struct Promotion<S> {
    pub(crate) attempt: DeploymentAttempt,
    /// Held for the whole attempt; surrendered on terminal transitions.
    pub(crate) token: Option<LockToken>,
    pub(crate) digest: Option<Digest>,
    pub(crate) _state: PhantomData<S>,
}

impl Promotion<Pending> {
    /// Accept a trigger: acquire the environment lock and open the
    /// DeploymentAttempt, capturing the current tag as rollback target.
    ///
    /// A held lock rejects the event outright with `LockConflict`; it
    /// is never queued behind the in-flight attempt.
    pub fn open(
        registry: &EnvironmentRegistry,
        env: EnvId,
        tag: ArtifactTag,
    ) -> Result<Self, PromoteError> {
        let token = registry.acquire_lock(env, false)?;
        let attempt = match registry.new_attempt(&token, tag) {
            Ok(attempt) => attempt,
            Err(e) => {
                // Surrender the lock before surfacing the error.
                let _ = registry.release_lock(token);
                return Err(e.into());
            }
        };

        tracing::info!(%env, tag = %attempt.tag, attempt = attempt.id, "trigger accepted");
        Ok(Promotion {
            attempt,
            token: Some(token),
            digest: None,
            _state: PhantomData,
        })
    }
}

impl Promotion<Pushed> {
    /// Open an attempt for an artifact that is already in the registry
    /// (explicit-tag promotion or operator rollback). Skips the build
    /// and push states.
    pub fn open_existing(
        registry: &EnvironmentRegistry,
        env: EnvId,
        tag: ArtifactTag,
        digest: Option<Digest>,
    ) -> Result<Self, PromoteError> {
        let pending = Promotion::<Pending>::open(registry, env, tag)?;
        let mut promotion: Promotion<Pushed> = Promotion {
            attempt: pending.attempt,
            token: pending.token,
            digest,
            _state: PhantomData,
        };
        promotion
            .attempt
            .advance(super::attempt::AttemptState::Pushed);
        promotion.record(registry)?;
        Ok(promotion)
    }
}

impl<S> Promotion<S> {
    pub fn env(&self) -> EnvId {
        self.attempt.env
    }

    pub fn tag(&self) -> &ArtifactTag {
        &self.attempt.tag
    }

    pub fn attempt(&self) -> &DeploymentAttempt {
        &self.attempt
    }

    /// Registry digest of the pushed artifact; None until `push()`, or
    /// for explicit-tag attempts where the registry did not report one.
    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// Internal helper to transition to a new state.
    pub(crate) fn transition<T>(self) -> Promotion<T> {
        Promotion {
            attempt: self.attempt,
            token: self.token,
            digest: self.digest,
            _state: PhantomData,
        }
    }

    /// Persist the attempt's current shape.
    pub(crate) fn record(&self, registry: &EnvironmentRegistry) -> Result<(), PromoteError> {
        registry.update_attempt(&self.attempt).map_err(Into::into)
    }

    /// Surrender the environment lock. Failures are non-fatal: the
    /// attempt already reached its terminal state.
    pub(crate) fn release_lock(&mut self, registry: &EnvironmentRegistry) {
        if let Some(token) = self.token.take()
            && let Err(e) = registry.release_lock(token)
        {
            tracing::warn!(env = %self.attempt.env, "failed to release lock: {e}");
        }
    }

    /// Terminate the attempt as `Failed` and release the lock. Used for
    /// failures where nothing needs reverting (build/push) or where
    /// reverting would be unsafe (a refused swap).
    pub(crate) fn finalize_failed(mut self, registry: &EnvironmentRegistry, error: &PromoteError) {
        self.attempt
            .fail(super::attempt::AttemptState::Failed, error.to_string());
        if let Err(e) = self.record(registry) {
            tracing::warn!(env = %self.attempt.env, "failed to record attempt failure: {e}");
        }
        self.release_lock(registry);
    }
}
