// ABOUTME: Traffic switch for the blue/green routing alias.
// ABOUTME: Atomic rebind preferred; weighted rebalance keeps one backend live.

mod http;

pub use http::HttpRouting;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::EnvId;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("routing alias {0} not found")]
    AliasNotFound(String),

    #[error("routing boundary rejected the change: {0}")]
    Rejected(String),

    #[error("routing boundary request failed: {0}")]
    Boundary(String),
}

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("{0} is not part of the blue/green pair")]
    NotLivePair(EnvId),

    /// The boundary refused the rebind. Routing state is unchanged but
    /// must be treated as fatal: stale routing is unsafe to auto-resolve.
    #[error("traffic swap refused: {0}")]
    Conflict(String),
}

/// Operations on the stable routing alias that fronts live traffic.
/// The alias always resolves to exactly one of {blue, green}.
#[async_trait]
pub trait RoutingOps: Send + Sync {
    /// Whether the boundary can rebind the alias in one atomic step.
    fn atomic_rebind_supported(&self) -> bool {
        true
    }

    /// Atomically repoint the alias. Must never leave the alias unbound
    /// or bound to both targets.
    async fn rebind(&self, alias: &str, to: EnvId) -> Result<(), RoutingError>;

    /// Weighted fallback for boundaries without an atomic rebind.
    async fn set_weights(&self, alias: &str, blue: u32, green: u32)
    -> Result<(), RoutingError>;

    /// Which environment the alias currently resolves to.
    async fn active_target(&self, alias: &str) -> Result<EnvId, RoutingError>;
}

#[async_trait]
impl<R: RoutingOps + ?Sized> RoutingOps for &R {
    fn atomic_rebind_supported(&self) -> bool {
        (**self).atomic_rebind_supported()
    }

    async fn rebind(&self, alias: &str, to: EnvId) -> Result<(), RoutingError> {
        (**self).rebind(alias, to).await
    }

    async fn set_weights(&self, alias: &str, blue: u32, green: u32)
    -> Result<(), RoutingError> {
        (**self).set_weights(alias, blue, green).await
    }

    async fn active_target(&self, alias: &str) -> Result<EnvId, RoutingError> {
        (**self).active_target(alias).await
    }
}

/// Repoints the live-traffic alias between blue and green. All swaps
/// serialize on a dedicated lock, distinct from the per-environment
/// locks, because the alias spans both environments.
pub struct TrafficSwitch<R> {
    routing: R,
    alias: String,
    swap_lock: tokio::sync::Mutex<()>,
}

impl<R: RoutingOps> TrafficSwitch<R> {
    pub fn new(routing: R, alias: &str) -> Self {
        Self {
            routing,
            alias: alias.to_string(),
            swap_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub async fn active(&self) -> Result<EnvId, RoutingError> {
        self.routing.active_target(&self.alias).await
    }

    /// Move live traffic from one half of the pair to the other.
    /// Swapping onto the already-active target is a no-op success.
    pub async fn swap(&self, from: EnvId, to: EnvId) -> Result<(), SwapError> {
        if !from.in_live_pair() {
            return Err(SwapError::NotLivePair(from));
        }
        if !to.in_live_pair() {
            return Err(SwapError::NotLivePair(to));
        }
        if from == to {
            return Ok(());
        }

        let _guard = self.swap_lock.lock().await;

        if self.routing.atomic_rebind_supported() {
            self.routing
                .rebind(&self.alias, to)
                .await
                .map_err(|e| SwapError::Conflict(e.to_string()))?;
        } else {
            // No atomic rebind: bring the target in alongside the old
            // side first, then drain the old side. At no step does the
            // alias have fewer than one weighted backend.
            self.routing
                .set_weights(&self.alias, 1, 1)
                .await
                .map_err(|e| SwapError::Conflict(e.to_string()))?;
            let (blue, green) = match to {
                EnvId::Blue => (1, 0),
                EnvId::Green => (0, 1),
                EnvId::Staging => unreachable!("validated above"),
            };
            self.routing
                .set_weights(&self.alias, blue, green)
                .await
                .map_err(|e| SwapError::Conflict(e.to_string()))?;
        }

        tracing::info!(alias = %self.alias, %from, %to, "live traffic swapped");
        Ok(())
    }
}
