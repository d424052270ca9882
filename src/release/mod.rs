// ABOUTME: Release coordination using the type state pattern.
// ABOUTME: Exports the promotion state machine, attempts, triggers, and errors.

mod attempt;
mod coordinator;
mod error;
mod promotion;
mod rollback;
mod state;
mod transitions;
mod trigger;

pub use attempt::{AttemptState, DeploymentAttempt, VerdictRecord};
pub use coordinator::{Coordinator, PromotionReport};
pub use error::{PromoteError, PromoteErrorKind};
pub use promotion::Promotion;
pub use rollback::RollbackContext;
pub use state::{Building, Deploying, HealthChecking, Pending, Promoted, Pushed, RolledBack};
pub use transitions::TransitionResult;
pub use trigger::{TriggerEvent, resolve_target, tag_for};
