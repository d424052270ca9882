// ABOUTME: Promotion state marker types for the type state pattern.
// ABOUTME: Zero-sized types enforce valid state transitions at compile time.

/// Trigger accepted, environment lock held.
/// Available actions: `begin()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Pending;

/// Build step in flight.
/// Available actions: `push()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Building;

/// Artifact pushed; registry digest known.
/// Available actions: `deploy()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Pushed;

/// Instance group instructed to adopt the new tag.
/// Available actions: `await_ready()`, `roll_back()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Deploying;

/// New instances registered; health gate running.
/// Available actions: `promote()`, `roll_back()`
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthChecking;

/// Terminal: promotion finalized, lock released.
#[derive(Debug, Clone, Copy, Default)]
pub struct Promoted;

/// Terminal: previous tag reinstated, lock released.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolledBack;
