//! Crate-wide error taxonomy.
//!
//! Mutators never panic across the public contract; failures either roll
//! back the optimistic change or surface through the store's error field.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PlanError {
    /// No active user; mutators no-op and surface a message.
    #[error("No active user. Sign in before editing the plan.")]
    Unauthenticated,

    /// Plan missing remotely. Internal to loads, which degrade to an
    /// empty synthesized plan instead of surfacing this.
    #[error("Plan not found: {0}")]
    NotFound(String),

    /// Transport-level failure; mutations fall back to the offline queue.
    #[error("Network error: {0}")]
    Network(String),

    /// Rejected credentials or missing permission.
    #[error("Auth error: {0}")]
    Auth(String),

    /// The remote store rejected the payload; the mutation rolls back.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A write response arrived for a superseded plan generation.
    /// Internal, logged and discarded, never user-visible.
    #[error("Stale write discarded for {0}")]
    StaleWriteDiscarded(String),

    /// Local durable storage failure (offline queue file).
    #[error("Storage error: {0}")]
    Storage(String),

    /// The AI generation collaborator failed or returned no plan.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Realtime channel failure (subscribe or stream).
    #[error("Realtime channel error: {0}")]
    Channel(String),
}
