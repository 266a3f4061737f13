//! Semana Core Library
//!
//! Client-side sync engine for weekly meal plans: one in-memory plan
//! store backed by a TTL cache, a debounced remote writer, a durable
//! offline queue, and a realtime change feed.

pub mod cache;
pub mod config;
pub mod error;
pub mod generate;
pub mod models;
pub mod persist;
pub mod queue;
pub mod realtime;
pub mod store;
pub mod writer;

pub use cache::{Cache, Priority};
pub use config::{ConfigError, EngineConfig};
pub use error::PlanError;
pub use generate::{GeneratedCandidate, GenerationConstraints, GenerationRequest, PlanGenerator};
pub use models::{
    week_start_of, AIGeneratedPlan, Ingredient, MealSlot, MealType, Nutrition, PlanKey, Recipe,
    ShoppingItem, ShoppingList, WeekPlan, WeekSummary,
};
pub use persist::{HttpStore, MemoryStore, PersistenceClient, RemoteStore};
pub use queue::{
    FileQueueStorage, MemoryQueueStorage, MutationOp, MutationState, OfflineQueue, QueueStorage,
    QueuedMutation, ReplayReport,
};
pub use realtime::{
    ChangeKind, EntityKind, MemoryChannel, RealtimeChannel, RealtimeEvent, RealtimeListener,
    WsChannel,
};
pub use store::{PlanStore, StoreEvent};
pub use writer::{DebouncedWriter, WriteOutcome};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
