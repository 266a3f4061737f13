//! Offline mutation queue.
//!
//! Mutations issued while disconnected are appended to a durable FIFO
//! list and replayed in original order on reconnect. Each replay
//! performs the same remote effect the mutation would have had online;
//! it does not re-validate rules that may have gone stale in the
//! meantime, so conflicts surface as errors. A mutation that keeps
//! failing is logged and dropped after `max_attempts`, never retried
//! forever.

mod storage;

pub use storage::{FileQueueStorage, MemoryQueueStorage, QueueStorage};

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PlanError;
use crate::models::{MealType, PlanKey, Recipe, WeekPlan};
use crate::persist::PersistenceClient;

/// One pending write, serializable for durable storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMutation {
    pub id: Uuid,
    pub key: PlanKey,
    pub op: MutationOp,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub state: MutationState,
}

impl QueuedMutation {
    pub fn new(key: PlanKey, op: MutationOp) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            op,
            enqueued_at: Utc::now(),
            attempts: 0,
            state: MutationState::Pending,
        }
    }
}

/// Lifecycle of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationState {
    Pending,
    Replaying,
    Committed,
    Failed,
}

/// The operation a queued mutation performs on its plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationOp {
    AssignMeal {
        day_of_week: u8,
        meal_type: MealType,
        recipe: Recipe,
    },
    RemoveMeal {
        slot_id: String,
    },
    SetLock {
        slot_id: String,
        locked: bool,
    },
    SetCompleted {
        slot_id: String,
        completed: bool,
    },
    SetServings {
        slot_id: String,
        servings: u32,
    },
    ClearWeek,
    /// Whole-state fallback used when a debounced write fails offline.
    SavePlan {
        plan: WeekPlan,
    },
}

impl MutationOp {
    /// Applies the operation to a plan. A missing target slot means the
    /// plan changed remotely since the mutation was recorded; that
    /// conflict surfaces as a validation error.
    pub fn apply(&self, plan: &mut WeekPlan) -> Result<(), PlanError> {
        let applied = match self {
            MutationOp::AssignMeal {
                day_of_week,
                meal_type,
                recipe,
            } => plan.assign_meal(*day_of_week, *meal_type, recipe.clone()),
            MutationOp::RemoveMeal { slot_id } => plan.remove_meal(slot_id),
            MutationOp::SetLock { slot_id, locked } => plan.set_locked(slot_id, *locked),
            MutationOp::SetCompleted { slot_id, completed } => {
                plan.set_completed(slot_id, *completed)
            }
            MutationOp::SetServings { slot_id, servings } => {
                plan.set_servings(slot_id, *servings)
            }
            MutationOp::ClearWeek => {
                plan.clear();
                true
            }
            MutationOp::SavePlan { plan: snapshot } => {
                *plan = snapshot.clone();
                true
            }
        };
        if applied {
            Ok(())
        } else {
            Err(PlanError::Validation(format!(
                "mutation target no longer exists: {:?}",
                self
            )))
        }
    }
}

/// Outcome of one `replay_all` pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    /// Mutations committed remotely.
    pub committed: usize,
    /// Mutations dropped after exhausting their attempts.
    pub dropped: usize,
    /// Mutations still pending (replay stopped on a retryable failure).
    pub remaining: usize,
}

/// Durable FIFO queue of pending mutations.
pub struct OfflineQueue {
    storage: Arc<dyn QueueStorage>,
    items: Mutex<Vec<QueuedMutation>>,
    replay_lock: tokio::sync::Mutex<()>,
    max_attempts: u32,
}

impl OfflineQueue {
    /// Opens the queue, loading any mutations persisted by a previous run.
    pub fn new(storage: Arc<dyn QueueStorage>, max_attempts: u32) -> Result<Self, PlanError> {
        let items = storage.load()?;
        if !items.is_empty() {
            tracing::info!(count = items.len(), "restored pending offline mutations");
        }
        Ok(Self {
            storage,
            items: Mutex::new(items),
            replay_lock: tokio::sync::Mutex::new(()),
            max_attempts,
        })
    }

    /// Appends a mutation and persists the queue.
    pub fn enqueue(&self, key: PlanKey, op: MutationOp) -> Result<(), PlanError> {
        let mut items = self.items.lock().unwrap();
        items.push(QueuedMutation::new(key, op));
        self.storage.save(&items)
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    /// Replays pending mutations in FIFO order.
    ///
    /// Concurrent replay triggers serialize behind one lock; a second
    /// trigger finds whatever the first left and usually no-ops. Replay
    /// stops at the first retryable failure to preserve ordering, since
    /// later mutations may depend on earlier ones.
    pub async fn replay_all(&self, client: &PersistenceClient) -> ReplayReport {
        let _guard = self.replay_lock.lock().await;
        let mut report = ReplayReport::default();

        loop {
            let mut mutation = {
                let items = self.items.lock().unwrap();
                match items.first() {
                    Some(m) => m.clone(),
                    None => break,
                }
            };

            mutation.state = MutationState::Replaying;
            mutation.attempts += 1;

            match self.replay_one(client, &mutation).await {
                Ok(()) => {
                    mutation.state = MutationState::Committed;
                    tracing::debug!(id = %mutation.id, key = %mutation.key, "offline mutation committed");
                    self.pop_front();
                    report.committed += 1;
                }
                Err(error) if mutation.attempts >= self.max_attempts => {
                    mutation.state = MutationState::Failed;
                    tracing::warn!(
                        id = %mutation.id,
                        key = %mutation.key,
                        attempts = mutation.attempts,
                        error = %error,
                        "dropping offline mutation after repeated failures"
                    );
                    self.pop_front();
                    report.dropped += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        id = %mutation.id,
                        key = %mutation.key,
                        attempts = mutation.attempts,
                        error = %error,
                        "offline replay failed, will retry on next trigger"
                    );
                    self.record_attempt(mutation.attempts);
                    break;
                }
            }
        }

        report.remaining = self.len();
        if report.committed > 0 || report.dropped > 0 {
            tracing::info!(
                committed = report.committed,
                dropped = report.dropped,
                remaining = report.remaining,
                "offline queue replay finished"
            );
        }
        report
    }

    /// Fetches the current remote plan, applies the op, and saves.
    /// A week with no remote plan yet gets a fresh empty one, matching
    /// what the online path would have created.
    async fn replay_one(
        &self,
        client: &PersistenceClient,
        mutation: &QueuedMutation,
    ) -> Result<(), PlanError> {
        let key = &mutation.key;
        let end = key.start_date + chrono::Duration::days(6);
        let mut plan = client
            .load_week_plan(&key.user_id, key.start_date, end)
            .await?
            .unwrap_or_else(|| WeekPlan::new_empty(key.user_id.clone(), key.start_date));

        mutation.op.apply(&mut plan)?;
        client.save_week_plan(&key.user_id, &plan).await?;
        Ok(())
    }

    fn pop_front(&self) {
        let mut items = self.items.lock().unwrap();
        if !items.is_empty() {
            items.remove(0);
        }
        if let Err(e) = self.storage.save(&items) {
            tracing::warn!(error = %e, "failed to persist offline queue");
        }
    }

    fn record_attempt(&self, attempts: u32) {
        let mut items = self.items.lock().unwrap();
        if let Some(first) = items.first_mut() {
            first.attempts = attempts;
        }
        if let Err(e) = self.storage.save(&items) {
            tracing::warn!(error = %e, "failed to persist offline queue");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;
    use chrono::NaiveDate;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn key() -> PlanKey {
        PlanKey::new("user1", monday())
    }

    fn queue() -> OfflineQueue {
        OfflineQueue::new(Arc::new(MemoryQueueStorage::new()), 3).unwrap()
    }

    #[tokio::test]
    async fn test_replay_preserves_fifo_order() {
        let store = Arc::new(MemoryStore::new());
        let client = PersistenceClient::new(store.clone());
        let queue = queue();

        // Add a meal, then lock that same slot: the lock only succeeds
        // if the assignment replays first.
        queue
            .enqueue(
                key(),
                MutationOp::AssignMeal {
                    day_of_week: 1,
                    meal_type: MealType::Almuerzo,
                    recipe: Recipe::new("r1", "Tortilla"),
                },
            )
            .unwrap();
        queue
            .enqueue(
                key(),
                MutationOp::SetLock {
                    slot_id: "2024-01-16-almuerzo".into(),
                    locked: true,
                },
            )
            .unwrap();

        let report = queue.replay_all(&client).await;
        assert_eq!(report.committed, 2);
        assert_eq!(report.dropped, 0);
        assert!(queue.is_empty());

        let stored = store.stored_plan("user1", monday()).unwrap();
        let slot = stored.slot_by_id("2024-01-16-almuerzo").unwrap();
        assert_eq!(slot.recipe_id.as_deref(), Some("r1"));
        assert!(slot.is_locked);
    }

    #[tokio::test]
    async fn test_replay_creates_missing_remote_plan() {
        let store = Arc::new(MemoryStore::new());
        let client = PersistenceClient::new(store.clone());
        let queue = queue();

        queue
            .enqueue(
                key(),
                MutationOp::AssignMeal {
                    day_of_week: 0,
                    meal_type: MealType::Cena,
                    recipe: Recipe::new("r2", "Lentejas"),
                },
            )
            .unwrap();

        let report = queue.replay_all(&client).await;
        assert_eq!(report.committed, 1);
        let stored = store.stored_plan("user1", monday()).unwrap();
        assert!(stored.validate().is_ok());
        assert_eq!(stored.filled_count(), 1);
    }

    #[tokio::test]
    async fn test_conflicting_mutation_dropped_after_max_attempts() {
        let store = Arc::new(MemoryStore::new());
        let client = PersistenceClient::new(store.clone());
        let queue = queue();

        // The target slot does not exist in any plan for this week.
        queue
            .enqueue(
                key(),
                MutationOp::RemoveMeal {
                    slot_id: "2024-01-16-nope".into(),
                },
            )
            .unwrap();
        queue.enqueue(key(), MutationOp::ClearWeek).unwrap();

        // Validation failures burn one attempt per pass; after three
        // passes the bad mutation is dropped and the next one commits.
        let first = queue.replay_all(&client).await;
        assert_eq!(first.committed, 0);
        assert_eq!(first.remaining, 2);
        queue.replay_all(&client).await;
        let last = queue.replay_all(&client).await;

        assert_eq!(last.dropped, 1);
        assert_eq!(last.committed, 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_network_failure_leaves_queue_intact() {
        let store = Arc::new(MemoryStore::new());
        let client = PersistenceClient::new(store.clone());
        let queue = queue();

        queue.enqueue(key(), MutationOp::ClearWeek).unwrap();
        store.fail_next_fetch(PlanError::Network("offline again".into()));

        let report = queue.replay_all(&client).await;
        assert_eq!(report.committed, 0);
        assert_eq!(report.remaining, 1);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        let storage = Arc::new(MemoryQueueStorage::new());
        {
            let queue = OfflineQueue::new(storage.clone(), 3).unwrap();
            queue.enqueue(key(), MutationOp::ClearWeek).unwrap();
        }

        let reopened = OfflineQueue::new(storage, 3).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_replays_do_not_double_apply() {
        let store = Arc::new(MemoryStore::new());
        let client = PersistenceClient::new(store.clone());
        let queue = Arc::new(queue());

        queue
            .enqueue(
                key(),
                MutationOp::AssignMeal {
                    day_of_week: 2,
                    meal_type: MealType::Desayuno,
                    recipe: Recipe::new("r3", "Avena"),
                },
            )
            .unwrap();

        let a = {
            let queue = Arc::clone(&queue);
            let client = client.clone();
            tokio::spawn(async move { queue.replay_all(&client).await })
        };
        let b = {
            let queue = Arc::clone(&queue);
            let client = client.clone();
            tokio::spawn(async move { queue.replay_all(&client).await })
        };

        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(ra.committed + rb.committed, 1);
        assert!(queue.is_empty());
    }
}
