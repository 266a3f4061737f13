//! Debounced writer: coalesces rapid plan mutations into one remote
//! write per quiet window.
//!
//! Each `(user_id, start_date)` key debounces independently and carries
//! a generation counter. Only the latest scheduled generation is ever
//! written, and a write response is applied to the cache only if its
//! generation is still current when it resolves; stale responses are
//! discarded. A pending write is lost on process exit unless `flush` is
//! called first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::{Cache, Priority};
use crate::error::PlanError;
use crate::models::{PlanKey, WeekPlan};
use crate::persist::PersistenceClient;

/// What became of a scheduled write. Consumed by the plan store.
#[derive(Debug)]
pub enum WriteOutcome {
    /// The latest generation persisted; the cache was reconciled.
    Persisted { key: PlanKey, plan: WeekPlan },
    /// The latest generation failed; the scheduled state is handed back
    /// so the store can roll back or queue it for offline replay.
    Failed {
        key: PlanKey,
        plan: WeekPlan,
        error: PlanError,
    },
    /// A superseded write resolved after a newer one was scheduled.
    /// Logged and dropped, never applied.
    StaleDiscarded { key: PlanKey },
}

struct Pending {
    generation: u64,
    plan: WeekPlan,
    timer: JoinHandle<()>,
}

struct WriterShared {
    client: PersistenceClient,
    cache: Cache<WeekPlan>,
    window: Duration,
    cache_ttl: Duration,
    pending: Mutex<HashMap<PlanKey, Pending>>,
    outcomes: mpsc::UnboundedSender<WriteOutcome>,
}

/// Per-key debounce over the persistence client. Cheap to clone.
#[derive(Clone)]
pub struct DebouncedWriter {
    shared: Arc<WriterShared>,
}

impl DebouncedWriter {
    /// Creates a writer; the receiver yields one `WriteOutcome` per
    /// resolved write attempt.
    pub fn new(
        client: PersistenceClient,
        cache: Cache<WeekPlan>,
        window: Duration,
        cache_ttl: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<WriteOutcome>) {
        let (outcomes, rx) = mpsc::unbounded_channel();
        let writer = Self {
            shared: Arc::new(WriterShared {
                client,
                cache,
                window,
                cache_ttl,
                pending: Mutex::new(HashMap::new()),
                outcomes,
            }),
        };
        (writer, rx)
    }

    /// Registers `plan` as the latest desired state for its key.
    ///
    /// Restarts the key's quiet window; any previously scheduled state
    /// for the same key is superseded and will never be written.
    pub fn schedule(&self, plan: WeekPlan) {
        let key = plan.key();
        let mut pending = self.shared.pending.lock().unwrap();

        let generation = match pending.get(&key) {
            Some(previous) => {
                previous.timer.abort();
                previous.generation + 1
            }
            None => 1,
        };

        let shared = Arc::clone(&self.shared);
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(shared.window).await;
            write_current(&shared, timer_key, generation).await;
        });

        tracing::debug!(key = %key, generation, "write scheduled");
        pending.insert(
            key,
            Pending {
                generation,
                plan,
                timer,
            },
        );
    }

    /// True if a write is scheduled or in flight for this key.
    ///
    /// The realtime path checks this before applying a remote reload:
    /// local optimistic intent takes precedence over an incoming echo.
    pub fn is_pending(&self, key: &PlanKey) -> bool {
        self.shared.pending.lock().unwrap().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().unwrap().len()
    }

    /// Writes a key's pending state immediately, skipping the remainder
    /// of its quiet window. No-op if nothing is pending.
    pub async fn flush(&self, key: &PlanKey) {
        let generation = {
            let pending = self.shared.pending.lock().unwrap();
            pending.get(key).map(|p| {
                p.timer.abort();
                p.generation
            })
        };
        if let Some(generation) = generation {
            write_current(&self.shared, key.clone(), generation).await;
        }
    }

    /// Flushes every pending key. Callers needing durability across
    /// shutdown invoke this before teardown.
    pub async fn flush_all(&self) {
        let keys: Vec<PlanKey> = self
            .shared
            .pending
            .lock()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        for key in keys {
            self.flush(&key).await;
        }
    }
}

/// Persists the key's pending state if `generation` is still current,
/// and applies the response only if it is still current afterwards.
async fn write_current(shared: &Arc<WriterShared>, key: PlanKey, generation: u64) {
    let plan = {
        let pending = shared.pending.lock().unwrap();
        match pending.get(&key) {
            Some(p) if p.generation == generation => p.plan.clone(),
            // Superseded before the network call started; nothing to do.
            _ => return,
        }
    };

    let result = shared.client.save_week_plan(&key.user_id, &plan).await;

    let still_current = {
        let mut pending = shared.pending.lock().unwrap();
        match pending.get(&key) {
            Some(p) if p.generation == generation => {
                pending.remove(&key);
                true
            }
            _ => false,
        }
    };

    match result {
        Ok(stored) if still_current => {
            shared
                .cache
                .set(key.cache_key(), stored.clone(), shared.cache_ttl, Priority::High);
            let _ = shared
                .outcomes
                .send(WriteOutcome::Persisted { key, plan: stored });
        }
        Ok(_) => {
            tracing::debug!(key = %key, generation, "stale write response discarded");
            let _ = shared.outcomes.send(WriteOutcome::StaleDiscarded { key });
        }
        Err(error) if still_current => {
            let _ = shared.outcomes.send(WriteOutcome::Failed { key, plan, error });
        }
        Err(error) => {
            // A newer generation is already scheduled; its own attempt
            // decides the outcome.
            tracing::debug!(key = %key, generation, error = %error, "superseded write failed");
            let _ = shared.outcomes.send(WriteOutcome::StaleDiscarded { key });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MealType, Recipe};
    use chrono::NaiveDate;

    const WINDOW: Duration = Duration::from_millis(1500);
    const TTL: Duration = Duration::from_secs(300);

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn setup() -> (
        Arc<crate::persist::MemoryStore>,
        Cache<WeekPlan>,
        DebouncedWriter,
        mpsc::UnboundedReceiver<WriteOutcome>,
    ) {
        let store = Arc::new(crate::persist::MemoryStore::new());
        let cache = Cache::new(32);
        let client = PersistenceClient::new(store.clone());
        let (writer, rx) = DebouncedWriter::new(client, cache.clone(), WINDOW, TTL);
        (store, cache, writer, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_schedules_collapse_into_one_write() {
        let (store, _cache, writer, mut rx) = setup();

        let mut plan = WeekPlan::new_empty("user1", monday());
        for i in 0..5 {
            plan.assign_meal(0, MealType::Almuerzo, Recipe::new(format!("r{}", i), "Meal"));
            writer.schedule(plan.clone());
        }

        tokio::time::sleep(WINDOW * 2).await;

        assert_eq!(store.save_call_count(), 1);
        let stored = store.stored_plan("user1", monday()).unwrap();
        assert_eq!(
            stored.slot(0, MealType::Almuerzo).unwrap().recipe_id.as_deref(),
            Some("r4")
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            WriteOutcome::Persisted { .. }
        ));
        assert!(!writer.is_pending(&plan.key()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_debounce_independently() {
        let (store, _cache, writer, _rx) = setup();

        let week1 = WeekPlan::new_empty("user1", monday());
        let week2 = WeekPlan::new_empty("user1", monday() + chrono::Duration::days(7));
        writer.schedule(week1);
        writer.schedule(week2);
        assert_eq!(writer.pending_count(), 2);

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(store.save_call_count(), 2);
        assert_eq!(store.plan_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_immediately() {
        let (store, _cache, writer, _rx) = setup();

        let plan = WeekPlan::new_empty("user1", monday());
        writer.schedule(plan.clone());
        writer.flush(&plan.key()).await;

        assert_eq!(store.save_call_count(), 1);
        assert!(!writer.is_pending(&plan.key()));

        // The aborted timer must not produce a second write later.
        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(store.save_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_write_response_is_discarded() {
        let (store, cache, writer, mut rx) = setup();
        store.set_save_delay(Duration::from_millis(100));

        let mut plan = WeekPlan::new_empty("user1", monday());
        plan.assign_meal(0, MealType::Almuerzo, Recipe::new("v1", "First"));
        writer.schedule(plan.clone());

        // Start the v1 write immediately; while it is in flight,
        // schedule the newer v2 state.
        let flush_writer = writer.clone();
        let key = plan.key();
        let flush_key = key.clone();
        let flush_task = tokio::spawn(async move {
            flush_writer.flush(&flush_key).await;
        });
        tokio::task::yield_now().await;

        plan.assign_meal(0, MealType::Almuerzo, Recipe::new("v2", "Second"));
        writer.schedule(plan.clone());

        flush_task.await.unwrap();
        tokio::time::sleep(WINDOW * 2).await;

        // v1's response resolved after v2 was scheduled: it must not
        // have touched the cache. The cache reflects v2's effects.
        let cached = cache.get(&key.cache_key()).unwrap();
        assert_eq!(
            cached.slot(0, MealType::Almuerzo).unwrap().recipe_id.as_deref(),
            Some("v2")
        );

        let mut saw_stale = false;
        let mut persisted_v2 = false;
        while let Ok(outcome) = rx.try_recv() {
            match outcome {
                WriteOutcome::StaleDiscarded { .. } => saw_stale = true,
                WriteOutcome::Persisted { plan, .. } => {
                    persisted_v2 = plan.slot(0, MealType::Almuerzo).unwrap().recipe_id.as_deref()
                        == Some("v2");
                }
                WriteOutcome::Failed { .. } => panic!("unexpected failure"),
            }
        }
        assert!(saw_stale);
        assert!(persisted_v2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_hands_back_scheduled_state() {
        let (store, cache, writer, mut rx) = setup();
        store.fail_next_save(PlanError::Network("connection reset".into()));

        let plan = WeekPlan::new_empty("user1", monday());
        writer.schedule(plan.clone());
        tokio::time::sleep(WINDOW * 2).await;

        match rx.recv().await.unwrap() {
            WriteOutcome::Failed { key, error, .. } => {
                assert_eq!(key, plan.key());
                assert!(matches!(error, PlanError::Network(_)));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        // Failures never reconcile the cache.
        assert!(cache.get(&plan.key().cache_key()).is_none());
    }
}
