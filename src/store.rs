//! Plan store: the reactive state container the UI talks to.
//!
//! Owns the single in-memory `WeekPlan` for the current week and
//! composes the cache, persistence client, debounced writer, offline
//! queue, realtime listener, and AI generator behind one contract.
//! Every mutation follows the same shape: snapshot, optimistic apply,
//! synchronous cache update, one debounced write (or an offline-queue
//! entry when disconnected). Write failures roll back or enqueue;
//! nothing throws across this boundary.
//!
//! The store must live inside a tokio runtime; the debounce timers and
//! outcome pump are spawned tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::{broadcast, mpsc};

use crate::cache::{Cache, Priority};
use crate::config::EngineConfig;
use crate::error::PlanError;
use crate::generate::{GenerationRequest, PlanGenerator};
use crate::models::{
    week_start_of, AIGeneratedPlan, MealType, PlanKey, Recipe, WeekPlan, WeekSummary,
};
use crate::persist::PersistenceClient;
use crate::queue::{MutationOp, OfflineQueue};
use crate::realtime::{EntityKind, RealtimeEvent, RealtimeListener};
use crate::writer::{DebouncedWriter, WriteOutcome};

/// Notifications for observers (screens, widgets).
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// In-memory state changed (optimistic edit, reload, rollback).
    PlanChanged,
    /// A debounced write for this key round-tripped successfully.
    PlanPersisted(PlanKey),
    /// A write failed; the store's error field carries the message.
    WriteFailed(PlanKey),
    /// An offline replay pass finished.
    QueueReplayed { committed: usize, dropped: usize },
    /// A remote-origin change was reloaded into local state.
    RemoteChangeApplied(PlanKey),
}

struct StoreState {
    user_id: Option<String>,
    current_plan: Option<WeekPlan>,
    /// Baseline for rollback: the last state known to match the remote.
    last_persisted: Option<WeekPlan>,
    error: Option<String>,
}

struct StoreInner {
    state: Mutex<StoreState>,
    cache: Cache<WeekPlan>,
    client: PersistenceClient,
    writer: DebouncedWriter,
    queue: OfflineQueue,
    generator: Mutex<Option<Arc<dyn PlanGenerator>>>,
    events: broadcast::Sender<StoreEvent>,
    online: AtomicBool,
    cache_ttl: Duration,
}

/// Cloneable handle to the shared store.
#[derive(Clone)]
pub struct PlanStore {
    inner: Arc<StoreInner>,
}

impl PlanStore {
    pub fn new(client: PersistenceClient, queue: OfflineQueue, config: &EngineConfig) -> Self {
        let cache = Cache::new(config.cache_capacity);
        let (writer, outcomes) = DebouncedWriter::new(
            client.clone(),
            cache.clone(),
            config.debounce_window(),
            config.cache_ttl(),
        );
        let (events, _) = broadcast::channel(64);

        let inner = Arc::new(StoreInner {
            state: Mutex::new(StoreState {
                user_id: None,
                current_plan: None,
                last_persisted: None,
                error: None,
            }),
            cache,
            client,
            writer,
            queue,
            generator: Mutex::new(None),
            events,
            online: AtomicBool::new(true),
            cache_ttl: config.cache_ttl(),
        });

        tokio::spawn(pump_outcomes(Arc::clone(&inner), outcomes));

        Self { inner }
    }

    pub fn set_generator(&self, generator: Arc<dyn PlanGenerator>) {
        *self.inner.generator.lock().unwrap() = Some(generator);
    }

    pub fn set_user(&self, user_id: impl Into<String>) {
        let mut state = self.inner.state.lock().unwrap();
        state.user_id = Some(user_id.into());
        state.error = None;
    }

    /// Clears the session. Pending debounced writes still complete so
    /// the signed-out user's last edits are not lost.
    pub fn sign_out(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.user_id = None;
        state.current_plan = None;
        state.last_persisted = None;
        state.error = None;
        drop(state);
        self.inner.cache.clear();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.lock().unwrap().error.clone()
    }

    pub fn current_plan(&self) -> Option<WeekPlan> {
        self.inner.state.lock().unwrap().current_plan.clone()
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    pub fn has_pending_writes(&self) -> bool {
        self.inner.writer.pending_count() > 0
    }

    /// Loads (or creates) the plan for the week containing `date` and
    /// makes it current.
    ///
    /// Cache-first; a miss fetches from the persistence client. A week
    /// with no remote plan gets a synthesized empty 28-slot plan, which
    /// is cached and scheduled for creation. A network failure degrades
    /// to an uncached synthesized plan and records the error; the caller
    /// still gets a usable plan, never `NotFound`.
    pub async fn load_week_plan(&self, date: NaiveDate) -> Result<WeekPlan, PlanError> {
        let user_id = {
            let state = self.inner.state.lock().unwrap();
            state.user_id.clone().ok_or(PlanError::Unauthenticated)?
        };
        let start = week_start_of(date);
        let key = PlanKey::new(user_id.clone(), start);
        let end = start + chrono::Duration::days(6);

        let inner = Arc::clone(&self.inner);
        let fetch_user = user_id.clone();
        let result: Result<WeekPlan, PlanError> = self
            .inner
            .cache
            .get_or_set(&key.cache_key(), self.inner.cache_ttl, Priority::High, || {
                let inner = Arc::clone(&inner);
                async move {
                    match inner.client.load_week_plan(&fetch_user, start, end).await? {
                        Some(plan) => Ok(plan),
                        None => {
                            let plan = WeekPlan::new_empty(fetch_user.clone(), start);
                            tracing::info!(user_id = %fetch_user, week = %start, "created empty week plan");
                            inner.writer.schedule(plan.clone());
                            Ok(plan)
                        }
                    }
                }
            })
            .await;

        let plan = match result {
            Ok(plan) => {
                self.inner.state.lock().unwrap().error = None;
                plan
            }
            Err(error) => {
                // Availability over strictness for reads: hand the UI an
                // empty week it can edit; edits will queue or retry.
                tracing::warn!(key = %key, error = %error, "plan load degraded to empty plan");
                self.inner.state.lock().unwrap().error = Some(error.to_string());
                WeekPlan::new_empty(user_id, start)
            }
        };

        {
            let mut state = self.inner.state.lock().unwrap();
            state.current_plan = Some(plan.clone());
            state.last_persisted = Some(plan.clone());
        }
        let _ = self.inner.events.send(StoreEvent::PlanChanged);
        Ok(plan)
    }

    /// Assigns a recipe snapshot to the (day, meal type) slot.
    ///
    /// Optimistic: in-memory state and cache update synchronously, then
    /// one debounced write is scheduled. Returns false (with the error
    /// field set) when no user or plan is active. Never panics.
    pub fn add_meal_to_slot(&self, day_of_week: u8, meal_type: MealType, recipe: Recipe) -> bool {
        self.mutate(MutationOp::AssignMeal {
            day_of_week,
            meal_type,
            recipe,
        })
    }

    pub fn remove_meal_from_slot(&self, slot_id: &str) -> bool {
        self.mutate(MutationOp::RemoveMeal {
            slot_id: slot_id.to_string(),
        })
    }

    pub fn toggle_slot_lock(&self, slot_id: &str) -> bool {
        let locked = self.slot_flag(slot_id, |s| s.is_locked);
        self.mutate(MutationOp::SetLock {
            slot_id: slot_id.to_string(),
            locked: !locked.unwrap_or(false),
        })
    }

    pub fn toggle_slot_completed(&self, slot_id: &str) -> bool {
        let completed = self.slot_flag(slot_id, |s| s.is_completed);
        self.mutate(MutationOp::SetCompleted {
            slot_id: slot_id.to_string(),
            completed: !completed.unwrap_or(false),
        })
    }

    pub fn set_slot_servings(&self, slot_id: &str, servings: u32) -> bool {
        self.mutate(MutationOp::SetServings {
            slot_id: slot_id.to_string(),
            servings,
        })
    }

    /// Resets every slot in one logical mutation: one cache update, one
    /// scheduled write, regardless of how many slots were filled.
    pub fn clear_week(&self) -> bool {
        self.mutate(MutationOp::ClearWeek)
    }

    /// Summary of the current week; all zeros when nothing is loaded.
    pub fn get_week_summary(&self) -> WeekSummary {
        self.inner
            .state
            .lock()
            .unwrap()
            .current_plan
            .as_ref()
            .map(WeekPlan::summary)
            .unwrap_or_else(WeekSummary::empty)
    }

    /// Requests a candidate week from the AI collaborator and merges it
    /// into current state, skipping every locked slot. The merge is one
    /// optimistic mutation with one scheduled write.
    pub async fn generate_week_with_ai(
        &self,
        request: &GenerationRequest,
    ) -> Result<AIGeneratedPlan, PlanError> {
        let (user_id, week) = {
            let state = self.inner.state.lock().unwrap();
            let user_id = state.user_id.clone().ok_or(PlanError::Unauthenticated)?;
            let week = state
                .current_plan
                .clone()
                .ok_or_else(|| PlanError::Validation("no plan loaded".to_string()))?;
            (user_id, week)
        };
        let generator = self
            .inner
            .generator
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PlanError::Generation("no generator configured".to_string()))?;

        let candidate = match generator.generate(&user_id, &week, request).await {
            Ok(candidate) => candidate,
            Err(error) => {
                self.inner.state.lock().unwrap().error = Some(error.to_string());
                return Err(error);
            }
        };

        let merged = {
            let mut state = self.inner.state.lock().unwrap();
            let plan = state
                .current_plan
                .as_mut()
                .ok_or_else(|| PlanError::Validation("plan unloaded during generation".to_string()))?;
            let replaced = plan.merge_candidate(&candidate.plan);
            tracing::info!(week = %plan.start_date, replaced, "merged AI-generated week");
            let merged = plan.clone();
            state.error = None;
            merged
        };

        self.after_optimistic_apply(&merged, MutationOp::SavePlan {
            plan: merged.clone(),
        });

        Ok(AIGeneratedPlan {
            shopping_list: merged.shopping_list(),
            nutrition_average: merged.nutrition_average(),
            plan: merged,
            confidence: candidate.confidence,
        })
    }

    /// Flips connectivity. The offline-to-online transition triggers one
    /// serialized replay of the queued mutations, then refreshes the
    /// current week from the remote.
    pub async fn set_online(&self, online: bool) {
        let was_online = self.inner.online.swap(online, Ordering::SeqCst);
        if was_online || !online {
            return;
        }

        let report = self.inner.queue.replay_all(&self.inner.client).await;
        let _ = self.inner.events.send(StoreEvent::QueueReplayed {
            committed: report.committed,
            dropped: report.dropped,
        });

        if report.committed > 0 {
            let key = {
                let state = self.inner.state.lock().unwrap();
                state.current_plan.as_ref().map(WeekPlan::key)
            };
            if let Some(key) = key {
                self.inner.cache.remove(&key.cache_key());
                self.reload_current(key).await;
            }
        }
    }

    /// Drains pending debounced writes. Call before teardown; a pending
    /// write is otherwise lost with the process.
    pub async fn flush(&self) {
        self.inner.writer.flush_all().await;
    }

    /// Wires the realtime listener to this store for the current user.
    ///
    /// Remote-origin events invalidate the cache and reload the plan,
    /// except while the debounced writer holds in-flight local intent
    /// for the same key; the reload is skipped then so an incoming echo
    /// never reverts an optimistic edit.
    pub async fn attach_realtime(&self, listener: &RealtimeListener) -> Result<(), PlanError> {
        let user_id = {
            let state = self.inner.state.lock().unwrap();
            state.user_id.clone().ok_or(PlanError::Unauthenticated)?
        };
        let store = self.clone();
        listener
            .subscribe(&user_id, move |event| store.handle_remote_event(event))
            .await
    }

    fn handle_remote_event(&self, event: RealtimeEvent) {
        let key = {
            let state = self.inner.state.lock().unwrap();
            match &state.current_plan {
                Some(plan) if event_concerns_plan(&event, plan) => Some(plan.key()),
                _ => None,
            }
        };
        let Some(key) = key else {
            return;
        };

        self.inner.cache.remove(&key.cache_key());

        if self.inner.writer.is_pending(&key) {
            tracing::debug!(key = %key, "local write in flight, skipping remote reload");
            return;
        }

        let store = self.clone();
        tokio::spawn(async move {
            store.reload_current(key).await;
        });
    }

    async fn reload_current(&self, key: PlanKey) {
        let end = key.start_date + chrono::Duration::days(6);
        match self
            .inner
            .client
            .load_week_plan(&key.user_id, key.start_date, end)
            .await
        {
            Ok(Some(plan)) => {
                {
                    let mut state = self.inner.state.lock().unwrap();
                    let holds_key = state
                        .current_plan
                        .as_ref()
                        .is_some_and(|p| p.key() == key);
                    if !holds_key {
                        return;
                    }
                    state.current_plan = Some(plan.clone());
                    state.last_persisted = Some(plan.clone());
                }
                self.inner
                    .cache
                    .set(key.cache_key(), plan, self.inner.cache_ttl, Priority::High);
                let _ = self.inner.events.send(StoreEvent::RemoteChangeApplied(key));
                let _ = self.inner.events.send(StoreEvent::PlanChanged);
            }
            // Plans are never hard-deleted; a missing plan here means the
            // event raced a creation we will hear about again.
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "reload after remote change failed");
            }
        }
    }

    fn slot_flag<F>(&self, slot_id: &str, flag: F) -> Option<bool>
    where
        F: Fn(&crate::models::MealSlot) -> bool,
    {
        let state = self.inner.state.lock().unwrap();
        state
            .current_plan
            .as_ref()
            .and_then(|p| p.slot_by_id(slot_id))
            .map(flag)
    }

    /// The optimistic mutation wrapper: snapshot, apply, cache, schedule.
    /// On apply failure the snapshot is restored and the error surfaced.
    fn mutate(&self, op: MutationOp) -> bool {
        let applied = {
            let mut state = self.inner.state.lock().unwrap();
            if state.user_id.is_none() {
                state.error = Some(PlanError::Unauthenticated.to_string());
                return false;
            }
            let Some(plan) = state.current_plan.as_mut() else {
                state.error = Some("No week plan loaded. Load a week before editing.".to_string());
                return false;
            };

            let snapshot = plan.clone();
            match op.apply(plan) {
                Ok(()) => {
                    let updated = plan.clone();
                    state.error = None;
                    Some(updated)
                }
                Err(error) => {
                    *plan = snapshot;
                    state.error = Some(error.to_string());
                    None
                }
            }
        };

        match applied {
            Some(updated) => {
                self.after_optimistic_apply(&updated, op);
                true
            }
            None => false,
        }
    }

    /// Cache synchronously, then schedule the write (or queue it when
    /// offline), then notify observers.
    fn after_optimistic_apply(&self, updated: &WeekPlan, op: MutationOp) {
        let key = updated.key();
        self.inner
            .cache
            .set(key.cache_key(), updated.clone(), self.inner.cache_ttl, Priority::High);

        if self.is_online() {
            self.inner.writer.schedule(updated.clone());
        } else if let Err(error) = self.inner.queue.enqueue(key, op) {
            tracing::warn!(error = %error, "failed to enqueue offline mutation");
            self.inner.state.lock().unwrap().error = Some(error.to_string());
        }

        let _ = self.inner.events.send(StoreEvent::PlanChanged);
    }
}

fn event_concerns_plan(event: &RealtimeEvent, plan: &WeekPlan) -> bool {
    match event.entity_kind {
        EntityKind::WeekPlan => event.entity_id == plan.id.to_string(),
        EntityKind::MealSlot => plan.slot_by_id(&event.entity_id).is_some(),
    }
}

/// Applies writer outcomes to store state: success refreshes the
/// baseline, a network failure queues the state for offline replay, any
/// other failure rolls back to the last persisted snapshot.
async fn pump_outcomes(inner: Arc<StoreInner>, mut rx: mpsc::UnboundedReceiver<WriteOutcome>) {
    while let Some(outcome) = rx.recv().await {
        match outcome {
            WriteOutcome::Persisted { key, plan } => {
                {
                    let mut state = inner.state.lock().unwrap();
                    if state.current_plan.as_ref().is_some_and(|p| p.key() == key) {
                        state.last_persisted = Some(plan);
                        state.error = None;
                    }
                }
                let _ = inner.events.send(StoreEvent::PlanPersisted(key));
            }
            WriteOutcome::Failed { key, plan, error } => {
                match &error {
                    PlanError::Network(_) => {
                        // Keep the optimistic state; it will reach the
                        // remote through the offline queue.
                        if let Err(e) = inner
                            .queue
                            .enqueue(key.clone(), MutationOp::SavePlan { plan })
                        {
                            tracing::warn!(error = %e, "failed to queue plan after network failure");
                        }
                        inner.online.store(false, Ordering::SeqCst);
                    }
                    _ => {
                        let mut state = inner.state.lock().unwrap();
                        if state.current_plan.as_ref().is_some_and(|p| p.key() == key) {
                            if let Some(baseline) = state.last_persisted.clone() {
                                state.current_plan = Some(baseline.clone());
                                inner.cache.set(
                                    key.cache_key(),
                                    baseline,
                                    inner.cache_ttl,
                                    Priority::High,
                                );
                            }
                        }
                    }
                }
                {
                    let mut state = inner.state.lock().unwrap();
                    state.error = Some(error.to_string());
                }
                let _ = inner.events.send(StoreEvent::WriteFailed(key));
                let _ = inner.events.send(StoreEvent::PlanChanged);
            }
            WriteOutcome::StaleDiscarded { key } => {
                tracing::debug!(key = %key, "superseded write outcome ignored");
            }
        }
    }
}
