use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::RemoteStore;
use crate::error::PlanError;
use crate::models::{PlanKey, WeekPlan};

/// In-memory remote store with upsert-by-composite-key semantics.
///
/// Used in tests and offline demos. Supports one-shot failure injection
/// and counts save calls, which the debounce tests rely on.
#[derive(Default)]
pub struct MemoryStore {
    plans: Mutex<HashMap<PlanKey, WeekPlan>>,
    fail_next_save: Mutex<Option<PlanError>>,
    fail_next_fetch: Mutex<Option<PlanError>>,
    save_delay: Mutex<Option<std::time::Duration>>,
    save_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `store_plan` call fail with `error`.
    pub fn fail_next_save(&self, error: PlanError) {
        *self.fail_next_save.lock().unwrap() = Some(error);
    }

    /// Makes the next `fetch_plan` call fail with `error`.
    pub fn fail_next_fetch(&self, error: PlanError) {
        *self.fail_next_fetch.lock().unwrap() = Some(error);
    }

    /// Adds artificial latency to every `store_plan` call, for tests
    /// that race an in-flight write against newer local state.
    pub fn set_save_delay(&self, delay: std::time::Duration) {
        *self.save_delay.lock().unwrap() = Some(delay);
    }

    /// Total successful and failed `store_plan` invocations.
    pub fn save_call_count(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// Total `fetch_plan` invocations.
    pub fn fetch_call_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Number of distinct stored plans.
    pub fn plan_count(&self) -> usize {
        self.plans.lock().unwrap().len()
    }

    /// Reads the stored plan for a key, if any.
    pub fn stored_plan(&self, user_id: &str, start: NaiveDate) -> Option<WeekPlan> {
        self.plans
            .lock()
            .unwrap()
            .get(&PlanKey::new(user_id, start))
            .cloned()
    }

    /// Seeds a plan directly, bypassing the store contract.
    pub fn insert_plan(&self, plan: WeekPlan) {
        self.plans.lock().unwrap().insert(plan.key(), plan);
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn fetch_plan(
        &self,
        user_id: &str,
        start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Option<WeekPlan>, PlanError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_next_fetch.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self
            .plans
            .lock()
            .unwrap()
            .get(&PlanKey::new(user_id, start))
            .cloned())
    }

    async fn store_plan(&self, user_id: &str, plan: &WeekPlan) -> Result<WeekPlan, PlanError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.save_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.fail_next_save.lock().unwrap().take() {
            return Err(error);
        }
        if plan.user_id != user_id {
            return Err(PlanError::Validation(format!(
                "plan user {} does not match caller {}",
                plan.user_id, user_id
            )));
        }
        let mut stored = plan.clone();
        stored.updated_at = chrono::Utc::now();
        self.plans
            .lock()
            .unwrap()
            .insert(plan.key(), stored.clone());
        Ok(stored)
    }
}
