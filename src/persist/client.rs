use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::PlanError;
use crate::models::WeekPlan;

/// The remote key-indexed document store for week plans.
///
/// `store_plan` upserts by `(user_id, start_date)`: saving the same plan
/// state twice must not create duplicate slots server-side.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetches a user's plan for the week starting at `start`.
    /// Returns None when no plan exists for that week yet.
    async fn fetch_plan(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<WeekPlan>, PlanError>;

    /// Upserts a plan and returns the stored state.
    async fn store_plan(&self, user_id: &str, plan: &WeekPlan) -> Result<WeekPlan, PlanError>;
}

/// Typed wrapper around the remote store: pure I/O, no business rules.
///
/// Failures surface as typed `PlanError`s and are never swallowed here;
/// degradation decisions (synthesize empty plan, enqueue offline) belong
/// to the plan store.
#[derive(Clone)]
pub struct PersistenceClient {
    store: Arc<dyn RemoteStore>,
}

impl PersistenceClient {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Loads a week plan, or None if the week has no plan yet.
    pub async fn load_week_plan(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<WeekPlan>, PlanError> {
        let result = self.store.fetch_plan(user_id, start, end).await;
        if let Err(e) = &result {
            tracing::warn!(user_id = %user_id, week = %start, error = %e, "plan load failed");
        }
        result
    }

    /// Upserts a week plan and returns the stored state.
    pub async fn save_week_plan(
        &self,
        user_id: &str,
        plan: &WeekPlan,
    ) -> Result<WeekPlan, PlanError> {
        match self.store.store_plan(user_id, plan).await {
            Ok(stored) => {
                tracing::debug!(user_id = %user_id, week = %plan.start_date, "plan saved");
                Ok(stored)
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, week = %plan.start_date, error = %e, "plan save failed");
                Err(e)
            }
        }
    }
}
