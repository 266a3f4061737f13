use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;

use super::RemoteStore;
use crate::error::PlanError;
use crate::models::WeekPlan;

/// Remote store over the hosted plan API.
///
/// Plans live at `/users/{user_id}/plans/{start_date}`; PUT upserts by
/// that path, so replaying an identical save is harmless server-side.
pub struct HttpStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn plan_url(&self, user_id: &str, start: NaiveDate) -> String {
        format!(
            "{}/users/{}/plans/{}",
            self.base_url.trim_end_matches('/'),
            user_id,
            start
        )
    }

    fn map_status(status: StatusCode, body: String) -> PlanError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlanError::Auth(body),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                PlanError::Validation(body)
            }
            _ => PlanError::Network(format!("server returned status {}: {}", status, body)),
        }
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn fetch_plan(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<WeekPlan>, PlanError> {
        let response = self
            .client
            .get(self.plan_url(user_id, start))
            .query(&[("end", end.to_string())])
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| PlanError::Network(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let plan: WeekPlan = response
            .json()
            .await
            .map_err(|e| PlanError::Validation(format!("malformed plan payload: {}", e)))?;
        Ok(Some(plan))
    }

    async fn store_plan(&self, user_id: &str, plan: &WeekPlan) -> Result<WeekPlan, PlanError> {
        let response = self
            .client
            .put(self.plan_url(user_id, plan.start_date))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(plan)
            .send()
            .await
            .map_err(|e| PlanError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        response
            .json()
            .await
            .map_err(|e| PlanError::Validation(format!("malformed plan payload: {}", e)))
    }
}
