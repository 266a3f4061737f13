//! AI plan-generation collaborator seam.
//!
//! Generation is one opaque remote call returning a candidate plan; the
//! plan store owns merging it into current state (locked slots always
//! survive the merge untouched). No retries happen at this layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::models::WeekPlan;

/// Constraints the generator must honor when proposing a week.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationConstraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_prep_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    #[serde(default)]
    pub exclude_recipe_ids: Vec<String>,
}

/// What the user asked the generator for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Free-form preference tags ("vegetariano", "rapido", ...).
    #[serde(default)]
    pub preferences: Vec<String>,
    #[serde(default)]
    pub constraints: GenerationConstraints,
}

/// A candidate week proposed by the generator.
#[derive(Debug, Clone)]
pub struct GeneratedCandidate {
    pub plan: WeekPlan,
    /// Generator-reported confidence, 0.0..=1.0.
    pub confidence: f64,
}

/// The remote generation collaborator.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(
        &self,
        user_id: &str,
        week: &WeekPlan,
        request: &GenerationRequest,
    ) -> Result<GeneratedCandidate, PlanError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_json_defaults() {
        let parsed: GenerationRequest = serde_json::from_str("{}").unwrap();
        assert!(parsed.preferences.is_empty());
        assert!(parsed.constraints.max_prep_minutes.is_none());
    }

    #[test]
    fn test_request_json_roundtrip() {
        let request = GenerationRequest {
            preferences: vec!["vegetariano".into()],
            constraints: GenerationConstraints {
                max_prep_minutes: Some(30),
                servings: Some(2),
                exclude_recipe_ids: vec!["r9".into()],
            },
        };
        let json = serde_json::to_string(&request).unwrap();
        let parsed: GenerationRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.preferences, request.preferences);
        assert_eq!(parsed.constraints.max_prep_minutes, Some(30));
    }
}
