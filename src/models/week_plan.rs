use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use super::{MealSlot, MealType, Recipe};

/// Composite key identifying one user's plan for one week.
///
/// Remote persistence upserts by this key, and the debounced writer and
/// cache are both keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanKey {
    pub user_id: String,
    pub start_date: NaiveDate,
}

impl PlanKey {
    pub fn new(user_id: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            user_id: user_id.into(),
            start_date,
        }
    }

    /// Stable cache key string for this plan.
    pub fn cache_key(&self) -> String {
        format!("plan:{}:{}", self.user_id, self.start_date)
    }
}

impl fmt::Display for PlanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.start_date)
    }
}

/// Snaps an arbitrary date back to the Monday of its calendar week.
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// One user's plan for a 7-day Monday-start week.
///
/// A plan always carries exactly 28 slots (7 days x 4 meal types),
/// generated eagerly at creation. Plans are never hard-deleted, only
/// cleared back to empty slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekPlan {
    pub id: Uuid,
    pub user_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub slots: Vec<MealSlot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WeekPlan {
    /// Creates an empty plan with all 28 slots for the week containing
    /// `date`. The start date snaps back to Monday.
    pub fn new_empty(user_id: impl Into<String>, date: NaiveDate) -> Self {
        let start_date = week_start_of(date);
        let now = Utc::now();

        let mut slots = Vec::with_capacity(28);
        for day in 0..7u8 {
            let slot_date = start_date + Duration::days(i64::from(day));
            for meal_type in MealType::ALL {
                slots.push(MealSlot::empty(slot_date, day, meal_type));
            }
        }

        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            start_date,
            end_date: start_date + Duration::days(6),
            slots,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> PlanKey {
        PlanKey::new(self.user_id.clone(), self.start_date)
    }

    /// Checks the 28-slot invariant: every (day, meal type) pair exactly once.
    pub fn validate(&self) -> Result<(), String> {
        if self.slots.len() != 28 {
            return Err(format!("expected 28 slots, found {}", self.slots.len()));
        }
        let mut seen = HashSet::new();
        for slot in &self.slots {
            if slot.day_of_week > 6 {
                return Err(format!("slot {} has day_of_week {}", slot.id, slot.day_of_week));
            }
            if !seen.insert((slot.day_of_week, slot.meal_type)) {
                return Err(format!(
                    "duplicate slot for day {} {}",
                    slot.day_of_week, slot.meal_type
                ));
            }
        }
        Ok(())
    }

    pub fn slot(&self, day_of_week: u8, meal_type: MealType) -> Option<&MealSlot> {
        self.slots
            .iter()
            .find(|s| s.day_of_week == day_of_week && s.meal_type == meal_type)
    }

    pub fn slot_by_id(&self, slot_id: &str) -> Option<&MealSlot> {
        self.slots.iter().find(|s| s.id == slot_id)
    }

    fn slot_mut(&mut self, day_of_week: u8, meal_type: MealType) -> Option<&mut MealSlot> {
        self.slots
            .iter_mut()
            .find(|s| s.day_of_week == day_of_week && s.meal_type == meal_type)
    }

    fn slot_by_id_mut(&mut self, slot_id: &str) -> Option<&mut MealSlot> {
        self.slots.iter_mut().find(|s| s.id == slot_id)
    }

    /// Assigns a recipe snapshot to the slot at (day, meal type).
    ///
    /// Returns false if no such slot exists.
    pub fn assign_meal(&mut self, day_of_week: u8, meal_type: MealType, recipe: Recipe) -> bool {
        let Some(slot) = self.slot_mut(day_of_week, meal_type) else {
            return false;
        };
        slot.assign(recipe);
        self.updated_at = Utc::now();
        true
    }

    /// Clears the assignment of one slot. Returns false if the slot is unknown.
    pub fn remove_meal(&mut self, slot_id: &str) -> bool {
        let Some(slot) = self.slot_by_id_mut(slot_id) else {
            return false;
        };
        slot.clear_assignment();
        self.updated_at = Utc::now();
        true
    }

    /// Toggles the lock on one slot, returning the new lock state.
    pub fn toggle_lock(&mut self, slot_id: &str) -> Option<bool> {
        let slot = self.slot_by_id_mut(slot_id)?;
        slot.is_locked = !slot.is_locked;
        slot.updated_at = Utc::now();
        let (updated_at, is_locked) = (slot.updated_at, slot.is_locked);
        self.updated_at = updated_at;
        Some(is_locked)
    }

    /// Sets the lock flag on one slot. Returns false if the slot is unknown.
    pub fn set_locked(&mut self, slot_id: &str, locked: bool) -> bool {
        let Some(slot) = self.slot_by_id_mut(slot_id) else {
            return false;
        };
        slot.is_locked = locked;
        slot.updated_at = Utc::now();
        self.updated_at = slot.updated_at;
        true
    }

    /// Sets the completion flag on one slot. Returns false if unknown.
    pub fn set_completed(&mut self, slot_id: &str, completed: bool) -> bool {
        let Some(slot) = self.slot_by_id_mut(slot_id) else {
            return false;
        };
        slot.is_completed = completed;
        slot.updated_at = Utc::now();
        self.updated_at = slot.updated_at;
        true
    }

    /// Toggles completion on one slot, returning the new state.
    pub fn toggle_completed(&mut self, slot_id: &str) -> Option<bool> {
        let slot = self.slot_by_id_mut(slot_id)?;
        slot.is_completed = !slot.is_completed;
        slot.updated_at = Utc::now();
        let (updated_at, is_completed) = (slot.updated_at, slot.is_completed);
        self.updated_at = updated_at;
        Some(is_completed)
    }

    /// Sets the servings count on one slot.
    pub fn set_servings(&mut self, slot_id: &str, servings: u32) -> bool {
        let Some(slot) = self.slot_by_id_mut(slot_id) else {
            return false;
        };
        slot.servings = servings;
        slot.updated_at = Utc::now();
        self.updated_at = slot.updated_at;
        true
    }

    /// Resets every slot's assignment and completion in one mutation.
    ///
    /// Lock flags are left as they are; the plan itself stays active.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.clear_assignment();
        }
        self.updated_at = Utc::now();
    }

    /// Merges a candidate plan into this one, skipping locked slots.
    ///
    /// Used by AI regeneration: every unlocked slot takes the candidate's
    /// assignment for the same (day, meal type) position; locked slots are
    /// untouched. Returns the number of slots that changed.
    pub fn merge_candidate(&mut self, candidate: &WeekPlan) -> usize {
        let mut replaced = 0;
        for slot in &mut self.slots {
            if slot.is_locked {
                continue;
            }
            let Some(incoming) = candidate.slot(slot.day_of_week, slot.meal_type) else {
                continue;
            };
            slot.recipe_id = incoming.recipe_id.clone();
            slot.recipe = incoming.recipe.clone();
            slot.custom_name = incoming.custom_name.clone();
            slot.servings = incoming.servings;
            slot.is_completed = false;
            slot.updated_at = Utc::now();
            replaced += 1;
        }
        if replaced > 0 {
            self.updated_at = Utc::now();
        }
        replaced
    }

    /// Count of slots with a planned meal.
    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_filled()).count()
    }
}

impl fmt::Display for WeekPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Week {} - {} ({})",
            self.start_date, self.end_date, self.user_id
        )?;
        writeln!(f, "{} of 28 slots filled", self.filled_count())?;
        Ok(())
    }
}
