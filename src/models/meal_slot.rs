use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{MealType, Recipe};

/// One meal-type/day cell of a week plan, possibly empty.
///
/// Slot ids are stable and derived from position (`"{date}-{meal_type}"`),
/// so the same cell keeps its id across reloads and devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealSlot {
    pub id: String,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: u8,
    pub meal_type: MealType,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_id: Option<String>,
    /// Denormalized snapshot copied at assignment time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe: Option<Recipe>,
    /// Free-text meal name for slots filled without a recipe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
    pub servings: u32,
    pub is_locked: bool,
    pub is_completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl MealSlot {
    /// Creates an empty slot for a position in the week.
    pub fn empty(date: NaiveDate, day_of_week: u8, meal_type: MealType) -> Self {
        Self {
            id: Self::slot_id(date, meal_type),
            day_of_week,
            meal_type,
            date,
            recipe_id: None,
            recipe: None,
            custom_name: None,
            servings: 2,
            is_locked: false,
            is_completed: false,
            updated_at: Utc::now(),
        }
    }

    /// The stable id for a slot position.
    pub fn slot_id(date: NaiveDate, meal_type: MealType) -> String {
        format!("{}-{}", date, meal_type)
    }

    /// True if the slot has a meal planned (recipe or custom name).
    pub fn is_filled(&self) -> bool {
        self.recipe_id.is_some() || self.custom_name.is_some()
    }

    /// Assigns a recipe snapshot, clearing any custom name.
    pub fn assign(&mut self, recipe: Recipe) {
        self.recipe_id = Some(recipe.id.clone());
        self.recipe = Some(recipe);
        self.custom_name = None;
        self.updated_at = Utc::now();
    }

    /// Clears the slot's assignment and completion. Lock state is kept.
    pub fn clear_assignment(&mut self) {
        self.recipe_id = None;
        self.recipe = None;
        self.custom_name = None;
        self.is_completed = false;
        self.updated_at = Utc::now();
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.meal_type)?;
        match (&self.recipe, &self.custom_name) {
            (Some(recipe), _) => write!(f, ": {}", recipe.name),
            (None, Some(name)) => write!(f, ": {}", name),
            (None, None) => write!(f, ": (empty)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn test_empty_slot() {
        let slot = MealSlot::empty(test_date(), 0, MealType::Almuerzo);
        assert_eq!(slot.id, "2024-01-15-almuerzo");
        assert!(!slot.is_filled());
        assert!(!slot.is_locked);
        assert!(!slot.is_completed);
    }

    #[test]
    fn test_assign_clears_custom_name() {
        let mut slot = MealSlot::empty(test_date(), 0, MealType::Cena);
        slot.custom_name = Some("Sobras".to_string());

        slot.assign(Recipe::new("r1", "Tortilla"));

        assert_eq!(slot.recipe_id.as_deref(), Some("r1"));
        assert!(slot.custom_name.is_none());
        assert!(slot.is_filled());
    }

    #[test]
    fn test_clear_assignment_keeps_lock() {
        let mut slot = MealSlot::empty(test_date(), 0, MealType::Desayuno);
        slot.assign(Recipe::new("r1", "Tortilla"));
        slot.is_locked = true;
        slot.is_completed = true;

        slot.clear_assignment();

        assert!(!slot.is_filled());
        assert!(!slot.is_completed);
        assert!(slot.is_locked);
    }

    #[test]
    fn test_snapshot_is_independent_of_recipe_edits() {
        let mut recipe = Recipe::new("r1", "Tortilla");
        let mut slot = MealSlot::empty(test_date(), 0, MealType::Almuerzo);
        slot.assign(recipe.clone());

        // Editing the source recipe must not change the planned slot.
        recipe.name = "Tortilla de patatas".to_string();
        assert_eq!(slot.recipe.as_ref().unwrap().name, "Tortilla");
    }

    #[test]
    fn test_display() {
        let mut slot = MealSlot::empty(test_date(), 0, MealType::Almuerzo);
        assert!(format!("{}", slot).contains("(empty)"));

        slot.assign(Recipe::new("r1", "Tortilla"));
        assert!(format!("{}", slot).contains("Tortilla"));
    }
}
