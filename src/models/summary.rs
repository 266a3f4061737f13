//! Derived read models: week summary, shopping list, AI generation result.
//!
//! Everything here is computed from the in-memory plan; nothing is
//! persisted or cached on its own.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{Nutrition, WeekPlan};

/// Aggregate numbers for one week plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekSummary {
    /// Slots with a planned meal.
    pub total_meals: usize,
    /// Slots marked completed.
    pub completed_meals: usize,
    /// Filled slots as a percentage of the 28 slots.
    pub completion_percentage: f64,
    /// Distinct recipe ids across filled slots.
    pub unique_recipes: usize,
    /// Mean nutrition across filled slots that carry nutrition data.
    /// None when no slot has nutrition info (never divides by zero).
    pub nutrition_average: Option<Nutrition>,
}

impl WeekSummary {
    pub fn empty() -> Self {
        Self {
            total_meals: 0,
            completed_meals: 0,
            completion_percentage: 0.0,
            unique_recipes: 0,
            nutrition_average: None,
        }
    }
}

/// One aggregated line of a shopping list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingItem {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

/// Grocery list derived from a week's recipe snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShoppingList {
    pub items: Vec<ShoppingItem>,
}

/// Result of an AI week generation: the merged plan plus derived views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIGeneratedPlan {
    pub plan: WeekPlan,
    pub shopping_list: ShoppingList,
    pub nutrition_average: Option<Nutrition>,
    /// Confidence reported by the generation collaborator, 0.0..=1.0.
    pub confidence: f64,
}

impl WeekPlan {
    /// Computes the week summary from current slots.
    pub fn summary(&self) -> WeekSummary {
        let total_meals = self.filled_count();
        let completed_meals = self.slots.iter().filter(|s| s.is_completed).count();
        let slot_count = self.slots.len().max(1);
        let completion_percentage = total_meals as f64 / slot_count as f64 * 100.0;

        let unique_recipes = self
            .slots
            .iter()
            .filter_map(|s| s.recipe_id.as_deref())
            .collect::<HashSet<_>>()
            .len();

        WeekSummary {
            total_meals,
            completed_meals,
            completion_percentage,
            unique_recipes,
            nutrition_average: self.nutrition_average(),
        }
    }

    /// Mean nutrition over filled slots with nutrition data, or None.
    pub fn nutrition_average(&self) -> Option<Nutrition> {
        let values: Vec<Nutrition> = self
            .slots
            .iter()
            .filter(|s| s.is_filled())
            .filter_map(|s| s.recipe.as_ref().and_then(|r| r.nutrition))
            .collect();

        if values.is_empty() {
            return None;
        }

        let n = values.len() as f64;
        let mut total = Nutrition::default();
        for v in &values {
            total.calories += v.calories;
            total.protein += v.protein;
            total.carbs += v.carbs;
            total.fat += v.fat;
        }
        Some(Nutrition::new(
            total.calories / n,
            total.protein / n,
            total.carbs / n,
            total.fat / n,
        ))
    }

    /// Aggregates ingredients across filled slots into a shopping list.
    ///
    /// Quantities scale with the slot's servings (recipe quantities are
    /// per two servings, the default) and merge by (name, unit),
    /// case-insensitive on the name.
    pub fn shopping_list(&self) -> ShoppingList {
        let mut items: Vec<ShoppingItem> = Vec::new();

        for slot in self.slots.iter().filter(|s| s.is_filled()) {
            let Some(recipe) = &slot.recipe else { continue };
            let scale = f64::from(slot.servings) / 2.0;
            for ingredient in &recipe.ingredients {
                let name_lower = ingredient.name.to_lowercase();
                match items
                    .iter_mut()
                    .find(|i| i.name.to_lowercase() == name_lower && i.unit == ingredient.unit)
                {
                    Some(existing) => existing.quantity += ingredient.quantity * scale,
                    None => items.push(ShoppingItem {
                        name: ingredient.name.clone(),
                        quantity: ingredient.quantity * scale,
                        unit: ingredient.unit.clone(),
                    }),
                }
            }
        }

        items.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        ShoppingList { items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ingredient, MealType, Recipe};
    use chrono::NaiveDate;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn test_empty_plan_summary_is_all_zero() {
        let plan = WeekPlan::new_empty("user1", monday());
        let summary = plan.summary();

        assert_eq!(summary.total_meals, 0);
        assert_eq!(summary.completed_meals, 0);
        assert_eq!(summary.completion_percentage, 0.0);
        assert_eq!(summary.unique_recipes, 0);
        assert!(summary.nutrition_average.is_none());
    }

    #[test]
    fn test_summary_counts_filled_and_unique() {
        let mut plan = WeekPlan::new_empty("user1", monday());
        plan.assign_meal(0, MealType::Almuerzo, Recipe::new("r1", "Tortilla"));
        plan.assign_meal(1, MealType::Almuerzo, Recipe::new("r1", "Tortilla"));
        plan.assign_meal(2, MealType::Cena, Recipe::new("r2", "Lentejas"));

        let summary = plan.summary();
        assert_eq!(summary.total_meals, 3);
        assert_eq!(summary.unique_recipes, 2);
        assert!((summary.completion_percentage - 3.0 / 28.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_nutrition_average_ignores_slots_without_data() {
        let mut plan = WeekPlan::new_empty("user1", monday());
        plan.assign_meal(
            0,
            MealType::Almuerzo,
            Recipe::new("r1", "Tortilla").with_nutrition(Nutrition::new(400.0, 20.0, 30.0, 20.0)),
        );
        plan.assign_meal(
            1,
            MealType::Cena,
            Recipe::new("r2", "Lentejas").with_nutrition(Nutrition::new(600.0, 30.0, 70.0, 10.0)),
        );
        // No nutrition on this one; it must not drag the average down.
        plan.assign_meal(2, MealType::Cena, Recipe::new("r3", "Sopa"));

        let avg = plan.nutrition_average().unwrap();
        assert_eq!(avg.calories, 500.0);
        assert_eq!(avg.protein, 25.0);
    }

    #[test]
    fn test_shopping_list_merges_and_scales() {
        let mut plan = WeekPlan::new_empty("user1", monday());
        plan.assign_meal(
            0,
            MealType::Almuerzo,
            Recipe::new("r1", "Tortilla")
                .with_ingredients(vec![Ingredient::new("Huevos", 3.0, "unidades")]),
        );
        plan.assign_meal(
            1,
            MealType::Cena,
            Recipe::new("r2", "Revuelto")
                .with_ingredients(vec![Ingredient::new("huevos", 2.0, "unidades")]),
        );
        // Four servings doubles the default-two quantities.
        let slot_id = plan.slot(1, MealType::Cena).unwrap().id.clone();
        plan.set_servings(&slot_id, 4);

        let list = plan.shopping_list();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].quantity, 3.0 + 2.0 * 2.0);
    }

    #[test]
    fn test_shopping_list_empty_plan() {
        let plan = WeekPlan::new_empty("user1", monday());
        assert!(plan.shopping_list().items.is_empty());
    }
}
