mod meal_slot;
mod meal_type;
mod recipe;
mod summary;
mod week_plan;

pub use meal_slot::MealSlot;
pub use meal_type::MealType;
pub use recipe::{Ingredient, Nutrition, Recipe};
pub use summary::{AIGeneratedPlan, ShoppingItem, ShoppingList, WeekSummary};
pub use week_plan::{week_start_of, PlanKey, WeekPlan};
