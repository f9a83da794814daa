//! Meal breakdown and meal feedback sanitizers.

use serde_json::Value;

use super::body::{CONFIDENCE, MAX_INSIGHTS};
use super::rules::{choice, choice_str, string_list, text, Bounds};
use crate::meal::{FoodItem, Macronutrients, MealBreakdown, MealFeedback};
use crate::task::MealContext;

const MAX_FOODS: usize = 15;
const MAX_FOOD_NAME_CHARS: usize = 80;
const MAX_QUANTITY_CHARS: usize = 40;
const DEFAULT_QUANTITY: &str = "1 serving";

const FOOD_CALORIES: Bounds = Bounds::new(0.0, 2500.0, 0.0);
const FOOD_CONFIDENCE: Bounds = Bounds::new(0.0, 1.0, 0.5);
const PROTEIN_G: Bounds = Bounds::new(0.0, 300.0, 0.0);
const CARBS_G: Bounds = Bounds::new(0.0, 400.0, 0.0);
const FAT_G: Bounds = Bounds::new(0.0, 200.0, 0.0);
const FIBER_G: Bounds = Bounds::new(0.0, 100.0, 0.0);
const SUGAR_G: Bounds = Bounds::new(0.0, 300.0, 0.0);
const SODIUM_MG: Bounds = Bounds::new(0.0, 10000.0, 0.0);

const HEALTH_SCORE: Bounds = Bounds::new(0.0, 10.0, 5.0);
const MAX_RECOMMENDATIONS: usize = 5;

/// Sanitize a decoded stage one meal response.
///
/// Foods without a name are dropped; totals are recomputed from the
/// remaining foods and never taken from the model. The meal type from the
/// request wins over the one the model reports.
pub fn sanitize_meal_breakdown(raw: &Value, context: &MealContext) -> MealBreakdown {
    let foods = match raw.get("foods") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(sanitize_food)
            .take(MAX_FOODS)
            .collect(),
        _ => Vec::new(),
    };
    let meal_type = match context.meal_type.as_deref() {
        Some(t) => choice_str(Some(t)),
        None => choice(raw.get("mealType")),
    };

    MealBreakdown::with_totals(
        foods,
        meal_type,
        CONFIDENCE.apply(raw.get("confidence")),
        string_list(raw.get("insights"), MAX_INSIGHTS, &[]),
    )
}

fn sanitize_food(raw: &Value) -> Option<FoodItem> {
    let name = text(raw.get("name"), MAX_FOOD_NAME_CHARS)?;
    let macros = raw.get("macronutrients");
    let grams = |key: &str| macros.and_then(|m| m.get(key));

    Some(FoodItem {
        name,
        quantity: text(raw.get("quantity"), MAX_QUANTITY_CHARS)
            .unwrap_or_else(|| DEFAULT_QUANTITY.to_string()),
        calories: FOOD_CALORIES.apply(raw.get("calories")),
        confidence: FOOD_CONFIDENCE.apply(raw.get("confidence")),
        macronutrients: Macronutrients {
            protein: PROTEIN_G.apply(grams("protein")),
            carbs: CARBS_G.apply(grams("carbs")),
            fat: FAT_G.apply(grams("fat")),
            fiber: FIBER_G.apply(grams("fiber")),
            sugar: SUGAR_G.apply(grams("sugar")),
            sodium: SODIUM_MG.apply(grams("sodium")),
        },
        category: choice(raw.get("category")),
    })
}

/// Sanitize a decoded stage two meal response.
pub fn sanitize_meal_feedback(raw: &Value) -> MealFeedback {
    MealFeedback {
        recommendations: string_list(raw.get("recommendations"), MAX_RECOMMENDATIONS, &[]),
        health_score: HEALTH_SCORE.apply(raw.get("healthScore")),
        balance: choice(raw.get("balance")),
    }
}
