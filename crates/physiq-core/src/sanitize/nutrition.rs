//! Nutrition plan sanitizer.

use serde_json::Value;

use super::rules::{choice, string_list, Bounds};
use crate::nutrition::{MacroSplit, NutritionPlan};

const DAILY_CALORIES: Bounds = Bounds::new(1200.0, 4500.0, 2000.0);
const PROTEIN_PCT: Bounds = Bounds::new(10.0, 50.0, 30.0);
const CARBS_PCT: Bounds = Bounds::new(10.0, 65.0, 40.0);
const FAT_PCT: Bounds = Bounds::new(15.0, 45.0, 30.0);

const MAX_NUTRITION_TIPS: usize = 6;
const MAX_LIST: usize = 5;
const DEFAULT_GOALS: &[&str] = &["improve_health"];

/// Sanitize a decoded stage two body response.
///
/// Models sometimes wrap the plan in a `recommendations` object; the wrapper
/// is looked through.
pub fn sanitize_nutrition_plan(raw: &Value) -> NutritionPlan {
    let raw = match raw.get("recommendations") {
        Some(inner @ Value::Object(_)) => inner,
        _ => raw,
    };
    let split = raw.get("macroSplit");
    let pct = |key: &str| split.and_then(|s| s.get(key));

    NutritionPlan {
        nutrition: string_list(raw.get("nutrition"), MAX_NUTRITION_TIPS, &[]),
        priority: choice(raw.get("priority")),
        daily_calories: DAILY_CALORIES.apply_u32(raw.get("dailyCalories")),
        macro_split: MacroSplit {
            protein: PROTEIN_PCT.apply_u32(pct("protein")),
            carbs: CARBS_PCT.apply_u32(pct("carbs")),
            fat: FAT_PCT.apply_u32(pct("fat")),
        },
        supplements: string_list(raw.get("supplements"), MAX_LIST, &[]),
        restrictions: string_list(raw.get("restrictions"), MAX_LIST, &[]),
        goals: string_list(raw.get("goals"), MAX_LIST, DEFAULT_GOALS),
    }
}
