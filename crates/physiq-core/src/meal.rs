//! Meal breakdown and feedback records.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoodCategory {
    Protein,
    Carbs,
    Vegetables,
    Fruits,
    Dairy,
    Fats,
    Beverages,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealBalance {
    #[default]
    Balanced,
    ProteinHeavy,
    CarbHeavy,
    FatHeavy,
    LowCalorie,
}

/// Grams, except sodium which is milligrams.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Macronutrients {
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub sodium: f64,
}

impl Macronutrients {
    fn add(&mut self, other: &Macronutrients) {
        self.protein += other.protein;
        self.carbs += other.carbs;
        self.fat += other.fat;
        self.fiber += other.fiber;
        self.sugar += other.sugar;
        self.sodium += other.sodium;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    pub name: String,
    pub quantity: String,
    pub calories: f64,
    pub confidence: f64,
    pub macronutrients: Macronutrients,
    pub category: FoodCategory,
}

/// Sanitized stage one output of a meal analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealBreakdown {
    pub foods: Vec<FoodItem>,
    pub total_calories: f64,
    pub total_macronutrients: Macronutrients,
    pub meal_type: MealType,
    pub confidence: f64,
    pub insights: Vec<String>,
}

impl MealBreakdown {
    /// Build a breakdown whose totals are the sums of `foods`.
    pub fn with_totals(
        foods: Vec<FoodItem>,
        meal_type: MealType,
        confidence: f64,
        insights: Vec<String>,
    ) -> Self {
        let mut total_macronutrients = Macronutrients::default();
        let mut total_calories = 0.0;
        for food in &foods {
            total_calories += food.calories;
            total_macronutrients.add(&food.macronutrients);
        }
        Self {
            foods,
            total_calories,
            total_macronutrients,
            meal_type,
            confidence,
            insights,
        }
    }
}

/// Sanitized stage two output of a meal analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealFeedback {
    pub recommendations: Vec<String>,
    pub health_score: f64,
    pub balance: MealBalance,
}
