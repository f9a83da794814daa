//! Nutrition plan record (stage two of a body analysis).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingPriority {
    Cardio,
    Strength,
    Flexibility,
    Balance,
    #[default]
    GeneralFitness,
}

/// Daily macronutrient split, in percent of energy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroSplit {
    pub protein: u32,
    pub carbs: u32,
    pub fat: u32,
}

/// Sanitized stage two output of a body analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionPlan {
    pub nutrition: Vec<String>,
    pub priority: TrainingPriority,
    pub daily_calories: u32,
    pub macro_split: MacroSplit,
    pub supplements: Vec<String>,
    pub restrictions: Vec<String>,
    pub goals: Vec<String>,
}
