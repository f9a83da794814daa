//! Prompt builders for the four stage calls.
//!
//! Each prompt names the JSON shape and the allowed values; the sanitizer
//! still enforces them on whatever comes back.

use serde_json::json;

use physiq_core::body::BodyAssessment;
use physiq_core::meal::MealBreakdown;
use physiq_core::{MealContext, Payload, SubjectProfile};

use crate::clients::{ImageInput, StageRequest};

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

const BODY_SYSTEM: &str = "You are a fitness assessment assistant. You estimate body \
composition from photos. Reply with a single JSON object and nothing else.";

const NUTRITION_SYSTEM: &str = "You are a sports nutritionist. You turn a body assessment \
into a practical nutrition plan. Reply with a single JSON object and nothing else.";

const MEAL_SYSTEM: &str = "You are a nutrition analyst. You identify foods in a meal and \
estimate their nutritional content. Reply with a single JSON object and nothing else.";

const MEAL_FEEDBACK_SYSTEM: &str = "You are a dietitian reviewing a single meal. Reply with \
a single JSON object and nothing else.";

fn images(payload: &Payload) -> Vec<ImageInput> {
    match payload {
        Payload::Image { data, mime_type } => vec![ImageInput {
            data: data.clone(),
            mime_type: mime_type
                .clone()
                .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string()),
        }],
        Payload::Text { .. } => Vec::new(),
    }
}

fn subject_source(payload: &Payload) -> String {
    match payload {
        Payload::Image { .. } => "Analyse the attached photo.".to_string(),
        Payload::Text { description } => format!("Analyse this description:\n{}", description),
    }
}

fn describe_profile(profile: &SubjectProfile) -> String {
    let mut lines = Vec::new();
    if let Some(age) = profile.age {
        lines.push(format!("- age: {}", age));
    }
    if let Some(gender) = &profile.gender {
        lines.push(format!("- gender: {}", gender));
    }
    if let Some(height) = profile.height_cm {
        lines.push(format!("- height: {} cm", height));
    }
    if let Some(weight) = profile.weight_kg {
        lines.push(format!("- weight: {} kg", weight));
    }
    if let Some(target) = profile.target_weight_kg {
        lines.push(format!("- target weight: {} kg", target));
    }
    if let Some(activity) = &profile.activity_level {
        lines.push(format!("- activity level: {}", activity));
    }
    if !profile.goals.is_empty() {
        lines.push(format!("- goals: {}", profile.goals.join(", ")));
    }
    if lines.is_empty() {
        "No personal details were provided.".to_string()
    } else {
        format!("Person details:\n{}", lines.join("\n"))
    }
}

/// Stage one of a body analysis.
pub fn body_assessment(payload: &Payload, profile: &SubjectProfile) -> StageRequest {
    let shape = json!({
        "bodyType": "ectomorph | mesomorph | endomorph",
        "measurements": {
            "bodyFatPercentage": "number between 5 and 50",
            "muscleDefinition": "low | moderate | high | very_high",
            "posture": "needs_attention | fair | good | excellent",
            "symmetry": "needs_attention | fair | good | excellent",
            "overallFitness": "beginner | intermediate | advanced | athlete"
        },
        "bodyComposition": {
            "estimatedBMI": "number between 15 and 40",
            "muscleMass": "low | medium | high",
            "bodyFat": "low | medium | high",
            "metabolism": "slow | medium | fast",
            "boneDensity": "light | medium | heavy",
            "muscleGroups": [{
                "name": "string",
                "development": "underdeveloped | developing | well_developed | good | excellent | highly_developed",
                "recommendations": ["at most 4 short strings"]
            }]
        },
        "progress": {
            "strengths": ["at most 5 short strings"],
            "areasToImprove": ["at most 5 short strings"],
            "generalAdvice": "one short paragraph"
        },
        "confidence": "number between 0.1 and 1.0",
        "insights": ["at most 5 short strings"]
    });

    StageRequest {
        system: BODY_SYSTEM.to_string(),
        prompt: format!(
            "{}\n\n{}\n\nRespond with JSON in exactly this shape:\n{:#}",
            subject_source(payload),
            describe_profile(profile),
            shape
        ),
        images: images(payload),
    }
}

/// Stage two of a body analysis, built from the sanitized assessment.
pub fn nutrition_plan(assessment: &BodyAssessment, profile: &SubjectProfile) -> StageRequest {
    let shape = json!({
        "nutrition": ["at most 6 short recommendations"],
        "priority": "cardio | strength | flexibility | balance | general_fitness",
        "dailyCalories": "integer between 1200 and 4500",
        "macroSplit": {"protein": "percent 10-50", "carbs": "percent 10-65", "fat": "percent 15-45"},
        "supplements": ["at most 5"],
        "restrictions": ["at most 5"],
        "goals": ["at most 5 snake_case goals"]
    });
    let assessment = serde_json::to_string_pretty(assessment).unwrap_or_default();

    StageRequest {
        system: NUTRITION_SYSTEM.to_string(),
        prompt: format!(
            "Body assessment:\n{}\n\n{}\n\nRespond with JSON in exactly this shape:\n{:#}",
            assessment,
            describe_profile(profile),
            shape
        ),
        images: Vec::new(),
    }
}

/// Stage one of a meal analysis.
pub fn meal_breakdown(payload: &Payload, meal: &MealContext) -> StageRequest {
    let shape = json!({
        "foods": [{
            "name": "string",
            "quantity": "e.g. 150g or 1 cup",
            "calories": "number",
            "confidence": "number between 0 and 1",
            "macronutrients": {
                "protein": "grams", "carbs": "grams", "fat": "grams",
                "fiber": "grams", "sugar": "grams", "sodium": "milligrams"
            },
            "category": "protein | carbs | vegetables | fruits | dairy | fats | beverages | other"
        }],
        "mealType": "breakfast | lunch | dinner | snack | other",
        "confidence": "number between 0.1 and 1.0",
        "insights": ["at most 5 short strings"]
    });

    let mut context = Vec::new();
    if let Some(meal_type) = &meal.meal_type {
        context.push(format!("Meal type: {}.", meal_type));
    }
    if let Some(servings) = meal.servings {
        context.push(format!("Number of servings: {}.", servings));
    }

    StageRequest {
        system: MEAL_SYSTEM.to_string(),
        prompt: format!(
            "{}\n{}\n\nRespond with JSON in exactly this shape:\n{:#}",
            subject_source(payload),
            context.join("\n"),
            shape
        ),
        images: images(payload),
    }
}

/// Stage two of a meal analysis, built from the sanitized breakdown.
pub fn meal_feedback(breakdown: &MealBreakdown) -> StageRequest {
    let shape = json!({
        "recommendations": ["at most 5 short strings"],
        "healthScore": "number between 0 and 10",
        "balance": "balanced | protein_heavy | carb_heavy | fat_heavy | low_calorie"
    });
    let breakdown = serde_json::to_string_pretty(breakdown).unwrap_or_default();

    StageRequest {
        system: MEAL_FEEDBACK_SYSTEM.to_string(),
        prompt: format!(
            "Meal breakdown:\n{}\n\nRespond with JSON in exactly this shape:\n{:#}",
            breakdown, shape
        ),
        images: Vec::new(),
    }
}
