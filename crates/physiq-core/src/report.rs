//! Final analysis reports, the only objects ever stored as a task result.

use serde::{Deserialize, Serialize};

use crate::body::{BodyAssessment, BodyComposition, BodyType, Measurements, ProgressNotes};
use crate::meal::{FoodItem, Macronutrients, MealBalance, MealBreakdown, MealFeedback, MealType};
use crate::nutrition::NutritionPlan;
use crate::task::TaskKind;

/// Attached verbatim to every report.
pub const DISCLAIMER: &str = "This analysis is an automated visual estimate for informational purposes only. Consult a qualified health professional for medical advice.";

/// Completed result of a task, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisReport {
    BodyAnalysis(BodyAnalysisReport),
    MealAnalysis(MealAnalysisReport),
}

impl AnalysisReport {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::BodyAnalysis(_) => TaskKind::BodyAnalysis,
            Self::MealAnalysis(_) => TaskKind::MealAnalysis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyAnalysisReport {
    pub body_type: BodyType,
    pub measurements: Measurements,
    pub body_composition: BodyComposition,
    pub progress: ProgressNotes,
    pub recommendations: NutritionPlan,
    pub confidence: f64,
    pub disclaimer: String,
    pub insights: Vec<String>,
}

impl BodyAnalysisReport {
    /// Combine a sanitized assessment with the plan derived from it.
    pub fn assemble(assessment: BodyAssessment, plan: NutritionPlan) -> Self {
        Self {
            body_type: assessment.body_type,
            measurements: assessment.measurements,
            body_composition: assessment.body_composition,
            progress: assessment.progress,
            recommendations: plan,
            confidence: assessment.confidence,
            disclaimer: DISCLAIMER.to_string(),
            insights: assessment.insights,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealAnalysisReport {
    pub foods: Vec<FoodItem>,
    pub total_calories: f64,
    pub total_macronutrients: Macronutrients,
    pub meal_type: MealType,
    pub recommendations: Vec<String>,
    pub health_score: f64,
    pub balance: MealBalance,
    pub confidence: f64,
    pub disclaimer: String,
    pub insights: Vec<String>,
}

impl MealAnalysisReport {
    pub fn assemble(breakdown: MealBreakdown, feedback: MealFeedback) -> Self {
        Self {
            foods: breakdown.foods,
            total_calories: breakdown.total_calories,
            total_macronutrients: breakdown.total_macronutrients,
            meal_type: breakdown.meal_type,
            recommendations: feedback.recommendations,
            health_score: feedback.health_score,
            balance: feedback.balance,
            confidence: breakdown.confidence,
            disclaimer: DISCLAIMER.to_string(),
            insights: breakdown.insights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::{
        sanitize_body_assessment, sanitize_meal_breakdown, sanitize_meal_feedback,
        sanitize_nutrition_plan,
    };
    use crate::task::{MealContext, SubjectProfile};
    use serde_json::json;

    #[test]
    fn test_body_report_carries_disclaimer_and_kind_tag() {
        let assessment = sanitize_body_assessment(&json!({}), &SubjectProfile::default());
        let plan = sanitize_nutrition_plan(&json!({}));
        let report = AnalysisReport::BodyAnalysis(BodyAnalysisReport::assemble(assessment, plan));

        assert_eq!(report.kind(), TaskKind::BodyAnalysis);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "body_analysis");
        assert_eq!(json["disclaimer"], DISCLAIMER);
        assert_eq!(json["recommendations"]["dailyCalories"], 2000);
        assert!(json["bodyComposition"].get("estimatedBMI").is_some());

        let back: AnalysisReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_meal_report_flattens_feedback() {
        let breakdown = sanitize_meal_breakdown(
            &json!({"foods": [{"name": "apple", "calories": 95}]}),
            &MealContext::default(),
        );
        let feedback = sanitize_meal_feedback(&json!({"healthScore": 8, "balance": "low_calorie"}));
        let report = MealAnalysisReport::assemble(breakdown, feedback);

        assert_eq!(report.total_calories, 95.0);
        assert_eq!(report.health_score, 8.0);
        assert_eq!(report.balance, MealBalance::LowCalorie);
        assert_eq!(report.disclaimer, DISCLAIMER);
    }
}
