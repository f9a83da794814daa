//! Body assessment sanitizer.

use serde_json::Value;

use super::rules::{
    choice, choice_str, number, round1, string_list, text, Bounds, MAX_TEXT_CHARS,
};
use crate::body::{
    BodyAssessment, BodyComposition, Measurements, MuscleGroup, ProgressNotes,
};
use crate::task::SubjectProfile;

const BODY_FAT: Bounds = Bounds::new(5.0, 50.0, 20.0);
const HEIGHT_CM: Bounds = Bounds::new(100.0, 250.0, 170.0);
const WEIGHT_KG: Bounds = Bounds::new(30.0, 300.0, 70.0);
const AGE: Bounds = Bounds::new(13.0, 100.0, 25.0);
const BMI: Bounds = Bounds::new(15.0, 40.0, 22.0);
pub(crate) const CONFIDENCE: Bounds = Bounds::new(0.1, 1.0, 0.7);

const MAX_MUSCLE_GROUPS: usize = 6;
const MAX_GROUP_RECOMMENDATIONS: usize = 4;
const MAX_GROUP_NAME_CHARS: usize = 60;
const MAX_PROGRESS_NOTES: usize = 5;
pub(crate) const MAX_INSIGHTS: usize = 5;

const DEFAULT_MUSCLE_GROUPS: [&str; 3] = ["torso", "arms", "legs"];
const DEFAULT_STRENGTHS: &[&str] = &["Balanced overall proportions"];
const DEFAULT_AREAS_TO_IMPROVE: &[&str] = &["Keep a consistent training routine"];
const DEFAULT_GENERAL_ADVICE: &str =
    "Progress steadily with regular training, enough sleep and a balanced diet";
const DEFAULT_INSIGHTS: &[&str] = &[
    "Track progress with photos taken under the same lighting and pose",
    "Combine strength training with adequate protein intake",
];

/// Sanitize a decoded stage one body response.
///
/// Height, weight, age, gender and activity level come from the submitted
/// profile when present and from the model otherwise. Never fails: every
/// unusable field falls back to its documented default.
pub fn sanitize_body_assessment(raw: &Value, profile: &SubjectProfile) -> BodyAssessment {
    let measurements = sanitize_measurements(raw.get("measurements"), profile);
    let body_composition = sanitize_composition(raw.get("bodyComposition"), &measurements);
    let progress = raw.get("progress");
    let body_type = raw
        .get("bodyType")
        .or_else(|| raw.get("bodyComposition").and_then(|c| c.get("bodyType")));

    BodyAssessment {
        body_type: choice(body_type),
        measurements,
        body_composition,
        progress: ProgressNotes {
            strengths: string_list(
                progress.and_then(|p| p.get("strengths")),
                MAX_PROGRESS_NOTES,
                DEFAULT_STRENGTHS,
            ),
            areas_to_improve: string_list(
                progress.and_then(|p| p.get("areasToImprove")),
                MAX_PROGRESS_NOTES,
                DEFAULT_AREAS_TO_IMPROVE,
            ),
            general_advice: text(
                progress.and_then(|p| p.get("generalAdvice")),
                MAX_TEXT_CHARS,
            )
            .unwrap_or_else(|| DEFAULT_GENERAL_ADVICE.to_string()),
        },
        confidence: CONFIDENCE.apply(raw.get("confidence")),
        insights: string_list(raw.get("insights"), MAX_INSIGHTS, DEFAULT_INSIGHTS),
    }
}

fn sanitize_measurements(raw: Option<&Value>, profile: &SubjectProfile) -> Measurements {
    let field = |key: &str| raw.and_then(|m| m.get(key));

    let gender = match profile.gender.as_deref() {
        Some(g) => choice_str(Some(g)),
        None => choice(field("gender")),
    };
    let activity_level = match profile.activity_level.as_deref() {
        Some(a) => choice_str(Some(a)),
        None => choice(field("activityLevel")),
    };

    Measurements {
        body_fat_percentage: BODY_FAT.apply(field("bodyFatPercentage")),
        muscle_definition: choice(field("muscleDefinition")),
        posture: choice(field("posture")),
        symmetry: choice(field("symmetry")),
        overall_fitness: choice(field("overallFitness")),
        height: HEIGHT_CM.apply_f64(profile.height_cm.or_else(|| number(field("height")))),
        weight: WEIGHT_KG.apply_f64(profile.weight_kg.or_else(|| number(field("weight")))),
        age: AGE
            .apply_f64(profile.age.or_else(|| number(field("age"))))
            .round() as u32,
        gender,
        activity_level,
    }
}

fn sanitize_composition(raw: Option<&Value>, measurements: &Measurements) -> BodyComposition {
    let field = |key: &str| raw.and_then(|c| c.get(key));

    let height_m = measurements.height / 100.0;
    let computed = measurements.weight / (height_m * height_m);
    let estimated_bmi = BMI.clamp(round1(number(field("estimatedBMI")).unwrap_or(computed)));

    BodyComposition {
        estimated_bmi,
        muscle_mass: choice(field("muscleMass")),
        body_fat: choice(field("bodyFat")),
        metabolism: choice(field("metabolism")),
        bone_density: choice(field("boneDensity")),
        muscle_groups: sanitize_muscle_groups(field("muscleGroups")),
    }
}

fn sanitize_muscle_groups(raw: Option<&Value>) -> Vec<MuscleGroup> {
    match raw {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(sanitize_muscle_group)
            .take(MAX_MUSCLE_GROUPS)
            .collect(),
        _ => DEFAULT_MUSCLE_GROUPS
            .iter()
            .map(|name| MuscleGroup {
                name: name.to_string(),
                development: Default::default(),
                recommendations: Vec::new(),
            })
            .collect(),
    }
}

fn sanitize_muscle_group(raw: &Value) -> Option<MuscleGroup> {
    Some(MuscleGroup {
        name: text(raw.get("name"), MAX_GROUP_NAME_CHARS)?,
        development: choice(raw.get("development")),
        recommendations: string_list(
            raw.get("recommendations"),
            MAX_GROUP_RECOMMENDATIONS,
            &[],
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{ActivityLevel, BodyType, Development, Gender, MuscleDefinition, Rating};
    use serde_json::json;

    #[test]
    fn test_out_of_range_and_unknown_values() {
        let raw = json!({
            "bodyType": "ectomorph",
            "measurements": {
                "bodyFatPercentage": 999,
                "muscleDefinition": "extreme",
                "posture": "Good",
            }
        });
        let assessment = sanitize_body_assessment(&raw, &SubjectProfile::default());

        assert_eq!(assessment.body_type, BodyType::Ectomorph);
        assert_eq!(assessment.measurements.body_fat_percentage, 50.0);
        assert_eq!(
            assessment.measurements.muscle_definition,
            MuscleDefinition::Moderate
        );
        assert_eq!(assessment.measurements.posture, Rating::Good);
        assert_eq!(assessment.measurements.symmetry, Rating::Fair);
    }

    #[test]
    fn test_empty_object_yields_documented_defaults() {
        let assessment = sanitize_body_assessment(&json!({}), &SubjectProfile::default());

        assert_eq!(assessment.body_type, BodyType::Mesomorph);
        assert_eq!(assessment.measurements.body_fat_percentage, 20.0);
        assert_eq!(assessment.measurements.height, 170.0);
        assert_eq!(assessment.measurements.weight, 70.0);
        assert_eq!(assessment.measurements.age, 25);
        assert_eq!(assessment.measurements.gender, Gender::Male);
        assert_eq!(assessment.confidence, 0.7);
        // 70 / 1.7^2
        assert_eq!(assessment.body_composition.estimated_bmi, 24.2);
        assert_eq!(assessment.body_composition.muscle_groups.len(), 3);
        assert_eq!(assessment.progress.strengths.len(), 1);
        assert_eq!(assessment.progress.areas_to_improve.len(), 1);
        assert_eq!(assessment.progress.general_advice, DEFAULT_GENERAL_ADVICE);
        assert_eq!(assessment.insights.len(), 2);
    }

    #[test]
    fn test_profile_overrides_model_measurements() {
        let raw = json!({"measurements": {"height": 300, "weight": "95kg", "age": 40}});
        let profile = SubjectProfile {
            height_cm: Some(182.0),
            gender: Some("Female".into()),
            activity_level: Some("very active".into()),
            ..Default::default()
        };
        let m = sanitize_body_assessment(&raw, &profile).measurements;

        assert_eq!(m.height, 182.0);
        assert_eq!(m.weight, 95.0);
        assert_eq!(m.age, 40);
        assert_eq!(m.gender, Gender::Female);
        assert_eq!(m.activity_level, ActivityLevel::VeryActive);
    }

    #[test]
    fn test_profile_values_are_clamped() {
        let profile = SubjectProfile {
            age: Some(7.0),
            weight_kg: Some(1000.0),
            ..Default::default()
        };
        let m = sanitize_body_assessment(&json!({}), &profile).measurements;
        assert_eq!(m.age, 13);
        assert_eq!(m.weight, 300.0);
    }

    #[test]
    fn test_body_type_read_from_composition_block() {
        let raw = json!({"bodyComposition": {"bodyType": "Endomorph"}});
        let assessment = sanitize_body_assessment(&raw, &SubjectProfile::default());
        assert_eq!(assessment.body_type, BodyType::Endomorph);

        let raw = json!({
            "bodyType": "ectomorph",
            "bodyComposition": {"bodyType": "endomorph"}
        });
        let assessment = sanitize_body_assessment(&raw, &SubjectProfile::default());
        assert_eq!(assessment.body_type, BodyType::Ectomorph);
    }

    #[test]
    fn test_general_advice_is_bounded_text() {
        let raw = json!({"progress": {"generalAdvice": format!("  {}  ", "x".repeat(400))}});
        let advice = sanitize_body_assessment(&raw, &SubjectProfile::default())
            .progress
            .general_advice;
        assert_eq!(advice.chars().count(), MAX_TEXT_CHARS);

        let raw = json!({"progress": {"generalAdvice": 42}});
        let advice = sanitize_body_assessment(&raw, &SubjectProfile::default())
            .progress
            .general_advice;
        assert_eq!(advice, DEFAULT_GENERAL_ADVICE);
    }

    #[test]
    fn test_muscle_groups_bounded() {
        let groups: Vec<Value> = (0..10)
            .map(|i| {
                json!({
                    "name": format!("group-{}", i),
                    "development": "highly developed",
                    "recommendations": ["a", "b", "c", "d", "e", "f"],
                })
            })
            .chain(std::iter::once(json!({"development": "good"})))
            .collect();
        let raw = json!({"bodyComposition": {"muscleGroups": groups, "estimatedBMI": 3}});
        let composition = sanitize_body_assessment(&raw, &SubjectProfile::default())
            .body_composition;

        assert_eq!(composition.estimated_bmi, 15.0);
        assert_eq!(composition.muscle_groups.len(), 6);
        for group in &composition.muscle_groups {
            assert_eq!(group.development, Development::HighlyDeveloped);
            assert_eq!(group.recommendations.len(), 4);
        }
    }

    #[test]
    fn test_sanitizing_sanitized_output_is_identity() {
        let raw = json!({
            "bodyType": "ENDOMORPH",
            "measurements": {"bodyFatPercentage": "31.5%", "overallFitness": "athlete"},
            "bodyComposition": {
                "muscleMass": "high",
                "metabolism": "turbo",
                "muscleGroups": [{"name": " chest ", "development": "good"}]
            },
            "progress": {"strengths": ["  grip  ", 12, ""], "generalAdvice": " rest more "},
            "confidence": 4,
            "insights": ["one", "two", "three", "four", "five", "six"],
        });
        let profile = SubjectProfile {
            weight_kg: Some(88.3),
            ..Default::default()
        };

        let once = sanitize_body_assessment(&raw, &profile);
        let again = sanitize_body_assessment(&serde_json::to_value(&once).unwrap(), &profile);
        assert_eq!(once, again);
        assert_eq!(once.confidence, 1.0);
        assert_eq!(once.insights.len(), 5);
        assert_eq!(once.progress.strengths, vec!["grip"]);
        assert_eq!(once.progress.general_advice, "rest more");
    }
}
