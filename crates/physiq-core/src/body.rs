//! Body assessment records (stage one of a body analysis).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyType {
    Ectomorph,
    #[default]
    Mesomorph,
    Endomorph,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuscleDefinition {
    Low,
    #[default]
    Moderate,
    High,
    VeryHigh,
}

/// Shared scale for posture and symmetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    NeedsAttention,
    #[default]
    Fair,
    Good,
    Excellent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
    Athlete,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[default]
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    #[default]
    Moderate,
    Active,
    VeryActive,
}

/// Scale for muscle mass and body fat in the composition block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metabolism {
    Slow,
    #[default]
    Medium,
    Fast,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoneDensity {
    Light,
    #[default]
    Medium,
    Heavy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Development {
    Underdeveloped,
    #[default]
    Developing,
    WellDeveloped,
    Good,
    Excellent,
    HighlyDeveloped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurements {
    pub body_fat_percentage: f64,
    pub muscle_definition: MuscleDefinition,
    pub posture: Rating,
    pub symmetry: Rating,
    pub overall_fitness: FitnessLevel,
    /// Centimetres.
    pub height: f64,
    /// Kilograms.
    pub weight: f64,
    pub age: u32,
    pub gender: Gender,
    pub activity_level: ActivityLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuscleGroup {
    pub name: String,
    pub development: Development,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyComposition {
    #[serde(rename = "estimatedBMI")]
    pub estimated_bmi: f64,
    pub muscle_mass: Level,
    pub body_fat: Level,
    pub metabolism: Metabolism,
    pub bone_density: BoneDensity,
    pub muscle_groups: Vec<MuscleGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNotes {
    pub strengths: Vec<String>,
    pub areas_to_improve: Vec<String>,
    pub general_advice: String,
}

/// Sanitized stage one output of a body analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyAssessment {
    pub body_type: BodyType,
    pub measurements: Measurements,
    pub body_composition: BodyComposition,
    pub progress: ProgressNotes,
    pub confidence: f64,
    pub insights: Vec<String>,
}
