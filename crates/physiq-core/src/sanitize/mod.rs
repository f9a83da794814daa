//! Decoding and sanitizing of untrusted model output.
//!
//! Everything here is pure: raw text goes through [`decode_object`], the
//! resulting JSON through one of the per-record sanitizers. Sanitizers never
//! fail and are idempotent: feeding a sanitized record back in (as JSON)
//! yields the same record.

mod body;
mod decode;
mod meal;
mod nutrition;
pub mod rules;

pub use body::sanitize_body_assessment;
pub use decode::{decode_object, strip_code_fence, ParseError};
pub use meal::{sanitize_meal_breakdown, sanitize_meal_feedback};
pub use nutrition::sanitize_nutrition_plan;
