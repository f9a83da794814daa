//! Field-level coercion rules shared by the record sanitizers.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Longest string kept in a list or free-text field.
pub const MAX_TEXT_CHARS: usize = 280;

const UNIT_SUFFIXES: [&str; 4] = ["kcal", "kg", "cm", "%"];

/// A closed numeric interval with a fallback for unusable input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64, default: f64) -> Self {
        Self { min, max, default }
    }

    pub fn clamp(&self, n: f64) -> f64 {
        n.clamp(self.min, self.max)
    }

    /// Clamp a usable number, otherwise the default.
    pub fn apply(&self, value: Option<&Value>) -> f64 {
        number(value).map_or(self.default, |n| self.clamp(n))
    }

    /// Like [`Bounds::apply`], for an already extracted number.
    pub fn apply_f64(&self, value: Option<f64>) -> f64 {
        value
            .filter(|n| n.is_finite())
            .map_or(self.default, |n| self.clamp(n))
    }

    /// Clamp and round to a whole number.
    pub fn apply_u32(&self, value: Option<&Value>) -> u32 {
        self.apply(value).round() as u32
    }
}

/// Coerce a JSON value into a finite number.
///
/// Numbers pass through; strings are accepted after trimming and dropping
/// one trailing unit (`%`, `kg`, `cm`, `kcal`).
pub fn number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            let s = UNIT_SUFFIXES
                .iter()
                .find_map(|unit| s.strip_suffix(unit))
                .unwrap_or(s);
            s.trim().parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Map a string onto an enumeration, falling back to its default.
///
/// Case and separators are normalized first, so `"Very High"` and
/// `"very-high"` both match `very_high`.
pub fn choice<T: DeserializeOwned + Default>(value: Option<&Value>) -> T {
    value
        .and_then(Value::as_str)
        .map(normalize_token)
        .and_then(|token| serde_json::from_value(Value::String(token)).ok())
        .unwrap_or_default()
}

/// Like [`choice`], for a free-form string from the request.
pub fn choice_str<T: DeserializeOwned + Default>(value: Option<&str>) -> T {
    choice(value.map(|s| Value::String(s.to_string())).as_ref())
}

fn normalize_token(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Trim and cap a string; `None` when nothing is left.
pub fn text(value: Option<&Value>, max_chars: usize) -> Option<String> {
    let s = value?.as_str()?;
    let capped: String = s.trim().chars().take(max_chars).collect();
    let capped = capped.trim_end();
    (!capped.is_empty()).then(|| capped.to_string())
}

/// Bounded list of strings.
///
/// An absent or non-array value yields `default`. Otherwise non-string and
/// blank entries are dropped before truncating to `max`.
pub fn string_list(value: Option<&Value>, max: usize, default: &[&str]) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| text(Some(item), MAX_TEXT_CHARS))
            .take(max)
            .collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// Round to one decimal place.
pub fn round1(n: f64) -> f64 {
    (n * 10.0).round() / 10.0
}
