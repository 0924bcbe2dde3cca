//! Core data models that flow through the analysis pipeline.
//!
//! [`AnalysisResult`] is the final report. It serializes with stable
//! camelCase keys and decodes leniently: any casing of a known key is
//! accepted (`topEvents`, `TopEvents`, `top_events`), unknown keys are
//! ignored, and missing or `null` values fall back to empty defaults.
//! Counts written as whole floats (`3.0`) are accepted. The provider's
//! output is only checked for syntactic validity, never for completeness.
//!
//! [`PartialSummary`] is the per-chunk intermediate result. It is kept as
//! an unvalidated JSON value so the chunk-level schema can change without
//! touching the final report shape.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// The final incident report for one service, environment and day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisResult {
    pub date: String,
    pub overview: String,
    pub kpis: Kpis,
    pub top_events: Vec<TopEvent>,
    pub root_causes: Vec<RootCause>,
    pub actions: Vec<ActionItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Kpis {
    #[serde(deserialize_with = "lenient_count")]
    pub total_lines: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub error_count: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub warn_count: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub unique_error_types: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(deserialize_with = "lenient_count")]
    pub count: u64,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RootCause {
    pub error_type: String,
    pub hypothesis: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionItem {
    pub priority: Priority,
    pub title: String,
    pub why: String,
    pub owner_hint: String,
}

/// Urgency of an [`ActionItem`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!(
                "unknown priority '{}'; expected high, medium, or low",
                other
            )),
        }
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A non-negative count, also accepted as a whole-valued float (`3.0`).
/// `null` reads as zero.
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            })
            .ok_or_else(|| serde::de::Error::custom(format!("expected a count, got {}", n))),
        other => Err(serde::de::Error::custom(format!("expected a count, got {}", other))),
    }
}

/// Every key [`AnalysisResult`] and its records serialize with.
const CANONICAL_KEYS: &[&str] = &[
    "date",
    "overview",
    "kpis",
    "totalLines",
    "errorCount",
    "warnCount",
    "uniqueErrorTypes",
    "topEvents",
    "type",
    "count",
    "examples",
    "rootCauses",
    "errorType",
    "hypothesis",
    "actions",
    "priority",
    "title",
    "why",
    "ownerHint",
];

fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Rewrite object keys to their canonical spelling, recursively.
///
/// Keys that do not fold to a known field name are left alone and will be
/// ignored by deserialization. Members whose value is `null` are dropped so
/// the field takes its default, exactly as if the key were missing.
fn canonicalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, v) in map {
                if v.is_null() {
                    continue;
                }
                let folded = fold_key(&key);
                let key = CANONICAL_KEYS
                    .iter()
                    .find(|k| fold_key(k) == folded)
                    .map(|k| k.to_string())
                    .unwrap_or(key);
                out.insert(key, canonicalize_keys(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize_keys).collect()),
        other => other,
    }
}

impl AnalysisResult {
    /// Decode a report from any JSON value, matching field names without
    /// regard to case or underscores.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(canonicalize_keys(value))
    }

    /// Parse a report from JSON text. See [`AnalysisResult::from_value`].
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Canonical pretty-printed JSON with camelCase keys.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Unvalidated structured output of summarizing one chunk.
///
/// Only guaranteed to be syntactically valid JSON. The merger is the one
/// place that interprets it.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialSummary(Value);

impl PartialSummary {
    pub(crate) fn new(value: Value) -> Self {
        PartialSummary(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Compact JSON text, as handed to the merge prompt.
    pub fn to_json(&self) -> String {
        self.0.to_string()
    }
}
