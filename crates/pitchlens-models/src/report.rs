//! Tactical report model and payload validation.
//!
//! The report is produced by the generation provider as an untyped JSON
//! payload (the arguments of a forced function call). [`TacticalReport::from_args`]
//! checks that payload field by field before any typed value is surfaced, so
//! a partially-shaped report is rejected with the list of violated fields
//! instead of being coerced or defaulted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A key tactical moment observed in the footage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyTacticalMoment {
    /// Approximate timestamp (e.g. MM:SS), if discernible.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Description of the specific tactical moment.
    pub description: String,
}

/// A standout individual performance or error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerHighlight {
    /// Name of the player involved, if identifiable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    /// Description of the notable action or contribution.
    pub highlight: String,
}

/// Structured tactical analysis report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TacticalReport {
    /// Overall summary of the tactical situation.
    pub overall_summary: String,
    /// Analysis of team formations, strengths and weaknesses.
    pub formation_analysis: String,
    /// Key tactical moments or patterns (3-5 expected, not enforced).
    pub key_tactical_moments: Vec<KeyTacticalMoment>,
    /// Standout individual performances (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_highlights: Option<Vec<PlayerHighlight>>,
    /// Suggested tactical improvements (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_improvements: Option<Vec<String>>,
}

/// A report payload that failed shape validation.
///
/// Carries the violated field paths and the raw payload for diagnostics.
#[derive(Debug, Error)]
#[error("report payload violates schema: {}", .violations.join("; "))]
pub struct ReportValidationError {
    /// Field paths that violated the schema, with reasons.
    pub violations: Vec<String>,
    /// The raw payload as received.
    pub payload: Value,
}

impl TacticalReport {
    /// Validate an untyped payload against the report shape.
    ///
    /// Required fields must be present, of the right type, and (for text)
    /// non-empty. Optional fields may be absent or `null`, but when present
    /// must match their declared shape.
    pub fn from_args(args: &Value) -> Result<Self, ReportValidationError> {
        let mut violations = Vec::new();

        let Some(obj) = args.as_object() else {
            return Err(ReportValidationError {
                violations: vec!["payload: expected a JSON object".to_string()],
                payload: args.clone(),
            });
        };

        check_text(obj.get("overallSummary"), "overallSummary", true, &mut violations);
        check_text(obj.get("formationAnalysis"), "formationAnalysis", true, &mut violations);

        match obj.get("keyTacticalMoments") {
            Some(Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    let path = format!("keyTacticalMoments[{}]", i);
                    match item.as_object() {
                        Some(moment) => {
                            check_text(
                                moment.get("description"),
                                &format!("{}.description", path),
                                true,
                                &mut violations,
                            );
                            check_text(
                                moment.get("timestamp"),
                                &format!("{}.timestamp", path),
                                false,
                                &mut violations,
                            );
                        }
                        None => violations.push(format!("{}: expected an object", path)),
                    }
                }
            }
            Some(_) => violations.push("keyTacticalMoments: expected an array".to_string()),
            None => violations.push("keyTacticalMoments: required field is missing".to_string()),
        }

        match obj.get("playerHighlights") {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    let path = format!("playerHighlights[{}]", i);
                    match item.as_object() {
                        Some(entry) => {
                            check_text(
                                entry.get("highlight"),
                                &format!("{}.highlight", path),
                                true,
                                &mut violations,
                            );
                            check_text(
                                entry.get("playerName"),
                                &format!("{}.playerName", path),
                                false,
                                &mut violations,
                            );
                        }
                        None => violations.push(format!("{}: expected an object", path)),
                    }
                }
            }
            Some(_) => violations.push("playerHighlights: expected an array".to_string()),
        }

        match obj.get("suggestedImprovements") {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        violations.push(format!("suggestedImprovements[{}]: expected a string", i));
                    }
                }
            }
            Some(_) => violations.push("suggestedImprovements: expected an array".to_string()),
        }

        if !violations.is_empty() {
            return Err(ReportValidationError {
                violations,
                payload: args.clone(),
            });
        }

        // The shape checks above guarantee this deserialization succeeds.
        serde_json::from_value(args.clone()).map_err(|e| ReportValidationError {
            violations: vec![format!("payload: {}", e)],
            payload: args.clone(),
        })
    }
}

/// Check one text field, recording a violation when it does not conform.
///
/// Required fields must be present and non-empty. Optional fields may be
/// absent or `null`, but a present value must be a string.
fn check_text(value: Option<&Value>, path: &str, required: bool, violations: &mut Vec<String>) {
    match value {
        Some(Value::String(s)) => {
            if required && s.trim().is_empty() {
                violations.push(format!("{}: must be a non-empty string", path));
            }
        }
        None | Some(Value::Null) => {
            if required {
                violations.push(format!("{}: required field is missing", path));
            }
        }
        Some(_) => violations.push(format!("{}: expected a string", path)),
    }
}
