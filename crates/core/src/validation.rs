//! Field-level validation for vital-sign inputs.
//!
//! Every violated rule is reported so a form can show all problems at once.
//! These ranges do not line up with the tier table in
//! [`crate::blood_pressure`]; callers run both checks.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

pub const SYSTOLIC_MIN: i32 = 80;
pub const SYSTOLIC_MAX: i32 = 200;
pub const DIASTOLIC_MIN: i32 = 50;
pub const DIASTOLIC_MAX: i32 = 130;

const FIELD_SYSTOLIC: &str = "systolic";
const FIELD_DIASTOLIC: &str = "diastolic";
const RULE_ORDER: &str = "greater_than_diastolic";

/// A single field-level rule violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub rule: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// Raw blood-pressure form input.
#[derive(Debug, Clone, Copy, Default, Validate, Deserialize)]
pub struct BloodPressureInput {
    #[validate(range(
        min = 80,
        max = 200,
        message = "Systolic pressure must be between 80 and 200 mmHg"
    ))]
    pub systolic: Option<i32>,
    #[validate(range(
        min = 50,
        max = 130,
        message = "Diastolic pressure must be between 50 and 130 mmHg"
    ))]
    pub diastolic: Option<i32>,
}

impl BloodPressureInput {
    /// Run all rules and return every violation, systolic first.
    pub fn violations(&self) -> Vec<FieldViolation> {
        let mut violations: Vec<FieldViolation> = match self.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .field_errors()
                .into_iter()
                .flat_map(|(field, errs)| {
                    let field = field.to_string();
                    let value = self.field_value(&field);
                    errs.iter()
                        .map(|e| FieldViolation {
                            field: field.clone(),
                            rule: e.code.to_string(),
                            message: e
                                .message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| format!("{field} is invalid")),
                            value: value.clone(),
                        })
                        .collect::<Vec<_>>()
                })
                .collect(),
        };

        if let (Some(s), Some(d)) = (self.systolic, self.diastolic) {
            if s <= d {
                violations.push(FieldViolation {
                    field: FIELD_SYSTOLIC.to_string(),
                    rule: RULE_ORDER.to_string(),
                    message: "Systolic pressure must be greater than diastolic pressure"
                        .to_string(),
                    value: Some(serde_json::json!(s)),
                });
            }
        }

        // field_errors() comes from a HashMap; keep a stable display order.
        violations.sort_by_key(|v| field_rank(&v.field));
        violations
    }

    fn field_value(&self, field: &str) -> Option<serde_json::Value> {
        match field {
            FIELD_SYSTOLIC => self.systolic.map(|v| serde_json::json!(v)),
            FIELD_DIASTOLIC => self.diastolic.map(|v| serde_json::json!(v)),
            _ => None,
        }
    }
}

fn field_rank(field: &str) -> u8 {
    match field {
        FIELD_SYSTOLIC => 0,
        FIELD_DIASTOLIC => 1,
        _ => 2,
    }
}

/// Validate a blood-pressure pair, returning all violations (empty when
/// valid). Absent readings are not an error.
pub fn validate_blood_pressure(
    systolic: Option<i32>,
    diastolic: Option<i32>,
) -> Vec<FieldViolation> {
    BloodPressureInput {
        systolic,
        diastolic,
    }
    .violations()
}

/// Like [`validate_blood_pressure`], folding any violations into a single
/// `CoreError::Validation`.
pub fn ensure_valid_blood_pressure(
    systolic: Option<i32>,
    diastolic: Option<i32>,
) -> Result<(), CoreError> {
    let violations = validate_blood_pressure(systolic, diastolic);
    if violations.is_empty() {
        return Ok(());
    }
    let joined = violations
        .iter()
        .map(|v| v.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    Err(CoreError::Validation(joined))
}
