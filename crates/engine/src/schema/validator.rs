//! Payload validation against a field contract
//!
//! Fields are checked in name order, so the first failure reported for a
//! payload is stable. Undeclared payload fields are always accepted.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use labcore_core::{
    value_kind, FieldContract, FieldKind, FieldSpec, JsonValue, LabError, LabResult, TypeTag,
    ValidationIssue, ValidationReason,
};

/// Field name reported when the payload itself is not an object
pub const PAYLOAD_FIELD: &str = "$";

/// Every failure found in one payload
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    /// Type validated
    pub type_tag: TypeTag,
    /// Schema version used, `None` when the type is unvalidated
    pub version: Option<u32>,
    /// Failures in field-name order
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Whether the payload passed
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// `Ok(())`, or the first failure as a `ValidationFailure`
    pub fn into_result(self) -> LabResult<()> {
        match self.issues.into_iter().next() {
            None => Ok(()),
            Some(issue) => Err(LabError::ValidationFailure {
                type_tag: self.type_tag.to_string(),
                issue,
            }),
        }
    }
}

/// All failures of `payload` against `contract`
pub fn check_contract(contract: &FieldContract, payload: &JsonValue) -> Vec<ValidationIssue> {
    let Some(fields) = payload.as_object() else {
        return vec![ValidationIssue::new(
            PAYLOAD_FIELD,
            ValidationReason::Malformed(format!(
                "payload must be an object, found {}",
                payload.kind_name()
            )),
        )];
    };

    contract
        .fields
        .iter()
        .filter_map(|(name, spec)| {
            check_field(spec, fields.get(name)).map(|reason| ValidationIssue::new(name.clone(), reason))
        })
        .collect()
}

/// First failure of `payload` against `contract`
pub fn first_failure(contract: &FieldContract, payload: &JsonValue) -> Option<ValidationIssue> {
    let Some(fields) = payload.as_object() else {
        return check_contract(contract, payload).into_iter().next();
    };
    contract.fields.iter().find_map(|(name, spec)| {
        check_field(spec, fields.get(name)).map(|reason| ValidationIssue::new(name.clone(), reason))
    })
}

fn check_field(spec: &FieldSpec, value: Option<&serde_json::Value>) -> Option<ValidationReason> {
    let value = match value {
        None | Some(serde_json::Value::Null) => {
            return spec.required.then_some(ValidationReason::MissingRequired);
        }
        Some(v) => v,
    };

    let outcome = match spec.kind {
        FieldKind::String => check_string(spec, value),
        FieldKind::Number => check_number(spec, value),
        FieldKind::Datetime => check_datetime(value),
        FieldKind::Array if value.is_array() => Ok(()),
        FieldKind::Array => Err(type_mismatch(FieldKind::Array, value)),
    };
    outcome.err()
}

fn check_string(spec: &FieldSpec, value: &serde_json::Value) -> Result<(), ValidationReason> {
    let s = value.as_str().ok_or_else(|| type_mismatch(FieldKind::String, value))?;
    if let Some(allowed) = &spec.enum_values {
        if !allowed.iter().any(|m| m == s) {
            return Err(ValidationReason::NotInEnum {
                allowed: allowed.clone(),
            });
        }
    }
    Ok(())
}

fn check_number(spec: &FieldSpec, value: &serde_json::Value) -> Result<(), ValidationReason> {
    let n = value
        .as_f64()
        .ok_or_else(|| type_mismatch(FieldKind::Number, value))?;
    if let Some(min) = spec.min {
        if n < min {
            return Err(ValidationReason::BelowMinimum { min });
        }
    }
    if let Some(max) = spec.max {
        if n > max {
            return Err(ValidationReason::AboveMaximum { max });
        }
    }
    Ok(())
}

fn check_datetime(value: &serde_json::Value) -> Result<(), ValidationReason> {
    let s = value
        .as_str()
        .ok_or_else(|| type_mismatch(FieldKind::Datetime, value))?;
    if is_datetime(s) {
        Ok(())
    } else {
        Err(ValidationReason::InvalidDatetime)
    }
}

fn type_mismatch(expected: FieldKind, value: &serde_json::Value) -> ValidationReason {
    ValidationReason::TypeMismatch {
        expected,
        actual: value_kind(value).to_string(),
    }
}

/// Whether `s` parses as an ISO-8601-style datetime
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS[.f]`, `YYYY-MM-DD HH:MM:SS[.f]`
/// and a bare `YYYY-MM-DD`.
pub fn is_datetime(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}
