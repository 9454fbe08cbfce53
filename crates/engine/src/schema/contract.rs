//! Field-contract documents
//!
//! A contract document is a JSON object mapping each field name to
//! `{ "type": "string"|"number"|"datetime"|"array", "required": bool,
//! "enum": [string], "min": number, "max": number }`. Only `type` is
//! mandatory.

use sha2::{Digest, Sha256};

use labcore_core::{FieldContract, FieldKind, FieldSpec, JsonValue, LabError, LabResult};

/// Parse a contract document
pub fn parse_contract(doc: &JsonValue) -> LabResult<FieldContract> {
    let fields = doc
        .as_object()
        .ok_or_else(|| LabError::invalid_input("Field contract must be a JSON object"))?;

    let mut contract = FieldContract::new();
    for (name, entry) in fields {
        if name.is_empty() {
            return Err(LabError::invalid_input("Contract field names must not be empty"));
        }
        contract = contract.with_field(name.clone(), parse_field(name, entry)?);
    }
    Ok(contract)
}

fn parse_field(name: &str, entry: &serde_json::Value) -> LabResult<FieldSpec> {
    let bad = |msg: &str| LabError::invalid_input(format!("Contract field '{}': {}", name, msg));

    let obj = entry
        .as_object()
        .ok_or_else(|| bad("entry must be an object"))?;

    for key in obj.keys() {
        if !matches!(key.as_str(), "type" | "required" | "enum" | "min" | "max") {
            return Err(bad(&format!("unknown property '{}'", key)));
        }
    }

    let kind_name = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| bad("'type' must be a string"))?;
    let kind = FieldKind::parse(kind_name)
        .ok_or_else(|| bad(&format!("unknown type '{}'", kind_name)))?;

    let mut spec = FieldSpec::new(kind);

    match obj.get("required") {
        None | Some(serde_json::Value::Null) => {}
        Some(serde_json::Value::Bool(b)) => spec.required = *b,
        Some(_) => return Err(bad("'required' must be a boolean")),
    }

    if let Some(values) = obj.get("enum").filter(|v| !v.is_null()) {
        if kind != FieldKind::String {
            return Err(bad("'enum' is only allowed on string fields"));
        }
        let items = values
            .as_array()
            .ok_or_else(|| bad("'enum' must be an array of strings"))?;
        if items.is_empty() {
            return Err(bad("'enum' must not be empty"));
        }
        let mut members = Vec::with_capacity(items.len());
        for item in items {
            let s = item
                .as_str()
                .ok_or_else(|| bad("'enum' must be an array of strings"))?;
            if members.iter().any(|m: &String| m == s) {
                return Err(bad(&format!("duplicate enum member '{}'", s)));
            }
            members.push(s.to_string());
        }
        spec.enum_values = Some(members);
    }

    let bound = |key: &str| -> LabResult<Option<f64>> {
        match obj.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(v) => {
                if kind != FieldKind::Number {
                    return Err(bad(&format!("'{}' is only allowed on number fields", key)));
                }
                v.as_f64()
                    .map(Some)
                    .ok_or_else(|| bad(&format!("'{}' must be a number", key)))
            }
        }
    };
    spec.min = bound("min")?;
    spec.max = bound("max")?;
    if let (Some(min), Some(max)) = (spec.min, spec.max) {
        if min > max {
            return Err(bad("'min' is greater than 'max'"));
        }
    }

    Ok(spec)
}

/// Canonical document form of a contract
///
/// Field names sort, enum members sort, defaults are spelled out. Two
/// contracts that validate identically produce the same document.
pub fn contract_document(contract: &FieldContract) -> serde_json::Value {
    let mut fields = serde_json::Map::new();
    for (name, spec) in &contract.fields {
        let mut entry = serde_json::Map::new();
        entry.insert("type".into(), spec.kind.as_str().into());
        entry.insert("required".into(), spec.required.into());
        if let Some(values) = &spec.enum_values {
            let mut sorted = values.clone();
            sorted.sort();
            entry.insert("enum".into(), sorted.into());
        }
        if let Some(min) = spec.min {
            entry.insert("min".into(), min.into());
        }
        if let Some(max) = spec.max {
            entry.insert("max".into(), max.into());
        }
        fields.insert(name.clone(), serde_json::Value::Object(entry));
    }
    serde_json::Value::Object(fields)
}

/// SHA-256 of the canonical document, lowercase hex
pub fn checksum(contract: &FieldContract) -> String {
    let canonical = contract_document(contract).to_string();
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}
