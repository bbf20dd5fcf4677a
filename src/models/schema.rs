//! Field tables for the wire records and a validator that walks JSON against them.
//!
//! Validation runs before serde so that failures name the exact dotted path
//! (`DeviceInfo.status[0].bin`) instead of a line/column position.

use serde_json::Value;
use thiserror::Error;

use super::records::{DeviceInfo, DevicePingResult, PingResult, Status};

/// Decoding error types.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing required field {path}")]
    MissingField { path: String },
    #[error("field {path} must be {expected}")]
    WrongType { path: String, expected: &'static str },
}

/// Target type of a single field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    String,
    Bool,
    Number,
    /// Any JSON value is accepted.
    Any,
    /// Array of nested records described by their own table.
    Records(&'static [FieldSpec]),
}

impl FieldKind {
    fn expected(&self) -> &'static str {
        match self {
            FieldKind::String => "a string",
            FieldKind::Bool => "a boolean",
            FieldKind::Number => "a number",
            FieldKind::Any => "any value",
            FieldKind::Records(_) => "an array",
        }
    }
}

/// One row of a schema table.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn required(key: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { key, kind, required: true }
}

const fn optional(key: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { key, kind, required: false }
}

/// A record with a declared wire schema.
pub trait Schema {
    const NAME: &'static str;
    const FIELDS: &'static [FieldSpec];
}

const STATUS_FIELDS: &[FieldSpec] = &[
    required("name", FieldKind::String),
    required("bin", FieldKind::String),
    required("statuscode", FieldKind::String),
    required("version", FieldKind::String),
    optional("info", FieldKind::Any),
];

const DEVICE_INFO_FIELDS: &[FieldSpec] = &[
    required("hostname", FieldKind::String),
    required("id", FieldKind::String),
    required("internet-connectivity", FieldKind::Bool),
    required("ip", FieldKind::String),
    optional("status", FieldKind::Records(STATUS_FIELDS)),
];

const DEVICE_PING_RESULT_FIELDS: &[FieldSpec] = &[
    required("deviceID", FieldKind::String),
    required("error", FieldKind::String),
    required("packets-received", FieldKind::Number),
    required("packets-sent", FieldKind::Number),
    required("packet-loss", FieldKind::Number),
    required("ip", FieldKind::String),
    required("address", FieldKind::String),
    required("average-round-trip", FieldKind::String),
];

const PING_RESULT_FIELDS: &[FieldSpec] = &[
    optional("successful", FieldKind::Records(DEVICE_PING_RESULT_FIELDS)),
    optional("unsuccessful", FieldKind::Records(DEVICE_PING_RESULT_FIELDS)),
];

impl Schema for Status {
    const NAME: &'static str = "Status";
    const FIELDS: &'static [FieldSpec] = STATUS_FIELDS;
}

impl Schema for DeviceInfo {
    const NAME: &'static str = "DeviceInfo";
    const FIELDS: &'static [FieldSpec] = DEVICE_INFO_FIELDS;
}

impl Schema for DevicePingResult {
    const NAME: &'static str = "DevicePingResult";
    const FIELDS: &'static [FieldSpec] = DEVICE_PING_RESULT_FIELDS;
}

impl Schema for PingResult {
    const NAME: &'static str = "PingResult";
    const FIELDS: &'static [FieldSpec] = PING_RESULT_FIELDS;
}

/// Check a JSON value against a schema table.
///
/// Unknown keys are ignored and `null` counts as absent.
pub fn validate(path: &str, fields: &[FieldSpec], value: &Value) -> Result<(), DecodeError> {
    let obj = value.as_object().ok_or_else(|| DecodeError::WrongType {
        path: path.to_string(),
        expected: "an object",
    })?;

    for field in fields {
        let field_path = format!("{}.{}", path, field.key);
        let v = match obj.get(field.key) {
            Some(Value::Null) | None => {
                if field.required {
                    return Err(DecodeError::MissingField { path: field_path });
                }
                continue;
            }
            Some(v) => v,
        };

        let ok = match field.kind {
            FieldKind::String => v.is_string(),
            FieldKind::Bool => v.is_boolean(),
            FieldKind::Number => v.is_number(),
            FieldKind::Any => true,
            FieldKind::Records(nested) => {
                let items = v.as_array().ok_or_else(|| DecodeError::WrongType {
                    path: field_path.clone(),
                    expected: field.kind.expected(),
                })?;
                for (i, item) in items.iter().enumerate() {
                    validate(&format!("{}[{}]", field_path, i), nested, item)?;
                }
                true
            }
        };

        if !ok {
            return Err(DecodeError::WrongType {
                path: field_path,
                expected: field.kind.expected(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_path_in_error() {
        let v = json!({
            "hostname": "h1",
            "id": "d1",
            "internet-connectivity": true,
            "ip": "10.0.0.1",
            "status": [{"name": "nginx", "statuscode": "0", "version": "1.2"}]
        });
        let err = validate(DeviceInfo::NAME, DeviceInfo::FIELDS, &v).unwrap_err();
        match err {
            DecodeError::MissingField { path } => assert_eq!(path, "DeviceInfo.status[0].bin"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_null_optional_is_absent() {
        let v = json!({"successful": null});
        assert!(validate(PingResult::NAME, PingResult::FIELDS, &v).is_ok());
    }

    #[test]
    fn test_null_required_is_missing() {
        let v = json!({"name": "a", "bin": null, "statuscode": "0", "version": ""});
        assert!(matches!(
            validate(Status::NAME, Status::FIELDS, &v),
            Err(DecodeError::MissingField { .. })
        ));
    }

    #[test]
    fn test_wrong_type() {
        let v = json!({
            "hostname": "h1",
            "id": "d1",
            "internet-connectivity": "yes",
            "ip": "10.0.0.1"
        });
        let err = validate(DeviceInfo::NAME, DeviceInfo::FIELDS, &v).unwrap_err();
        assert_eq!(
            err.to_string(),
            "field DeviceInfo.internet-connectivity must be a boolean"
        );
    }

    #[test]
    fn test_top_level_must_be_object() {
        let err = validate(PingResult::NAME, PingResult::FIELDS, &json!([])).unwrap_err();
        assert!(matches!(err, DecodeError::WrongType { expected: "an object", .. }));
    }

    #[test]
    fn test_any_accepts_everything() {
        for info in [json!(1), json!("x"), json!({"k": [1, 2]}), json!(false)] {
            let v = json!({
                "name": "a", "bin": "b", "statuscode": "0", "version": "", "info": info
            });
            assert!(validate(Status::NAME, Status::FIELDS, &v).is_ok());
        }
    }
}
