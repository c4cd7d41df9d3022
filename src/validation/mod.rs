//! Structural validation of builder form values.

mod rules;
pub mod schema;

use serde_json::Value;

use crate::builder::types::BuilderFormValues;

pub use schema::{Schema, TestContext, ValidationIssue, ValidationReport};

/// Validates serialized form values. Values that pass the rules must also
/// decode into [`BuilderFormValues`].
pub fn validate_form_values(values: &Value) -> ValidationReport {
    let mut report = rules::FORM_SCHEMA.validate(values);
    if report.is_valid() {
        if let Err(err) = serde_json::from_value::<BuilderFormValues>(report.value.clone()) {
            report.issues.push(ValidationIssue {
                path: String::new(),
                message: format!("form values do not decode: {err}"),
            });
        }
    }
    report
}

pub fn validate_builder(values: &BuilderFormValues) -> ValidationReport {
    match serde_json::to_value(values) {
        Ok(value) => validate_form_values(&value),
        Err(err) => ValidationReport {
            issues: vec![ValidationIssue {
                path: String::new(),
                message: format!("form values do not encode: {err}"),
            }],
            value: Value::Null,
        },
    }
}
