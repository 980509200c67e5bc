// Declared parameter types and the per-field coercion + check rules built from them
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};
use std::fmt;

use crate::route::context::{Location, RequestContext};

/// Declared type of a route parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    #[default]
    String,
    Number,
    Boolean,
    Array,
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterType::String => "string",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Array => "array",
        };
        f.write_str(name)
    }
}

impl ParameterType {
    fn article(&self) -> &'static str {
        match self {
            ParameterType::Array => "an",
            _ => "a",
        }
    }
}

/// How a single route parameter is whitelisted and validated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type", default)]
    pub kind: ParameterType,
    #[serde(default)]
    pub optional: bool,
    /// Replaces the generated failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Older route tables mark list parameters with `array: true` instead of a type
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub array: bool,
}

impl ParameterSpec {
    pub fn new(kind: ParameterType) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn string() -> Self {
        Self::new(ParameterType::String)
    }

    pub fn number() -> Self {
        Self::new(ParameterType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(ParameterType::Boolean)
    }

    pub fn array() -> Self {
        Self::new(ParameterType::Array)
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// The type actually enforced, honoring the legacy `array` flag
    pub fn effective_type(&self) -> ParameterType {
        if self.array {
            ParameterType::Array
        } else {
            self.kind
        }
    }
}

/// One failed field check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationFailure {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub message: String,
}

/// Every field failure collected for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    failures: Vec<ValidationFailure>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, failure: ValidationFailure) {
        self.failures.push(failure);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationFailure> {
        self.failures.iter()
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.failures.iter().any(|f| f.field == field)
    }

    /// Failure messages, one per line
    pub fn message(&self) -> String {
        self.failures
            .iter()
            .map(|f| f.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// field -> {location, value, message}
    pub fn meta_data(&self) -> Map<String, Value> {
        let mut meta = Map::new();
        for failure in &self.failures {
            let mut detail = Map::new();
            if let Some(location) = failure.location {
                detail.insert("location".to_string(), json!(location));
            }
            if let Some(value) = &failure.value {
                detail.insert("value".to_string(), value.clone());
            }
            detail.insert("message".to_string(), Value::String(failure.message.clone()));
            meta.insert(failure.field.clone(), Value::Object(detail));
        }
        meta
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Coercion + check rule for one declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChecker {
    name: String,
    spec: ParameterSpec,
}

pub fn build_checker(name: &str, spec: &ParameterSpec) -> FieldChecker {
    FieldChecker {
        name: name.to_string(),
        spec: spec.clone(),
    }
}

impl FieldChecker {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &ParameterSpec {
        &self.spec
    }

    /// Check the field wherever it appears (body, path params, query),
    /// replacing accepted values with their coerced form. At most one
    /// failure is recorded per field.
    pub fn check(&self, ctx: &mut RequestContext) {
        let kind = self.spec.effective_type();
        let mut found = false;

        for location in Location::ALL {
            let rejected = match ctx.location_mut(location).get_mut(&self.name) {
                None => continue,
                Some(value) => match coerce(kind, value) {
                    Some(coerced) => {
                        *value = coerced;
                        None
                    }
                    None => Some(value.clone()),
                },
            };
            found = true;

            if let Some(value) = rejected {
                ctx.validation.push(ValidationFailure {
                    field: self.name.clone(),
                    location: Some(location),
                    value: Some(value),
                    message: self.failure_message(format!("{} must be {} {}", self.name, kind.article(), kind)),
                });
                return;
            }
        }

        if !found && !self.spec.optional {
            ctx.validation.push(ValidationFailure {
                field: self.name.clone(),
                location: None,
                value: None,
                message: self.failure_message(format!("{} is required", self.name)),
            });
        }
    }

    fn failure_message(&self, fallback: String) -> String {
        self.spec.message.clone().unwrap_or(fallback)
    }
}

/// Coerce a raw value to the declared type; `None` when it does not conform
pub fn coerce(kind: ParameterType, value: &Value) -> Option<Value> {
    match kind {
        ParameterType::String => value.is_string().then(|| value.clone()),
        ParameterType::Number => {
            let parsed = match value {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) if is_numeric(s) => s.parse::<f64>().ok()?,
                _ => return None,
            };
            Number::from_f64(parsed).map(Value::Number)
        }
        ParameterType::Boolean => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::String(s) => parse_boolean(s).map(Value::Bool),
            Value::Number(n) => match n.as_u64() {
                Some(1) => Some(Value::Bool(true)),
                Some(0) => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        ParameterType::Array => value.is_array().then(|| value.clone()),
    }
}

/// Numbers sent as strings: decimal notation only, with an optional sign,
/// optional integer part, optional fraction and at least one trailing digit.
/// No exponents, no hex, no blanks. JSON numbers skip this check.
fn is_numeric(text: &str) -> bool {
    let unsigned = text.strip_prefix(&['+', '-'][..]).unwrap_or(text);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => ("", unsigned),
    };
    !frac_part.is_empty()
        && int_part.bytes().all(|b| b.is_ascii_digit())
        && frac_part.bytes().all(|b| b.is_ascii_digit())
}

fn parse_boolean(text: &str) -> Option<bool> {
    match text {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn ctx_with_body(body: Value) -> RequestContext {
        let body = body.as_object().cloned().unwrap_or_default();
        RequestContext::new(Method::POST, "/items").with_body(body)
    }

    #[test]
    fn numbers_are_coerced_to_floats() {
        assert_eq!(coerce(ParameterType::Number, &json!("5")), Some(json!(5.0)));
        assert_eq!(coerce(ParameterType::Number, &json!("-2.5")), Some(json!(-2.5)));
        assert_eq!(coerce(ParameterType::Number, &json!(".5")), Some(json!(0.5)));
        assert_eq!(coerce(ParameterType::Number, &json!(7)), Some(json!(7.0)));
    }

    #[test]
    fn json_numbers_in_exponent_range_are_accepted() {
        let huge: Value = serde_json::from_str("100000000000000000000").unwrap();
        let tiny: Value = serde_json::from_str("0.0000001").unwrap();

        assert_eq!(coerce(ParameterType::Number, &huge), Some(json!(1e20)));
        assert_eq!(coerce(ParameterType::Number, &tiny), Some(json!(1e-7)));
        assert_eq!(coerce(ParameterType::Number, &json!(u64::MAX)), Some(json!(u64::MAX as f64)));
    }

    #[test]
    fn non_decimal_numbers_are_rejected() {
        for raw in ["notanumber", "", "1e5", "0x10", "5.", " 5", "+", "1.2.3"] {
            assert_eq!(coerce(ParameterType::Number, &json!(raw)), None, "{raw:?}");
        }
        assert_eq!(coerce(ParameterType::Number, &json!(true)), None);
    }

    #[test]
    fn booleans_accept_the_strict_set() {
        assert_eq!(coerce(ParameterType::Boolean, &json!("true")), Some(json!(true)));
        assert_eq!(coerce(ParameterType::Boolean, &json!("0")), Some(json!(false)));
        assert_eq!(coerce(ParameterType::Boolean, &json!(false)), Some(json!(false)));
        assert_eq!(coerce(ParameterType::Boolean, &json!(1)), Some(json!(true)));
        assert_eq!(coerce(ParameterType::Boolean, &json!("yes")), None);
        assert_eq!(coerce(ParameterType::Boolean, &json!(2)), None);
    }

    #[test]
    fn strings_and_arrays_are_type_checked_only() {
        assert_eq!(coerce(ParameterType::String, &json!("a")), Some(json!("a")));
        assert_eq!(coerce(ParameterType::String, &json!(5)), None);
        assert_eq!(coerce(ParameterType::Array, &json!(["a"])), Some(json!(["a"])));
        assert_eq!(coerce(ParameterType::Array, &json!("a")), None);
    }

    #[test]
    fn legacy_array_flag_overrides_type() {
        let spec: ParameterSpec = serde_json::from_value(json!({"type": "string", "array": true})).unwrap();
        assert_eq!(spec.effective_type(), ParameterType::Array);
    }

    #[test]
    fn check_coerces_in_place() {
        let mut ctx = ctx_with_body(json!({"qty": "5"}));
        build_checker("qty", &ParameterSpec::number()).check(&mut ctx);

        assert!(ctx.validation.is_empty());
        assert_eq!(ctx.body["qty"], json!(5.0));
    }

    #[test]
    fn check_reports_missing_required_fields() {
        let mut ctx = ctx_with_body(json!({}));
        build_checker("name", &ParameterSpec::string()).check(&mut ctx);

        assert_eq!(ctx.validation.len(), 1);
        assert_eq!(ctx.validation.message(), "name is required");
    }

    #[test]
    fn optional_fields_may_be_absent_but_not_wrong() {
        let mut ctx = ctx_with_body(json!({}));
        let checker = build_checker("draft", &ParameterSpec::boolean().optional());
        checker.check(&mut ctx);
        assert!(ctx.validation.is_empty());

        let mut ctx = ctx_with_body(json!({"draft": "maybe"}));
        checker.check(&mut ctx);
        assert!(ctx.validation.contains_field("draft"));
    }

    #[test]
    fn custom_message_replaces_default() {
        let mut ctx = ctx_with_body(json!({"qty": "lots"}));
        let spec = ParameterSpec::number().with_message("qty needs digits");
        build_checker("qty", &spec).check(&mut ctx);

        assert_eq!(ctx.validation.message(), "qty needs digits");
    }

    #[test]
    fn query_values_are_checked_too() {
        let mut query = Map::new();
        query.insert("page".to_string(), json!("3"));
        let mut ctx = RequestContext::new(Method::GET, "/items").with_query(query);

        build_checker("page", &ParameterSpec::number()).check(&mut ctx);
        assert_eq!(ctx.query["page"], json!(3.0));
    }

    #[test]
    fn failures_aggregate_into_one_message() {
        let mut ctx = ctx_with_body(json!({"qty": "x"}));
        build_checker("name", &ParameterSpec::string()).check(&mut ctx);
        build_checker("qty", &ParameterSpec::number()).check(&mut ctx);

        assert_eq!(ctx.validation.message(), "name is required\nqty must be a number");
        let meta = ctx.validation.meta_data();
        assert_eq!(meta["qty"]["location"], "body");
        assert_eq!(meta["qty"]["value"], "x");
        assert!(meta["name"].get("location").is_none());
    }
}
