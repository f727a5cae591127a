// Field definitions - one administrator-defined profile attribute

use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};
use std::fmt;

use crate::error::FieldError;
use crate::schema::validator::FieldValidator;

/// Value types a custom field may hold
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Enum(Vec<String>),
}

impl FieldType {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Enum(_) => "enum",
        }
    }

    /// Two types are compatible when they store the same kind of value.
    /// Enum option lists may differ.
    pub fn is_compatible(&self, other: &FieldType) -> bool {
        self.type_name() == other.type_name()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Whether a field appears on read-only profile views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

/// Read-time restriction on which fields a profile read returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisibilityFilter {
    #[default]
    All,
    PublicOnly,
}

impl VisibilityFilter {
    pub fn admits(&self, visibility: Visibility) -> bool {
        match self {
            VisibilityFilter::All => true,
            VisibilityFilter::PublicOnly => visibility == Visibility::Public,
        }
    }
}

/// Field definition - name, type, validation rules and presentation hints
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    pub validators: Vec<FieldValidator>,
    pub default: Option<Value>,
    pub visibility: Visibility,
    pub label: Option<String>,
    pub description: Option<String>,
}

impl FieldDefinition {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            validators: Vec::new(),
            default: None,
            visibility: Visibility::Public,
            label: None,
            description: None,
        }
    }

    /// Add a validator, layering it onto an existing one with the same rule
    pub fn validate(mut self, validator: FieldValidator) -> Self {
        self.layer_validator(&validator);
        self
    }

    pub fn default_value(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }

    /// Layer a validator onto the field: same rule merges, new rule appends
    pub fn layer_validator(&mut self, validator: &FieldValidator) {
        let layered = self
            .validators
            .iter_mut()
            .any(|existing| existing.layer(validator));
        if !layered {
            self.validators.push(validator.clone());
        }
    }

    pub fn validator(&self, rule: &str) -> Option<&FieldValidator> {
        self.validators.iter().find(|v| v.rule() == rule)
    }

    /// Convert a submitted value into this field's storage type
    pub fn coerce(&self, value: &Value) -> Result<Value, FieldError> {
        let mismatch = |expected: &str| {
            FieldError::new(&self.name, "type", format!("must be {}", expected))
        };

        if value.is_null() {
            return Ok(Value::Null);
        }

        match &self.field_type {
            FieldType::String => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err(mismatch("a string")),
            },
            FieldType::Number => match value {
                Value::Number(_) => Ok(value.clone()),
                Value::String(s) => parse_number(s.trim()).ok_or_else(|| mismatch("a number")),
                _ => Err(mismatch("a number")),
            },
            FieldType::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Ok(Value::Bool(false)),
                    Some(1) => Ok(Value::Bool(true)),
                    _ => Err(mismatch("a boolean")),
                },
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
                    "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
                    _ => Err(mismatch("a boolean")),
                },
                _ => Err(mismatch("a boolean")),
            },
            FieldType::Enum(options) => match value {
                Value::String(s) if options.iter().any(|o| o == s) => Ok(value.clone()),
                _ => Err(FieldError::new(
                    &self.name,
                    "type",
                    format!("must be one of: {}", options.join(", ")),
                )),
            },
        }
    }

    /// Coerce then run every validator; returns the stored value or all errors
    pub fn check(&self, value: &Value) -> Result<Value, Vec<FieldError>> {
        let coerced = self.coerce(value).map_err(|e| vec![e])?;
        let errors: Vec<FieldError> = self
            .validators
            .iter()
            .filter_map(|v| v.check(&self.name, &coerced))
            .collect();
        if errors.is_empty() {
            Ok(coerced)
        } else {
            Err(errors)
        }
    }

    /// Request-schema form consumed by the validation and form layers
    pub fn to_json(&self) -> Value {
        let mut out = serde_json::Map::new();
        out.insert("type".into(), json!(self.field_type.type_name()));
        if let FieldType::Enum(options) = &self.field_type {
            out.insert("options".into(), json!(options));
        }
        let validators: serde_json::Map<String, Value> = self
            .validators
            .iter()
            .map(|v| (v.rule().to_string(), v.params_json()))
            .collect();
        out.insert("validators".into(), Value::Object(validators));
        if let Some(default) = &self.default {
            out.insert("default".into(), default.clone());
        }
        out.insert("visibility".into(), json!(self.visibility.as_str()));
        if let Some(label) = &self.label {
            out.insert("label".into(), json!(label));
        }
        if let Some(description) = &self.description {
            out.insert("description".into(), json!(description));
        }
        Value::Object(out)
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}
