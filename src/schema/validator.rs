// Field validators - declarative rules attached to a field definition

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::FieldError;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
});

/// One validation rule. A field carries at most one validator per rule name.
#[derive(Debug, Clone)]
pub enum FieldValidator {
    Required,
    Length { min: Option<usize>, max: Option<usize> },
    Range { min: Option<f64>, max: Option<f64> },
    Pattern(Regex),
    Email,
    Integer,
}

impl PartialEq for FieldValidator {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                FieldValidator::Length { min, max },
                FieldValidator::Length { min: other_min, max: other_max },
            ) => min == other_min && max == other_max,
            (
                FieldValidator::Range { min, max },
                FieldValidator::Range { min: other_min, max: other_max },
            ) => min == other_min && max == other_max,
            (FieldValidator::Pattern(a), FieldValidator::Pattern(b)) => a.as_str() == b.as_str(),
            (a, b) => a.rule() == b.rule(),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LengthParams {
    min: Option<usize>,
    max: Option<usize>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RangeParams {
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PatternParams {
    regex: String,
}

impl FieldValidator {
    pub fn length(min: Option<usize>, max: Option<usize>) -> Self {
        FieldValidator::Length { min, max }
    }

    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        FieldValidator::Range { min, max }
    }

    pub fn pattern(regex: &str) -> Result<Self, String> {
        Regex::new(regex)
            .map(FieldValidator::Pattern)
            .map_err(|e| format!("invalid pattern '{}': {}", regex, e))
    }

    /// Rule name, as written in schema files
    pub fn rule(&self) -> &'static str {
        match self {
            FieldValidator::Required => "required",
            FieldValidator::Length { .. } => "length",
            FieldValidator::Range { .. } => "range",
            FieldValidator::Pattern(_) => "pattern",
            FieldValidator::Email => "email",
            FieldValidator::Integer => "integer",
        }
    }

    /// Parse one entry of a `validators` list: either a bare rule name or a
    /// single-key mapping of rule name to parameters.
    pub fn from_yaml(entry: &serde_yaml::Value) -> Result<Self, String> {
        match entry {
            serde_yaml::Value::String(rule) => Self::from_rule(rule, None),
            serde_yaml::Value::Mapping(map) if map.len() == 1 => {
                let (key, params) = map.iter().next().ok_or("empty validator entry")?;
                let rule = key
                    .as_str()
                    .ok_or_else(|| format!("validator name must be a string, got {:?}", key))?;
                Self::from_rule(rule, Some(params))
            }
            other => Err(format!(
                "validator must be a rule name or a single-key mapping, got {:?}",
                other
            )),
        }
    }

    fn from_rule(rule: &str, params: Option<&serde_yaml::Value>) -> Result<Self, String> {
        let params = params.filter(|p| !p.is_null());
        match rule {
            "required" | "email" | "integer" => {
                if let Some(p) = params {
                    let empty = p.as_mapping().map(|m| m.is_empty()).unwrap_or(false);
                    if !empty {
                        return Err(format!("validator '{}' takes no parameters", rule));
                    }
                }
                Ok(match rule {
                    "required" => FieldValidator::Required,
                    "email" => FieldValidator::Email,
                    _ => FieldValidator::Integer,
                })
            }
            "length" => {
                let p: LengthParams = parse_params(rule, params)?;
                if p.min.is_none() && p.max.is_none() {
                    return Err("validator 'length' needs min or max".to_string());
                }
                let validator = FieldValidator::Length { min: p.min, max: p.max };
                validator.check_bounds()?;
                Ok(validator)
            }
            "range" => {
                let p: RangeParams = parse_params(rule, params)?;
                if p.min.is_none() && p.max.is_none() {
                    return Err("validator 'range' needs min or max".to_string());
                }
                let validator = FieldValidator::Range { min: p.min, max: p.max };
                validator.check_bounds()?;
                Ok(validator)
            }
            "pattern" => {
                let regex = match params {
                    Some(serde_yaml::Value::String(s)) => s.clone(),
                    other => parse_params::<PatternParams>(rule, other)?.regex,
                };
                Self::pattern(&regex)
            }
            unknown => Err(format!("unknown validator '{}'", unknown)),
        }
    }

    /// Bounds must leave at least one admissible value
    pub fn check_bounds(&self) -> Result<(), String> {
        match self {
            FieldValidator::Length { min: Some(min), max: Some(max) } if min > max => Err(
                format!("validator 'length' has min {} > max {}", min, max),
            ),
            FieldValidator::Range { min: Some(min), max: Some(max) } if min > max => Err(
                format!("validator 'range' has min {} > max {}", min, max),
            ),
            _ => Ok(()),
        }
    }

    /// Layer `other` onto this validator. Bounds merge per parameter, every
    /// other rule is replaced outright. Returns false when the rules differ.
    pub fn layer(&mut self, other: &FieldValidator) -> bool {
        if self.rule() != other.rule() {
            return false;
        }
        match (self, other) {
            (
                FieldValidator::Length { min, max },
                FieldValidator::Length { min: new_min, max: new_max },
            ) => {
                if new_min.is_some() {
                    *min = *new_min;
                }
                if new_max.is_some() {
                    *max = *new_max;
                }
            }
            (
                FieldValidator::Range { min, max },
                FieldValidator::Range { min: new_min, max: new_max },
            ) => {
                if new_min.is_some() {
                    *min = *new_min;
                }
                if new_max.is_some() {
                    *max = *new_max;
                }
            }
            (current, replacement) => *current = replacement.clone(),
        }
        true
    }

    /// Parameters in request-schema form
    pub fn params_json(&self) -> Value {
        let mut params = serde_json::Map::new();
        match self {
            FieldValidator::Length { min, max } => {
                if let Some(min) = min {
                    params.insert("min".into(), json!(min));
                }
                if let Some(max) = max {
                    params.insert("max".into(), json!(max));
                }
            }
            FieldValidator::Range { min, max } => {
                if let Some(min) = min {
                    params.insert("min".into(), json!(min));
                }
                if let Some(max) = max {
                    params.insert("max".into(), json!(max));
                }
            }
            FieldValidator::Pattern(regex) => {
                params.insert("regex".into(), json!(regex.as_str()));
            }
            FieldValidator::Required | FieldValidator::Email | FieldValidator::Integer => {}
        }
        Value::Object(params)
    }

    /// Check an already-coerced value. Empty values only fail `required`.
    pub fn check(&self, field: &str, value: &Value) -> Option<FieldError> {
        let empty = is_empty(value);
        if let FieldValidator::Required = self {
            return empty.then(|| FieldError::new(field, self.rule(), "is required"));
        }
        if empty {
            return None;
        }

        match self {
            FieldValidator::Length { min, max } => {
                let len = value_text(value).chars().count();
                if let Some(min) = min {
                    if len < *min {
                        return Some(FieldError::new(
                            field,
                            self.rule(),
                            format!("must be at least {} characters", min),
                        ));
                    }
                }
                if let Some(max) = max {
                    if len > *max {
                        return Some(FieldError::new(
                            field,
                            self.rule(),
                            format!("must be at most {} characters", max),
                        ));
                    }
                }
                None
            }
            FieldValidator::Range { min, max } => {
                let Some(number) = value.as_f64() else {
                    return Some(FieldError::new(field, self.rule(), "must be a number"));
                };
                if let Some(min) = min {
                    if number < *min {
                        return Some(FieldError::new(
                            field,
                            self.rule(),
                            format!("must be at least {}", min),
                        ));
                    }
                }
                if let Some(max) = max {
                    if number > *max {
                        return Some(FieldError::new(
                            field,
                            self.rule(),
                            format!("must be at most {}", max),
                        ));
                    }
                }
                None
            }
            FieldValidator::Pattern(regex) => (!regex.is_match(&value_text(value))).then(|| {
                FieldError::new(
                    field,
                    self.rule(),
                    format!("does not match pattern {}", regex.as_str()),
                )
            }),
            FieldValidator::Email => (!EMAIL_PATTERN.is_match(&value_text(value)))
                .then(|| FieldError::new(field, self.rule(), "must be a valid email address")),
            FieldValidator::Integer => {
                let whole = value.as_f64().map(|n| n.fract() == 0.0).unwrap_or(false);
                (!whole).then(|| FieldError::new(field, self.rule(), "must be a whole number"))
            }
            FieldValidator::Required => None,
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    rule: &str,
    params: Option<&serde_yaml::Value>,
) -> Result<T, String> {
    let params = params.ok_or_else(|| format!("validator '{}' needs parameters", rule))?;
    serde_yaml::from_value(params.clone())
        .map_err(|e| format!("invalid parameters for validator '{}': {}", rule, e))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
