use serde::Serialize;
use std::fmt;

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub rule: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, rule: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            rule: rule.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.field, self.rule, self.message)
    }
}

#[derive(Debug)]
pub enum ProfileError {
    SchemaLoad { location: String, reason: String },
    SchemaConflict {
        field: String,
        base_type: String,
        custom_type: String,
    },
    UnknownField(Vec<String>),
    Validation(Vec<FieldError>),
    Database(String),
    Serialization(String),
    Configuration(String),
}

impl ProfileError {
    pub fn schema_load(location: impl Into<String>, reason: impl Into<String>) -> Self {
        ProfileError::SchemaLoad {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Errors caused by broken configuration rather than by user input
    pub fn is_configuration_fault(&self) -> bool {
        matches!(
            self,
            ProfileError::SchemaLoad { .. }
                | ProfileError::SchemaConflict { .. }
                | ProfileError::Configuration(_)
        )
    }

    /// Errors the caller should report back as a failed submission
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProfileError::UnknownField(_) | ProfileError::Validation(_)
        )
    }

    /// Field-level errors, if this is a validation failure
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ProfileError::Validation(errors) => errors,
            _ => &[],
        }
    }
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileError::SchemaLoad { location, reason } => {
                write!(f, "Schema load error ({}): {}", location, reason)
            }
            ProfileError::SchemaConflict {
                field,
                base_type,
                custom_type,
            } => write!(
                f,
                "Schema conflict: field '{}' is {} in the base schema but {} in the custom schema",
                field, base_type, custom_type
            ),
            ProfileError::UnknownField(fields) => {
                write!(f, "Unknown profile field(s): {}", fields.join(", "))
            }
            ProfileError::Validation(errors) => {
                let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                write!(f, "Validation error: {}", joined.join("; "))
            }
            ProfileError::Database(msg) => write!(f, "Database error: {}", msg),
            ProfileError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            ProfileError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ProfileError {}

impl From<sqlx::Error> for ProfileError {
    fn from(err: sqlx::Error) -> Self {
        ProfileError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for ProfileError {
    fn from(err: serde_json::Error) -> Self {
        ProfileError::Serialization(err.to_string())
    }
}

pub type ProfileResult<T> = Result<T, ProfileError>;
