// Field schema merger - folds custom fields into a base request schema

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ProfileError, ProfileResult};
use crate::schema::document::SchemaDocument;
use crate::schema::field::FieldDefinition;
use crate::schema::validator::FieldValidator;

/// Validator injected into a named field during a merge, e.g. password
/// length bounds taken from site configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorOverride {
    pub field: String,
    pub validator: FieldValidator,
}

impl ValidatorOverride {
    pub fn new(field: &str, validator: FieldValidator) -> Self {
        Self {
            field: field.to_string(),
            validator,
        }
    }
}

/// Union of a base request schema and the custom fields of one entity kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedSchema {
    document: SchemaDocument,
    custom_fields: Vec<String>,
}

impl MergedSchema {
    pub fn document(&self) -> &SchemaDocument {
        &self.document
    }

    pub fn into_document(self) -> SchemaDocument {
        self.document
    }

    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.document.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.document.iter()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.document.field_names()
    }

    /// Names the custom schema contributed, in custom order. Includes names
    /// that were reconciled with a base field.
    pub fn custom_fields(&self) -> &[String] {
        &self.custom_fields
    }

    pub fn is_custom(&self, name: &str) -> bool {
        self.custom_fields.iter().any(|f| f == name)
    }

    pub fn to_json(&self) -> Value {
        self.document.to_json()
    }
}

/// Merge `custom` into `base`, then apply `overrides` in order.
///
/// Base fields keep their position and every property except validators.
/// When a custom field shares a base field's name its validators are layered
/// onto the base field; otherwise it is appended after the base fields.
/// Field types on a shared name must agree, and layered bounds must still
/// admit a value.
pub fn merge(
    base: &SchemaDocument,
    custom: &SchemaDocument,
    overrides: &[ValidatorOverride],
) -> ProfileResult<MergedSchema> {
    let mut document = base.clone();
    let mut custom_fields = Vec::with_capacity(custom.len());

    for field in custom.iter() {
        match document.get_mut(&field.name) {
            Some(existing) => {
                if !existing.field_type.is_compatible(&field.field_type) {
                    return Err(ProfileError::SchemaConflict {
                        field: field.name.clone(),
                        base_type: existing.field_type.to_string(),
                        custom_type: field.field_type.to_string(),
                    });
                }
                for validator in &field.validators {
                    existing.layer_validator(validator);
                }
                check_bounds(existing)?;
                debug!("Reconciled custom field '{}' with base field", field.name);
            }
            None => {
                document
                    .insert(field.clone())
                    .map_err(ProfileError::Configuration)?;
            }
        }
        custom_fields.push(field.name.clone());
    }

    for o in overrides {
        match document.get_mut(&o.field) {
            Some(field) => {
                field.layer_validator(&o.validator);
                check_bounds(field)?;
            }
            None => warn!(
                "Validator override for '{}' skipped: field not in merged schema",
                o.field
            ),
        }
    }

    Ok(MergedSchema {
        document,
        custom_fields,
    })
}

fn check_bounds(field: &FieldDefinition) -> ProfileResult<()> {
    field
        .validators
        .iter()
        .try_for_each(FieldValidator::check_bounds)
        .map_err(|reason| {
            ProfileError::Configuration(format!("field '{}': {}", field.name, reason))
        })
}
