// Schema documents - ordered field definitions for one entity kind

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{ProfileError, ProfileResult};
use crate::schema::field::{FieldDefinition, FieldType, Visibility};
use crate::schema::validator::FieldValidator;

/// Ordered mapping from field name to definition. Names are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDocument {
    fields: Vec<FieldDefinition>,
    index: HashMap<String, usize>,
}

impl SchemaDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from definitions, rejecting duplicate names
    pub fn from_fields(fields: Vec<FieldDefinition>) -> Result<Self, String> {
        let mut document = Self::new();
        for field in fields {
            document.insert(field)?;
        }
        Ok(document)
    }

    /// Append a field definition
    pub fn insert(&mut self, field: FieldDefinition) -> Result<(), String> {
        if self.index.contains_key(&field.name) {
            return Err(format!("duplicate field '{}'", field.name));
        }
        self.index.insert(field.name.clone(), self.fields.len());
        self.fields.push(field);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldDefinition> {
        match self.index.get(name) {
            Some(&i) => self.fields.get_mut(i),
            None => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Ordered `{name: definition}` object in request-schema form
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|f| (f.name.clone(), f.to_json()))
                .collect(),
        )
    }

    /// Parse a YAML field-definition document. `location` names the source in
    /// error messages.
    pub fn from_yaml_str(location: &str, text: &str) -> ProfileResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        let root: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| ProfileError::schema_load(location, e.to_string()))?;

        let mapping = match root {
            serde_yaml::Value::Null => return Ok(Self::new()),
            serde_yaml::Value::Mapping(mapping) => mapping,
            _ => {
                return Err(ProfileError::schema_load(
                    location,
                    "top level must be a mapping of field names to definitions",
                ))
            }
        };

        let mut document = Self::new();
        for (key, value) in mapping {
            let name = key.as_str().ok_or_else(|| {
                ProfileError::schema_load(location, format!("field name {:?} is not a string", key))
            })?;
            let raw: RawFieldDefinition = serde_yaml::from_value(value).map_err(|e| {
                ProfileError::schema_load(location, format!("field '{}': {}", name, e))
            })?;
            let field = raw
                .into_definition(name)
                .map_err(|reason| ProfileError::schema_load(location, reason))?;
            document
                .insert(field)
                .map_err(|reason| ProfileError::schema_load(location, reason))?;
        }

        Ok(document)
    }
}

/// On-disk shape of one field definition
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFieldDefinition {
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    validators: Vec<serde_yaml::Value>,
    #[serde(default)]
    default: Option<serde_yaml::Value>,
    #[serde(default)]
    visibility: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl RawFieldDefinition {
    fn into_definition(self, name: &str) -> Result<FieldDefinition, String> {
        if name.trim().is_empty() {
            return Err("field names must not be empty".to_string());
        }

        let field_type = match self.field_type.as_str() {
            "string" => FieldType::String,
            "number" => FieldType::Number,
            "boolean" => FieldType::Boolean,
            "enum" if self.options.is_empty() => {
                return Err(format!("enum field '{}' needs a non-empty options list", name))
            }
            "enum" => FieldType::Enum(self.options.clone()),
            other => return Err(format!("field '{}' has unknown type '{}'", name, other)),
        };
        if !self.options.is_empty() && !matches!(field_type, FieldType::Enum(_)) {
            return Err(format!("field '{}' lists options but is not an enum", name));
        }

        let mut field = FieldDefinition::new(name, field_type);
        field.label = self.label;
        field.description = self.description;

        field.visibility = match self.visibility.as_deref() {
            None | Some("public") => Visibility::Public,
            Some("private") => Visibility::Private,
            Some(other) => {
                return Err(format!("field '{}' has unknown visibility '{}'", name, other))
            }
        };

        for entry in &self.validators {
            let validator = FieldValidator::from_yaml(entry)
                .map_err(|reason| format!("field '{}': {}", name, reason))?;
            field.layer_validator(&validator);
        }

        if let Some(raw_default) = self.default.filter(|d| !d.is_null()) {
            let default = serde_json::to_value(&raw_default)
                .map_err(|e| format!("field '{}' default: {}", name, e))?;
            let coerced = field.coerce(&default).map_err(|e| {
                format!("default for field '{}' does not match its type: {}", name, e.message)
            })?;
            field.default = Some(coerced);
        }

        Ok(field)
    }
}
