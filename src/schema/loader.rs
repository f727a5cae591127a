// Schema sources - where custom field definitions and base request schemas live

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::entity::EntityKind;
use crate::error::{ProfileError, ProfileResult};
use crate::schema::document::SchemaDocument;

/// Supplies the custom field-definition document for an entity kind.
/// Loading is a pure read and never touches the schema cache.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn load(&self, kind: EntityKind) -> ProfileResult<SchemaDocument>;
}

/// Supplies the static base request schema for a named operation
/// (e.g. `create_user`, `account_settings`).
#[async_trait]
pub trait BaseSchemaProvider: Send + Sync {
    async fn base_schema(&self, operation: &str) -> ProfileResult<SchemaDocument>;
}

async fn read_document(path: &Path) -> ProfileResult<SchemaDocument> {
    let location = path.display().to_string();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProfileError::schema_load(&location, e.to_string()))?;
    let document = SchemaDocument::from_yaml_str(&location, &text)?;
    debug!("Loaded {} field definitions from {}", document.len(), location);
    Ok(document)
}

/// Reads `<dir>/<schema_key>.yaml`, e.g. `schema/user_fields.yaml`
#[derive(Debug, Clone)]
pub struct FileSchemaSource {
    dir: PathBuf,
}

impl FileSchemaSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, kind: EntityKind) -> PathBuf {
        self.dir.join(format!("{}.yaml", kind.schema_key()))
    }
}

#[async_trait]
impl SchemaSource for FileSchemaSource {
    #[instrument(skip(self))]
    async fn load(&self, kind: EntityKind) -> ProfileResult<SchemaDocument> {
        read_document(&self.path_for(kind)).await
    }
}

/// In-memory YAML sources, one per kind
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaSource {
    sources: HashMap<EntityKind, String>,
}

impl StaticSchemaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: EntityKind, yaml: &str) -> Self {
        self.sources.insert(kind, yaml.to_string());
        self
    }
}

#[async_trait]
impl SchemaSource for StaticSchemaSource {
    async fn load(&self, kind: EntityKind) -> ProfileResult<SchemaDocument> {
        let text = self.sources.get(&kind).ok_or_else(|| {
            ProfileError::schema_load(kind.schema_key(), "no field definitions registered")
        })?;
        SchemaDocument::from_yaml_str(kind.schema_key(), text)
    }
}

fn check_operation_name(operation: &str) -> ProfileResult<()> {
    let valid = !operation.is_empty()
        && operation
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ProfileError::schema_load(
            operation,
            "request schema names may only contain letters, digits, '_' and '-'",
        ))
    }
}

/// Reads `<dir>/requests/<operation>.yaml`
#[derive(Debug, Clone)]
pub struct FileBaseSchemaProvider {
    dir: PathBuf,
}

impl FileBaseSchemaProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl BaseSchemaProvider for FileBaseSchemaProvider {
    #[instrument(skip(self))]
    async fn base_schema(&self, operation: &str) -> ProfileResult<SchemaDocument> {
        check_operation_name(operation)?;
        let path = self.dir.join("requests").join(format!("{}.yaml", operation));
        read_document(&path).await
    }
}

/// In-memory base schemas keyed by operation name
#[derive(Debug, Clone, Default)]
pub struct StaticBaseSchemaProvider {
    schemas: HashMap<String, SchemaDocument>,
}

impl StaticBaseSchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, operation: &str, schema: SchemaDocument) -> Self {
        self.schemas.insert(operation.to_string(), schema);
        self
    }
}

#[async_trait]
impl BaseSchemaProvider for StaticBaseSchemaProvider {
    async fn base_schema(&self, operation: &str) -> ProfileResult<SchemaDocument> {
        check_operation_name(operation)?;
        self.schemas
            .get(operation)
            .cloned()
            .ok_or_else(|| ProfileError::schema_load(operation, "no such request schema"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_source_reads_per_kind() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("user_fields.yaml"),
            "nickname:\n  type: string\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("group_fields.yaml"),
            "motto:\n  type: string\n",
        )
        .unwrap();

        let source = FileSchemaSource::new(dir.path());
        let user = source.load(EntityKind::User).await.unwrap();
        let group = source.load(EntityKind::Group).await.unwrap();
        assert_eq!(user.field_names(), vec!["nickname"]);
        assert_eq!(group.field_names(), vec!["motto"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_load_error() {
        let dir = tempdir().unwrap();
        let source = FileSchemaSource::new(dir.path());
        let err = source.load(EntityKind::Group).await.unwrap_err();
        assert!(matches!(err, ProfileError::SchemaLoad { .. }));
        assert!(err.is_configuration_fault());
    }

    #[tokio::test]
    async fn test_base_provider_reads_requests_dir() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("requests")).unwrap();
        std::fs::write(
            dir.path().join("requests").join("create_user.yaml"),
            "user_name:\n  type: string\n  validators:\n    - required\n",
        )
        .unwrap();

        let provider = FileBaseSchemaProvider::new(dir.path());
        let base = provider.base_schema("create_user").await.unwrap();
        assert_eq!(base.field_names(), vec!["user_name"]);

        assert!(provider.base_schema("../user_fields").await.is_err());
        assert!(provider.base_schema("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_static_source_without_kind_fails() {
        let source = StaticSchemaSource::new().with(EntityKind::User, "bio:\n  type: string\n");
        assert!(source.load(EntityKind::User).await.is_ok());
        assert!(source.load(EntityKind::Group).await.is_err());
    }
}
