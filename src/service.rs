// ProfileService - entry point controllers use for custom profile fields
// Composes the schema cache, merger and attribute store

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::cache::SchemaCache;
use crate::entity::{EntityKind, ProfileEntity};
use crate::error::{ProfileError, ProfileResult};
use crate::schema::{
    merge, BaseSchemaProvider, MergedSchema, SchemaDocument, ValidatorOverride, VisibilityFilter,
};
use crate::store::{AttributeStore, ProfileValues, StoreTransaction};

/// Schema reads need only the cache. Profile reads and writes also need an
/// attribute store; a schema-only service rejects them.
#[derive(Clone)]
pub struct ProfileService {
    cache: Arc<SchemaCache>,
    base_schemas: Arc<dyn BaseSchemaProvider>,
    store: Option<AttributeStore>,
    overrides: Vec<ValidatorOverride>,
}

impl ProfileService {
    /// Full service sharing the store's schema cache
    pub fn new(store: AttributeStore, base_schemas: Arc<dyn BaseSchemaProvider>) -> Self {
        Self {
            cache: store.cache().clone(),
            base_schemas,
            store: Some(store),
            overrides: Vec::new(),
        }
    }

    /// Service for schema reads only; no database is opened
    pub fn schema_only(
        cache: Arc<SchemaCache>,
        base_schemas: Arc<dyn BaseSchemaProvider>,
    ) -> Self {
        Self {
            cache,
            base_schemas,
            store: None,
            overrides: Vec::new(),
        }
    }

    /// Validator overrides applied to every merged schema
    pub fn with_overrides(mut self, overrides: Vec<ValidatorOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    pub fn store(&self) -> ProfileResult<&AttributeStore> {
        self.store.as_ref().ok_or_else(|| {
            ProfileError::Configuration(
                "profile service was built without an attribute store".to_string(),
            )
        })
    }

    /// Current custom field document for `kind`
    pub async fn custom_schema(&self, kind: EntityKind) -> ProfileResult<Arc<SchemaDocument>> {
        self.cache.get_or_load(kind).await
    }

    /// Custom fields of `kind` merged into the base request schema of
    /// `base_operation` (or into nothing when `None`)
    #[instrument(skip(self))]
    pub async fn fields_schema(
        &self,
        kind: EntityKind,
        base_operation: Option<&str>,
    ) -> ProfileResult<MergedSchema> {
        let base = match base_operation {
            Some(operation) => self.base_schemas.base_schema(operation).await?,
            None => SchemaDocument::new(),
        };
        self.fields_schema_with(kind, &base, &[]).await
    }

    /// Merge with a caller-supplied base document. `extra_overrides` apply
    /// after the configured ones.
    pub async fn fields_schema_with(
        &self,
        kind: EntityKind,
        base: &SchemaDocument,
        extra_overrides: &[ValidatorOverride],
    ) -> ProfileResult<MergedSchema> {
        let custom = self.cache.get_or_load(kind).await?;
        let overrides: Vec<ValidatorOverride> = self
            .overrides
            .iter()
            .chain(extra_overrides)
            .cloned()
            .collect();
        merge(base, &custom, &overrides)
    }

    /// Stored profile values for `entity`, always read fresh
    #[instrument(skip(self, entity), fields(kind = %entity.entity_kind(), id = %entity.entity_id()))]
    pub async fn profile<E: ProfileEntity + ?Sized>(
        &self,
        entity: &E,
        filter: VisibilityFilter,
    ) -> ProfileResult<ProfileValues> {
        self.store()?
            .get_values(entity.entity_id(), entity.entity_kind(), filter)
            .await
    }

    /// Persist the custom-field part of `data` inside the caller's
    /// transaction. Keys that are not custom fields of the entity's kind are
    /// ignored. Returns the values as stored.
    #[instrument(skip(self, tx, entity, data), fields(kind = %entity.entity_kind(), id = %entity.entity_id()))]
    pub async fn update_profile<E: ProfileEntity + ?Sized>(
        &self,
        tx: &mut StoreTransaction<'_>,
        entity: &E,
        data: &ProfileValues,
    ) -> ProfileResult<ProfileValues> {
        let store = self.store()?;
        let kind = entity.entity_kind();
        // one snapshot for both filtering and writing
        let schema = self.cache.get_or_load(kind).await?;

        let mut filtered = ProfileValues::new();
        for (key, value) in data {
            if schema.contains(key) {
                filtered.insert(key.clone(), value.clone());
            } else {
                debug!("Ignoring non-profile key '{}'", key);
            }
        }

        store
            .write_values(tx, &schema, entity.entity_id(), kind, &filtered)
            .await
    }

    /// Forget the cached custom schema for `kind` after an administrative edit
    pub async fn invalidate_schema(&self, kind: EntityKind) {
        self.cache.invalidate(kind).await;
    }
}
