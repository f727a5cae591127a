// Attribute store - per-entity custom field values persisted as a JSON blob

use serde_json::Value;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, Transaction};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::cache::SchemaCache;
use crate::entity::{EntityId, EntityKind};
use crate::error::{FieldError, ProfileError, ProfileResult};
use crate::schema::{SchemaDocument, VisibilityFilter};

/// Field name to value, in schema order
pub type ProfileValues = serde_json::Map<String, Value>;

/// Transaction wrapper for attribute writes. The caller decides when to
/// commit; the store never commits or rolls back on its own.
pub struct StoreTransaction<'a> {
    tx: Transaction<'a, Sqlite>,
}

impl<'a> StoreTransaction<'a> {
    /// Wrap a transaction the caller already opened for its own entity writes
    pub fn new(tx: Transaction<'a, Sqlite>) -> Self {
        Self { tx }
    }

    /// Connection for running the caller's own statements in this transaction
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> ProfileResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| ProfileError::Database(format!("Failed to commit transaction: {}", e)))
    }

    pub async fn rollback(self) -> ProfileResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| ProfileError::Database(format!("Failed to rollback transaction: {}", e)))
    }
}

/// Reads and writes profile attribute values for users and groups.
/// One row per `(entity_kind, entity_id)`; rows never affect each other.
/// The field schema for each row comes from the cache, keyed by the row's kind.
#[derive(Debug, Clone)]
pub struct AttributeStore {
    pool: SqlitePool,
    cache: Arc<SchemaCache>,
}

impl AttributeStore {
    pub fn new(pool: SqlitePool, cache: Arc<SchemaCache>) -> Self {
        Self { pool, cache }
    }

    /// Connect to `url` and make sure the attribute table exists
    pub async fn connect(url: &str, cache: Arc<SchemaCache>) -> ProfileResult<Self> {
        // every connection to an in-memory database is a separate database,
        // and closing the last one discards it
        let mut options = SqlitePoolOptions::new();
        if url.contains(":memory:") {
            options = options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            options = options.max_connections(5);
        }
        let pool = options
            .connect(url)
            .await
            .map_err(|e| ProfileError::Database(format!("Failed to connect to {}: {}", url, e)))?;

        let store = Self { pool, cache };
        store.initialize().await?;
        Ok(store)
    }

    pub async fn new_in_memory(cache: Arc<SchemaCache>) -> ProfileResult<Self> {
        Self::connect("sqlite::memory:", cache).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    /// Create the attribute table if it does not exist yet
    pub async fn initialize(&self) -> ProfileResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profile_attributes (
                entity_kind TEXT NOT NULL,
                entity_id INTEGER NOT NULL,
                attributes TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (entity_kind, entity_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            ProfileError::Database(format!("Failed to create profile_attributes table: {}", e))
        })?;
        Ok(())
    }

    pub async fn begin(&self) -> ProfileResult<StoreTransaction<'static>> {
        let tx = self.pool.begin().await.map_err(|e| {
            ProfileError::Database(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(StoreTransaction::new(tx))
    }

    /// Current values of the fields `kind` defines, defaults filled in.
    /// `PublicOnly` leaves private fields out of the result entirely.
    #[instrument(skip(self))]
    pub async fn get_values(
        &self,
        entity_id: EntityId,
        kind: EntityKind,
        filter: VisibilityFilter,
    ) -> ProfileResult<ProfileValues> {
        let schema = self.cache.get_or_load(kind).await?;
        let mut conn = self.pool.acquire().await?;
        let stored = fetch_stored(&mut conn, entity_id, kind).await?;
        Ok(project(&schema, &stored, filter))
    }

    /// Same as `get_values`, reading inside the caller's transaction
    pub async fn get_values_tx(
        &self,
        tx: &mut StoreTransaction<'_>,
        entity_id: EntityId,
        kind: EntityKind,
        filter: VisibilityFilter,
    ) -> ProfileResult<ProfileValues> {
        let schema = self.cache.get_or_load(kind).await?;
        let stored = fetch_stored(tx.connection(), entity_id, kind).await?;
        Ok(project(&schema, &stored, filter))
    }

    /// Validate and persist `values` for one entity.
    ///
    /// Every key must be a field of `kind`'s schema; values are coerced to the
    /// field type and checked against its validators. Any failure aborts
    /// before the write. `null` clears a stored value. Returns the values as
    /// stored.
    pub async fn set_values(
        &self,
        tx: &mut StoreTransaction<'_>,
        entity_id: EntityId,
        kind: EntityKind,
        values: &ProfileValues,
    ) -> ProfileResult<ProfileValues> {
        let schema = self.cache.get_or_load(kind).await?;
        self.write_values(tx, &schema, entity_id, kind, values).await
    }

    /// `set_values` against a schema snapshot the caller already took from
    /// this store's cache for `kind`
    #[instrument(skip(self, tx, schema, values), fields(keys = values.len()))]
    pub(crate) async fn write_values(
        &self,
        tx: &mut StoreTransaction<'_>,
        schema: &SchemaDocument,
        entity_id: EntityId,
        kind: EntityKind,
        values: &ProfileValues,
    ) -> ProfileResult<ProfileValues> {
        let unknown: Vec<String> = values
            .keys()
            .filter(|key| !schema.contains(key))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ProfileError::UnknownField(unknown));
        }

        let mut checked = ProfileValues::new();
        let mut errors: Vec<FieldError> = Vec::new();
        for (name, value) in values {
            let Some(field) = schema.get(name) else {
                continue;
            };
            match field.check(value) {
                Ok(coerced) => {
                    checked.insert(name.clone(), coerced);
                }
                Err(field_errors) => errors.extend(field_errors),
            }
        }
        if !errors.is_empty() {
            return Err(ProfileError::Validation(errors));
        }

        let mut stored = fetch_stored(tx.connection(), entity_id, kind).await?;
        for (name, value) in &checked {
            if value.is_null() {
                stored.remove(name);
            } else {
                stored.insert(name.clone(), value.clone());
            }
        }

        let attributes = serde_json::to_string(&Value::Object(stored))?;
        sqlx::query(
            r#"
            INSERT INTO profile_attributes (entity_kind, entity_id, attributes, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (entity_kind, entity_id)
            DO UPDATE SET attributes = excluded.attributes, updated_at = excluded.updated_at
            "#,
        )
        .bind(kind.as_str())
        .bind(entity_id.value())
        .bind(attributes)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(tx.connection())
        .await
        .map_err(|e| {
            ProfileError::Database(format!(
                "Failed to write profile attributes for {}:{}: {}",
                kind, entity_id, e
            ))
        })?;

        debug!("Stored {} profile values for {}:{}", checked.len(), kind, entity_id);
        Ok(checked)
    }

    /// Remove every stored value for one entity. Returns whether a row existed.
    pub async fn delete_values(
        &self,
        tx: &mut StoreTransaction<'_>,
        entity_id: EntityId,
        kind: EntityKind,
    ) -> ProfileResult<bool> {
        let result = sqlx::query(
            "DELETE FROM profile_attributes WHERE entity_kind = ? AND entity_id = ?",
        )
        .bind(kind.as_str())
        .bind(entity_id.value())
        .execute(tx.connection())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn fetch_stored(
    conn: &mut SqliteConnection,
    entity_id: EntityId,
    kind: EntityKind,
) -> ProfileResult<ProfileValues> {
    let row = sqlx::query(
        "SELECT attributes FROM profile_attributes WHERE entity_kind = ? AND entity_id = ?",
    )
    .bind(kind.as_str())
    .bind(entity_id.value())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| {
        ProfileError::Database(format!(
            "Failed to read profile attributes for {}:{}: {}",
            kind, entity_id, e
        ))
    })?;

    let Some(row) = row else {
        return Ok(ProfileValues::new());
    };
    let text: String = row.get("attributes");
    match serde_json::from_str(&text)? {
        Value::Object(map) => Ok(map),
        other => Err(ProfileError::Serialization(format!(
            "profile attributes for {}:{} are not an object: {}",
            kind, entity_id, other
        ))),
    }
}

fn project(
    schema: &SchemaDocument,
    stored: &ProfileValues,
    filter: VisibilityFilter,
) -> ProfileValues {
    let mut values = ProfileValues::new();
    for field in schema.iter().filter(|f| filter.admits(f.visibility)) {
        match stored.get(&field.name) {
            Some(value) if !value.is_null() => {
                values.insert(field.name.clone(), value.clone());
            }
            _ => {
                if let Some(default) = &field.default {
                    values.insert(field.name.clone(), default.clone());
                }
            }
        }
    }
    values
}
