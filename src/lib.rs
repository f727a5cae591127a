// Profile Fields - administrator-defined custom attributes for users and groups

// Entity identity (user vs group)
pub mod entity;

// Field definitions, schema sources and schema merging
pub mod schema;

// Process-wide schema document cache
pub mod cache;

// Per-entity attribute persistence
pub mod store;

// Facade used by controllers
pub mod service;

// Common utilities
pub mod config;
pub mod error;

// Re-exports for convenience
pub use cache::SchemaCache;
pub use entity::{EntityId, EntityKind, EntityRef, ProfileEntity};
pub use error::{FieldError, ProfileError, ProfileResult};
pub use schema::{MergedSchema, SchemaDocument, VisibilityFilter};
pub use service::ProfileService;
pub use store::{AttributeStore, ProfileValues, StoreTransaction};
