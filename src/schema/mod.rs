// Profile field schemas - definitions, sources and merging

pub mod document;
pub mod field;
pub mod loader;
pub mod merge;
pub mod validator;

pub use document::SchemaDocument;
pub use field::{FieldDefinition, FieldType, Visibility, VisibilityFilter};
pub use loader::{
    BaseSchemaProvider, FileBaseSchemaProvider, FileSchemaSource, SchemaSource,
    StaticBaseSchemaProvider, StaticSchemaSource,
};
pub use merge::{merge, MergedSchema, ValidatorOverride};
pub use validator::FieldValidator;
