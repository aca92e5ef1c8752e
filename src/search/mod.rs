//! Search index integration: typed field mapping and document merges.

pub mod client;
pub mod document;
pub mod publisher;
pub mod schema;

pub use client::{IndexError, IndexResponse, SearchIndexClient};
pub use document::{IndexAction, IndexBatch, IndexUpdateDocument};
pub use publisher::IndexPublisher;
pub use schema::{
    FieldSpec, FieldType, SchemaError, TypedValue, build_typed_fields, map_fields,
    parse_field_specs,
};
