//! Service catalog for mjsoul.
//!
//! Every call and notification travels under a type name. This crate
//! turns those names into message layouts and converts between JSON
//! values and protobuf bytes:
//!
//! - **Schema** ([`MessageSchema`], [`ServiceSchema`], ...): plain
//!   descriptions of messages, enums and services.
//! - **Catalog** ([`ServiceCatalog`]): the immutable lookup table,
//!   built with [`CatalogBuilder`] or loaded from a protobuf.js JSON
//!   descriptor.
//! - **Dynamic codec**: [`ServiceCatalog::encode`] and
//!   [`ServiceCatalog::decode`].
//!
//! ```text
//! method name → ResolvedMethod (request/response schemas) → bytes ↔ serde_json::Value
//! ```

mod catalog;
mod dynamic;
mod error;
mod loader;
mod schema;

pub use catalog::{CatalogBuilder, ResolvedMethod, ServiceCatalog, short_name};
pub use dynamic::MAX_DEPTH;
pub use error::SchemaError;
pub use schema::{
    EnumSchema, FieldSchema, FieldType, MessageSchema, MethodSchema, ScalarType,
    ServiceSchema,
};
