//! Persistent typed store: schema-constrained key-value records
//! (configuration and mutable state) cached in memory and backed one-to-one
//! by a document collection.

mod field;
mod record;

pub use field::{FieldKind, FieldSpec, FieldValue, Schema};
pub use record::{FieldView, ImportReport, TypedRecord};

use thiserror::Error;

use crate::db::StorageError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("field '{field}' expects {expected}: {message}")]
    Validation {
        field: String,
        expected: FieldKind,
        message: String,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("toml parse: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("toml serialize: {0}")]
    Serialize(#[from] toml::ser::Error),
}
