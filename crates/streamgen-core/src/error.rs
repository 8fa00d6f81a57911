//! Error types for the correlation engine core.

use thiserror::Error;

/// A correlation description that is malformed or inconsistent.
///
/// Always raised while building a [`CorrelationConfig`](crate::CorrelationConfig),
/// before any generation begins.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("entity type '{0}' is declared more than once")]
    DuplicateType(String),

    #[error("relationship '{entity}.{field}' has malformed reference '{reference}' (expected 'type.field')")]
    MalformedReference {
        entity: String,
        field: String,
        reference: String,
    },

    #[error("relationship '{entity}.{field}' references unknown entity type '{target}'")]
    UnknownTarget {
        entity: String,
        field: String,
        target: String,
    },

    #[error("relationship '{entity}.{field}' references '{target}.{found}', but the identifier field of '{target}' is '{expected}'")]
    FieldMismatch {
        entity: String,
        field: String,
        target: String,
        expected: String,
        found: String,
    },

    #[error("relationship '{entity}.{field}' references '{target}', which declares no id_field")]
    NotReferenceable {
        entity: String,
        field: String,
        target: String,
    },

    #[error("master type '{entity}' references transactional type '{target}' through field '{field}'")]
    MasterReferencesTransactional {
        entity: String,
        field: String,
        target: String,
    },

    #[error("entity type '{entity}' declares id_field '{id_field}' that its source does not produce")]
    MissingIdField { entity: String, id_field: String },

    #[error("field '{entity}.{field}' has an invalid generator: {reason}")]
    InvalidGenerator {
        entity: String,
        field: String,
        reason: String,
    },

    #[error("dependency cycle detected among entity types: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Errors raised while reading a correlation document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid correlation config: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors raised by [`ReferencePool`](crate::ReferencePool) lookups.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("entity type '{0}' was never added to the reference pool")]
    UnknownType(String),

    #[error("reference pool for entity type '{0}' is empty")]
    EmptyPool(String),
}

/// Errors raised by the [`ShutdownCoordinator`](crate::ShutdownCoordinator).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShutdownError {
    #[error("shutdown already in progress")]
    ShuttingDown,
}
