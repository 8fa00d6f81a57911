//! Error types for row sources and generators.

use std::path::PathBuf;
use streamgen_sink::SinkError;
use thiserror::Error;

/// A row source failed to produce a row.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open CSV file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("CSV read error in {} at record {record}: {source}", path.display())]
    Csv {
        path: PathBuf,
        record: u64,
        #[source]
        source: csv::Error,
    },
}

/// A correlated generator could not complete a record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeneratorError {
    /// The referenced type has no identifiers yet. Master data was not
    /// loaded before generation started.
    #[error("cannot fill relationship field '{field}': no identifiers registered for '{entity_type}'")]
    EmptyPool { field: String, entity_type: String },

    #[error("'{0}' is not a transactional entity type")]
    TypeNotFound(String),
}

/// The master load phase failed. Fatal for the whole phase.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read rows for master type '{entity_type}': {source}")]
    Source {
        entity_type: String,
        #[source]
        source: SourceError,
    },

    #[error("master type '{entity_type}' row {row} has no value for id_field '{id_field}'")]
    MissingIdField {
        entity_type: String,
        row: u64,
        id_field: String,
    },

    #[error("master type '{entity_type}': {source}")]
    Relationship {
        entity_type: String,
        #[source]
        source: GeneratorError,
    },

    #[error("failed to publish master type '{entity_type}': {source}")]
    Publish {
        entity_type: String,
        #[source]
        source: SinkError,
    },

    #[error("master load interrupted by shutdown")]
    Interrupted,
}
