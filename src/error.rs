//! Custom error types for the application.
//!
//! This module defines the primary error type, `CaloError`, used across the whole
//! pipeline. Using the `thiserror` crate, it provides a centralized and consistent way
//! to report problems from configuration loading through per-cell position resolution
//! to output serialization.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment` when the pipeline configuration file
//!   cannot be parsed or extracted.
//! - **`Configuration`**: Semantic setup errors that pass parsing but are logically
//!   wrong (unknown readout, empty layer-radius table, non-positive merge count).
//!   Always raised before the first event is read.
//! - **`Resolution`**: A cell identifier could not be turned into a position. Fatal
//!   for the event being processed and therefore for the run.
//! - **`MissingCollection`** / **`CollectionKind`** / **`DuplicateCollection`**: misuse
//!   of the per-event collection store.
//! - **`Io`**, **`Serialization`**, **`Storage`**: input and output failures.
//! - **`EventFailed`**: wraps any of the above with the number of the event that was
//!   being processed when it happened.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type CaloResult<T> = std::result::Result<T, CaloError>;

/// Why a single cell could not be positioned.
///
/// Resolvers report these without knowing which subsystem they are bound to; the
/// assignment stage attaches the subsystem name and cell id when it turns one into a
/// [`CaloError::Resolution`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveFailure {
    #[error("layer {layer} is outside the {available} configured layers")]
    LayerOutOfRange { layer: i64, available: usize },

    #[error("system code {found} does not belong to this readout (expected {expected})")]
    UnknownSystem { expected: i64, found: i64 },

    #[error("field '{field}' decoded to negative index {value}")]
    NegativeIndex { field: &'static str, value: i64 },

    #[error("eta of {eta} cannot be placed on a disc face")]
    DegenerateEta { eta: f64 },
}

#[derive(Error, Debug)]
pub enum CaloError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Cannot position cell {cell_id:#x} of '{subsystem}': {reason}")]
    Resolution {
        subsystem: String,
        cell_id: u64,
        reason: ResolveFailure,
    },

    #[error("Collection '{0}' not found in event store")]
    MissingCollection(String),

    #[error("Collection '{name}' holds {found} records, expected {expected}")]
    CollectionKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Collection '{0}' already exists in event store")]
    DuplicateCollection(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Stage task failed: {0}")]
    StageTask(String),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    #[error("Event {event} failed: {source}")]
    EventFailed {
        event: u64,
        #[source]
        source: Box<CaloError>,
    },
}

impl From<figment::Error> for CaloError {
    fn from(value: figment::Error) -> Self {
        CaloError::Config(Box::new(value))
    }
}

impl From<serde_json::Error> for CaloError {
    fn from(value: serde_json::Error) -> Self {
        CaloError::Serialization(value.to_string())
    }
}

impl CaloError {
    /// Wraps `self` with the number of the event it belongs to.
    ///
    /// Errors that are already tagged with an event are returned unchanged.
    pub fn in_event(self, event: u64) -> Self {
        match self {
            err @ CaloError::EventFailed { .. } => err,
            other => CaloError::EventFailed {
                event,
                source: Box::new(other),
            },
        }
    }

    /// Returns `true` for errors raised while setting the pipeline up, before any
    /// event has been touched.
    pub fn is_setup_error(&self) -> bool {
        matches!(self, CaloError::Config(_) | CaloError::Configuration(_))
    }
}
