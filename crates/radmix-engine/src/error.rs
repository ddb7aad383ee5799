//! Error types for the Radmix driver binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes between reading the configuration and writing the report.

use std::path::PathBuf;

use crate::catalogue::CatalogueError;

/// Top-level error for the driver binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: radmix_model::ConfigError,
    },

    /// The track catalogue could not be read.
    #[error("catalogue error: {source}")]
    Catalogue {
        /// The underlying catalogue error.
        #[from]
        source: CatalogueError,
    },

    /// Model construction failed.
    #[error("model error: {source}")]
    Model {
        /// The underlying model error.
        #[from]
        source: radmix_model::ModelError,
    },

    /// A query against the built model failed.
    #[error("query error: {source}")]
    Query {
        /// The underlying query error.
        #[from]
        source: radmix_model::QueryError,
    },

    /// The configuration does not name a catalogue.
    #[error("no catalogue path configured (set catalogue.path in radmix-config.yaml)")]
    NoCatalogue,

    /// The report could not be serialized.
    #[error("failed to serialize report: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The report could not be written.
    #[error("failed to write report to {}: {source}", path.display())]
    Report {
        /// Destination that failed, or `-` for stdout.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
