//! Configuration loading and typed config structures for Radmix.
//!
//! The configuration lives in `radmix-config.yaml` next to the catalogue it
//! describes. This module defines strongly-typed structs that mirror the
//! YAML structure, and provides a loader that reads and validates the file.
//!
//! Every field has a default. The grid defaults reproduce the hydrodynamic
//! disk run the model was first calibrated on: 30 radial zones of 1 kpc out
//! to 30 kpc, and 20 formation-time bins over 13.8 Gyr.
//!
//! Bin edges may be written either as an explicit list or as a linspace:
//!
//! ```yaml
//! grid:
//!   radius_edges: { start: 0.0, stop: 20.0, count: 41 }
//!   time_edges: [0.0, 2.0, 4.0, 8.0, 13.8]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::edges::{BinEdges, EdgeError};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A set of bin edges in the config is invalid.
    #[error("invalid {field}: {source}")]
    Edges {
        /// Which config field held the edges.
        field: &'static str,
        /// The underlying edge error.
        source: EdgeError,
    },

    /// A value is out of its allowed range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level model configuration.
///
/// Mirrors the structure of `radmix-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelConfig {
    /// Radial and time grids.
    #[serde(default)]
    pub grid: GridConfig,

    /// Matrix construction options.
    #[serde(default)]
    pub build: BuildConfig,

    /// Track catalogue location and column layout.
    #[serde(default)]
    pub catalogue: CatalogueConfig,

    /// Radial-mixing summary options.
    #[serde(default)]
    pub mixing: MixingConfig,

    /// Reference sampler options.
    #[serde(default)]
    pub sampling: SamplingConfig,
}

impl ModelConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or a
    /// validation error from [`validate`](Self::validate).
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or a
    /// validation error from [`validate`](Self::validate).
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field that deserialization alone cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Edges`] for unusable bin edges and
    /// [`ConfigError::Invalid`] for other out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.radius_edges()?;
        self.grid.time_edges()?;
        self.mixing.radius_edges()?;

        if !self.grid.present_day_time.is_finite() {
            return Err(ConfigError::Invalid {
                reason: "grid.present_day_time must be finite".to_owned(),
            });
        }
        if self.build.threads == 0 {
            return Err(ConfigError::Invalid {
                reason: "build.threads must be at least 1".to_owned(),
            });
        }
        for &[lo, hi] in &self.mixing.time_windows {
            if !(lo <= hi) {
                return Err(ConfigError::Invalid {
                    reason: format!("mixing time window [{lo}, {hi}] is empty"),
                });
            }
        }
        self.catalogue.validate()
    }
}

/// Bin edges as written in YAML: an explicit list or a linspace.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EdgeSpec {
    /// Explicit boundaries.
    Explicit(Vec<f64>),
    /// `count` evenly spaced boundaries from `start` to `stop`.
    Linspace {
        /// First boundary.
        start: f64,
        /// Last boundary.
        stop: f64,
        /// Number of boundaries (bins + 1).
        count: u32,
    },
}

impl EdgeSpec {
    /// Materialize the boundaries.
    ///
    /// # Errors
    ///
    /// Returns [`EdgeError`] if the boundaries are invalid.
    pub fn resolve(&self) -> Result<BinEdges, EdgeError> {
        match *self {
            Self::Explicit(ref edges) => BinEdges::new(edges.clone()),
            Self::Linspace { start, stop, count } => BinEdges::linspace(start, stop, count),
        }
    }
}

/// Radial and formation-time grid configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GridConfig {
    /// Radial zone edges, shared by the formation and final zone axes.
    #[serde(default = "default_radius_edges")]
    pub radius_edges: EdgeSpec,

    /// Formation-time bin edges.
    #[serde(default = "default_time_edges")]
    pub time_edges: EdgeSpec,

    /// Time of the final snapshot, used when the catalogue has no final-time
    /// column.
    #[serde(default = "default_present_day_time")]
    pub present_day_time: f64,
}

impl GridConfig {
    /// The validated radial edges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Edges`] if they are invalid.
    pub fn radius_edges(&self) -> Result<BinEdges, ConfigError> {
        self.radius_edges
            .resolve()
            .map_err(|source| ConfigError::Edges {
                field: "grid.radius_edges",
                source,
            })
    }

    /// The validated time edges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Edges`] if they are invalid.
    pub fn time_edges(&self) -> Result<BinEdges, ConfigError> {
        self.time_edges
            .resolve()
            .map_err(|source| ConfigError::Edges {
                field: "grid.time_edges",
                source,
            })
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            radius_edges: default_radius_edges(),
            time_edges: default_time_edges(),
            present_day_time: default_present_day_time(),
        }
    }
}

/// Matrix construction options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildConfig {
    /// Whether to accumulate the matrix on a rayon pool.
    #[serde(default)]
    pub parallel: bool,

    /// Worker count for parallel builds.
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            threads: default_threads(),
        }
    }
}

/// Location and column layout of the whitespace-delimited track table.
///
/// Column numbers are zero-based.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogueConfig {
    /// Path of the track table. Required by the driver binary.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Column holding the formation time.
    #[serde(default = "default_formation_time_column")]
    pub formation_time_column: usize,

    /// Column holding the formation radius.
    #[serde(default = "default_formation_radius_column")]
    pub formation_radius_column: usize,

    /// Column holding the final radius.
    #[serde(default = "default_final_radius_column")]
    pub final_radius_column: usize,

    /// Column holding the final time; `None` uses `grid.present_day_time`.
    #[serde(default)]
    pub final_time_column: Option<usize>,

    /// Where to write the JSON report; `None` writes to stdout.
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

impl CatalogueConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut columns = vec![
            self.formation_time_column,
            self.formation_radius_column,
            self.final_radius_column,
        ];
        columns.extend(self.final_time_column);
        columns.sort_unstable();
        let before = columns.len();
        columns.dedup();
        if columns.len() != before {
            return Err(ConfigError::Invalid {
                reason: "catalogue columns must be distinct".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for CatalogueConfig {
    fn default() -> Self {
        Self {
            path: None,
            formation_time_column: default_formation_time_column(),
            formation_radius_column: default_formation_radius_column(),
            final_radius_column: default_final_radius_column(),
            final_time_column: None,
            report_path: None,
        }
    }
}

/// Radial-mixing summary options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MixingConfig {
    /// Inclusive formation-time windows `[start, end]`.
    #[serde(default = "default_time_windows")]
    pub time_windows: Vec<[f64; 2]>,

    /// Formation-radius bins the summary is reported over.
    #[serde(default = "default_mixing_radius_edges")]
    pub radius_edges: EdgeSpec,
}

impl MixingConfig {
    /// The validated summary radius edges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Edges`] if they are invalid.
    pub fn radius_edges(&self) -> Result<BinEdges, ConfigError> {
        self.radius_edges
            .resolve()
            .map_err(|source| ConfigError::Edges {
                field: "mixing.radius_edges",
                source,
            })
    }
}

impl Default for MixingConfig {
    fn default() -> Self {
        Self {
            time_windows: default_time_windows(),
            radius_edges: default_mixing_radius_edges(),
        }
    }
}

/// Reference sampler options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SamplingConfig {
    /// Seed for reproducible zone draws.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_radius_edges() -> EdgeSpec {
    EdgeSpec::Linspace {
        start: 0.0,
        stop: 30.0,
        count: 31,
    }
}

const fn default_time_edges() -> EdgeSpec {
    EdgeSpec::Linspace {
        start: 0.0,
        stop: 13.8,
        count: 21,
    }
}

const fn default_present_day_time() -> f64 {
    13.8
}

const fn default_threads() -> usize {
    4
}

const fn default_formation_time_column() -> usize {
    1
}

const fn default_formation_radius_column() -> usize {
    2
}

const fn default_final_radius_column() -> usize {
    4
}

fn default_time_windows() -> Vec<[f64; 2]> {
    vec![
        [0.0, 2.0],
        [2.0, 4.0],
        [4.0, 6.0],
        [6.0, 8.0],
        [8.0, 10.0],
        [10.0, 12.0],
    ]
}

const fn default_mixing_radius_edges() -> EdgeSpec {
    EdgeSpec::Linspace {
        start: 0.0,
        stop: 15.0,
        count: 51,
    }
}

const fn default_seed() -> u64 {
    42
}
