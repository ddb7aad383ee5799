//! Empirical radial-migration model for zone-based chemical-evolution runs.
//!
//! This crate turns a catalogue of simulated star-particle trajectories into
//! a transition matrix over radial zones, and serves per-step migration
//! weights to an external time-stepped simulation engine.
//!
//! Construction is a one-shot batch: classify tracks onto a zone/time grid,
//! count them into a `[formation zone][time bin][final zone]` table, and
//! fill empty strata with the identity (no-migration) distribution. The
//! resulting [`MigrationModel`] is frozen and only read from then on.
//!
//! # Modules
//!
//! - [`edges`] -- [`BinEdges`] validation and the lower-bin-wins
//!   [`bin_of`](edges::bin_of) lookup.
//! - [`classify`] -- Mapping of one track onto grid coordinates.
//! - [`matrix`] -- [`TransitionMatrix`] and its sequential and rayon
//!   parallel builders.
//! - [`fallback`] -- Identity fill for strata without observations.
//! - [`query`] -- [`MigrationDistribution`] lookups and the
//!   [`MigrationSource`] seam used by simulation engines.
//! - [`model`] -- [`MigrationModel`], the frozen build-once object.
//! - [`config`] -- Loading of `radmix-config.yaml` into typed structs.
//! - [`sampling`] -- Seeded reference draw of a tracer's zone.
//! - [`mixing`] -- Final-radius versus formation-radius summary.
//!
//! [`BinEdges`]: edges::BinEdges
//! [`TransitionMatrix`]: matrix::TransitionMatrix
//! [`MigrationDistribution`]: query::MigrationDistribution
//! [`MigrationSource`]: query::MigrationSource
//! [`MigrationModel`]: model::MigrationModel

pub mod classify;
pub mod config;
pub mod edges;
pub mod fallback;
pub mod matrix;
pub mod mixing;
pub mod model;
pub mod query;
pub mod sampling;

// Re-export primary types at crate root.
pub use classify::{ClassifiedTrack, Unclassifiable, classify};
pub use config::{ConfigError, ModelConfig};
pub use edges::{BinEdges, EdgeError, bin_of};
pub use fallback::{fallback_strata, normalize};
pub use matrix::{BuildError, ClassificationReport, RawBuild, TransitionMatrix, build, build_parallel};
pub use mixing::{RadialMixingSummary, summarize};
pub use model::{MigrationModel, ModelDiagnostics, ModelError};
pub use query::{IdentityMigration, MigrationDistribution, MigrationSource, QueryError, query};
pub use sampling::{ZoneSampler, sample_final_zone};
