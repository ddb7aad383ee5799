//! Shared type definitions for the Radmix radial-migration model.
//!
//! This crate holds the plain data types that cross crate boundaries: the
//! raw particle tracks read from a simulation catalogue and the strongly
//! typed indices that address the zone/time grid of the transition matrix.
//!
//! # Modules
//!
//! - [`index`] -- Type-safe `usize` wrappers for zone and time-bin indices,
//!   plus the [`Stratum`] pair.
//! - [`track`] -- [`ParticleTrack`], one simulated tracer particle.
//!
//! [`Stratum`]: index::Stratum
//! [`ParticleTrack`]: track::ParticleTrack

pub mod index;
pub mod track;

// Re-export all public types at crate root for convenience.
pub use index::{Stratum, TimeBinIndex, ZoneIndex};
pub use track::ParticleTrack;
