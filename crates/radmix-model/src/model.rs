//! The frozen migration model handed to a simulation engine.
//!
//! [`MigrationModel`] owns everything a query needs: the radial and time
//! edges the matrix was built on, and the normalized transition matrix. It
//! is built once and then only read. All query methods take `&self`, so a
//! model behind an `Arc` can serve any number of concurrent lookups without
//! locking.

use radmix_types::{ParticleTrack, Stratum, ZoneIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ModelConfig};
use crate::edges::BinEdges;
use crate::fallback::{fallback_strata, normalize};
use crate::matrix::{BuildError, ClassificationReport, RawBuild, TransitionMatrix, build, build_parallel};
use crate::query::{MigrationDistribution, MigrationSource, QueryError, query};

/// Errors that abort model construction. No partial model is returned.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The configuration was invalid.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// Matrix construction failed.
    #[error("build error: {source}")]
    Build {
        /// The underlying build error.
        #[from]
        source: BuildError,
    },

    /// A raw build does not match the supplied edges.
    #[error(
        "raw matrix shape ({matrix_zones}, {matrix_time_bins}) does not match \
         edges ({edge_zones}, {edge_time_bins})"
    )]
    GridMismatch {
        /// Zones in the raw matrix.
        matrix_zones: usize,
        /// Time bins in the raw matrix.
        matrix_time_bins: usize,
        /// Zones implied by the radial edges.
        edge_zones: usize,
        /// Time bins implied by the time edges.
        edge_time_bins: usize,
    },

    /// A stored model has a stratum with no weight at all.
    #[error("stratum {stratum} has an empty row")]
    EmptyRow {
        /// The offending stratum.
        stratum: Stratum,
    },
}

/// Summary of a model build, suitable for logging or a JSON report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDiagnostics {
    /// Number of radial zones.
    pub n_zones: usize,
    /// Number of formation-time bins.
    pub n_time_bins: usize,
    /// How the input tracks were classified.
    pub classification: ClassificationReport,
    /// Strata with at least one observed track.
    pub observed_strata: usize,
    /// Strata filled by the identity fallback.
    pub fallback_strata: Vec<Stratum>,
}

/// Build-once, query-many empirical migration model.
///
/// A model loaded with serde goes through the same checks as
/// [`from_raw`](Self::from_raw): the matrix must match the edges and every
/// row must carry weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelFields")]
pub struct MigrationModel {
    radius_edges: BinEdges,
    time_edges: BinEdges,
    matrix: TransitionMatrix,
    classification: ClassificationReport,
}

impl MigrationModel {
    /// Build a model from tracks on the given grids, sequentially.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Build`] if the matrix cannot be allocated.
    pub fn build(
        tracks: &[ParticleTrack],
        radius_edges: BinEdges,
        time_edges: BinEdges,
    ) -> Result<Self, ModelError> {
        let raw = build(tracks, &radius_edges, &time_edges)?;
        Self::from_raw(radius_edges, time_edges, raw)
    }

    /// Build a model using the grids and build options in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Config`] for invalid grids, or
    /// [`ModelError::Build`] if construction fails.
    pub fn build_with(tracks: &[ParticleTrack], config: &ModelConfig) -> Result<Self, ModelError> {
        let radius_edges = config.grid.radius_edges()?;
        let time_edges = config.grid.time_edges()?;
        let raw = if config.build.parallel {
            build_parallel(tracks, &radius_edges, &time_edges, config.build.threads)?
        } else {
            build(tracks, &radius_edges, &time_edges)?
        };
        Self::from_raw(radius_edges, time_edges, raw)
    }

    /// Freeze a raw build: apply the identity fallback and take ownership.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::GridMismatch`] if the raw matrix was built on a
    /// different grid.
    pub fn from_raw(
        radius_edges: BinEdges,
        time_edges: BinEdges,
        raw: RawBuild,
    ) -> Result<Self, ModelError> {
        let RawBuild { matrix, report } = raw;
        check_grid(&matrix, &radius_edges, &time_edges)?;

        let model = Self {
            radius_edges,
            time_edges,
            matrix: normalize(matrix),
            classification: report,
        };

        let diagnostics = model.diagnostics();
        info!(
            n_zones = diagnostics.n_zones,
            n_time_bins = diagnostics.n_time_bins,
            classified = diagnostics.classification.classified,
            observed_strata = diagnostics.observed_strata,
            fallback_strata = diagnostics.fallback_strata.len(),
            "Migration model frozen"
        );
        if diagnostics.classification.classified == 0 {
            warn!("No tracks were classified; every stratum uses the identity fallback");
        }
        Ok(model)
    }

    /// Weights over final zones for a tracer formed in `formation_zone` at
    /// `formation_time`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] if the zone or time is outside the grid.
    pub fn query(
        &self,
        formation_zone: ZoneIndex,
        formation_time: f64,
    ) -> Result<MigrationDistribution<'_>, QueryError> {
        query(&self.matrix, &self.time_edges, formation_zone, formation_time)
    }

    /// The normalized transition matrix.
    pub const fn matrix(&self) -> &TransitionMatrix {
        &self.matrix
    }

    /// Radial zone edges.
    pub const fn radius_edges(&self) -> &BinEdges {
        &self.radius_edges
    }

    /// Formation-time edges.
    pub const fn time_edges(&self) -> &BinEdges {
        &self.time_edges
    }

    /// How the build input was classified.
    pub const fn classification(&self) -> &ClassificationReport {
        &self.classification
    }

    /// Zone containing `radius`, for engines that track radii rather than
    /// zone indices.
    pub fn zone_of(&self, radius: f64) -> Option<ZoneIndex> {
        self.radius_edges.bin_of(radius).map(ZoneIndex::new)
    }

    /// Build summary.
    pub fn diagnostics(&self) -> ModelDiagnostics {
        let fallback = fallback_strata(&self.matrix);
        let total_strata = self
            .matrix
            .n_zones()
            .saturating_mul(self.matrix.n_time_bins());
        ModelDiagnostics {
            n_zones: self.matrix.n_zones(),
            n_time_bins: self.matrix.n_time_bins(),
            classification: self.classification.clone(),
            observed_strata: total_strata.saturating_sub(fallback.len()),
            fallback_strata: fallback,
        }
    }
}

fn check_grid(
    matrix: &TransitionMatrix,
    radius_edges: &BinEdges,
    time_edges: &BinEdges,
) -> Result<(), ModelError> {
    if matrix.n_zones() != radius_edges.n_bins() || matrix.n_time_bins() != time_edges.n_bins() {
        return Err(ModelError::GridMismatch {
            matrix_zones: matrix.n_zones(),
            matrix_time_bins: matrix.n_time_bins(),
            edge_zones: radius_edges.n_bins(),
            edge_time_bins: time_edges.n_bins(),
        });
    }
    Ok(())
}

/// Serialized form of [`MigrationModel`], checked before use.
#[derive(Deserialize)]
struct ModelFields {
    radius_edges: BinEdges,
    time_edges: BinEdges,
    matrix: TransitionMatrix,
    classification: ClassificationReport,
}

impl TryFrom<ModelFields> for MigrationModel {
    type Error = ModelError;

    fn try_from(fields: ModelFields) -> Result<Self, Self::Error> {
        let ModelFields {
            radius_edges,
            time_edges,
            matrix,
            classification,
        } = fields;
        check_grid(&matrix, &radius_edges, &time_edges)?;
        if let Some(stratum) = matrix
            .strata()
            .find(|&stratum| matrix.row_sum(stratum).unwrap_or(0) == 0)
        {
            return Err(ModelError::EmptyRow { stratum });
        }
        debug!(
            n_zones = matrix.n_zones(),
            n_time_bins = matrix.n_time_bins(),
            "Migration model loaded"
        );
        Ok(Self {
            radius_edges,
            time_edges,
            matrix,
            classification,
        })
    }
}

impl MigrationSource for MigrationModel {
    fn n_zones(&self) -> usize {
        self.matrix.n_zones()
    }

    fn distribution(
        &self,
        formation_zone: ZoneIndex,
        formation_time: f64,
    ) -> Result<MigrationDistribution<'_>, QueryError> {
        self.query(formation_zone, formation_time)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use radmix_types::TimeBinIndex;

    use super::*;

    fn three_zone_model(tracks: &[ParticleTrack]) -> MigrationModel {
        MigrationModel::build(
            tracks,
            BinEdges::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap(),
            BinEdges::new(vec![0.0, 5.0, 10.0]).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn model_is_normalized_and_queryable() {
        let tracks = vec![ParticleTrack::new(1.0, 0.5, 13.8, 2.5); 3];
        let model = three_zone_model(&tracks);
        let dist = model.query(ZoneIndex::new(0), 1.0).unwrap();
        assert_eq!(dist.weights(), &[0, 0, 3]);
        let dist = model.query(ZoneIndex::new(2), 9.0).unwrap();
        assert_eq!(dist.weights(), &[0, 0, 1]);
    }

    #[test]
    fn diagnostics_separate_observed_and_fallback_strata() {
        let tracks = vec![ParticleTrack::new(1.0, 0.5, 13.8, 0.5)];
        let diagnostics = three_zone_model(&tracks).diagnostics();
        assert_eq!(diagnostics.n_zones, 3);
        assert_eq!(diagnostics.n_time_bins, 2);
        assert_eq!(diagnostics.observed_strata, 1);
        assert_eq!(diagnostics.fallback_strata.len(), 5);
        assert!(
            !diagnostics
                .fallback_strata
                .contains(&Stratum::new(ZoneIndex::new(0), TimeBinIndex::new(0)))
        );
    }

    #[test]
    fn build_with_config_honours_parallel_option() {
        let tracks: Vec<ParticleTrack> = (0..200_u32)
            .map(|i| {
                let x = f64::from(i);
                ParticleTrack::new((x * 0.07) % 13.8, (x * 0.31) % 30.0, 13.8, (x * 0.17) % 30.0)
            })
            .collect();
        let sequential = MigrationModel::build_with(&tracks, &ModelConfig::default()).unwrap();

        let mut config = ModelConfig::default();
        config.build.parallel = true;
        config.build.threads = 3;
        let parallel = MigrationModel::build_with(&tracks, &config).unwrap();

        assert_eq!(sequential, parallel);
        assert_eq!(sequential.classification().classified, 200);
    }

    #[test]
    fn from_raw_rejects_foreign_grid() {
        let radius = BinEdges::new(vec![0.0, 1.0, 2.0]).unwrap();
        let time = BinEdges::new(vec![0.0, 1.0]).unwrap();
        let raw = build(&[], &radius, &time).unwrap();
        let other_radius = BinEdges::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let err = MigrationModel::from_raw(other_radius, time, raw).unwrap_err();
        assert!(matches!(err, ModelError::GridMismatch { .. }));
    }

    #[test]
    fn stored_model_loads_back() {
        let tracks = vec![ParticleTrack::new(1.0, 0.5, 13.8, 2.5); 3];
        let model = three_zone_model(&tracks);
        let value = serde_json::to_value(&model).unwrap();
        let back: MigrationModel = serde_json::from_value(value).unwrap();
        assert_eq!(back, model);
    }

    #[test]
    fn stored_model_with_empty_rows_is_rejected() {
        let model = three_zone_model(&[ParticleTrack::new(1.0, 0.5, 13.8, 2.5)]);
        let mut value = serde_json::to_value(&model).unwrap();
        value["matrix"]["counts"] = serde_json::to_value(vec![0_u32; 18]).unwrap();
        let err = serde_json::from_value::<MigrationModel>(value).unwrap_err();
        assert!(err.to_string().contains("empty row"), "{err}");
    }

    #[test]
    fn stored_model_with_truncated_counts_is_rejected() {
        let model = three_zone_model(&[]);
        let mut value = serde_json::to_value(&model).unwrap();
        value["matrix"]["counts"] = serde_json::json!([1]);
        let err = serde_json::from_value::<MigrationModel>(value).unwrap_err();
        assert!(err.to_string().contains("needs 18 cells"), "{err}");
    }

    #[test]
    fn stored_model_on_foreign_edges_is_rejected() {
        let model = three_zone_model(&[]);
        let mut value = serde_json::to_value(&model).unwrap();
        value["radius_edges"] = serde_json::json!([0.0, 1.0, 2.0, 3.0, 4.0]);
        let err = serde_json::from_value::<MigrationModel>(value).unwrap_err();
        assert!(err.to_string().contains("does not match"), "{err}");
    }

    #[test]
    fn zone_of_uses_radial_edges() {
        let model = three_zone_model(&[]);
        assert_eq!(model.zone_of(1.0), Some(ZoneIndex::new(0)));
        assert_eq!(model.zone_of(2.2), Some(ZoneIndex::new(2)));
        assert_eq!(model.zone_of(3.1), None);
    }

    #[test]
    fn model_is_shareable_across_threads() {
        let tracks = vec![ParticleTrack::new(1.0, 1.5, 13.8, 0.5); 4];
        let model = Arc::new(three_zone_model(&tracks));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let model = Arc::clone(&model);
                std::thread::spawn(move || {
                    model
                        .distribution(ZoneIndex::new(1), 2.0)
                        .unwrap()
                        .weight(ZoneIndex::new(0))
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 4.0);
        }
    }
}
