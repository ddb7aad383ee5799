//! Per-step migration lookups for an external simulation engine.
//!
//! The engine asks, once per tracer per integration step, "a tracer that
//! formed in zone `z` at time `t`: how likely is each final zone?". The
//! answer is a [`MigrationDistribution`], a borrowed view of one matrix row.
//! Building one costs a bin lookup on the time axis and a bounds check; no
//! allocation happens on this path.
//!
//! The formation zone is taken as-is (it is already a zone index on the
//! engine side). The formation time is binned against the same time edges
//! used to build the matrix.

use radmix_types::{Stratum, TimeBinIndex, ZoneIndex};

use crate::edges::BinEdges;
use crate::matrix::TransitionMatrix;

/// A query outside the built grid. Always a caller bug: the engine must use
/// the zones and time range the model was built for.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// The formation zone does not exist in the matrix.
    #[error("formation zone {zone} outside model grid of {n_zones} zones")]
    ZoneOutOfRange {
        /// The requested zone.
        zone: ZoneIndex,
        /// Number of zones in the model.
        n_zones: usize,
    },

    /// The formation time falls outside the time edges.
    #[error("formation time {time} outside model time range [{lower}, {upper}]")]
    TimeOutOfRange {
        /// The requested formation time.
        time: f64,
        /// First time edge.
        lower: f64,
        /// Last time edge.
        upper: f64,
    },
}

/// Relative weights over final zones for one formation stratum.
///
/// Weights are raw counts (or the identity fallback), not probabilities;
/// sample in proportion to them or use [`probability`](Self::probability).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationDistribution<'a> {
    stratum: Stratum,
    row: &'a [u32],
}

impl<'a> MigrationDistribution<'a> {
    /// Weight of `final_zone`. Zones outside the grid have weight 0.
    pub fn weight(&self, final_zone: ZoneIndex) -> f64 {
        self.row
            .get(final_zone.get())
            .copied()
            .map_or(0.0, f64::from)
    }

    /// Fraction of the row's weight on `final_zone`, or 0 for an empty row.
    #[allow(clippy::cast_precision_loss)]
    pub fn probability(&self, final_zone: ZoneIndex) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.weight(final_zone) / total as f64
    }

    /// The whole row, indexed by final zone.
    pub const fn weights(&self) -> &'a [u32] {
        self.row
    }

    /// Sum of the row.
    pub fn total(&self) -> u64 {
        self.row
            .iter()
            .fold(0_u64, |acc, &w| acc.saturating_add(u64::from(w)))
    }

    /// Number of candidate final zones.
    pub const fn n_zones(&self) -> usize {
        self.row.len()
    }

    /// The stratum this row belongs to.
    pub const fn stratum(&self) -> Stratum {
        self.stratum
    }

    /// Formation zone of the stratum.
    pub const fn formation_zone(&self) -> ZoneIndex {
        self.stratum.zone
    }

    /// Formation-time bin of the stratum.
    pub const fn time_bin(&self) -> TimeBinIndex {
        self.stratum.time_bin
    }
}

/// Look up the distribution for `(formation_zone, formation_time)`.
///
/// # Errors
///
/// Returns [`QueryError`] if the zone is not in the matrix or the time is
/// outside `time_edges`.
pub fn query<'a>(
    matrix: &'a TransitionMatrix,
    time_edges: &BinEdges,
    formation_zone: ZoneIndex,
    formation_time: f64,
) -> Result<MigrationDistribution<'a>, QueryError> {
    if formation_zone.get() >= matrix.n_zones() {
        return Err(QueryError::ZoneOutOfRange {
            zone: formation_zone,
            n_zones: matrix.n_zones(),
        });
    }
    let time_out_of_range = || QueryError::TimeOutOfRange {
        time: formation_time,
        lower: time_edges.lower(),
        upper: time_edges.upper(),
    };
    let time_bin = time_edges
        .bin_of(formation_time)
        .ok_or_else(time_out_of_range)?;
    let stratum = Stratum::new(formation_zone, TimeBinIndex::new(time_bin));
    let row = matrix.row(stratum).ok_or_else(time_out_of_range)?;
    Ok(MigrationDistribution { stratum, row })
}

/// The migration-assignment seam an external engine depends on.
///
/// [`MigrationModel`](crate::model::MigrationModel) is the empirical
/// implementation; [`IdentityMigration`] keeps every tracer in place.
pub trait MigrationSource {
    /// Number of radial zones the source covers.
    fn n_zones(&self) -> usize;

    /// Final-zone weights for a tracer formed in `formation_zone` at
    /// `formation_time`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] if the query lies outside the source's grid.
    fn distribution(
        &self,
        formation_zone: ZoneIndex,
        formation_time: f64,
    ) -> Result<MigrationDistribution<'_>, QueryError>;
}

/// A migration source with no migration: every tracer stays in its
/// formation zone, at any formation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMigration {
    /// `n_zones x n_zones` identity, flattened row-major.
    identity: Vec<u32>,
    n_zones: usize,
}

impl IdentityMigration {
    /// Create an identity source over `n_zones` zones.
    pub fn new(n_zones: usize) -> Self {
        let identity = (0..n_zones)
            .flat_map(|row| (0..n_zones).map(move |col| u32::from(row == col)))
            .collect();
        Self { identity, n_zones }
    }
}

impl MigrationSource for IdentityMigration {
    fn n_zones(&self) -> usize {
        self.n_zones
    }

    fn distribution(
        &self,
        formation_zone: ZoneIndex,
        _formation_time: f64,
    ) -> Result<MigrationDistribution<'_>, QueryError> {
        let out_of_range = || QueryError::ZoneOutOfRange {
            zone: formation_zone,
            n_zones: self.n_zones,
        };
        if formation_zone.get() >= self.n_zones {
            return Err(out_of_range());
        }
        let start = formation_zone
            .get()
            .checked_mul(self.n_zones)
            .ok_or_else(out_of_range)?;
        let end = start.checked_add(self.n_zones).ok_or_else(out_of_range)?;
        let row = self.identity.get(start..end).ok_or_else(out_of_range)?;
        Ok(MigrationDistribution {
            stratum: Stratum::new(formation_zone, TimeBinIndex::new(0)),
            row,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use radmix_types::ParticleTrack;

    use super::*;
    use crate::fallback::normalize;
    use crate::matrix::build;

    fn scenario() -> (TransitionMatrix, BinEdges) {
        let radius = BinEdges::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let time = BinEdges::new(vec![0.0, 5.0, 10.0]).unwrap();
        let mut tracks = vec![ParticleTrack::new(1.0, 0.5, 13.8, 0.5); 8];
        tracks.extend(vec![ParticleTrack::new(1.0, 0.5, 13.8, 1.5); 2]);
        let matrix = normalize(build(&tracks, &radius, &time).unwrap().matrix);
        (matrix, time)
    }

    #[test]
    fn empty_stratum_query_returns_identity_weights() {
        let (matrix, time) = scenario();
        let dist = query(&matrix, &time, ZoneIndex::new(1), 2.5).unwrap();
        assert_eq!(dist.time_bin(), TimeBinIndex::new(0));
        assert_eq!(dist.weight(ZoneIndex::new(0)), 0.0);
        assert_eq!(dist.weight(ZoneIndex::new(1)), 1.0);
        assert_eq!(dist.weight(ZoneIndex::new(2)), 0.0);
    }

    #[test]
    fn observed_stratum_returns_raw_counts() {
        let (matrix, time) = scenario();
        let dist = query(&matrix, &time, ZoneIndex::new(0), 1.0).unwrap();
        assert_eq!(dist.weights(), &[8, 2, 0]);
        assert_eq!(dist.total(), 10);
        assert_eq!(dist.weight(ZoneIndex::new(0)), 8.0);
        assert_eq!(dist.probability(ZoneIndex::new(1)), 0.2);
        assert_eq!(dist.formation_zone(), ZoneIndex::new(0));
    }

    #[test]
    fn time_on_bin_boundary_uses_lower_bin() {
        let (matrix, time) = scenario();
        let dist = query(&matrix, &time, ZoneIndex::new(0), 5.0).unwrap();
        assert_eq!(dist.time_bin(), TimeBinIndex::new(0));
        assert_eq!(dist.weights(), &[8, 2, 0]);
    }

    #[test]
    fn later_time_bin_falls_back_to_identity() {
        let (matrix, time) = scenario();
        let dist = query(&matrix, &time, ZoneIndex::new(0), 7.5).unwrap();
        assert_eq!(dist.time_bin(), TimeBinIndex::new(1));
        assert_eq!(dist.weights(), &[1, 0, 0]);
    }

    #[test]
    fn final_zone_outside_grid_has_zero_weight() {
        let (matrix, time) = scenario();
        let dist = query(&matrix, &time, ZoneIndex::new(0), 1.0).unwrap();
        assert_eq!(dist.weight(ZoneIndex::new(3)), 0.0);
        assert_eq!(dist.probability(ZoneIndex::new(99)), 0.0);
    }

    #[test]
    fn out_of_range_zone_is_an_error() {
        let (matrix, time) = scenario();
        let err = query(&matrix, &time, ZoneIndex::new(3), 1.0).unwrap_err();
        assert_eq!(
            err,
            QueryError::ZoneOutOfRange {
                zone: ZoneIndex::new(3),
                n_zones: 3
            }
        );
    }

    #[test]
    fn out_of_range_time_is_an_error_not_a_wrap() {
        let (matrix, time) = scenario();
        let err = query(&matrix, &time, ZoneIndex::new(0), 10.5).unwrap_err();
        assert!(matches!(err, QueryError::TimeOutOfRange { .. }));
        let err = query(&matrix, &time, ZoneIndex::new(0), f64::NAN).unwrap_err();
        assert!(matches!(err, QueryError::TimeOutOfRange { .. }));
    }

    #[test]
    fn identity_source_never_migrates() {
        let source = IdentityMigration::new(4);
        assert_eq!(source.n_zones(), 4);
        let dist = source.distribution(ZoneIndex::new(2), 123.0).unwrap();
        assert_eq!(dist.weights(), &[0, 0, 1, 0]);
        assert!(source.distribution(ZoneIndex::new(4), 0.0).is_err());
    }
}
