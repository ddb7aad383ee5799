//! The transition count table and its construction from particle tracks.
//!
//! A [`TransitionMatrix`] is a dense 3-D table indexed by
//! `[formation zone][formation time bin][final zone]`. The cell at
//! `(z, t, f)` counts how many catalogue particles formed in zone `z` during
//! time bin `t` and were found in zone `f` at the final snapshot. Each
//! `(z, t)` row is one stratum's empirical distribution over final zones.
//!
//! # Construction
//!
//! [`build`] classifies every track and increments one cell per classifiable
//! track. Tracks outside the grid are tallied in a
//! [`ClassificationReport`] instead of aborting the batch. [`build_parallel`]
//! splits the tracks across a rayon pool, builds one partial table per
//! chunk, and sums them; since accumulation is commutative the result is
//! identical to the sequential build.
//!
//! Raw builds carry no fallback rows. See [`crate::fallback`] for the pass
//! that makes every row usable.

use radmix_types::{ParticleTrack, Stratum, TimeBinIndex, ZoneIndex};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classify::{ClassifiedTrack, classify};
use crate::edges::BinEdges;

/// Maximum number of rejected track positions kept in a report.
pub const REJECTED_SAMPLE_LIMIT: usize = 32;

/// Errors that abort matrix construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// The requested shape does not fit in memory addressing.
    #[error("transition matrix shape {n_zones} x {n_time_bins} x {n_zones} overflows usize")]
    ShapeOverflow {
        /// Number of radial zones.
        n_zones: usize,
        /// Number of formation-time bins.
        n_time_bins: usize,
    },

    /// Two partial matrices with different shapes were merged.
    #[error(
        "cannot merge matrices of shape ({left_zones}, {left_time_bins}) and \
         ({right_zones}, {right_time_bins})"
    )]
    ShapeMismatch {
        /// Zones of the receiving matrix.
        left_zones: usize,
        /// Time bins of the receiving matrix.
        left_time_bins: usize,
        /// Zones of the merged-in matrix.
        right_zones: usize,
        /// Time bins of the merged-in matrix.
        right_time_bins: usize,
    },

    /// Stored vectors do not match the declared shape.
    #[error(
        "transition matrix of shape ({n_zones}, {n_time_bins}) needs {expected_cells} cells \
         and {expected_strata} fallback flags, found {cells} and {strata}"
    )]
    LayoutMismatch {
        /// Declared number of zones.
        n_zones: usize,
        /// Declared number of time bins.
        n_time_bins: usize,
        /// Cells the shape requires.
        expected_cells: usize,
        /// Cells actually stored.
        cells: usize,
        /// Fallback flags the shape requires.
        expected_strata: usize,
        /// Fallback flags actually stored.
        strata: usize,
    },

    /// A cell would exceed `u32::MAX` observations.
    #[error("transition count overflow in cell {cell}")]
    CountOverflow {
        /// Row-major position of the cell, final zone varying fastest.
        cell: usize,
    },

    /// The worker pool for a parallel build could not be created.
    #[error("failed to create build thread pool: {message}")]
    ThreadPool {
        /// Description of the pool failure.
        message: String,
    },
}

/// Dense `[zone][time bin][final zone]` count table.
///
/// Deserialization checks that the stored vectors match the declared shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MatrixFields")]
pub struct TransitionMatrix {
    /// Number of radial zones (length of the first and last axes).
    n_zones: usize,
    /// Number of formation-time bins.
    n_time_bins: usize,
    /// Row-major counts, final zone varying fastest.
    counts: Vec<u32>,
    /// One flag per stratum, set when its row came from the identity fallback.
    fallback: Vec<bool>,
}

impl TransitionMatrix {
    /// An all-zero table of the given shape.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ShapeOverflow`] if the cell count overflows.
    pub fn zeros(n_zones: usize, n_time_bins: usize) -> Result<Self, BuildError> {
        let (strata, cells) = layout(n_zones, n_time_bins)?;
        Ok(Self {
            n_zones,
            n_time_bins,
            counts: vec![0; cells],
            fallback: vec![false; strata],
        })
    }

    /// An all-zero table shaped by a radial and a time grid.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ShapeOverflow`] if the cell count overflows.
    pub fn for_grid(radius_edges: &BinEdges, time_edges: &BinEdges) -> Result<Self, BuildError> {
        Self::zeros(radius_edges.n_bins(), time_edges.n_bins())
    }

    /// Number of radial zones.
    pub const fn n_zones(&self) -> usize {
        self.n_zones
    }

    /// Number of formation-time bins.
    pub const fn n_time_bins(&self) -> usize {
        self.n_time_bins
    }

    /// Whether `stratum` lies inside the table.
    pub fn contains(&self, stratum: Stratum) -> bool {
        stratum.zone.get() < self.n_zones && stratum.time_bin.get() < self.n_time_bins
    }

    /// Position of a stratum in the flag vector.
    fn stratum_slot(&self, stratum: Stratum) -> Option<usize> {
        if !self.contains(stratum) {
            return None;
        }
        stratum
            .zone
            .get()
            .checked_mul(self.n_time_bins)?
            .checked_add(stratum.time_bin.get())
    }

    /// Range of `counts` holding a stratum's row.
    fn row_range(&self, stratum: Stratum) -> Option<core::ops::Range<usize>> {
        let start = self.stratum_slot(stratum)?.checked_mul(self.n_zones)?;
        let end = start.checked_add(self.n_zones)?;
        Some(start..end)
    }

    /// Counts over final zones for one stratum, or `None` if out of shape.
    pub fn row(&self, stratum: Stratum) -> Option<&[u32]> {
        self.counts.get(self.row_range(stratum)?)
    }

    pub(crate) fn row_mut(&mut self, stratum: Stratum) -> Option<&mut [u32]> {
        let range = self.row_range(stratum)?;
        self.counts.get_mut(range)
    }

    /// A single cell, or `None` if any index is out of shape.
    pub fn get(&self, stratum: Stratum, final_zone: ZoneIndex) -> Option<u32> {
        self.row(stratum)?.get(final_zone.get()).copied()
    }

    /// Sum of one row, or `None` if the stratum is out of shape.
    pub fn row_sum(&self, stratum: Stratum) -> Option<u64> {
        self.row(stratum)
            .map(|row| row.iter().fold(0_u64, |acc, &c| acc.saturating_add(u64::from(c))))
    }

    /// Sum of every cell.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0_u64, |acc, &c| acc.saturating_add(u64::from(c)))
    }

    /// Whether the stratum's row was filled by the identity fallback rather
    /// than observed tracks.
    pub fn is_fallback(&self, stratum: Stratum) -> bool {
        self.stratum_slot(stratum)
            .and_then(|slot| self.fallback.get(slot).copied())
            .unwrap_or(false)
    }

    pub(crate) fn mark_fallback(&mut self, stratum: Stratum) {
        if let Some(flag) = self
            .stratum_slot(stratum)
            .and_then(|slot| self.fallback.get_mut(slot))
        {
            *flag = true;
        }
    }

    /// Every stratum in zone-major order.
    pub fn strata(&self) -> impl Iterator<Item = Stratum> + use<> {
        let n_time_bins = self.n_time_bins;
        (0..self.n_zones).flat_map(move |zone| {
            (0..n_time_bins).map(move |bin| Stratum::new(ZoneIndex::new(zone), TimeBinIndex::new(bin)))
        })
    }

    /// Position of one cell in `counts`.
    fn cell_index(&self, stratum: Stratum, final_zone: ZoneIndex) -> Option<usize> {
        if final_zone.get() >= self.n_zones {
            return None;
        }
        self.row_range(stratum)?.start.checked_add(final_zone.get())
    }

    /// Add one observation. Returns `Ok(false)` if the track does not fit
    /// the shape.
    fn record(&mut self, track: &ClassifiedTrack) -> Result<bool, BuildError> {
        let Some(cell) = self.cell_index(track.stratum(), track.final_zone) else {
            return Ok(false);
        };
        let Some(count) = self.counts.get_mut(cell) else {
            return Ok(false);
        };
        *count = count
            .checked_add(1)
            .ok_or(BuildError::CountOverflow { cell })?;
        Ok(true)
    }

    /// Add another table's counts into this one.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ShapeMismatch`] if the shapes differ, or
    /// [`BuildError::CountOverflow`] if a summed cell exceeds `u32::MAX`.
    pub fn merge(&mut self, other: &Self) -> Result<(), BuildError> {
        if self.n_zones != other.n_zones || self.n_time_bins != other.n_time_bins {
            return Err(BuildError::ShapeMismatch {
                left_zones: self.n_zones,
                left_time_bins: self.n_time_bins,
                right_zones: other.n_zones,
                right_time_bins: other.n_time_bins,
            });
        }
        for (cell, (mine, theirs)) in self.counts.iter_mut().zip(&other.counts).enumerate() {
            *mine = mine
                .checked_add(*theirs)
                .ok_or(BuildError::CountOverflow { cell })?;
        }
        for (mine, theirs) in self.fallback.iter_mut().zip(&other.fallback) {
            *mine = *mine || *theirs;
        }
        Ok(())
    }
}

/// Number of strata and of cells in a table of the given shape.
fn layout(n_zones: usize, n_time_bins: usize) -> Result<(usize, usize), BuildError> {
    let overflow = || BuildError::ShapeOverflow {
        n_zones,
        n_time_bins,
    };
    let strata = n_zones.checked_mul(n_time_bins).ok_or_else(overflow)?;
    let cells = strata.checked_mul(n_zones).ok_or_else(overflow)?;
    Ok((strata, cells))
}

/// Serialized form of [`TransitionMatrix`], checked before use.
#[derive(Deserialize)]
struct MatrixFields {
    n_zones: usize,
    n_time_bins: usize,
    counts: Vec<u32>,
    fallback: Vec<bool>,
}

impl TryFrom<MatrixFields> for TransitionMatrix {
    type Error = BuildError;

    fn try_from(fields: MatrixFields) -> Result<Self, Self::Error> {
        let MatrixFields {
            n_zones,
            n_time_bins,
            counts,
            fallback,
        } = fields;
        let (expected_strata, expected_cells) = layout(n_zones, n_time_bins)?;
        if counts.len() != expected_cells || fallback.len() != expected_strata {
            return Err(BuildError::LayoutMismatch {
                n_zones,
                n_time_bins,
                expected_cells,
                cells: counts.len(),
                expected_strata,
                strata: fallback.len(),
            });
        }
        Ok(Self {
            n_zones,
            n_time_bins,
            counts,
            fallback,
        })
    }
}

/// Tally of how a batch of tracks was classified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Tracks that landed in a cell.
    pub classified: u64,
    /// Tracks with at least one quantity outside the grid.
    pub rejected: u64,
    /// Rejected tracks whose formation radius was out of range.
    pub formation_radius_out_of_range: u64,
    /// Rejected tracks whose formation time was out of range.
    pub formation_time_out_of_range: u64,
    /// Rejected tracks whose final radius was out of range.
    pub final_radius_out_of_range: u64,
    /// Positions (in the input sequence) of the first rejected tracks, at
    /// most [`REJECTED_SAMPLE_LIMIT`] of them, in increasing order.
    pub rejected_sample: Vec<usize>,
}

impl ClassificationReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: &Self) {
        self.classified = self.classified.saturating_add(other.classified);
        self.rejected = self.rejected.saturating_add(other.rejected);
        self.formation_radius_out_of_range = self
            .formation_radius_out_of_range
            .saturating_add(other.formation_radius_out_of_range);
        self.formation_time_out_of_range = self
            .formation_time_out_of_range
            .saturating_add(other.formation_time_out_of_range);
        self.final_radius_out_of_range = self
            .final_radius_out_of_range
            .saturating_add(other.final_radius_out_of_range);
        self.rejected_sample.extend_from_slice(&other.rejected_sample);
        self.rejected_sample.sort_unstable();
        self.rejected_sample.truncate(REJECTED_SAMPLE_LIMIT);
    }

    /// Total tracks seen.
    pub const fn seen(&self) -> u64 {
        self.classified.saturating_add(self.rejected)
    }
}

/// A raw (pre-fallback) matrix together with its classification report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBuild {
    /// Observed counts.
    pub matrix: TransitionMatrix,
    /// How the input tracks were classified.
    pub report: ClassificationReport,
}

impl RawBuild {
    /// Fold a partial build into this one.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ShapeMismatch`] if the matrix shapes differ.
    pub fn merge(&mut self, other: &Self) -> Result<(), BuildError> {
        self.matrix.merge(&other.matrix)?;
        self.report.merge(&other.report);
        Ok(())
    }
}

/// Count every classifiable track into a fresh matrix.
///
/// The result depends only on the multiset of tracks, not their order
/// (apart from which rejected positions are sampled in the report, which
/// are always the lowest ones). Empty input yields an all-zero matrix.
///
/// # Errors
///
/// Returns [`BuildError::ShapeOverflow`] if the grid is too large to allocate,
/// or [`BuildError::CountOverflow`] if a cell passes `u32::MAX`.
pub fn build(
    tracks: &[ParticleTrack],
    radius_edges: &BinEdges,
    time_edges: &BinEdges,
) -> Result<RawBuild, BuildError> {
    let raw = accumulate(tracks, 0, radius_edges, time_edges)?;
    log_build(&raw);
    Ok(raw)
}

/// [`build`], spread over a rayon pool of `num_threads` workers.
///
/// # Errors
///
/// Returns [`BuildError::ThreadPool`] if the pool cannot be created, or
/// [`BuildError::ShapeOverflow`] if the grid is too large.
pub fn build_parallel(
    tracks: &[ParticleTrack],
    radius_edges: &BinEdges,
    time_edges: &BinEdges,
    num_threads: usize,
) -> Result<RawBuild, BuildError> {
    let workers = num_threads.max(1);
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| BuildError::ThreadPool {
            message: e.to_string(),
        })?;

    let chunk_len = tracks.len().div_ceil(workers).max(1);
    let partials: Vec<Result<RawBuild, BuildError>> = pool.install(|| {
        tracks
            .par_chunks(chunk_len)
            .enumerate()
            .map(|(chunk, slice)| {
                let offset = chunk.saturating_mul(chunk_len);
                accumulate(slice, offset, radius_edges, time_edges)
            })
            .collect()
    });

    let mut raw = RawBuild {
        matrix: TransitionMatrix::for_grid(radius_edges, time_edges)?,
        report: ClassificationReport::default(),
    };
    for partial in partials {
        raw.merge(&partial?)?;
    }
    debug!(workers, chunk_len, "Merged partial transition matrices");
    log_build(&raw);
    Ok(raw)
}

/// Classify and count one slice of tracks. `offset` is the position of the
/// slice's first track in the full input, used for the rejected sample.
fn accumulate(
    tracks: &[ParticleTrack],
    offset: usize,
    radius_edges: &BinEdges,
    time_edges: &BinEdges,
) -> Result<RawBuild, BuildError> {
    let mut matrix = TransitionMatrix::for_grid(radius_edges, time_edges)?;
    let mut report = ClassificationReport::default();

    for (position, track) in tracks.iter().enumerate() {
        match classify(track, radius_edges, time_edges) {
            Ok(classified) => {
                // The matrix is shaped by the same edges, so this always fits.
                if matrix.record(&classified)? {
                    report.classified = report.classified.saturating_add(1);
                }
            }
            Err(outside) => {
                report.rejected = report.rejected.saturating_add(1);
                if outside.formation_radius.is_some() {
                    report.formation_radius_out_of_range =
                        report.formation_radius_out_of_range.saturating_add(1);
                }
                if outside.formation_time.is_some() {
                    report.formation_time_out_of_range =
                        report.formation_time_out_of_range.saturating_add(1);
                }
                if outside.final_radius.is_some() {
                    report.final_radius_out_of_range =
                        report.final_radius_out_of_range.saturating_add(1);
                }
                if report.rejected_sample.len() < REJECTED_SAMPLE_LIMIT {
                    report
                        .rejected_sample
                        .push(offset.saturating_add(position));
                }
            }
        }
    }

    Ok(RawBuild { matrix, report })
}

fn log_build(raw: &RawBuild) {
    debug!(
        n_zones = raw.matrix.n_zones(),
        n_time_bins = raw.matrix.n_time_bins(),
        classified = raw.report.classified,
        "Raw transition matrix accumulated"
    );
    if raw.report.rejected > 0 {
        warn!(
            rejected = raw.report.rejected,
            formation_radius = raw.report.formation_radius_out_of_range,
            formation_time = raw.report.formation_time_out_of_range,
            final_radius = raw.report.final_radius_out_of_range,
            "Tracks outside the bin grid were excluded"
        );
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn stratum(zone: usize, bin: usize) -> Stratum {
        Stratum::new(ZoneIndex::new(zone), TimeBinIndex::new(bin))
    }

    fn three_zone_grid() -> (BinEdges, BinEdges) {
        (
            BinEdges::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap(),
            BinEdges::new(vec![0.0, 10.0]).unwrap(),
        )
    }

    #[test]
    fn zeros_has_expected_shape() {
        let matrix = TransitionMatrix::zeros(3, 2).unwrap();
        assert_eq!(matrix.n_zones(), 3);
        assert_eq!(matrix.n_time_bins(), 2);
        assert_eq!(matrix.total(), 0);
        assert_eq!(matrix.strata().count(), 6);
        assert_eq!(matrix.row(stratum(2, 1)), Some(&[0, 0, 0][..]));
        assert_eq!(matrix.row(stratum(3, 0)), None);
        assert_eq!(matrix.row(stratum(0, 2)), None);
    }

    #[test]
    fn zeros_rejects_overflowing_shape() {
        let err = TransitionMatrix::zeros(usize::MAX, 2).unwrap_err();
        assert!(matches!(err, BuildError::ShapeOverflow { .. }));
    }

    #[test]
    fn build_counts_observed_migrations() {
        let (radius, time) = three_zone_grid();
        let mut tracks = vec![ParticleTrack::new(5.0, 0.5, 13.8, 0.5); 8];
        tracks.extend(vec![ParticleTrack::new(5.0, 0.5, 13.8, 1.5); 2]);

        let raw = build(&tracks, &radius, &time).unwrap();
        assert_eq!(raw.matrix.row(stratum(0, 0)), Some(&[8, 2, 0][..]));
        assert_eq!(raw.matrix.row_sum(stratum(0, 0)), Some(10));
        assert_eq!(raw.matrix.row(stratum(1, 0)), Some(&[0, 0, 0][..]));
        assert_eq!(raw.report.classified, 10);
        assert_eq!(raw.report.rejected, 0);
    }

    #[test]
    fn build_of_nothing_is_all_zero() {
        let (radius, time) = three_zone_grid();
        let raw = build(&[], &radius, &time).unwrap();
        assert_eq!(raw.matrix.total(), 0);
        assert_eq!(raw.report, ClassificationReport::default());
    }

    #[test]
    fn rejected_tracks_are_reported_not_counted() {
        let (radius, time) = three_zone_grid();
        let tracks = vec![
            ParticleTrack::new(5.0, 0.5, 13.8, 0.5),
            ParticleTrack::new(5.0, -1.0, 13.8, 0.5),
            ParticleTrack::new(11.0, 0.5, 13.8, 4.0),
            ParticleTrack::new(5.0, 2.5, 13.8, 2.5),
        ];
        let raw = build(&tracks, &radius, &time).unwrap();
        assert_eq!(raw.matrix.total(), 2);
        assert_eq!(raw.report.classified, 2);
        assert_eq!(raw.report.rejected, 2);
        assert_eq!(raw.report.formation_radius_out_of_range, 1);
        assert_eq!(raw.report.formation_time_out_of_range, 1);
        assert_eq!(raw.report.final_radius_out_of_range, 1);
        assert_eq!(raw.report.rejected_sample, vec![1, 2]);
        assert_eq!(raw.report.seen(), 4);
    }

    #[test]
    fn rejected_sample_is_capped() {
        let (radius, time) = three_zone_grid();
        let tracks = vec![ParticleTrack::new(5.0, 99.0, 13.8, 0.5); REJECTED_SAMPLE_LIMIT + 5];
        let raw = build(&tracks, &radius, &time).unwrap();
        assert_eq!(raw.report.rejected_sample.len(), REJECTED_SAMPLE_LIMIT);
        assert_eq!(raw.report.rejected_sample.first(), Some(&0));
    }

    #[test]
    fn parallel_build_matches_sequential() {
        let radius = BinEdges::linspace(0.0, 6.0, 7).unwrap();
        let time = BinEdges::linspace(0.0, 4.0, 5).unwrap();
        let tracks: Vec<ParticleTrack> = (0..97_u32)
            .map(|i| {
                let x = f64::from(i);
                ParticleTrack::new((x * 0.37) % 4.5, (x * 0.61) % 6.3, 13.8, (x * 0.29) % 6.2)
            })
            .collect();

        let sequential = build(&tracks, &radius, &time).unwrap();
        for threads in [1, 2, 3, 8] {
            let parallel = build_parallel(&tracks, &radius, &time, threads).unwrap();
            assert_eq!(parallel, sequential, "threads = {threads}");
        }
    }

    #[test]
    fn merge_rejects_mismatched_shapes() {
        let mut a = TransitionMatrix::zeros(3, 1).unwrap();
        let b = TransitionMatrix::zeros(2, 1).unwrap();
        assert!(matches!(a.merge(&b), Err(BuildError::ShapeMismatch { .. })));
    }

    #[test]
    fn full_cell_rejects_another_observation() {
        let mut matrix = TransitionMatrix::zeros(3, 1).unwrap();
        matrix.counts[1] = u32::MAX;
        let track = ClassifiedTrack {
            formation_zone: ZoneIndex::new(0),
            time_bin: TimeBinIndex::new(0),
            final_zone: ZoneIndex::new(1),
        };
        assert_eq!(matrix.record(&track), Err(BuildError::CountOverflow { cell: 1 }));
        assert_eq!(matrix.get(stratum(0, 0), ZoneIndex::new(1)), Some(u32::MAX));

        let other = ClassifiedTrack {
            final_zone: ZoneIndex::new(3),
            ..track
        };
        assert_eq!(matrix.record(&other), Ok(false));
    }

    #[test]
    fn merge_rejects_overflowing_sum() {
        let mut a = TransitionMatrix::zeros(2, 1).unwrap();
        let mut b = TransitionMatrix::zeros(2, 1).unwrap();
        a.counts[3] = u32::MAX;
        b.counts[3] = 1;
        assert_eq!(a.merge(&b), Err(BuildError::CountOverflow { cell: 3 }));
    }

    #[test]
    fn deserialized_table_must_match_its_shape() {
        let matrix = TransitionMatrix::zeros(3, 2).unwrap();
        let mut value = serde_json::to_value(&matrix).unwrap();
        let back: TransitionMatrix = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(back, matrix);

        value["counts"] = serde_json::json!([1]);
        let err = serde_json::from_value::<TransitionMatrix>(value.clone()).unwrap_err();
        assert!(err.to_string().contains("needs 18 cells"), "{err}");

        value["counts"] = serde_json::to_value(vec![0_u32; 18]).unwrap();
        value["fallback"] = serde_json::json!([true]);
        assert!(serde_json::from_value::<TransitionMatrix>(value).is_err());
    }
}
