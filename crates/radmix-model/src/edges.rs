//! Bin edges and the scalar-to-bin lookup.
//!
//! A [`BinEdges`] value is an ordered list of `n + 1` boundaries defining
//! `n` contiguous bins. Both ends of every bin are inclusive, so a value
//! sitting exactly on an interior boundary belongs to two bins; the lookup
//! scans bins in increasing order and therefore always resolves it to the
//! lower one.
//!
//! Edges are validated once at construction. Every later lookup can assume
//! at least two finite, strictly increasing boundaries.

use serde::{Deserialize, Serialize};

/// Errors raised when a set of bin edges is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EdgeError {
    /// Fewer than two boundaries were supplied.
    #[error("bin edges need at least two entries, got {len}")]
    TooFew {
        /// Number of boundaries supplied.
        len: usize,
    },

    /// A boundary is NaN or infinite.
    #[error("bin edge {index} is not finite ({value})")]
    NonFinite {
        /// Position of the offending boundary.
        index: usize,
        /// The offending value.
        value: f64,
    },

    /// Two consecutive boundaries are equal or decreasing.
    #[error("bin edges are not strictly increasing at index {index} ({previous} then {value})")]
    NotIncreasing {
        /// Position of the second boundary of the offending pair.
        index: usize,
        /// The boundary before `index`.
        previous: f64,
        /// The boundary at `index`.
        value: f64,
    },
}

/// Strictly increasing bin boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct BinEdges {
    edges: Vec<f64>,
}

impl BinEdges {
    /// Validate and wrap a list of boundaries.
    ///
    /// # Errors
    ///
    /// Returns [`EdgeError`] if there are fewer than two boundaries, any
    /// boundary is not finite, or the sequence is not strictly increasing.
    pub fn new(edges: Vec<f64>) -> Result<Self, EdgeError> {
        if edges.len() < 2 {
            return Err(EdgeError::TooFew { len: edges.len() });
        }
        for (index, &value) in edges.iter().enumerate() {
            if !value.is_finite() {
                return Err(EdgeError::NonFinite { index, value });
            }
        }
        for (offset, pair) in edges.windows(2).enumerate() {
            if let [previous, value] = *pair {
                if previous >= value {
                    return Err(EdgeError::NotIncreasing {
                        index: offset.saturating_add(1),
                        previous,
                        value,
                    });
                }
            }
        }
        Ok(Self { edges })
    }

    /// Evenly spaced boundaries from `start` to `stop` inclusive.
    ///
    /// `count` is the number of boundaries, so the result has `count - 1`
    /// bins. The last boundary is exactly `stop`.
    ///
    /// # Errors
    ///
    /// Returns [`EdgeError`] if `count < 2` or the resulting boundaries are
    /// not finite and strictly increasing (e.g. `start >= stop`).
    pub fn linspace(start: f64, stop: f64, count: u32) -> Result<Self, EdgeError> {
        let Some(intervals) = count.checked_sub(1).filter(|&n| n > 0) else {
            return Err(EdgeError::TooFew {
                len: usize::try_from(count).unwrap_or(usize::MAX),
            });
        };
        let step = (stop - start) / f64::from(intervals);
        let mut edges: Vec<f64> = (0..intervals)
            .map(|i| step.mul_add(f64::from(i), start))
            .collect();
        edges.push(stop);
        Self::new(edges)
    }

    /// Number of bins (one less than the number of boundaries).
    pub fn n_bins(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    /// The first boundary.
    pub fn lower(&self) -> f64 {
        self.edges.first().copied().unwrap_or(f64::NAN)
    }

    /// The last boundary.
    pub fn upper(&self) -> f64 {
        self.edges.last().copied().unwrap_or(f64::NAN)
    }

    /// Whether `value` lies within `[lower, upper]`.
    pub fn contains(&self, value: f64) -> bool {
        self.lower() <= value && value <= self.upper()
    }

    /// The raw boundaries.
    pub fn as_slice(&self) -> &[f64] {
        &self.edges
    }

    /// Inclusive bounds of bin `bin`, or `None` if it does not exist.
    pub fn bin_bounds(&self, bin: usize) -> Option<(f64, f64)> {
        let lo = *self.edges.get(bin)?;
        let hi = *self.edges.get(bin.checked_add(1)?)?;
        Some((lo, hi))
    }

    /// Midpoint of bin `bin`, or `None` if it does not exist.
    pub fn bin_center(&self, bin: usize) -> Option<f64> {
        self.bin_bounds(bin).map(|(lo, hi)| (lo + hi) / 2.0)
    }

    /// Bin containing `value`; see [`bin_of`].
    pub fn bin_of(&self, value: f64) -> Option<usize> {
        bin_of(&self.edges, value)
    }
}

impl TryFrom<Vec<f64>> for BinEdges {
    type Error = EdgeError;

    fn try_from(edges: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(edges)
    }
}

impl From<BinEdges> for Vec<f64> {
    fn from(edges: BinEdges) -> Self {
        edges.edges
    }
}

/// Index of the first bin `i` with `edges[i] <= value <= edges[i + 1]`.
///
/// Returns `None` when no bin contains the value: below the first edge,
/// above the last, or NaN.
pub fn bin_of(edges: &[f64], value: f64) -> Option<usize> {
    edges
        .windows(2)
        .position(|pair| matches!(*pair, [lo, hi] if lo <= value && value <= hi))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    fn unit_edges() -> BinEdges {
        BinEdges::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap()
    }

    #[test]
    fn interior_value_maps_to_its_bin() {
        assert_eq!(unit_edges().bin_of(1.5), Some(1));
        assert_eq!(unit_edges().bin_of(0.25), Some(0));
        assert_eq!(unit_edges().bin_of(2.999), Some(2));
    }

    #[test]
    fn shared_boundary_resolves_to_lower_bin() {
        let edges = unit_edges();
        assert_eq!(edges.bin_of(1.0), Some(0));
        assert_eq!(edges.bin_of(2.0), Some(1));
    }

    #[test]
    fn outer_boundaries_are_inclusive() {
        let edges = unit_edges();
        assert_eq!(edges.bin_of(0.0), Some(0));
        assert_eq!(edges.bin_of(3.0), Some(2));
    }

    #[test]
    fn out_of_range_has_no_bin() {
        let edges = unit_edges();
        assert_eq!(edges.bin_of(3.5), None);
        assert_eq!(edges.bin_of(-0.001), None);
        assert_eq!(edges.bin_of(f64::NAN), None);
    }

    #[test]
    fn every_in_range_value_lands_between_its_edges() {
        let edges = BinEdges::new(vec![-4.0, -1.5, 0.0, 0.3, 7.0, 12.25]).unwrap();
        let raw = edges.as_slice();
        let mut value = -4.0;
        while value <= 12.25 {
            let bin = edges.bin_of(value).unwrap();
            assert!(raw[bin] <= value && value <= raw[bin + 1], "value {value} bin {bin}");
            value += 0.05;
        }
    }

    #[test]
    fn rejects_too_few_edges() {
        assert_eq!(BinEdges::new(vec![1.0]), Err(EdgeError::TooFew { len: 1 }));
        assert_eq!(BinEdges::new(Vec::new()), Err(EdgeError::TooFew { len: 0 }));
    }

    #[test]
    fn rejects_non_increasing_edges() {
        let err = BinEdges::new(vec![0.0, 1.0, 1.0, 2.0]).unwrap_err();
        assert!(matches!(err, EdgeError::NotIncreasing { index: 2, .. }));
        let err = BinEdges::new(vec![3.0, 2.0]).unwrap_err();
        assert!(matches!(err, EdgeError::NotIncreasing { index: 1, .. }));
    }

    #[test]
    fn rejects_non_finite_edges() {
        let err = BinEdges::new(vec![0.0, f64::INFINITY]).unwrap_err();
        assert!(matches!(err, EdgeError::NonFinite { index: 1, .. }));
    }

    #[test]
    fn linspace_matches_radial_grid() {
        let edges = BinEdges::linspace(0.0, 30.0, 31).unwrap();
        assert_eq!(edges.n_bins(), 30);
        assert_eq!(edges.lower(), 0.0);
        assert_eq!(edges.upper(), 30.0);
        assert_eq!(edges.bin_bounds(4), Some((4.0, 5.0)));
        assert_eq!(edges.bin_center(4), Some(4.5));
        assert_eq!(edges.bin_bounds(30), None);
    }

    #[test]
    fn linspace_time_grid_ends_exactly_at_stop() {
        let edges = BinEdges::linspace(0.0, 13.8, 21).unwrap();
        assert_eq!(edges.n_bins(), 20);
        assert_eq!(edges.upper(), 13.8);
        assert_eq!(edges.bin_of(13.8), Some(19));
    }

    #[test]
    fn linspace_rejects_degenerate_ranges() {
        assert!(BinEdges::linspace(0.0, 1.0, 1).is_err());
        assert!(BinEdges::linspace(2.0, 1.0, 5).is_err());
    }

    #[test]
    fn deserialization_validates() {
        let ok: BinEdges = serde_json::from_str("[0.0, 0.5, 1.0]").unwrap();
        assert_eq!(ok.n_bins(), 2);
        assert!(serde_json::from_str::<BinEdges>("[1.0, 0.5]").is_err());
    }
}
