//! Radial-mixing summary: final radius as a function of formation radius.
//!
//! For each formation-time window, tracks are grouped by formation-radius
//! bin and the distribution of their final radii is summarized by its mean,
//! the standard error of that mean, and the 16th-84th percentile range.
//! A population that does not migrate sits on the one-to-one line; the
//! spread around it measures how strongly the disk mixes.
//!
//! Window and bin bounds are both inclusive here, so a track exactly on a
//! shared boundary is counted in both neighbouring bins. This is a
//! descriptive summary, not the transition matrix, which uses the
//! lower-bin rule instead.

use radmix_types::ParticleTrack;
use serde::{Deserialize, Serialize};

use crate::edges::BinEdges;

/// Lower scatter percentile.
const SCATTER_LOW_PERCENTILE: f64 = 16.0;

/// Upper scatter percentile.
const SCATTER_HIGH_PERCENTILE: f64 = 84.0;

/// Final-radius statistics for one formation-radius bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixingBin {
    /// Inner edge of the formation-radius bin.
    pub radius_lower: f64,
    /// Outer edge of the formation-radius bin.
    pub radius_upper: f64,
    /// Tracks in the bin.
    pub count: usize,
    /// Mean final radius, if the bin is not empty.
    pub mean_final_radius: Option<f64>,
    /// Standard error of the mean, if at least two tracks.
    pub error_of_mean: Option<f64>,
    /// 16th and 84th percentile of final radius, if the bin is not empty.
    pub scatter: Option<(f64, f64)>,
}

impl MixingBin {
    /// Midpoint of the formation-radius bin.
    pub const fn radius_center(&self) -> f64 {
        (self.radius_lower + self.radius_upper) / 2.0
    }
}

/// Statistics for every formation-radius bin within one time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixingWindow {
    /// Start of the formation-time window.
    pub time_lower: f64,
    /// End of the formation-time window.
    pub time_upper: f64,
    /// Per-bin statistics, in radius order.
    pub bins: Vec<MixingBin>,
}

/// Radial-mixing summary over several formation-time windows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadialMixingSummary {
    /// One entry per requested window, in input order.
    pub windows: Vec<MixingWindow>,
}

/// Summarize final radius against formation radius.
pub fn summarize(
    tracks: &[ParticleTrack],
    time_windows: &[[f64; 2]],
    radius_edges: &BinEdges,
) -> RadialMixingSummary {
    let windows = time_windows
        .iter()
        .map(|&[time_lower, time_upper]| {
            let in_window: Vec<&ParticleTrack> = tracks
                .iter()
                .filter(|t| time_lower <= t.formation_time && t.formation_time <= time_upper)
                .collect();
            let bins = (0..radius_edges.n_bins())
                .filter_map(|bin| radius_edges.bin_bounds(bin))
                .map(|(radius_lower, radius_upper)| {
                    let finals: Vec<f64> = in_window
                        .iter()
                        .filter(|t| {
                            radius_lower <= t.formation_radius && t.formation_radius <= radius_upper
                        })
                        .map(|t| t.final_radius)
                        .collect();
                    summarize_bin(radius_lower, radius_upper, finals)
                })
                .collect();
            MixingWindow {
                time_lower,
                time_upper,
                bins,
            }
        })
        .collect();
    RadialMixingSummary { windows }
}

fn summarize_bin(radius_lower: f64, radius_upper: f64, mut finals: Vec<f64>) -> MixingBin {
    finals.retain(|r| r.is_finite());
    finals.sort_by(f64::total_cmp);
    let count = finals.len();
    let mean = mean(&finals);
    MixingBin {
        radius_lower,
        radius_upper,
        count,
        mean_final_radius: mean,
        error_of_mean: mean.and_then(|m| error_of_mean(&finals, m)),
        scatter: percentile(&finals, SCATTER_LOW_PERCENTILE)
            .zip(percentile(&finals, SCATTER_HIGH_PERCENTILE)),
    }
}

#[allow(clippy::cast_precision_loss)]
const fn as_f64(n: usize) -> f64 {
    n as f64
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / as_f64(values.len()))
}

/// Sample standard deviation over `sqrt(n)`. Needs at least two values.
fn error_of_mean(values: &[f64], mean: f64) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    let variance = squares / as_f64(n.saturating_sub(1));
    Some(variance.sqrt() / as_f64(n).sqrt())
}

/// Percentile of sorted data with linear interpolation between ranks.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = q / 100.0 * as_f64(last);
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    let lo = *sorted.get(below)?;
    let hi = *sorted.get(above.min(last))?;
    Some((hi - lo).mul_add(rank - rank.floor(), lo))
}
