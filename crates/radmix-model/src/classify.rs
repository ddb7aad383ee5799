//! Discretization of a particle track onto the zone/time grid.
//!
//! A track is classified by three independent bin lookups: formation radius
//! against the radial edges, formation time against the time edges, and
//! final radius against the radial edges again. A track with any quantity
//! outside its grid is [`Unclassifiable`]; it is never clamped or mapped to
//! a placeholder index.

use radmix_types::{ParticleTrack, Stratum, TimeBinIndex, ZoneIndex};
use serde::{Deserialize, Serialize};

use crate::edges::BinEdges;

/// The grid coordinates of one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassifiedTrack {
    /// Radial zone at formation.
    pub formation_zone: ZoneIndex,
    /// Formation-time bin.
    pub time_bin: TimeBinIndex,
    /// Radial zone at the final snapshot.
    pub final_zone: ZoneIndex,
}

impl ClassifiedTrack {
    /// The formation stratum this track contributes to.
    pub const fn stratum(&self) -> Stratum {
        Stratum::new(self.formation_zone, self.time_bin)
    }
}

/// A track with at least one quantity outside the bin grid.
///
/// Each field holds the offending value, or `None` if that quantity was
/// inside its grid.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error(
    "track outside bin grid (formation radius: {formation_radius:?}, \
     formation time: {formation_time:?}, final radius: {final_radius:?})"
)]
pub struct Unclassifiable {
    /// Formation radius, if outside the radial edges.
    pub formation_radius: Option<f64>,
    /// Formation time, if outside the time edges.
    pub formation_time: Option<f64>,
    /// Final radius, if outside the radial edges.
    pub final_radius: Option<f64>,
}

/// Map a track onto (formation zone, time bin, final zone).
///
/// # Errors
///
/// Returns [`Unclassifiable`] naming every quantity that fell outside its
/// edges.
pub fn classify(
    track: &ParticleTrack,
    radius_edges: &BinEdges,
    time_edges: &BinEdges,
) -> Result<ClassifiedTrack, Unclassifiable> {
    let formation_zone = radius_edges.bin_of(track.formation_radius);
    let time_bin = time_edges.bin_of(track.formation_time);
    let final_zone = radius_edges.bin_of(track.final_radius);

    match (formation_zone, time_bin, final_zone) {
        (Some(formation_zone), Some(time_bin), Some(final_zone)) => Ok(ClassifiedTrack {
            formation_zone: ZoneIndex::new(formation_zone),
            time_bin: TimeBinIndex::new(time_bin),
            final_zone: ZoneIndex::new(final_zone),
        }),
        _ => Err(Unclassifiable {
            formation_radius: formation_zone.is_none().then_some(track.formation_radius),
            formation_time: time_bin.is_none().then_some(track.formation_time),
            final_radius: final_zone.is_none().then_some(track.final_radius),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn grids() -> (BinEdges, BinEdges) {
        (
            BinEdges::linspace(0.0, 30.0, 31).unwrap(),
            BinEdges::linspace(0.0, 13.8, 21).unwrap(),
        )
    }

    #[test]
    fn classifies_in_range_track() {
        let (radius, time) = grids();
        let track = ParticleTrack::new(1.0, 8.2, 13.8, 10.7);
        let classified = classify(&track, &radius, &time).unwrap();
        assert_eq!(classified.formation_zone, ZoneIndex::new(8));
        assert_eq!(classified.time_bin, TimeBinIndex::new(1));
        assert_eq!(classified.final_zone, ZoneIndex::new(10));
        assert_eq!(
            classified.stratum(),
            Stratum::new(ZoneIndex::new(8), TimeBinIndex::new(1))
        );
    }

    #[test]
    fn boundary_radius_goes_to_lower_zone() {
        let (radius, time) = grids();
        let track = ParticleTrack::new(0.5, 5.0, 13.8, 6.0);
        let classified = classify(&track, &radius, &time).unwrap();
        assert_eq!(classified.formation_zone, ZoneIndex::new(4));
        assert_eq!(classified.final_zone, ZoneIndex::new(5));
    }

    #[test]
    fn reports_every_out_of_range_axis() {
        let (radius, time) = grids();
        let track = ParticleTrack::new(14.0, 3.0, 13.8, 31.0);
        let err = classify(&track, &radius, &time).unwrap_err();
        assert_eq!(err.formation_radius, None);
        assert_eq!(err.formation_time, Some(14.0));
        assert_eq!(err.final_radius, Some(31.0));
    }

    #[test]
    fn negative_radius_is_not_wrapped() {
        let (radius, time) = grids();
        let track = ParticleTrack::new(2.0, -0.1, 13.8, 4.0);
        let err = classify(&track, &radius, &time).unwrap_err();
        assert_eq!(err.formation_radius, Some(-0.1));
    }
}
