//! Raw particle trajectories from a hydrodynamic simulation.

use serde::{Deserialize, Serialize};

/// One simulated star particle: where and when it formed, and where it
/// ended up.
///
/// Times are in Gyr and radii in kpc in the catalogues this model was built
/// for, but nothing here depends on the units as long as the bin edges use
/// the same ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleTrack {
    /// Time at which the particle formed.
    pub formation_time: f64,
    /// Galactocentric radius at formation.
    pub formation_radius: f64,
    /// Time at which the final radius was recorded.
    pub final_time: f64,
    /// Galactocentric radius at `final_time`.
    pub final_radius: f64,
}

impl ParticleTrack {
    /// Create a track from its four measured quantities.
    pub const fn new(
        formation_time: f64,
        formation_radius: f64,
        final_time: f64,
        final_radius: f64,
    ) -> Self {
        Self {
            formation_time,
            formation_radius,
            final_time,
            final_radius,
        }
    }

    /// Signed radial displacement between formation and final radius.
    pub const fn displacement(&self) -> f64 {
        self.final_radius - self.formation_radius
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn displacement_is_final_minus_formation() {
        let track = ParticleTrack::new(2.0, 8.5, 13.8, 6.0);
        assert_eq!(track.displacement(), -2.5);
    }

    #[test]
    fn displacement_is_usable_in_const_context() {
        const OUTWARD: f64 = ParticleTrack::new(1.0, 3.0, 13.8, 7.5).displacement();
        assert_eq!(OUTWARD, 4.5);
    }

    #[test]
    fn track_deserializes_from_named_fields() {
        let json = r#"{"formation_time":1.0,"formation_radius":4.0,"final_time":13.8,"final_radius":5.5}"#;
        let track: ParticleTrack = serde_json::from_str(json).unwrap();
        assert_eq!(track, ParticleTrack::new(1.0, 4.0, 13.8, 5.5));
    }
}
