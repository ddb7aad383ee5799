//! Reference weighted draw of a tracer's zone.
//!
//! The simulation engine owns the random sampling and the zone bookkeeping;
//! the model only supplies weights. These helpers are the straightforward
//! draw an engine would do with those weights, packaged so that engines
//! written in Rust (and the tests) do not each reinvent it.
//!
//! A draw picks final zone `f` with probability `weight(f) / total`. It walks
//! the row once and does not allocate.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use radmix_types::ZoneIndex;

use crate::query::{MigrationDistribution, MigrationSource, QueryError};

/// Draw a final zone in proportion to the distribution's weights.
///
/// An all-zero row (impossible after the identity fallback) keeps the
/// tracer in its formation zone.
pub fn sample_final_zone<R: Rng>(dist: &MigrationDistribution<'_>, rng: &mut R) -> ZoneIndex {
    let total = dist.total();
    if total == 0 {
        return dist.formation_zone();
    }
    let roll = rng.random_range(0..total);
    let mut cumulative: u64 = 0;
    for (zone, &weight) in dist.weights().iter().enumerate() {
        cumulative = cumulative.saturating_add(u64::from(weight));
        if roll < cumulative {
            return ZoneIndex::new(zone);
        }
    }
    dist.formation_zone()
}

/// Seeded sampler for reproducible zone assignment.
#[derive(Debug, Clone)]
pub struct ZoneSampler {
    rng: StdRng,
}

impl ZoneSampler {
    /// Create a sampler whose draws are fully determined by `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw a final zone from an existing distribution.
    pub fn sample(&mut self, dist: &MigrationDistribution<'_>) -> ZoneIndex {
        sample_final_zone(dist, &mut self.rng)
    }

    /// Query `source` and draw the zone a tracer formed in
    /// `formation_zone` at `formation_time` currently occupies.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] if the query is outside the source's grid.
    pub fn assign<S: MigrationSource + ?Sized>(
        &mut self,
        source: &S,
        formation_zone: ZoneIndex,
        formation_time: f64,
    ) -> Result<ZoneIndex, QueryError> {
        let dist = source.distribution(formation_zone, formation_time)?;
        Ok(self.sample(&dist))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects, clippy::indexing_slicing)]
mod tests {
    use radmix_types::ParticleTrack;

    use super::*;
    use crate::edges::BinEdges;
    use crate::model::MigrationModel;
    use crate::query::IdentityMigration;

    fn skewed_model() -> MigrationModel {
        let mut tracks = vec![ParticleTrack::new(1.0, 0.5, 13.8, 0.5); 3];
        tracks.extend(vec![ParticleTrack::new(1.0, 0.5, 13.8, 2.5); 1]);
        MigrationModel::build(
            &tracks,
            BinEdges::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap(),
            BinEdges::new(vec![0.0, 10.0]).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn never_draws_a_zero_weight_zone() {
        let model = skewed_model();
        let mut sampler = ZoneSampler::seeded(7);
        for _ in 0..500 {
            let zone = sampler.assign(&model, ZoneIndex::new(0), 3.0).unwrap();
            assert_ne!(zone, ZoneIndex::new(1));
        }
    }

    #[test]
    fn draw_frequencies_follow_weights() {
        let model = skewed_model();
        let mut sampler = ZoneSampler::seeded(11);
        let mut counts = [0_u32; 3];
        for _ in 0..4000 {
            let zone = sampler.assign(&model, ZoneIndex::new(0), 3.0).unwrap();
            counts[zone.get()] += 1;
        }
        // Expected 3000 / 0 / 1000.
        assert!((2800..3200).contains(&counts[0]), "{counts:?}");
        assert_eq!(counts[1], 0);
        assert!((800..1200).contains(&counts[2]), "{counts:?}");
    }

    #[test]
    fn same_seed_gives_same_draws() {
        let model = skewed_model();
        let mut a = ZoneSampler::seeded(99);
        let mut b = ZoneSampler::seeded(99);
        for _ in 0..50 {
            assert_eq!(
                a.assign(&model, ZoneIndex::new(0), 1.0).unwrap(),
                b.assign(&model, ZoneIndex::new(0), 1.0).unwrap()
            );
        }
    }

    #[test]
    fn identity_source_always_stays() {
        let source = IdentityMigration::new(5);
        let mut sampler = ZoneSampler::seeded(3);
        for zone in 0..5 {
            let drawn = sampler.assign(&source, ZoneIndex::new(zone), 0.0).unwrap();
            assert_eq!(drawn, ZoneIndex::new(zone));
        }
    }

    #[test]
    fn query_errors_propagate() {
        let model = skewed_model();
        let mut sampler = ZoneSampler::seeded(1);
        assert!(sampler.assign(&model, ZoneIndex::new(0), 11.0).is_err());
    }
}
