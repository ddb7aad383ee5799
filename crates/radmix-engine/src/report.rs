//! JSON report written at the end of a driver run.
//!
//! The report bundles the model diagnostics, a per-stratum retention table,
//! the radial-mixing summary, and a resampling check: every classifiable
//! track is redrawn through the model and the resulting final-zone
//! histogram is set beside the observed one. For a correct matrix the two
//! agree up to sampling noise.

use radmix_model::{
    MigrationModel, ModelDiagnostics, QueryError, RadialMixingSummary, ZoneSampler, classify,
};
use radmix_types::{ParticleTrack, ZoneIndex};
use serde::Serialize;
use tracing::debug;

/// Everything the driver reports about one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineReport {
    /// Build summary of the model.
    pub diagnostics: ModelDiagnostics,
    /// Probability of staying in the formation zone, per stratum.
    pub retention: Vec<RetentionEntry>,
    /// Final radius against formation radius.
    pub mixing: RadialMixingSummary,
    /// Observed versus model-drawn final zones.
    pub resampling: ResamplingCheck,
}

/// Retention probability for one formation stratum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionEntry {
    /// Formation zone.
    pub zone: usize,
    /// Formation-time bin.
    pub time_bin: usize,
    /// Centre of the formation-time bin, used for the query.
    pub formation_time: f64,
    /// Fraction of the row's weight on the formation zone.
    pub stay_probability: f64,
    /// Whether the row came from the identity fallback.
    pub fallback: bool,
}

/// Final-zone histograms of the catalogue and of a seeded redraw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResamplingCheck {
    /// Seed of the redraw.
    pub seed: u64,
    /// Tracks that could be placed on the grid and were redrawn.
    pub tracks: u64,
    /// Observed final-zone counts.
    pub observed: Vec<u64>,
    /// Model-drawn final-zone counts.
    pub sampled: Vec<u64>,
}

/// Stay probability of every stratum, queried at the centre of its time bin.
///
/// # Errors
///
/// Returns [`QueryError`] if a stratum cannot be queried, which means the
/// model's matrix and edges disagree.
pub fn retention_table(model: &MigrationModel) -> Result<Vec<RetentionEntry>, QueryError> {
    let time_edges = model.time_edges();
    model
        .matrix()
        .strata()
        .filter_map(|stratum| {
            time_edges
                .bin_center(stratum.time_bin.get())
                .map(|formation_time| (stratum, formation_time))
        })
        .map(|(stratum, formation_time)| {
            let dist = model.query(stratum.zone, formation_time)?;
            Ok(RetentionEntry {
                zone: stratum.zone.get(),
                time_bin: stratum.time_bin.get(),
                formation_time,
                stay_probability: dist.probability(stratum.zone),
                fallback: model.matrix().is_fallback(stratum),
            })
        })
        .collect()
}

/// Redraw the final zone of every classifiable track through the model.
///
/// # Errors
///
/// Returns [`QueryError`] if a classified track cannot be queried.
pub fn resample(
    model: &MigrationModel,
    tracks: &[ParticleTrack],
    seed: u64,
) -> Result<ResamplingCheck, QueryError> {
    let n_zones = model.matrix().n_zones();
    let mut observed = vec![0_u64; n_zones];
    let mut sampled = vec![0_u64; n_zones];
    let mut sampler = ZoneSampler::seeded(seed);
    let mut redrawn: u64 = 0;

    for track in tracks {
        let Ok(classified) = classify(track, model.radius_edges(), model.time_edges()) else {
            continue;
        };
        let drawn = sampler.assign(model, classified.formation_zone, track.formation_time)?;
        bump(&mut observed, classified.final_zone);
        bump(&mut sampled, drawn);
        redrawn = redrawn.saturating_add(1);
    }

    debug!(seed, tracks = redrawn, "Resampling check complete");
    Ok(ResamplingCheck {
        seed,
        tracks: redrawn,
        observed,
        sampled,
    })
}

fn bump(counts: &mut [u64], zone: ZoneIndex) {
    if let Some(count) = counts.get_mut(zone.get()) {
        *count = count.saturating_add(1);
    }
}
