//! Driver binary for the Radmix radial-migration model.
//!
//! This is the batch entry point that turns a star-particle catalogue into
//! a frozen migration model and reports on it. A chemical-evolution engine
//! links `radmix-model` directly; this binary exists to build and inspect a
//! model from the command line.
//!
//! # Run Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `radmix-config.yaml` (or the path given as the
//!    first argument)
//! 3. Read the track catalogue named in the configuration
//! 4. Build and freeze the migration model
//! 5. Compute the retention table, radial-mixing summary and resampling check
//! 6. Write the JSON report to the configured path, or stdout

mod catalogue;
mod error;
mod report;

use std::io::Write as _;
use std::path::{Path, PathBuf};

use radmix_model::{MigrationModel, ModelConfig, summarize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::report::EngineReport;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "radmix-config.yaml";

/// Application entry point for the driver.
///
/// # Errors
///
/// Returns an error if configuration, catalogue reading, model construction
/// or report writing fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("radmix-engine starting");

    // 2. Load configuration.
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = load_config(&config_path)?;
    info!(
        parallel = config.build.parallel,
        threads = config.build.threads,
        present_day_time = config.grid.present_day_time,
        "Configuration loaded"
    );

    // 3. Read the catalogue.
    let catalogue_path = config
        .catalogue
        .path
        .as_deref()
        .ok_or(EngineError::NoCatalogue)?;
    let tracks = catalogue::read_tracks(
        catalogue_path,
        &config.catalogue,
        config.grid.present_day_time,
    )
    .map_err(EngineError::from)?;

    // 4. Build the model.
    let model = MigrationModel::build_with(&tracks, &config).map_err(EngineError::from)?;
    let diagnostics = model.diagnostics();
    info!(
        classified = diagnostics.classification.classified,
        rejected = diagnostics.classification.rejected,
        observed_strata = diagnostics.observed_strata,
        fallback_strata = diagnostics.fallback_strata.len(),
        "Model built"
    );
    if diagnostics.classification.rejected > 0 {
        warn!(
            formation_radius = diagnostics.classification.formation_radius_out_of_range,
            formation_time = diagnostics.classification.formation_time_out_of_range,
            final_radius = diagnostics.classification.final_radius_out_of_range,
            sample = ?diagnostics.classification.rejected_sample,
            "Some tracks fell outside the grid and were not counted"
        );
    }

    // 5. Assemble the report.
    let mixing_edges = config.mixing.radius_edges().map_err(EngineError::from)?;
    let report = EngineReport {
        retention: report::retention_table(&model).map_err(EngineError::from)?,
        mixing: summarize(&tracks, &config.mixing.time_windows, &mixing_edges),
        resampling: report::resample(&model, &tracks, config.sampling.seed)
            .map_err(EngineError::from)?,
        diagnostics,
    };

    // 6. Write it out.
    write_report(&report, config.catalogue.report_path.as_deref())?;

    info!("radmix-engine finished");
    Ok(())
}

/// Load the model configuration from `path`.
///
/// A missing file is not an error; defaults are used instead.
fn load_config(path: &Path) -> Result<ModelConfig, EngineError> {
    if path.exists() {
        let config = ModelConfig::from_file(path)?;
        Ok(config)
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(ModelConfig::default())
    }
}

/// Serialize the report as pretty JSON to `path`, or stdout when `None`.
fn write_report(report: &EngineReport, path: Option<&Path>) -> Result<(), EngineError> {
    let json = serde_json::to_string_pretty(report)?;
    match path {
        Some(path) => {
            std::fs::write(path, json).map_err(|source| EngineError::Report {
                path: path.to_path_buf(),
                source,
            })?;
            info!(path = %path.display(), "Report written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}").map_err(|source| EngineError::Report {
                path: PathBuf::from("-"),
                source,
            })?;
        }
    }
    Ok(())
}
