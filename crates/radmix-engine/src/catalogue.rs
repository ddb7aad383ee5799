//! Reader for the whitespace-delimited track catalogue.
//!
//! Each non-blank line not starting with `#` is one star particle. Columns
//! are located by the zero-based indices in [`CatalogueConfig`]; any extra
//! columns are ignored. When no final-time column is configured every track
//! is taken to end at the present-day time.

use std::num::ParseFloatError;
use std::path::{Path, PathBuf};

use radmix_model::config::CatalogueConfig;
use radmix_types::ParticleTrack;
use tracing::{debug, info};

/// Errors raised while reading a catalogue. Line numbers are one-based.
#[derive(Debug, thiserror::Error)]
pub enum CatalogueError {
    /// The catalogue file could not be read.
    #[error("failed to read catalogue {}: {source}", path.display())]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A row has fewer columns than the layout requires.
    #[error("line {line}: missing column {column} (row has {found} columns)")]
    MissingColumn {
        /// Line of the malformed row.
        line: usize,
        /// Zero-based column that was expected.
        column: usize,
        /// Number of columns actually present.
        found: usize,
    },

    /// A required column is not a number.
    #[error("line {line}, column {column}: cannot parse {value:?} as a number: {source}")]
    InvalidNumber {
        /// Line of the malformed row.
        line: usize,
        /// Zero-based column of the bad field.
        column: usize,
        /// The offending text.
        value: String,
        /// The underlying parse error.
        source: ParseFloatError,
    },
}

/// Read and parse the catalogue at `path`.
///
/// # Errors
///
/// Returns [`CatalogueError::Io`] if the file cannot be read, or a parse
/// error from [`parse_tracks`].
pub fn read_tracks(
    path: &Path,
    layout: &CatalogueConfig,
    present_day_time: f64,
) -> Result<Vec<ParticleTrack>, CatalogueError> {
    let text = std::fs::read_to_string(path).map_err(|source| CatalogueError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let tracks = parse_tracks(&text, layout, present_day_time)?;
    info!(
        path = %path.display(),
        tracks = tracks.len(),
        "Catalogue loaded"
    );
    Ok(tracks)
}

/// Parse catalogue text into tracks.
///
/// # Errors
///
/// Returns [`CatalogueError::MissingColumn`] or
/// [`CatalogueError::InvalidNumber`] for the first malformed row.
pub fn parse_tracks(
    text: &str,
    layout: &CatalogueConfig,
    present_day_time: f64,
) -> Result<Vec<ParticleTrack>, CatalogueError> {
    let mut tracks = Vec::new();
    let mut skipped: usize = 0;

    for (index, raw) in text.lines().enumerate() {
        let line = index.saturating_add(1);
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            skipped = skipped.saturating_add(1);
            continue;
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let column = |col: usize| field(&fields, line, col);

        let final_time = match layout.final_time_column {
            Some(col) => column(col)?,
            None => present_day_time,
        };
        tracks.push(ParticleTrack::new(
            column(layout.formation_time_column)?,
            column(layout.formation_radius_column)?,
            final_time,
            column(layout.final_radius_column)?,
        ));
    }

    debug!(tracks = tracks.len(), skipped, "Catalogue parsed");
    Ok(tracks)
}

fn field(fields: &[&str], line: usize, column: usize) -> Result<f64, CatalogueError> {
    let value = fields
        .get(column)
        .ok_or(CatalogueError::MissingColumn {
            line,
            column,
            found: fields.len(),
        })?;
    value
        .parse::<f64>()
        .map_err(|source| CatalogueError::InvalidNumber {
            line,
            column,
            value: (*value).to_owned(),
            source,
        })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# id  t_form  r_form  z_form  r_final
0     1.25    4.0     0.1     6.5

1     9.00    8.5    -0.2     8.0
   # trailing comment
2     12.1    2.2     0.0     3.1   extra columns ignored
";

    #[test]
    fn parses_default_layout_and_skips_comments() {
        let tracks = parse_tracks(SAMPLE, &CatalogueConfig::default(), 13.8).unwrap();
        assert_eq!(tracks.len(), 3);
        assert_eq!(tracks[0], ParticleTrack::new(1.25, 4.0, 13.8, 6.5));
        assert_eq!(tracks[1].formation_radius, 8.5);
        assert_eq!(tracks[2].final_radius, 3.1);
    }

    #[test]
    fn final_time_column_overrides_present_day() {
        let layout = CatalogueConfig {
            final_time_column: Some(3),
            ..CatalogueConfig::default()
        };
        let tracks = parse_tracks("0 1.0 2.0 11.5 3.0\n", &layout, 13.8).unwrap();
        assert_eq!(tracks[0].final_time, 11.5);
    }

    #[test]
    fn short_row_reports_line_and_column() {
        let err = parse_tracks("# header\n0 1.0 2.0\n", &CatalogueConfig::default(), 13.8)
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogueError::MissingColumn {
                line: 2,
                column: 4,
                found: 3
            }
        ));
    }

    #[test]
    fn non_numeric_field_reports_value() {
        let err = parse_tracks("0 1.0 abc 0.0 3.0\n", &CatalogueConfig::default(), 13.8)
            .unwrap_err();
        match err {
            CatalogueError::InvalidNumber {
                line,
                column,
                value,
                ..
            } => {
                assert_eq!(line, 1);
                assert_eq!(column, 2);
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_text_gives_no_tracks() {
        assert!(parse_tracks("", &CatalogueConfig::default(), 13.8).unwrap().is_empty());
        assert!(parse_tracks("\n# only comments\n", &CatalogueConfig::default(), 13.8)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_tracks(
            Path::new("/nonexistent/radmix/catalogue.txt"),
            &CatalogueConfig::default(),
            13.8,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogueError::Io { .. }));
    }
}
