//! Identity fallback for strata without observations.
//!
//! A stratum whose row sums to zero has no empirical migration data at all.
//! Such rows are replaced by the identity distribution (weight 1 on the
//! formation zone itself), so a tracer formed there stays put. Rows with any
//! observations are left as raw counts; consumers weight final zones in
//! proportion to the counts.
//!
//! Every filled stratum is flagged on the matrix, which keeps it
//! distinguishable from a stratum whose observed tracks genuinely all stayed
//! in their formation zone.

use radmix_types::Stratum;
use tracing::debug;

use crate::matrix::TransitionMatrix;

/// Fill every empty row with the identity distribution.
///
/// Idempotent: a second pass finds no empty rows and changes nothing.
pub fn normalize(mut matrix: TransitionMatrix) -> TransitionMatrix {
    let mut filled: usize = 0;
    for stratum in matrix.strata() {
        let Some(row) = matrix.row_mut(stratum) else {
            continue;
        };
        if row.iter().any(|&count| count > 0) {
            continue;
        }
        if let Some(cell) = row.get_mut(stratum.zone.get()) {
            *cell = 1;
            matrix.mark_fallback(stratum);
            filled = filled.saturating_add(1);
        }
    }
    debug!(filled, "Identity fallback applied to empty strata");
    matrix
}

/// Strata whose rows came from the identity fallback, in zone-major order.
pub fn fallback_strata(matrix: &TransitionMatrix) -> Vec<Stratum> {
    matrix
        .strata()
        .filter(|&stratum| matrix.is_fallback(stratum))
        .collect()
}
