//! Type-safe index wrappers for the zone/time grid.
//!
//! Radial zones and formation-time bins are both plain `usize` positions,
//! and mixing them up silently corrupts a transition matrix lookup. Each axis
//! therefore gets its own newtype so the compiler rejects a time bin passed
//! where a zone is expected.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around `usize` with standard derives.
macro_rules! define_index {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub usize);

        impl $name {
            /// Wrap a raw position.
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            /// Return the inner position.
            pub const fn get(self) -> usize {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<usize> for $name {
            fn from(index: usize) -> Self {
                Self(index)
            }
        }

        impl From<$name> for usize {
            fn from(index: $name) -> Self {
                index.0
            }
        }
    };
}

define_index! {
    /// Index of a radial zone (an annulus between two radius edges).
    ZoneIndex
}

define_index! {
    /// Index of a formation-time bin.
    TimeBinIndex
}

/// A formation stratum: the (formation zone, formation time bin) pair that
/// selects one row of the transition matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stratum {
    /// Zone the tracer formed in.
    pub zone: ZoneIndex,
    /// Time bin the tracer formed in.
    pub time_bin: TimeBinIndex,
}

impl Stratum {
    /// Create a stratum from its two indices.
    pub const fn new(zone: ZoneIndex, time_bin: TimeBinIndex) -> Self {
        Self { zone, time_bin }
    }
}

impl core::fmt::Display for Stratum {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "(zone {}, time bin {})", self.zone, self.time_bin)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_through_usize() {
        let zone = ZoneIndex::from(7);
        assert_eq!(zone.get(), 7);
        assert_eq!(usize::from(zone), 7);
    }

    #[test]
    fn index_serializes_transparently() {
        let json = serde_json::to_string(&TimeBinIndex::new(3)).unwrap();
        assert_eq!(json, "3");
        let back: TimeBinIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TimeBinIndex::new(3));
    }

    #[test]
    fn strata_order_by_zone_then_time_bin() {
        let a = Stratum::new(ZoneIndex::new(0), TimeBinIndex::new(5));
        let b = Stratum::new(ZoneIndex::new(1), TimeBinIndex::new(0));
        assert!(a < b);
        assert_eq!(a.to_string(), "(zone 0, time bin 5)");
    }
}
