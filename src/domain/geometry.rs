// Instrument geometry domain model
use serde::Serialize;

/// Depth jitter absorbed when comparing geometries, in depth units (meters).
pub const DEPTH_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Orientation {
    /// Transducer faces the bottom: shallow bins are at the top of the plot.
    Downward,
    /// Transducer sits on the floor looking up: bin 0 is at the bottom.
    Upward,
}

impl Orientation {
    pub fn from_upward_flag(is_upward: bool) -> Self {
        if is_upward {
            Orientation::Upward
        } else {
            Orientation::Downward
        }
    }
}

/// The structural parameters a depth/bin plot layout depends on.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentGeometry {
    pub beam_count: u32,
    pub bin_count: u32,
    pub min_depth: f64,
    pub max_depth: f64,
    pub orientation: Orientation,
}

impl InstrumentGeometry {
    pub fn new(
        beam_count: u32,
        bin_count: u32,
        min_depth: f64,
        max_depth: f64,
        orientation: Orientation,
    ) -> Self {
        Self {
            beam_count,
            bin_count,
            min_depth,
            max_depth,
            orientation,
        }
    }

    /// Exact on counts and orientation, `DEPTH_TOLERANCE` on depth bounds.
    pub fn approx_eq(&self, other: &InstrumentGeometry) -> bool {
        self.beam_count == other.beam_count
            && self.bin_count == other.bin_count
            && self.orientation == other.orientation
            && (self.min_depth - other.min_depth).abs() <= DEPTH_TOLERANCE
            && (self.max_depth - other.max_depth).abs() <= DEPTH_TOLERANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downward(min_depth: f64, max_depth: f64) -> InstrumentGeometry {
        InstrumentGeometry::new(4, 30, min_depth, max_depth, Orientation::Downward)
    }

    #[test]
    fn test_depth_jitter_within_tolerance() {
        let a = downward(0.5, 15.5);
        let b = downward(0.55, 15.42);
        assert!(a.approx_eq(&b));
        assert!(b.approx_eq(&a));
    }

    #[test]
    fn test_depth_change_beyond_tolerance() {
        let a = downward(0.5, 15.5);
        assert!(!a.approx_eq(&downward(0.5, 15.65)));
        assert!(!a.approx_eq(&downward(0.35, 15.5)));
    }

    #[test]
    fn test_counts_and_orientation_are_exact() {
        let a = downward(0.5, 15.5);
        let mut b = a;
        b.bin_count = 31;
        assert!(!a.approx_eq(&b));

        let mut c = a;
        c.beam_count = 3;
        assert!(!a.approx_eq(&c));

        let mut d = a;
        d.orientation = Orientation::Upward;
        assert!(!a.approx_eq(&d));
    }
}
