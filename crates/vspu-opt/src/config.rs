//! Optimization configuration.
//!
//! One immutable snapshot is shared by every pass of a compilation; methods
//! optimized in parallel all read the same values.

/// Tunables consumed by the built-in passes.
#[derive(Clone, Debug)]
pub struct Config {
    /// How many instructions the placeholder-replacement search examines
    /// before giving up. Bounds worst-case pass latency, not correctness.
    pub reorder_lookahead: usize,
    /// The live-range window (in encoded instructions, writer included)
    /// within which a value can still be assigned to an accumulator.
    pub accumulator_window: usize,
    /// How far apart (in encoded instructions) two identical literal loads
    /// may be and still be combined.
    pub literal_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reorder_lookahead: 16,
            accumulator_window: 8,
            literal_window: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_positive() {
        let config = Config::default();
        assert!(config.reorder_lookahead > 0);
        assert!(config.accumulator_window > 0);
        assert!(config.literal_window > 0);
    }
}
