use crate::error::ConfigError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Bounds and step sizes of the random walk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WalkLimits {
    pub min: i64,
    pub max: i64,
    /// Largest relative change between two consecutive readings.
    pub variation: f64,
    /// Fraction of `max` that caps the very first reading.
    pub start_fraction: f64,
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self {
            min: 1,
            max: 200_000,
            variation: 0.05,
            start_fraction: 0.5,
        }
    }
}

impl WalkLimits {
    /// Structural checks only: a single-point range (`min == max`) and a zero
    /// variation are accepted here, the CLI layer is stricter.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::InvalidBounds {
                min: self.min,
                max: self.max,
            });
        }
        if !(0.0..=1.0).contains(&self.variation) {
            return Err(ConfigError::WalkFraction {
                name: "variation",
                value: self.variation,
            });
        }
        if !(0.0..=1.0).contains(&self.start_fraction) {
            return Err(ConfigError::WalkFraction {
                name: "start fraction",
                value: self.start_fraction,
            });
        }
        Ok(())
    }

    /// Upper end of the first draw, never below `min`.
    pub fn start_ceiling(&self) -> i64 {
        let ceiling = (self.max as f64 * self.start_fraction).floor() as i64;
        ceiling.clamp(self.min, self.max)
    }
}

/// Bounded random walk over integers.
///
/// The first value is drawn uniformly from `[min, start_ceiling]` at
/// construction. Every later value is drawn uniformly from the window
/// `last * (1 ± variation)` intersected with `[min, max]`, then rounded half
/// away from zero.
#[derive(Debug, Clone)]
pub struct ValueGenerator<R = StdRng> {
    limits: WalkLimits,
    rng: R,
    last_value: i64,
}

impl ValueGenerator<StdRng> {
    /// Reproducible generator: the same seed yields the same sequence.
    pub fn seeded(limits: WalkLimits, seed: u64) -> Result<Self, ConfigError> {
        Self::with_rng(limits, StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy(limits: WalkLimits) -> Result<Self, ConfigError> {
        Self::with_rng(limits, StdRng::from_entropy())
    }
}

impl<R: Rng> ValueGenerator<R> {
    pub fn with_rng(limits: WalkLimits, mut rng: R) -> Result<Self, ConfigError> {
        limits.check()?;
        let first = rng.gen_range(limits.min..=limits.start_ceiling());
        Ok(Self {
            limits,
            rng,
            last_value: first.clamp(limits.min, limits.max),
        })
    }

    /// Advance the walk by one step and return the new reading.
    pub fn generate_next(&mut self) -> i64 {
        let (lower, upper) = self.window();
        let drawn = if lower < upper {
            self.rng.gen_range(lower..=upper)
        } else {
            lower
        };
        let next = (drawn.round() as i64).clamp(self.limits.min, self.limits.max);
        self.last_value = next;
        next
    }

    /// Real-valued interval the next draw comes from. Always `lower <= upper`
    /// because `last_value` itself lies inside both the walk window and the
    /// configured bounds.
    pub fn window(&self) -> (f64, f64) {
        let last = self.last_value as f64;
        let a = last * (1.0 - self.limits.variation);
        let b = last * (1.0 + self.limits.variation);
        let lower = a.min(b).max(self.limits.min as f64);
        let upper = a.max(b).min(self.limits.max as f64);
        (lower, upper)
    }

    pub fn last_value(&self) -> i64 {
        self.last_value
    }

    pub fn limits(&self) -> &WalkLimits {
        &self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(min: i64, max: i64, variation: f64, start_fraction: f64) -> WalkLimits {
        WalkLimits {
            min,
            max,
            variation,
            start_fraction,
        }
    }

    #[test]
    fn first_value_respects_start_fraction() {
        for seed in 0..200 {
            let gen = ValueGenerator::seeded(limits(100, 1000, 0.05, 0.5), seed).unwrap();
            assert!((100..=500).contains(&gen.last_value()), "seed {seed}");
        }
    }

    #[test]
    fn second_value_stays_in_clamped_window() {
        for seed in 0..200 {
            let mut gen = ValueGenerator::seeded(limits(100, 1000, 0.05, 0.5), seed).unwrap();
            let prev = gen.last_value() as f64;
            let next = gen.generate_next();
            let lower = (prev * 0.95).max(100.0).round() as i64;
            let upper = (prev * 1.05).min(1000.0).round() as i64;
            assert!(next >= lower && next <= upper, "seed {seed}: {next} not in [{lower}, {upper}]");
        }
    }

    #[test]
    fn single_point_range_always_returns_min() {
        let mut gen = ValueGenerator::seeded(limits(42, 42, 0.3, 1.0), 7).unwrap();
        assert_eq!(gen.last_value(), 42);
        for _ in 0..100 {
            assert_eq!(gen.generate_next(), 42);
        }
    }

    #[test]
    fn zero_variation_freezes_the_walk() {
        let mut gen = ValueGenerator::seeded(limits(1, 1000, 0.0, 1.0), 3).unwrap();
        let first = gen.last_value();
        for _ in 0..50 {
            assert_eq!(gen.generate_next(), first);
        }
    }

    #[test]
    fn start_ceiling_below_min_starts_at_min() {
        // 150 * 0.5 = 75 lies under the minimum.
        let gen = ValueGenerator::seeded(limits(100, 150, 0.1, 0.5), 11).unwrap();
        assert_eq!(gen.last_value(), 100);
    }

    #[test]
    fn same_seed_same_sequence() {
        let l = limits(1, 200_000, 0.05, 0.5);
        let mut a = ValueGenerator::seeded(l, 12345).unwrap();
        let mut b = ValueGenerator::seeded(l, 12345).unwrap();
        let seq_a: Vec<i64> = (0..64).map(|_| a.generate_next()).collect();
        let seq_b: Vec<i64> = (0..64).map(|_| b.generate_next()).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = ValueGenerator::seeded(limits(10, 5, 0.05, 0.5), 1).unwrap_err();
        assert_eq!(err, ConfigError::InvalidBounds { min: 10, max: 5 });
    }

    #[test]
    fn zero_fractions_pass_the_structural_check() {
        let walk = limits(0, 10, 0.0, 0.0);
        assert_eq!(walk.check(), Ok(()));
        let err = limits(0, 10, 0.1, 1.01).check().unwrap_err();
        assert_eq!(
            err.to_string(),
            "start fraction must be in [0, 1] (got 1.01)"
        );
    }

    #[test]
    fn rejects_nan_variation() {
        let err = ValueGenerator::seeded(limits(0, 5, f64::NAN, 0.5), 1).unwrap_err();
        assert!(matches!(err, ConfigError::WalkFraction { name: "variation", .. }));
    }

    #[test]
    fn window_at_upper_bound_is_not_inverted() {
        let mut gen = ValueGenerator::seeded(limits(0, 10, 1.0, 1.0), 5).unwrap();
        for _ in 0..100 {
            let (lower, upper) = gen.window();
            assert!(lower <= upper);
            gen.generate_next();
        }
    }
}
