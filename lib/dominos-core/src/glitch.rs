//! Sources of randomness for the simulation.
//!
//! Every random decision the simulation makes goes through a [`GlitchSource`]: which service glitches on a given tick,
//! how hard it is hit, how long to wait before the next tick, and the identifier given to each incident. Production runs
//! use [`RandomGlitches`], seeded from the operating system or from a fixed seed, and tests can script the exact
//! sequence of decisions with [`ScriptedGlitches`].
use std::{ops::Range, time::Duration};

use rand::{rngs::StdRng, Rng, SeedableRng as _};
use uuid::Uuid;

/// A source of glitch decisions.
pub trait GlitchSource: Send {
    /// Picks the index of the service to glitch, out of `population` services.
    ///
    /// `population` is never zero. Indices past the end wrap around the population.
    fn pick(&mut self, population: usize) -> usize;

    /// Draws the magnitude of a glitch from `range`.
    fn magnitude(&mut self, range: Range<f64>) -> f64;

    /// Draws an additional delay, up to `max`, to add to the next inter-tick wait.
    fn jitter(&mut self, max: Duration) -> Duration {
        let _ = max;
        Duration::ZERO
    }

    /// Generates the identifier of the `sequence`-th incident of a run.
    fn incident_id(&mut self, sequence: u64) -> Uuid {
        Uuid::from_u128(u128::from(sequence))
    }
}

/// Glitch decisions drawn from a random number generator.
pub struct RandomGlitches<R> {
    rng: R,
}

impl<R: Rng> RandomGlitches<R> {
    /// Creates a new `RandomGlitches` drawing from the given generator.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomGlitches<StdRng> {
    /// Creates a new `RandomGlitches` from a fixed seed.
    ///
    /// Two runs over the same services and configuration, using the same seed, make exactly the same decisions.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Creates a new `RandomGlitches` seeded from the operating system's entropy source.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_os_rng())
    }
}

impl<R: Rng + Send> GlitchSource for RandomGlitches<R> {
    fn pick(&mut self, population: usize) -> usize {
        self.rng.random_range(0..population)
    }

    fn magnitude(&mut self, range: Range<f64>) -> f64 {
        if range.is_empty() {
            range.start
        } else {
            self.rng.random_range(range)
        }
    }

    fn jitter(&mut self, max: Duration) -> Duration {
        if max.is_zero() {
            Duration::ZERO
        } else {
            max.mul_f64(self.rng.random::<f64>())
        }
    }

    fn incident_id(&mut self, _sequence: u64) -> Uuid {
        uuid::Builder::from_random_bytes(self.rng.random()).into_uuid()
    }
}

/// Glitch decisions replayed from fixed scripts.
///
/// Picks and magnitudes are each consumed in order, wrapping around once exhausted. Magnitudes are used as-is, even
/// when they fall outside of the configured degradation range, so tests can force exact outcomes.
pub struct ScriptedGlitches {
    picks: Vec<usize>,
    magnitudes: Vec<f64>,
    next_pick: usize,
    next_magnitude: usize,
}

impl ScriptedGlitches {
    /// Creates a new `ScriptedGlitches` from the given pick indices and glitch magnitudes.
    ///
    /// # Panics
    ///
    /// Panics if either script is empty.
    pub fn new<P, M>(picks: P, magnitudes: M) -> Self
    where
        P: IntoIterator<Item = usize>,
        M: IntoIterator<Item = f64>,
    {
        let picks = picks.into_iter().collect::<Vec<_>>();
        let magnitudes = magnitudes.into_iter().collect::<Vec<_>>();
        assert!(!picks.is_empty(), "scripted glitches need at least one pick");
        assert!(!magnitudes.is_empty(), "scripted glitches need at least one magnitude");

        Self {
            picks,
            magnitudes,
            next_pick: 0,
            next_magnitude: 0,
        }
    }
}

impl GlitchSource for ScriptedGlitches {
    fn pick(&mut self, population: usize) -> usize {
        let pick = self.picks[self.next_pick % self.picks.len()];
        self.next_pick += 1;
        pick % population
    }

    fn magnitude(&mut self, _range: Range<f64>) -> f64 {
        let magnitude = self.magnitudes[self.next_magnitude % self.magnitudes.len()];
        self.next_magnitude += 1;
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_draws_stay_in_range() {
        let mut glitches = RandomGlitches::seeded(7);
        for _ in 0..1_000 {
            assert!(glitches.pick(5) < 5);

            let magnitude = glitches.magnitude(0.2..0.5);
            assert!((0.2..0.5).contains(&magnitude));

            assert!(glitches.jitter(Duration::from_millis(250)) <= Duration::from_millis(250));
        }
    }

    #[test]
    fn same_seed_same_decisions() {
        let mut a = RandomGlitches::seeded(42);
        let mut b = RandomGlitches::seeded(42);

        for _ in 0..100 {
            assert_eq!(a.pick(10), b.pick(10));
            assert_eq!(a.magnitude(0.2..0.5), b.magnitude(0.2..0.5));
            assert_eq!(a.incident_id(0), b.incident_id(0));
        }
    }

    #[test]
    fn empty_range_yields_start() {
        let mut glitches = RandomGlitches::seeded(1);
        assert_eq!(glitches.magnitude(0.3..0.3), 0.3);
        assert_eq!(glitches.jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn scripted_wraps_around() {
        let mut glitches = ScriptedGlitches::new([0, 2], [0.3]);

        assert_eq!(glitches.pick(3), 0);
        assert_eq!(glitches.pick(3), 2);
        assert_eq!(glitches.pick(3), 0);
        assert_eq!(glitches.magnitude(0.2..0.5), 0.3);
        assert_eq!(glitches.magnitude(0.2..0.5), 0.3);
        assert_eq!(glitches.incident_id(4), Uuid::from_u128(4));
    }
}
