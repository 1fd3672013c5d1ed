//! Seeded random choices
//!
//! Every random decision a run makes goes through these functions
//! with a caller-supplied RNG, so a fixed seed replays a run exactly.

use rand::Rng;
use std::time::Duration;

/// Only the first this-many qualifying links are candidates for the
/// single-link policy.
pub const LINK_CANDIDATE_WINDOW: usize = 10;

/// Choose one link index among the first [`LINK_CANDIDATE_WINDOW`] of
/// `qualifying` links, uniformly. `None` when there are no links.
#[must_use]
pub fn pick_link<R: Rng + ?Sized>(qualifying: usize, rng: &mut R) -> Option<usize> {
    let window = qualifying.min(LINK_CANDIDATE_WINDOW);
    (window > 0).then(|| rng.gen_range(0..window))
}

/// Decides, message by message, which processed messages get link
/// resolution.
///
/// Selection sampling (Knuth's Algorithm S) over a population that is
/// re-estimated before every message: the caller passes how many
/// messages the run can still process, the current one included. While
/// that estimate holds, exactly `n * percentage / 100` (rounded to
/// nearest) of the `n` processed messages are chosen, and every subset
/// of that size is equally likely. A run that stops early therefore
/// still resolves links for its share of the messages it opened.
#[derive(Debug, Clone)]
pub struct ClickSampler {
    percentage: usize,
    seen: usize,
    chosen: usize,
}

impl ClickSampler {
    /// `percentage` is clamped to 100.
    #[must_use]
    pub fn new(percentage: u8) -> Self {
        Self {
            percentage: usize::from(percentage.min(100)),
            seen: 0,
            chosen: 0,
        }
    }

    /// Whether the next message gets link resolution, given that at
    /// most `remaining` messages are left to process.
    pub fn choose<R: Rng + ?Sized>(&mut self, remaining: usize, rng: &mut R) -> bool {
        let remaining = remaining.max(1);
        let target = ((self.seen + remaining) * self.percentage + 50) / 100;
        let needed = target.saturating_sub(self.chosen);
        let pick = needed >= remaining || (needed > 0 && rng.gen_range(0..remaining) < needed);

        self.seen += 1;
        if pick {
            self.chosen += 1;
        }
        pick
    }

    /// Messages chosen so far.
    #[must_use]
    pub const fn chosen(&self) -> usize {
        self.chosen
    }
}

/// `base` scaled by a uniform factor in `[0.5, 1.5]`.
#[must_use]
pub fn jittered_delay<R: Rng + ?Sized>(base: Duration, rng: &mut R) -> Duration {
    if base.is_zero() {
        return base;
    }
    base.mul_f64(rng.gen_range(0.5..=1.5))
}
