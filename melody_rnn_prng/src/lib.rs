// Deterministic, portable pseudo-random number generator for melody_rnn.
//
// xoshiro256++ (Blackman & Vigna, 2019) seeded through SplitMix64. Every
// random decision in a run draws from one `MelodyRng`: the window length,
// weight initialization, per-epoch shuffling, the sampler's seed offset,
// the weighted pitch draws and the note durations. Seeding it with the same
// value reproduces the whole run, model included.
//
// The integer core must stay free of floating point so that the raw stream
// is identical on every platform. The float helpers are derived from the
// integer stream and only used by callers that already accept f64 math.

use serde::{Deserialize, Serialize};

/// Xoshiro256++ PRNG, the only source of randomness in a generation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MelodyRng {
    s: [u64; 4],
}

impl MelodyRng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// SplitMix64 expands the seed into the 256-bit state, so nearby seeds
    /// still give unrelated streams.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Seed from the system clock. Used when a run has no configured seed.
    pub fn from_clock() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self::new(nanos)
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Uniform `f64` in [0, 1) built from the upper 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform `f64` in `[low, high)`. When `low == high` the bound itself is
    /// returned, which lets fixed-duration configs share the same code path.
    ///
    /// Panics if `low > high`.
    pub fn range_f64(&mut self, low: f64, high: f64) -> f64 {
        assert!(low <= high, "range_f64: low must not exceed high");
        if low == high {
            return low;
        }
        low + self.next_f64() * (high - low)
    }

    /// Uniform integer in `[low, high)`, rejection-sampled to avoid modulo
    /// bias.
    ///
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Uniform `usize` in `[low, high)`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Uniform `usize` in `[low, high]`.
    ///
    /// Panics if `low > high`.
    pub fn range_usize_inclusive(&mut self, low: usize, high: usize) -> usize {
        assert!(low <= high, "range_usize_inclusive: low must be <= high");
        self.range_u64(low as u64, high as u64 + 1) as usize
    }

    /// Draw an index with probability proportional to `weights[i]`.
    ///
    /// Negative and non-finite weights count as zero. Returns `None` when no
    /// weight is positive.
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let usable = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
        let total: f64 = weights.iter().copied().map(usable).sum();
        if total <= 0.0 {
            return None;
        }
        let target = self.next_f64() * total;
        let mut cumulative = 0.0;
        let mut last_positive = None;
        for (i, &w) in weights.iter().enumerate() {
            let w = usable(w);
            if w == 0.0 {
                continue;
            }
            cumulative += w;
            last_positive = Some(i);
            if cumulative > target {
                return Some(i);
            }
        }
        // Rounding can leave `target` a hair above the final sum.
        last_positive
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.range_usize_inclusive(0, i);
            items.swap(i, j);
        }
    }
}

/// SplitMix64, used only to expand a `u64` seed into xoshiro state.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
