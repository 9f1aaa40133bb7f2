// Training windows over the flattened note-index sequence.
//
// The window length `L` is drawn once per run from the configured range.
// Windows overlap with stride 1: pair `i` is `indices[i..i + L]` labelled
// with `indices[i + L]`, for `i` in `0..N - L - 1`. The final possible pair
// is left out, so `N` notes give `N - L - 1` pairs and a run needs
// `N > L + 1`.
//
// Only pitches reach the model. Note durations are drawn at sampling time
// (sampler.rs) and never enter training.

use crate::config::SequenceParams;
use crate::error::{Error, Result};
use melody_rnn_prng::MelodyRng;

/// Overlapping (window, next index) pairs.
#[derive(Clone, Debug)]
pub struct TrainingSet {
    pub window: usize,
    /// Each entry has length `window`.
    pub inputs: Vec<Vec<usize>>,
    pub labels: Vec<usize>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Draw the run's window length uniformly from `[min, max]`.
pub fn choose_window_length(params: &SequenceParams, rng: &mut MelodyRng) -> usize {
    rng.range_usize_inclusive(params.min_seq_length, params.max_seq_length)
}

/// Slide a window of `window` indices across `indices`.
///
/// Returns `Error::WindowTooLong` when no pair would be produced, so an
/// empty training set never reaches the model.
pub fn build_training_set(indices: &[usize], window: usize) -> Result<TrainingSet> {
    let n = indices.len();
    if window == 0 || n <= window + 1 {
        return Err(Error::WindowTooLong { notes: n, window });
    }
    let count = n - window - 1;
    let mut inputs = Vec::with_capacity(count);
    let mut labels = Vec::with_capacity(count);
    for i in 0..count {
        inputs.push(indices[i..i + window].to_vec());
        labels.push(indices[i + window]);
    }
    Ok(TrainingSet {
        window,
        inputs,
        labels,
    })
}
