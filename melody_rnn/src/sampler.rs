// Melody sampling from a trained next-pitch model.
//
// A small state machine: Seeded -> Generating -> Done.
//
// - Seeded: the context window is `L` consecutive indices from the real
//   training sequence, starting at a random offset in `0..N - L - 1`.
// - Generating: each `step` predicts a distribution for the current window,
//   reshapes it with the temperature, draws one index, records it together
//   with a duration drawn uniformly from the configured range, and slides
//   the window (newest in, oldest out; length stays `L`).
// - Done: once `max_notes` notes exist or the summed duration reaches
//   `max_total_duration`. Both bounds are checked before every step, so the
//   duration budget is overshot by at most the last note.
//
// Every probability is floored before the logarithm so a softmax that
// underflowed to 0 cannot produce NaN or infinity.

use crate::config::{DurationParams, SamplingParams};
use crate::error::{Error, Result};
use crate::model::NextPitchModel;
use crate::vocab::PitchVocabulary;
use melody_rnn_prng::MelodyRng;
use std::collections::VecDeque;

/// Lowest probability fed to the logarithm in temperature scaling.
pub const PROBABILITY_FLOOR: f64 = 1e-12;

/// Rescale `probs` by temperature `t`: `exp(ln(p) / t)`, renormalized.
///
/// `t` must be positive. The exponent is shifted by its maximum before
/// `exp`, so the result is finite for any input.
pub fn apply_temperature(probs: &[f64], t: f64) -> Vec<f64> {
    let scaled: Vec<f64> = probs
        .iter()
        .map(|&p| {
            let p = if p.is_finite() { p.max(PROBABILITY_FLOOR) } else { PROBABILITY_FLOOR };
            p.ln() / t
        })
        .collect();
    let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scaled.iter().map(|&s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Where the sampler is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerState {
    Seeded,
    Generating,
    Done(StopReason),
}

/// Which bound ended generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    MaxNotes,
    DurationBudget,
}

/// One sampled note, before it is placed on the timeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeneratedNote {
    pub index: usize,
    pub pitch: u8,
    /// Seconds.
    pub duration: f64,
}

/// Generation state for one run.
#[derive(Clone, Debug)]
pub struct Sampler {
    state: SamplerState,
    window: VecDeque<usize>,
    total_duration: f64,
    notes: Vec<GeneratedNote>,
    temperature: f64,
    max_notes: usize,
    max_total_duration: f64,
    min_duration: f64,
    max_duration: f64,
}

impl Sampler {
    /// Seed the context window from a random slice of `indices`.
    ///
    /// Requires `indices.len() > window + 1`, the same bound training uses.
    pub fn seeded(
        indices: &[usize],
        window: usize,
        sampling: &SamplingParams,
        durations: &DurationParams,
        rng: &mut MelodyRng,
    ) -> Result<Self> {
        let n = indices.len();
        if window == 0 || n <= window + 1 {
            return Err(Error::WindowTooLong { notes: n, window });
        }
        let start = rng.range_usize(0, n - window - 1);
        Ok(Self::from_context(
            indices[start..start + window].iter().copied().collect(),
            sampling,
            durations,
        ))
    }

    /// Seed with an explicit context window.
    pub fn from_context(
        context: VecDeque<usize>,
        sampling: &SamplingParams,
        durations: &DurationParams,
    ) -> Self {
        Sampler {
            state: SamplerState::Seeded,
            window: context,
            total_duration: 0.0,
            notes: Vec::new(),
            temperature: sampling.temperature,
            max_notes: sampling.max_notes,
            max_total_duration: sampling.max_total_duration,
            min_duration: durations.min_duration,
            max_duration: durations.max_duration,
        }
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn notes(&self) -> &[GeneratedNote] {
        &self.notes
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn window(&self) -> &VecDeque<usize> {
        &self.window
    }

    fn stop_reason(&self) -> Option<StopReason> {
        if self.notes.len() >= self.max_notes {
            Some(StopReason::MaxNotes)
        } else if self.total_duration >= self.max_total_duration {
            Some(StopReason::DurationBudget)
        } else {
            None
        }
    }

    /// Produce one note, or move to `Done` if a bound has been reached.
    /// Calling `step` on a finished sampler does nothing.
    ///
    /// Fails with `VocabularyMismatch` if the model's output size is not the
    /// vocabulary size; every drawn index must decode to a pitch.
    pub fn step(
        &mut self,
        model: &impl NextPitchModel,
        vocab: &PitchVocabulary,
        rng: &mut MelodyRng,
    ) -> Result<SamplerState> {
        if let SamplerState::Done(_) = self.state {
            return Ok(self.state);
        }
        if model.vocab_size() != vocab.len() {
            return Err(Error::VocabularyMismatch {
                model: model.vocab_size(),
                vocab: vocab.len(),
            });
        }
        if let Some(reason) = self.stop_reason() {
            self.state = SamplerState::Done(reason);
            return Ok(self.state);
        }
        self.state = SamplerState::Generating;

        let context: Vec<usize> = self.window.iter().copied().collect();
        let predicted = model.predict(&context);
        if predicted.len() != vocab.len() {
            return Err(Error::VocabularyMismatch {
                model: predicted.len(),
                vocab: vocab.len(),
            });
        }
        let probs = apply_temperature(&predicted, self.temperature);
        let index = rng
            .weighted_index(&probs)
            .expect("temperature-scaled probabilities are all positive");
        let pitch = vocab.decode(index).ok_or(Error::VocabularyMismatch {
            model: probs.len(),
            vocab: vocab.len(),
        })?;
        let duration = rng.range_f64(self.min_duration, self.max_duration);

        self.window.push_back(index);
        self.window.pop_front();
        self.total_duration += duration;
        self.notes.push(GeneratedNote {
            index,
            pitch,
            duration,
        });
        log::debug!(
            "sampled pitch {pitch} (p = {:.3}), duration {duration:.3}s",
            probs[index]
        );

        Ok(self.state)
    }

    /// Step until `Done` and return the generated notes with the stop reason.
    pub fn run(
        mut self,
        model: &impl NextPitchModel,
        vocab: &PitchVocabulary,
        rng: &mut MelodyRng,
    ) -> Result<(Vec<GeneratedNote>, StopReason)> {
        loop {
            if let SamplerState::Done(reason) = self.step(model, vocab, rng)? {
                return Ok((self.notes, reason));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Always predicts the same fixed distribution.
    struct FixedModel(Vec<f64>);

    impl NextPitchModel for FixedModel {
        fn vocab_size(&self) -> usize {
            self.0.len()
        }

        fn predict(&self, _window: &[usize]) -> Vec<f64> {
            self.0.clone()
        }
    }

    /// Predicts (last index + 1) mod vocab with certainty.
    struct CountingModel(usize);

    impl NextPitchModel for CountingModel {
        fn vocab_size(&self) -> usize {
            self.0
        }

        fn predict(&self, window: &[usize]) -> Vec<f64> {
            let next = (window[window.len() - 1] + 1) % self.0;
            let mut p = vec![0.0; self.0];
            p[next] = 1.0;
            p
        }
    }

    fn sampling(max_notes: usize, max_total_duration: f64) -> SamplingParams {
        SamplingParams {
            temperature: 1.5,
            max_notes,
            max_total_duration,
        }
    }

    fn durations(min: f64, max: f64) -> DurationParams {
        DurationParams {
            min_duration: min,
            max_duration: max,
        }
    }

    fn assert_distribution(p: &[f64]) {
        assert!(p.iter().all(|v| v.is_finite() && *v >= 0.0), "bad entries: {p:?}");
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9, "sum: {}", p.iter().sum::<f64>());
    }

    #[test]
    fn temperature_output_is_a_distribution() {
        for t in [0.1, 0.5, 1.0, 1.5, 10.0] {
            assert_distribution(&apply_temperature(&[0.7, 0.2, 0.1], t));
            assert_distribution(&apply_temperature(&[1.0, 0.0, 0.0, 0.0], t));
            assert_distribution(&apply_temperature(&[0.0, 0.0], t));
        }
    }

    #[test]
    fn temperature_guards_underflow_and_garbage() {
        let p = apply_temperature(&[1.0, 0.0, f64::NAN, -0.5, 1e-320], 1.5);
        assert_distribution(&p);
        assert!(p[0] > 0.99);
    }

    #[test]
    fn temperature_one_is_identity() {
        let p = apply_temperature(&[0.5, 0.3, 0.2], 1.0);
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!((p[1] - 0.3).abs() < 1e-12);
        assert!((p[2] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn high_temperature_flattens_low_sharpens() {
        let base = [0.8, 0.2];
        let flat = apply_temperature(&base, 2.0);
        let sharp = apply_temperature(&base, 0.5);
        assert!(flat[0] < 0.8 && flat[0] > 0.5);
        assert!(sharp[0] > 0.8);
        // p^(1/2) renormalized: sqrt(.8) / (sqrt(.8) + sqrt(.2)) = 2/3.
        assert!((flat[0] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn stops_at_max_notes() {
        let vocab = PitchVocabulary::from_pitches([60, 62, 64, 65]).unwrap();
        let model = FixedModel(vec![0.25; 4]);
        let mut rng = MelodyRng::new(3);
        let sampler =
            Sampler::from_context(VecDeque::from(vec![0, 1, 2]), &sampling(7, 1000.0), &durations(0.5, 1.0));
        let (notes, reason) = sampler.run(&model, &vocab, &mut rng).unwrap();
        assert_eq!(notes.len(), 7);
        assert_eq!(reason, StopReason::MaxNotes);
        assert!(notes.iter().all(|n| vocab.encode(n.pitch) == Some(n.index)));
    }

    #[test]
    fn stops_at_duration_budget_with_at_most_one_note_overshoot() {
        let vocab = PitchVocabulary::from_pitches([60, 62, 64]).unwrap();
        let model = FixedModel(vec![0.2, 0.3, 0.5]);
        for seed in 0..50 {
            let mut rng = MelodyRng::new(seed);
            let mut sampler =
                Sampler::from_context(VecDeque::from(vec![0, 1]), &sampling(1000, 10.0), &durations(0.25, 2.0));
            while !matches!(sampler.step(&model, &vocab, &mut rng).unwrap(), SamplerState::Done(_)) {}
            assert_eq!(sampler.state(), SamplerState::Done(StopReason::DurationBudget));
            let total = sampler.total_duration();
            let last = sampler.notes().last().unwrap().duration;
            assert!(total >= 10.0);
            assert!(total - last < 10.0, "budget crossed before the last note");
            assert!(sampler.notes().len() <= 1000);
        }
    }

    #[test]
    fn window_slides_and_keeps_length() {
        let vocab = PitchVocabulary::from_pitches([48, 50, 52, 53, 55]).unwrap();
        let model = CountingModel(5);
        let mut rng = MelodyRng::new(1);
        let mut sampler =
            Sampler::from_context(VecDeque::from(vec![4, 0, 1]), &sampling(4, 100.0), &durations(0.5, 0.5));
        assert_eq!(sampler.state(), SamplerState::Seeded);

        assert_eq!(sampler.step(&model, &vocab, &mut rng).unwrap(), SamplerState::Generating);
        assert_eq!(sampler.window(), &VecDeque::from(vec![0, 1, 2]));
        sampler.step(&model, &vocab, &mut rng).unwrap();
        assert_eq!(sampler.window(), &VecDeque::from(vec![1, 2, 3]));

        let (notes, _) = sampler.run(&model, &vocab, &mut rng).unwrap();
        let pitches: Vec<u8> = notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![52, 53, 55, 48]);
        assert!(notes.iter().all(|n| n.duration == 0.5));
    }

    #[test]
    fn seeded_window_comes_from_the_sequence() {
        let indices: Vec<usize> = (0..30).collect();
        let mut rng = MelodyRng::new(8);
        for _ in 0..100 {
            let sampler =
                Sampler::seeded(&indices, 5, &sampling(10, 10.0), &durations(0.5, 1.0), &mut rng).unwrap();
            let w: Vec<usize> = sampler.window().iter().copied().collect();
            assert_eq!(w.len(), 5);
            assert!(w.windows(2).all(|p| p[1] == p[0] + 1));
            assert!(w[0] < 30 - 5 - 1);
        }
    }

    #[test]
    fn seeded_rejects_short_sequence() {
        let mut rng = MelodyRng::new(8);
        let result = Sampler::seeded(&[0, 1, 2], 2, &sampling(10, 10.0), &durations(0.5, 1.0), &mut rng);
        assert!(matches!(result, Err(Error::WindowTooLong { .. })));
    }

    #[test]
    fn done_is_terminal() {
        let vocab = PitchVocabulary::from_pitches([60]).unwrap();
        let model = FixedModel(vec![1.0]);
        let mut rng = MelodyRng::new(0);
        let mut sampler =
            Sampler::from_context(VecDeque::from(vec![0]), &sampling(1, 10.0), &durations(0.5, 0.5));
        sampler.step(&model, &vocab, &mut rng).unwrap();
        let done = sampler.step(&model, &vocab, &mut rng).unwrap();
        assert_eq!(done, SamplerState::Done(StopReason::MaxNotes));
        assert_eq!(sampler.step(&model, &vocab, &mut rng).unwrap(), done);
        assert_eq!(sampler.notes().len(), 1);
    }

    #[test]
    fn model_wider_than_vocabulary_is_an_error() {
        let vocab = PitchVocabulary::from_pitches([60, 62, 64]).unwrap();
        // Index 3 or 4 would have no pitch to decode to.
        let model = FixedModel(vec![0.2; 5]);
        let mut rng = MelodyRng::new(4);
        let sampler =
            Sampler::from_context(VecDeque::from(vec![0, 1]), &sampling(10, 100.0), &durations(0.5, 0.5));
        let result = sampler.run(&model, &vocab, &mut rng);
        assert!(
            matches!(result, Err(Error::VocabularyMismatch { model: 5, vocab: 3 })),
            "{result:?}"
        );
    }

    #[test]
    fn mismatch_is_reported_before_any_note() {
        let vocab = PitchVocabulary::from_pitches([60, 62, 64, 65]).unwrap();
        let model = FixedModel(vec![0.5, 0.5]);
        let mut rng = MelodyRng::new(4);
        let mut sampler =
            Sampler::from_context(VecDeque::from(vec![0]), &sampling(10, 100.0), &durations(0.5, 0.5));
        assert!(sampler.step(&model, &vocab, &mut rng).is_err());
        assert!(sampler.notes().is_empty());
        assert_eq!(sampler.state(), SamplerState::Seeded);
    }
}
