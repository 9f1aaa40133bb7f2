// Recurrent next-pitch classifier.
//
// One Elman recurrent layer followed by a dense softmax head over the pitch
// vocabulary:
//
//   h_0 = 0
//   h_t = tanh(W_xh * x_t + W_hh * h_{t-1} + b_h)      t = 1..L
//   p   = softmax(W_hy * h_L + b_y)
//
// Each time step feeds a single scalar: the pitch index scaled into [0, 1]
// by the vocabulary size. Training minimizes sparse categorical
// cross-entropy with minibatch Adam (optim.rs), shuffling the examples every
// epoch. Gradients come from back-propagation through the whole window.
//
// Weights are Glorot-uniform from the run's PRNG, biases start at zero. The
// model lives only for one run; there is no save/load.

use crate::config::ModelParams;
use crate::optim::Adam;
use crate::sequence::TrainingSet;
use melody_rnn_prng::MelodyRng;

/// Probability assumed for the true class when computing the loss, so a
/// fully wrong prediction gives a large finite loss instead of infinity.
const LOSS_PROBABILITY_FLOOR: f64 = 1e-12;

/// Anything that turns a window of pitch indices into a distribution over
/// the next index. The sampler only needs this.
pub trait NextPitchModel {
    fn vocab_size(&self) -> usize;

    /// Probability per vocabulary index. Sums to 1.
    fn predict(&self, window: &[usize]) -> Vec<f64>;
}

/// Weight buffers, row-major.
#[derive(Clone, Debug)]
struct Params {
    /// hidden (input width is 1)
    w_xh: Vec<f64>,
    /// hidden x hidden; `w_hh[i * hidden + j]` maps h_j to h_i
    w_hh: Vec<f64>,
    b_h: Vec<f64>,
    /// vocab x hidden
    w_hy: Vec<f64>,
    b_y: Vec<f64>,
}

impl Params {
    fn zeros(hidden: usize, vocab: usize) -> Self {
        Params {
            w_xh: vec![0.0; hidden],
            w_hh: vec![0.0; hidden * hidden],
            b_h: vec![0.0; hidden],
            w_hy: vec![0.0; vocab * hidden],
            b_y: vec![0.0; vocab],
        }
    }

    fn glorot(hidden: usize, vocab: usize, rng: &mut MelodyRng) -> Self {
        let mut p = Params::zeros(hidden, vocab);
        fill_glorot(&mut p.w_xh, 1, hidden, rng);
        fill_glorot(&mut p.w_hh, hidden, hidden, rng);
        fill_glorot(&mut p.w_hy, hidden, vocab, rng);
        p
    }

    fn buffers_mut(&mut self) -> [&mut [f64]; 5] {
        [
            &mut self.w_xh,
            &mut self.w_hh,
            &mut self.b_h,
            &mut self.w_hy,
            &mut self.b_y,
        ]
    }

    fn buffers(&self) -> [&[f64]; 5] {
        [&self.w_xh, &self.w_hh, &self.b_h, &self.w_hy, &self.b_y]
    }

    fn clear(&mut self) {
        for buf in self.buffers_mut() {
            buf.fill(0.0);
        }
    }

    fn scale(&mut self, factor: f64) {
        for buf in self.buffers_mut() {
            for v in buf.iter_mut() {
                *v *= factor;
            }
        }
    }
}

fn fill_glorot(buf: &mut [f64], fan_in: usize, fan_out: usize, rng: &mut MelodyRng) {
    let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
    for w in buf.iter_mut() {
        *w = rng.range_f64(-limit, limit);
    }
}

/// Mean training loss per epoch, in order.
#[derive(Clone, Debug, Default)]
pub struct TrainingReport {
    pub epoch_losses: Vec<f64>,
    /// Minibatch updates applied across all epochs.
    pub optimizer_steps: u32,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.epoch_losses.last().copied()
    }
}

/// Elman RNN with a softmax classification head.
#[derive(Clone, Debug)]
pub struct RnnModel {
    hidden: usize,
    vocab: usize,
    params: Params,
}

impl RnnModel {
    /// Fresh, randomly initialized model.
    ///
    /// Panics if `hidden` or `vocab` is zero.
    pub fn new(hidden: usize, vocab: usize, rng: &mut MelodyRng) -> Self {
        assert!(hidden > 0 && vocab > 0, "RnnModel needs non-empty layers");
        RnnModel {
            hidden,
            vocab,
            params: Params::glorot(hidden, vocab, rng),
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden
    }

    /// Scalar fed to the network for a pitch index.
    fn input_value(&self, index: usize) -> f64 {
        if self.vocab > 1 {
            index as f64 / (self.vocab - 1) as f64
        } else {
            0.0
        }
    }

    /// Run the recurrence. Returns all hidden states, `h_0` included.
    fn hidden_states(&self, window: &[usize]) -> Vec<Vec<f64>> {
        let h = self.hidden;
        let p = &self.params;
        let mut states = Vec::with_capacity(window.len() + 1);
        states.push(vec![0.0; h]);
        for &index in window {
            let x = self.input_value(index);
            let prev = &states[states.len() - 1];
            let mut next = vec![0.0; h];
            for (i, out) in next.iter_mut().enumerate() {
                let row = &p.w_hh[i * h..(i + 1) * h];
                let recurrent: f64 = row.iter().zip(prev).map(|(w, hj)| w * hj).sum();
                *out = (p.w_xh[i] * x + p.b_h[i] + recurrent).tanh();
            }
            states.push(next);
        }
        states
    }

    fn output_probs(&self, last: &[f64]) -> Vec<f64> {
        let h = self.hidden;
        let p = &self.params;
        let logits: Vec<f64> = (0..self.vocab)
            .map(|k| {
                let row = &p.w_hy[k * h..(k + 1) * h];
                p.b_y[k] + row.iter().zip(last).map(|(w, hi)| w * hi).sum::<f64>()
            })
            .collect();
        softmax(&logits)
    }

    /// Forward and backward pass for one example. Adds gradients into
    /// `grads` and returns the example's loss.
    fn accumulate_gradients(&self, window: &[usize], label: usize, grads: &mut Params) -> f64 {
        let h = self.hidden;
        let p = &self.params;
        let states = self.hidden_states(window);
        let last = &states[states.len() - 1];
        let probs = self.output_probs(last);
        let loss = -probs[label].max(LOSS_PROBABILITY_FLOOR).ln();

        // dL/dlogits for softmax + cross-entropy.
        let mut d_logits = probs;
        d_logits[label] -= 1.0;

        let mut d_h = vec![0.0; h];
        for (k, &dk) in d_logits.iter().enumerate() {
            grads.b_y[k] += dk;
            let row = k * h;
            for i in 0..h {
                grads.w_hy[row + i] += dk * last[i];
                d_h[i] += p.w_hy[row + i] * dk;
            }
        }

        let mut d_pre = vec![0.0; h];
        for t in (0..window.len()).rev() {
            let x = self.input_value(window[t]);
            let h_t = &states[t + 1];
            let h_prev = &states[t];
            for i in 0..h {
                d_pre[i] = d_h[i] * (1.0 - h_t[i] * h_t[i]);
            }
            d_h.fill(0.0);
            for i in 0..h {
                let di = d_pre[i];
                grads.w_xh[i] += di * x;
                grads.b_h[i] += di;
                let row = i * h;
                for j in 0..h {
                    grads.w_hh[row + j] += di * h_prev[j];
                    d_h[j] += p.w_hh[row + j] * di;
                }
            }
        }

        loss
    }

    /// Mean cross-entropy over a training set, without updating weights.
    pub fn evaluate(&self, data: &TrainingSet) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        let total: f64 = data
            .inputs
            .iter()
            .zip(&data.labels)
            .map(|(window, &label)| {
                let probs = self.predict(window);
                -probs[label].max(LOSS_PROBABILITY_FLOOR).ln()
            })
            .sum();
        total / data.len() as f64
    }

    /// Fit on `data` for `params.epochs` passes of shuffled minibatches.
    pub fn train(
        &mut self,
        data: &TrainingSet,
        params: &ModelParams,
        rng: &mut MelodyRng,
    ) -> TrainingReport {
        let mut report = TrainingReport::default();
        if data.is_empty() {
            return report;
        }

        let lens: Vec<usize> = self.params.buffers().iter().map(|b| b.len()).collect();
        let mut adam = Adam::new(params.learning_rate, &lens);
        let mut grads = Params::zeros(self.hidden, self.vocab);
        let mut order: Vec<usize> = (0..data.len()).collect();
        let batch_size = params.batch_size.max(1);

        for epoch in 0..params.epochs {
            rng.shuffle(&mut order);
            let mut epoch_loss = 0.0;
            for batch in order.chunks(batch_size) {
                grads.clear();
                for &i in batch {
                    epoch_loss += self.accumulate_gradients(&data.inputs[i], data.labels[i], &mut grads);
                }
                grads.scale(1.0 / batch.len() as f64);
                adam.step(&mut self.params.buffers_mut(), &grads.buffers());
            }
            let mean = epoch_loss / data.len() as f64;
            log::info!("epoch {}/{}: loss {:.4}", epoch + 1, params.epochs, mean);
            report.epoch_losses.push(mean);
        }
        report.optimizer_steps = adam.steps_taken();
        report
    }
}

impl NextPitchModel for RnnModel {
    fn vocab_size(&self) -> usize {
        self.vocab
    }

    fn predict(&self, window: &[usize]) -> Vec<f64> {
        let states = self.hidden_states(window);
        self.output_probs(&states[states.len() - 1])
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&z| (z - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
