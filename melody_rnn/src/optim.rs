// Adam optimizer over flat parameter buffers.
//
// The model exposes its weights and gradients as matching lists of slices
// (see `Params::buffers` in model.rs); Adam keeps one first- and second-moment
// buffer per slice, laid out the same way.

/// Adam state and hyperparameters.
#[derive(Clone, Debug)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    step: u32,
    m: Vec<Vec<f64>>,
    v: Vec<Vec<f64>>,
}

impl Adam {
    /// Create an optimizer for parameter buffers of the given lengths.
    pub fn new(learning_rate: f64, buffer_lens: &[usize]) -> Self {
        Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
            m: buffer_lens.iter().map(|&n| vec![0.0; n]).collect(),
            v: buffer_lens.iter().map(|&n| vec![0.0; n]).collect(),
        }
    }

    /// Apply one update. `params` and `grads` must have the buffer layout
    /// this optimizer was created with.
    pub fn step(&mut self, params: &mut [&mut [f64]], grads: &[&[f64]]) {
        debug_assert_eq!(params.len(), self.m.len());
        debug_assert_eq!(grads.len(), self.m.len());

        self.step += 1;
        let bias1 = 1.0 - self.beta1.powi(self.step as i32);
        let bias2 = 1.0 - self.beta2.powi(self.step as i32);

        for (b, (p, g)) in params.iter_mut().zip(grads).enumerate() {
            let m = &mut self.m[b];
            let v = &mut self.v[b];
            for i in 0..p.len() {
                m[i] = self.beta1 * m[i] + (1.0 - self.beta1) * g[i];
                v[i] = self.beta2 * v[i] + (1.0 - self.beta2) * g[i] * g[i];
                let m_hat = m[i] / bias1;
                let v_hat = v[i] / bias2;
                p[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            }
        }
    }

    pub fn steps_taken(&self) -> u32 {
        self.step
    }
}
