// Run configuration.
//
// Every tunable of a generation run lives in `GeneratorConfig`, grouped into
// nested parameter structs the way the stages consume them: `SequenceParams`
// for windowing, `DurationParams` for note lengths, `ModelParams` for the
// network and its training loop, `SamplingParams` for generation, and
// `OutputParams` for the written MIDI file.
//
// Configs load from JSON. Every field has a default, so a file only needs to
// name the values it changes. `validate()` runs before any work starts; the
// stages assume a validated config and do not re-check ranges.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Range the per-run window length `L` is drawn from (inclusive).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceParams {
    pub min_seq_length: usize,
    pub max_seq_length: usize,
}

impl Default for SequenceParams {
    fn default() -> Self {
        Self {
            min_seq_length: 10,
            max_seq_length: 20,
        }
    }
}

/// Uniform range for generated note durations, in seconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationParams {
    pub min_duration: f64,
    pub max_duration: f64,
}

impl Default for DurationParams {
    fn default() -> Self {
        Self {
            min_duration: 0.25,
            max_duration: 1.0,
        }
    }
}

/// Network shape and training loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    /// Width of the recurrent layer.
    pub hidden_size: usize,
    pub batch_size: usize,
    /// Full passes over the training set.
    pub epochs: usize,
    /// Adam step size.
    pub learning_rate: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            hidden_size: 64,
            batch_size: 32,
            epochs: 10,
            learning_rate: 0.001,
        }
    }
}

/// Temperature and stop conditions for the sampler.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Values above 1.0 flatten the predicted distribution, below 1.0 sharpen it.
    pub temperature: f64,
    pub max_notes: usize,
    /// Total generated duration (seconds) that ends generation.
    pub max_total_duration: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.5,
            max_notes: 50,
            max_total_duration: 90.0,
        }
    }
}

/// How the generated melody is written to MIDI.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputParams {
    pub velocity: u8,
    /// General MIDI program for the single output instrument.
    pub program: u8,
    pub tempo_bpm: u16,
    pub ticks_per_quarter: u16,
}

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            velocity: 100,
            program: 0,
            tempo_bpm: 120,
            ticks_per_quarter: 480,
        }
    }
}

/// Complete configuration for one generation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// PRNG seed. `None` seeds from the clock, so runs differ.
    pub seed: Option<u64>,
    pub sequence: SequenceParams,
    pub duration: DurationParams,
    pub model: ModelParams,
    pub sampling: SamplingParams,
    pub output: OutputParams,
}

impl GeneratorConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: GeneratorConfig =
            serde_json::from_str(&data).map_err(|source| Error::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the stages cannot work with.
    pub fn validate(&self) -> Result<()> {
        let seq = &self.sequence;
        if seq.min_seq_length == 0 {
            return invalid("sequence.min_seq_length must be at least 1");
        }
        if seq.min_seq_length > seq.max_seq_length {
            return invalid("sequence.min_seq_length exceeds sequence.max_seq_length");
        }

        let dur = &self.duration;
        if !(dur.min_duration.is_finite() && dur.min_duration > 0.0) {
            return invalid("duration.min_duration must be a positive number");
        }
        if !(dur.max_duration.is_finite() && dur.max_duration >= dur.min_duration) {
            return invalid("duration.max_duration must be >= duration.min_duration");
        }

        let model = &self.model;
        if model.hidden_size == 0 {
            return invalid("model.hidden_size must be at least 1");
        }
        if model.batch_size == 0 {
            return invalid("model.batch_size must be at least 1");
        }
        if model.epochs == 0 {
            return invalid("model.epochs must be at least 1");
        }
        if !(model.learning_rate.is_finite() && model.learning_rate > 0.0) {
            return invalid("model.learning_rate must be a positive number");
        }

        let sampling = &self.sampling;
        if !(sampling.temperature.is_finite() && sampling.temperature > 0.0) {
            return invalid("sampling.temperature must be a positive number");
        }
        if sampling.max_notes == 0 {
            return invalid("sampling.max_notes must be at least 1");
        }
        if !(sampling.max_total_duration.is_finite() && sampling.max_total_duration > 0.0) {
            return invalid("sampling.max_total_duration must be a positive number");
        }

        let out = &self.output;
        if out.velocity > 127 {
            return invalid("output.velocity must be in 0..=127");
        }
        if out.program > 127 {
            return invalid("output.program must be in 0..=127");
        }
        // Below 4 BPM a quarter lasts longer than a 24-bit tempo event holds.
        if out.tempo_bpm < 4 {
            return invalid("output.tempo_bpm must be at least 4");
        }
        if out.ticks_per_quarter == 0 || out.ticks_per_quarter > 0x7FFF {
            return invalid("output.ticks_per_quarter must be in 1..=32767");
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> Result<()> {
    Err(Error::InvalidConfig(msg.to_string()))
}
