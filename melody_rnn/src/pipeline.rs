// One generation run, end to end.
//
// extract -> vocabulary -> window length -> training set -> train -> sample
// -> render -> write. Strictly sequential; any error aborts the run before
// the output file is touched. A single `MelodyRng` drives every random
// choice, so a configured seed reproduces the run exactly.

use crate::config::GeneratorConfig;
use crate::error::Result;
use crate::extract::extract_notes;
use crate::midi_out::{render_notes, write_midi};
use crate::model::{NextPitchModel, RnnModel};
use crate::sampler::{GeneratedNote, Sampler, StopReason};
use crate::sequence::{build_training_set, choose_window_length};
use crate::vocab::PitchVocabulary;
use melody_rnn_prng::MelodyRng;
use std::path::Path;

/// What a run did, for reporting.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub seed: u64,
    pub notes_extracted: usize,
    pub vocab_size: usize,
    pub window_length: usize,
    pub training_examples: usize,
    pub epoch_losses: Vec<f64>,
    /// Mean loss of the last epoch.
    pub final_loss: Option<f64>,
    pub generated: Vec<GeneratedNote>,
    pub stop_reason: StopReason,
    /// Length of the written melody in seconds.
    pub total_duration: f64,
}

/// Run the full pipeline and write the melody to `output_path`.
pub fn run<P: AsRef<Path>>(
    config: &GeneratorConfig,
    inputs: &[P],
    output_path: &Path,
) -> Result<RunSummary> {
    config.validate()?;
    let seed = match config.seed {
        Some(seed) => seed,
        None => MelodyRng::from_clock().next_u64(),
    };
    let mut rng = MelodyRng::new(seed);

    let notes = extract_notes(inputs)?;
    log::info!("extracted {} notes from {} files", notes.len(), inputs.len());

    let vocab = PitchVocabulary::from_notes(&notes)?;
    let indices = vocab.encode_notes(&notes);
    log::info!(
        "pitch vocabulary: {} pitches ({}..={})",
        vocab.len(),
        vocab.pitches()[0],
        vocab.pitches()[vocab.len() - 1]
    );

    let window = choose_window_length(&config.sequence, &mut rng);
    let data = build_training_set(&indices, window)?;
    log::info!(
        "training set: inputs [{}, {}], labels [{}]",
        data.len(),
        window,
        data.len()
    );

    let mut model = RnnModel::new(config.model.hidden_size, vocab.len(), &mut rng);
    log::info!(
        "model: hidden {}, {} output classes",
        model.hidden_size(),
        model.vocab_size()
    );
    let report = model.train(&data, &config.model, &mut rng);
    log::info!("training done after {} updates", report.optimizer_steps);

    let sampler = Sampler::seeded(&indices, window, &config.sampling, &config.duration, &mut rng)?;
    let (generated, stop_reason) = sampler.run(&model, &vocab, &mut rng)?;
    let rendered = render_notes(&generated, config.output.velocity);
    let total_duration = rendered.last().map(|n| n.end).unwrap_or(0.0);
    log::info!(
        "generated {} notes, {:.1}s ({:?})",
        generated.len(),
        total_duration,
        stop_reason
    );

    write_midi(&rendered, &config.output, output_path)?;
    log::info!("wrote {}", output_path.display());

    Ok(RunSummary {
        seed,
        notes_extracted: notes.len(),
        vocab_size: vocab.len(),
        window_length: window,
        training_examples: data.len(),
        final_loss: report.final_loss(),
        epoch_losses: report.epoch_losses,
        generated,
        stop_reason,
        total_duration,
    })
}
