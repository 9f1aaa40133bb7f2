// Error type for a generation run.
//
// Every failure is terminal: the pipeline propagates these with `?` and the
// binary prints the message and exits. Numeric trouble in the sampler is not
// an error; it is absorbed by the probability floor in sampler.rs.

use std::path::PathBuf;

/// Errors from loading inputs, validating config, and writing output.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("MIDI parse error in {path}: {source}")]
    MidiParse {
        path: PathBuf,
        #[source]
        source: midly::Error,
    },

    #[error("failed to encode MIDI output: {0}")]
    MidiEncode(#[source] std::io::Error),

    #[error("gap of {ticks} ticks between MIDI events exceeds the 28-bit delta-time limit")]
    DeltaOverflow { ticks: u64 },

    #[error("invalid config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("no input MIDI files given")]
    NoInputFiles,

    #[error("input files contain no notes")]
    EmptyNoteSet,

    #[error(
        "window length {window} leaves no training pairs: {notes} notes available, at least {} needed",
        .window + 2
    )]
    WindowTooLong { notes: usize, window: usize },

    #[error("model predicts over {model} classes but the vocabulary has {vocab} pitches")]
    VocabularyMismatch { model: usize, vocab: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
