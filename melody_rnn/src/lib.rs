// Melody RNN
//
// Trains a small recurrent network on the pitches of a few MIDI files and
// samples a new melody from it. The run is one straight pipeline with no
// persistence: parse the inputs, index their pitches, cut the index sequence
// into overlapping windows, fit the network, sample notes with temperature,
// write a MIDI file.
//
// Architecture:
// - note.rs: NoteEvent, the pitch/time/velocity record shared by input and output
// - extract.rs: MIDI parsing and note flattening (tempo-aware tick -> seconds)
// - vocab.rs: sorted pitch vocabulary, pitch <-> dense index bijection
// - sequence.rs: window length choice and (window, next index) training pairs
// - model.rs: Elman RNN + softmax head, BPTT training, NextPitchModel trait
// - optim.rs: Adam optimizer over flat weight buffers
// - sampler.rs: Seeded -> Generating -> Done sampling with temperature
// - midi_out.rs: timeline rendering and single-track MIDI writing
// - pipeline.rs: the end-to-end run
// - config.rs: JSON-loadable run configuration
// - error.rs: the crate's error type
//
// All randomness comes from `melody_rnn_prng`, so a seeded run is
// reproducible.

pub mod config;
pub mod error;
pub mod extract;
pub mod midi_out;
pub mod model;
pub mod note;
pub mod optim;
pub mod pipeline;
pub mod sampler;
pub mod sequence;
pub mod vocab;

pub use error::{Error, Result};
