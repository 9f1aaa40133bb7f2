// Pitch vocabulary: the classifier's label space.
//
// The distinct pitches seen in the training notes, sorted ascending, mapped
// to dense indices 0..len. Built once per run and never changed afterwards;
// the model's output layer has exactly `len()` classes.

use crate::error::{Error, Result};
use crate::note::NoteEvent;

#[derive(Clone, Debug)]
pub struct PitchVocabulary {
    /// index -> pitch, ascending.
    pitches: Vec<u8>,
    /// pitch -> index, for all 128 MIDI keys.
    index_of: [Option<usize>; 128],
}

impl PitchVocabulary {
    /// Build from observed notes. Fails on an empty note set.
    pub fn from_notes(notes: &[NoteEvent]) -> Result<Self> {
        Self::from_pitches(notes.iter().map(|n| n.pitch))
    }

    pub fn from_pitches(pitches: impl IntoIterator<Item = u8>) -> Result<Self> {
        let mut seen = [false; 128];
        for p in pitches {
            seen[(p & 0x7F) as usize] = true;
        }
        let pitches: Vec<u8> = (0u8..128).filter(|&p| seen[p as usize]).collect();
        if pitches.is_empty() {
            return Err(Error::EmptyNoteSet);
        }
        let mut index_of = [None; 128];
        for (i, &p) in pitches.iter().enumerate() {
            index_of[p as usize] = Some(i);
        }
        Ok(PitchVocabulary { pitches, index_of })
    }

    pub fn len(&self) -> usize {
        self.pitches.len()
    }

    /// Always false for a built vocabulary; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.pitches.is_empty()
    }

    pub fn encode(&self, pitch: u8) -> Option<usize> {
        self.index_of.get(pitch as usize).copied().flatten()
    }

    pub fn decode(&self, index: usize) -> Option<u8> {
        self.pitches.get(index).copied()
    }

    pub fn pitches(&self) -> &[u8] {
        &self.pitches
    }

    /// Encode every note's pitch. All pitches come from the notes the
    /// vocabulary was built from, so none are skipped in practice.
    pub fn encode_notes(&self, notes: &[NoteEvent]) -> Vec<usize> {
        notes.iter().filter_map(|n| self.encode(n.pitch)).collect()
    }
}
