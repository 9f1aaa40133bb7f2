// Note events shared by the extractor and the writer.

/// One sounding note. Times are in seconds from the start of the file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteEvent {
    /// MIDI note number, 0..=127.
    pub pitch: u8,
    pub start: f64,
    pub end: f64,
    pub velocity: u8,
}

impl NoteEvent {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}
