// Note extraction from Standard MIDI Files.
//
// Parses each input with `midly` and flattens every note of every instrument
// into one sequence. Order is encounter order, not time order: file order,
// then track order, then instrument order within the track (a track's
// channels in the order their first note-on appears), then the order in
// which notes finish. No deduplication and no overlap checks.
//
// Ticks become seconds through a tempo map built from all `Tempo` meta events
// in the file, so multi-track files with a separate conductor track convert
// correctly. Timecode (SMPTE) files use a fixed tick rate instead: frames
// per second times ticks per frame, where a declared 0 counts as one tick
// per frame.
//
// Note pairing: a note-on with velocity 0 counts as a note-off, and a
// note-off closes the oldest open note with the same channel and key. Notes
// left open when a track ends are dropped.

use crate::error::{Error, Result};
use crate::note::NoteEvent;
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::VecDeque;
use std::path::Path;

/// Tempo assumed before the first tempo event (120 BPM).
const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

/// Read and flatten notes from every file, in the given order.
pub fn extract_notes<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<NoteEvent>> {
    if paths.is_empty() {
        return Err(Error::NoInputFiles);
    }
    let mut notes = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let smf = Smf::parse(&bytes).map_err(|source| Error::MidiParse {
            path: path.to_path_buf(),
            source,
        })?;
        let file_notes = notes_from_smf(&smf);
        let sounding: f64 = file_notes.iter().map(NoteEvent::duration).sum();
        log::debug!(
            "{}: {} notes, {:.1}s sounding",
            path.display(),
            file_notes.len(),
            sounding
        );
        notes.extend(file_notes);
    }
    Ok(notes)
}

/// Flatten notes from an in-memory MIDI file.
pub fn parse_notes(bytes: &[u8]) -> std::result::Result<Vec<NoteEvent>, midly::Error> {
    let smf = Smf::parse(bytes)?;
    Ok(notes_from_smf(&smf))
}

fn notes_from_smf(smf: &Smf) -> Vec<NoteEvent> {
    let clock = TickClock::new(smf);
    let mut notes = Vec::new();
    for track in &smf.tracks {
        let mut instruments: Vec<Instrument> = Vec::new();
        let mut tick: u64 = 0;
        for event in track {
            tick += event.delta.as_int() as u64;
            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    let slot = instrument_slot(&mut instruments, channel);
                    slot.open[key.as_int() as usize].push_back((tick, vel.as_int()));
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    let Some(slot) = instruments.iter_mut().find(|i| i.channel == channel)
                    else {
                        continue;
                    };
                    if let Some((start_tick, velocity)) =
                        slot.open[key.as_int() as usize].pop_front()
                    {
                        slot.notes.push(NoteEvent {
                            pitch: key.as_int(),
                            start: clock.seconds(start_tick),
                            end: clock.seconds(tick),
                            velocity,
                        });
                    }
                }
                _ => {}
            }
        }
        for instrument in instruments {
            notes.extend(instrument.notes);
        }
    }
    notes
}

/// Notes of one channel within one track.
struct Instrument {
    channel: u8,
    /// Open notes per key: (start tick, velocity), oldest first.
    open: Vec<VecDeque<(u64, u8)>>,
    notes: Vec<NoteEvent>,
}

fn instrument_slot(instruments: &mut Vec<Instrument>, channel: u8) -> &mut Instrument {
    let pos = match instruments.iter().position(|i| i.channel == channel) {
        Some(pos) => pos,
        None => {
            instruments.push(Instrument {
                channel,
                open: vec![VecDeque::new(); 128],
                notes: Vec::new(),
            });
            instruments.len() - 1
        }
    };
    &mut instruments[pos]
}

/// Converts absolute ticks to seconds for one file.
enum TickClock {
    /// Metrical timing: ticks per quarter plus tempo segments sorted by tick.
    Metrical {
        ticks_per_quarter: f64,
        /// (start tick, seconds elapsed at that tick, microseconds per quarter)
        segments: Vec<(u64, f64, u32)>,
    },
    Timecode {
        ticks_per_second: f64,
    },
}

impl TickClock {
    fn new(smf: &Smf) -> Self {
        match smf.header.timing {
            Timing::Timecode(fps, subframes) => TickClock::Timecode {
                ticks_per_second: fps.as_f32() as f64 * subframes.max(1) as f64,
            },
            Timing::Metrical(tpq) => {
                let ticks_per_quarter = tpq.as_int().max(1) as f64;
                let mut changes: Vec<(u64, u32)> = Vec::new();
                for track in &smf.tracks {
                    let mut tick: u64 = 0;
                    for event in track {
                        tick += event.delta.as_int() as u64;
                        if let TrackEventKind::Meta(MetaMessage::Tempo(t)) = event.kind {
                            changes.push((tick, t.as_int()));
                        }
                    }
                }
                // Stable: same-tick changes keep file order, the last one wins.
                changes.sort_by_key(|&(tick, _)| tick);

                let mut segments = Vec::new();
                let mut current = (0u64, 0.0f64, DEFAULT_MICROS_PER_QUARTER);
                for (tick, micros) in changes {
                    let (seg_tick, seg_secs, seg_micros) = current;
                    let secs = seg_secs
                        + (tick - seg_tick) as f64 * seg_micros as f64
                            / 1_000_000.0
                            / ticks_per_quarter;
                    if tick > seg_tick {
                        segments.push(current);
                    }
                    current = (tick, secs, micros);
                }
                segments.push(current);
                TickClock::Metrical {
                    ticks_per_quarter,
                    segments,
                }
            }
        }
    }

    fn seconds(&self, tick: u64) -> f64 {
        match self {
            TickClock::Timecode { ticks_per_second } => tick as f64 / ticks_per_second,
            TickClock::Metrical {
                ticks_per_quarter,
                segments,
            } => {
                let idx = segments.partition_point(|&(start, _, _)| start <= tick);
                let (seg_tick, seg_secs, micros) = segments[idx.saturating_sub(1)];
                seg_secs + (tick - seg_tick) as f64 * micros as f64 / 1_000_000.0 / ticks_per_quarter
            }
        }
    }
}
