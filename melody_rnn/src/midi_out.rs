// MIDI output for generated melodies.
//
// `render_notes` lays the sampled notes end to end on a running clock; each
// note keeps the duration drawn when it was sampled. `write_midi` turns the
// resulting `NoteEvent`s into a single-track Standard MIDI File (format 0)
// holding one instrument: track name, tempo, program change, the notes, end
// of track.
//
// Seconds map to ticks through the same microseconds-per-quarter value that
// is written as the tempo event, so reading the file back with extract.rs
// reproduces every start and end to within one tick. A tempo or gap that
// does not fit midly's 24-bit tempo or 28-bit delta fields is an error rather
// than a silently truncated file.
//
// Uses the `midly` crate for encoding.

use crate::config::OutputParams;
use crate::error::{Error, Result};
use crate::note::NoteEvent;
use crate::sampler::GeneratedNote;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

const TRACK_NAME: &str = "Generated Melody";

const CHANNEL: u8 = 0;

/// Place generated notes back to back starting at 0 s.
pub fn render_notes(generated: &[GeneratedNote], velocity: u8) -> Vec<NoteEvent> {
    let mut clock = 0.0;
    generated
        .iter()
        .map(|g| {
            let start = clock;
            clock += g.duration;
            NoteEvent {
                pitch: g.pitch,
                start,
                end: clock,
                velocity,
            }
        })
        .collect()
}

/// Encode `notes` and write them to `path`.
pub fn write_midi(notes: &[NoteEvent], output: &OutputParams, path: &Path) -> Result<()> {
    let buf = encode_midi(notes, output)?;
    std::fs::write(path, &buf).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Encode `notes` as an in-memory Standard MIDI File.
pub fn encode_midi(notes: &[NoteEvent], output: &OutputParams) -> Result<Vec<u8>> {
    let smf = notes_to_smf(notes, output)?;
    let mut buf = Vec::new();
    smf.write_std(&mut buf).map_err(Error::MidiEncode)?;
    Ok(buf)
}

fn micros_per_quarter(output: &OutputParams) -> u32 {
    60_000_000 / output.tempo_bpm.max(1) as u32
}

/// Float-to-int `as` saturates, so huge or negative times clamp instead of
/// wrapping.
fn seconds_to_ticks(seconds: f64, output: &OutputParams) -> u64 {
    let quarters = seconds * 1_000_000.0 / micros_per_quarter(output) as f64;
    (quarters * output.ticks_per_quarter as f64).round().max(0.0) as u64
}

fn delta(ticks: u64) -> Result<u28> {
    u32::try_from(ticks)
        .ok()
        .and_then(u28::try_from)
        .ok_or(Error::DeltaOverflow { ticks })
}

fn notes_to_smf(notes: &[NoteEvent], output: &OutputParams) -> Result<Smf<'static>> {
    let micros = micros_per_quarter(output);
    let tempo = u24::try_from(micros).ok_or_else(|| {
        Error::InvalidConfig(format!(
            "tempo of {} BPM needs {micros} us per quarter, more than a MIDI tempo event holds",
            output.tempo_bpm
        ))
    })?;
    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(output.ticks_per_quarter)),
    ));
    let channel = u4::new(CHANNEL);

    // (tick, is_note_on, pitch, velocity). Offs sort before ons at the same
    // tick so back-to-back repeats of one pitch pair up correctly.
    let mut events: Vec<(u64, bool, u8, u8)> = Vec::with_capacity(notes.len() * 2);
    for note in notes {
        let start = seconds_to_ticks(note.start, output);
        let end = seconds_to_ticks(note.end, output).max(start + 1);
        events.push((start, true, note.pitch, note.velocity));
        events.push((end, false, note.pitch, 0));
    }
    events.sort_by_key(|&(tick, is_on, _, _)| (tick, is_on));

    let mut track: Track<'static> = Vec::with_capacity(events.len() + 4);
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(TRACK_NAME.as_bytes())),
    });
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(tempo)),
    });
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: u7::new(output.program & 0x7F),
            },
        },
    });

    let mut last_tick = 0u64;
    for (tick, is_on, pitch, velocity) in events {
        let key = u7::new(pitch & 0x7F);
        let message = if is_on {
            MidiMessage::NoteOn {
                key,
                vel: u7::new(velocity.clamp(1, 127)),
            }
        } else {
            MidiMessage::NoteOff { key, vel: u7::new(0) }
        };
        track.push(TrackEvent {
            delta: delta(tick - last_tick)?,
            kind: TrackEventKind::Midi { channel, message },
        });
        last_tick = tick;
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);
    Ok(smf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::parse_notes;

    fn generated(pitches: &[u8], durations: &[f64]) -> Vec<GeneratedNote> {
        pitches
            .iter()
            .zip(durations)
            .enumerate()
            .map(|(index, (&pitch, &duration))| GeneratedNote {
                index,
                pitch,
                duration,
            })
            .collect()
    }

    #[test]
    fn render_uses_each_notes_own_duration() {
        let notes = render_notes(&generated(&[60, 62, 64], &[0.5, 0.25, 1.0]), 100);
        let spans: Vec<(f64, f64)> = notes.iter().map(|n| (n.start, n.end)).collect();
        assert_eq!(spans, vec![(0.0, 0.5), (0.5, 0.75), (0.75, 1.75)]);
        assert!(notes.iter().all(|n| n.velocity == 100));
    }

    #[test]
    fn smf_has_one_track_with_one_instrument() {
        let notes = render_notes(&generated(&[60, 64], &[0.5, 0.5]), 100);
        let smf = notes_to_smf(&notes, &OutputParams::default()).unwrap();
        assert_eq!(smf.header.format, Format::SingleTrack);
        assert_eq!(smf.tracks.len(), 1);
        let programs = smf.tracks[0]
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    TrackEventKind::Midi {
                        message: MidiMessage::ProgramChange { .. },
                        ..
                    }
                )
            })
            .count();
        assert_eq!(programs, 1);
    }

    #[test]
    fn round_trip_preserves_notes() {
        let output = OutputParams::default();
        let tick = 60.0 / output.tempo_bpm as f64 / output.ticks_per_quarter as f64;
        let written = render_notes(
            &generated(
                &[60, 60, 67, 72, 55, 60],
                &[0.31, 0.77, 0.25, 0.999, 0.5, 0.62],
            ),
            100,
        );
        let bytes = encode_midi(&written, &output).unwrap();
        let read = parse_notes(&bytes).unwrap();

        assert_eq!(read.len(), written.len());
        for (r, w) in read.iter().zip(&written) {
            assert_eq!(r.pitch, w.pitch);
            assert_eq!(r.velocity, 100);
            assert!((r.start - w.start).abs() <= tick, "start {} vs {}", r.start, w.start);
            assert!((r.end - w.end).abs() <= tick, "end {} vs {}", r.end, w.end);
        }
    }

    #[test]
    fn round_trip_at_other_tempo() {
        let output = OutputParams {
            tempo_bpm: 90,
            ticks_per_quarter: 96,
            ..OutputParams::default()
        };
        let tick = 60.0 / output.tempo_bpm as f64 / output.ticks_per_quarter as f64;
        let written = render_notes(&generated(&[50, 52, 53], &[0.4, 0.8, 1.2]), 70);
        let read = parse_notes(&encode_midi(&written, &output).unwrap()).unwrap();
        assert_eq!(read.len(), 3);
        for (r, w) in read.iter().zip(&written) {
            assert!((r.end - w.end).abs() <= tick);
        }
    }

    #[test]
    fn slowest_valid_tempo_round_trips() {
        let output = OutputParams {
            tempo_bpm: 4,
            ..OutputParams::default()
        };
        let written = render_notes(&generated(&[60, 62], &[1.0, 1.0]), 100);
        let read = parse_notes(&encode_midi(&written, &output).unwrap()).unwrap();
        let tick = 60.0 / output.tempo_bpm as f64 / output.ticks_per_quarter as f64;
        assert_eq!(read.len(), 2);
        for (r, w) in read.iter().zip(&written) {
            assert!((r.start - w.start).abs() <= tick, "start {} vs {}", r.start, w.start);
            assert!((r.end - w.end).abs() <= tick, "end {} vs {}", r.end, w.end);
        }
    }

    #[test]
    fn tempo_too_slow_for_a_tempo_event_is_rejected() {
        let output = OutputParams {
            tempo_bpm: 2,
            ..OutputParams::default()
        };
        let notes = render_notes(&generated(&[60, 62], &[1.0, 1.0]), 100);
        let result = encode_midi(&notes, &output);
        assert!(matches!(result, Err(Error::InvalidConfig(_))), "{result:?}");
    }

    #[test]
    fn gap_wider_than_a_delta_time_is_rejected() {
        // 300000 s at 120 BPM and 480 ticks per quarter is 288M ticks, past
        // the 28-bit limit of 268435455.
        let notes = render_notes(&generated(&[60], &[300_000.0]), 100);
        let result = encode_midi(&notes, &OutputParams::default());
        assert!(
            matches!(result, Err(Error::DeltaOverflow { ticks: 288_000_000 })),
            "{result:?}"
        );
    }

    #[test]
    fn write_midi_reports_bad_path() {
        let result = write_midi(
            &[],
            &OutputParams::default(),
            Path::new("/nonexistent/melody_rnn/out.mid"),
        );
        assert!(matches!(result, Err(Error::Io { .. })));
    }
}
