//! Note events read from a standard MIDI file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use midly::{MidiMessage, Smf, Timing, TrackEventKind};
use tracing::debug;

use crate::error::ScoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub kind: NoteKind,
    pub channel: u8,
    pub key: u8,
    pub velocity: u8,
    /// Ticks since the previous note event of the score.
    pub delta_ticks: u32,
    pub track: usize,
}

/// Fixed playback speed: a tick resolution and a tempo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    ticks_per_quarter: u16,
    beats_per_minute: f64,
}

impl Tempo {
    pub fn new(ticks_per_quarter: u16, beats_per_minute: f64) -> Result<Self, ScoreError> {
        if ticks_per_quarter == 0 {
            return Err(ScoreError::Timing("ticks per quarter note must be positive".into()));
        }
        if !(beats_per_minute.is_finite() && beats_per_minute > 0.0) {
            return Err(ScoreError::Timing(format!(
                "tempo must be positive (got {beats_per_minute} bpm)"
            )));
        }
        Ok(Self {
            ticks_per_quarter,
            beats_per_minute,
        })
    }

    pub fn micros_per_quarter(&self) -> f64 {
        60_000_000.0 / self.beats_per_minute
    }

    pub fn delay(&self, delta_ticks: u32) -> Duration {
        let micros = f64::from(delta_ticks) * self.micros_per_quarter()
            / f64::from(self.ticks_per_quarter);
        Duration::from_secs_f64(micros / 1_000_000.0)
    }
}

/// Note-on and note-off events of every track, merged into one timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Score {
    events: Vec<NoteEvent>,
}

impl Score {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScoreError> {
        let bytes = fs::read(path.as_ref())?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ScoreError> {
        let smf = Smf::parse(bytes)?;
        if let Timing::Metrical(tpq) = smf.header.timing {
            debug!(
                "score: {} tracks, file resolution {} ticks per quarter",
                smf.tracks.len(),
                tpq.as_int()
            );
        }

        // (absolute tick, event); the stable sort keeps track order on ties.
        let mut timeline = Vec::new();
        for (track, events) in smf.tracks.iter().enumerate() {
            let mut tick: u64 = 0;
            for event in events {
                tick += u64::from(event.delta.as_int());
                let TrackEventKind::Midi { channel, message } = event.kind else {
                    continue;
                };
                let (kind, key, vel) = match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        (NoteKind::On, key, vel)
                    }
                    MidiMessage::NoteOn { key, vel } | MidiMessage::NoteOff { key, vel } => {
                        (NoteKind::Off, key, vel)
                    }
                    _ => continue,
                };
                timeline.push((
                    tick,
                    NoteEvent {
                        kind,
                        channel: channel.as_int(),
                        key: key.as_int(),
                        velocity: vel.as_int(),
                        delta_ticks: 0,
                        track,
                    },
                ));
            }
        }
        timeline.sort_by_key(|(tick, _)| *tick);

        let mut last = 0;
        let events = timeline
            .into_iter()
            .map(|(tick, mut event)| {
                event.delta_ticks = u32::try_from(tick - last).unwrap_or(u32::MAX);
                last = tick;
                event
            })
            .collect();
        Ok(Self { events })
    }

    pub fn events(&self) -> &[NoteEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u4, u7, u15, u28};
    use midly::{Format, Header, MetaMessage, TrackEvent};

    fn midi(delta: u32, channel: u8, message: MidiMessage) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(channel),
                message,
            },
        }
    }

    fn on(key: u8, vel: u8) -> MidiMessage {
        MidiMessage::NoteOn {
            key: u7::new(key),
            vel: u7::new(vel),
        }
    }

    fn end() -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        }
    }

    fn encode(tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
        let format = if tracks.len() > 1 {
            Format::Parallel
        } else {
            Format::SingleTrack
        };
        let mut smf = Smf::new(Header::new(format, Timing::Metrical(u15::new(404))));
        smf.tracks = tracks;
        let mut bytes = Vec::new();
        smf.write_std(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn tempo_matches_fixed_resolution() {
        let tempo = Tempo::new(404, 113.0).unwrap();
        assert!((tempo.micros_per_quarter() - 530_973.45).abs() < 0.01);
        let quarter = tempo.delay(404);
        assert_eq!(quarter.as_millis(), 530);
        assert_eq!(tempo.delay(0), Duration::ZERO);
        assert!(Tempo::new(0, 113.0).is_err());
        assert!(Tempo::new(404, 0.0).is_err());
    }

    #[test]
    fn zero_velocity_note_on_is_note_off() {
        let note_off = MidiMessage::NoteOff {
            key: u7::new(62),
            vel: u7::new(64),
        };
        let volume = MidiMessage::Controller {
            controller: u7::new(7),
            value: u7::new(100),
        };
        let bytes = encode(vec![vec![
            midi(0, 0, on(60, 80)),
            TrackEvent {
                delta: u28::new(100),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(midly::num::u24::new(500_000))),
            },
            midi(20, 0, on(60, 0)),
            midi(10, 3, note_off),
            midi(0, 3, volume),
            end(),
        ]]);
        let score = Score::parse(&bytes).unwrap();
        let events = score.events();
        assert_eq!(events.len(), 3);
        assert_eq!((events[0].kind, events[0].delta_ticks), (NoteKind::On, 0));
        // The tempo event's ticks carry into the next note.
        let second = &events[1];
        assert_eq!((second.kind, second.key, second.delta_ticks), (NoteKind::Off, 60, 120));
        let third = &events[2];
        assert_eq!((third.channel, third.key, third.delta_ticks), (3, 62, 10));
    }

    #[test]
    fn tracks_are_merged_by_time() {
        let bytes = encode(vec![
            vec![midi(0, 0, on(60, 90)), midi(50, 0, on(60, 0)), end()],
            vec![midi(25, 6, on(64, 90)), midi(50, 6, on(64, 0)), end()],
        ]);
        let score = Score::parse(&bytes).unwrap();
        let order: Vec<_> = score
            .events()
            .iter()
            .map(|e| (e.track, e.key, e.kind, e.delta_ticks))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, 60, NoteKind::On, 0),
                (1, 64, NoteKind::On, 25),
                (0, 60, NoteKind::Off, 25),
                (1, 64, NoteKind::Off, 25),
            ]
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            Score::parse(b"definitely not a midi file"),
            Err(ScoreError::Midi(_))
        ));
        assert!(matches!(
            Score::load("/nonexistent/score.mid"),
            Err(ScoreError::Io(_))
        ));
    }
}
