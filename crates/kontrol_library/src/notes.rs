//! Note events to key LEDs.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::lights::{Brightness, Color, Hue, Lights};
use crate::session::Session;

/// Lowest note on the keybed is C2 (36), so note 36 lights key 0.
pub const DEFAULT_KEY_OFFSET: i32 = -36;
pub const SEMITONES_PER_OCTAVE: i32 = 12;
/// Velocities above this light a key at normal brightness, others dim.
pub const VELOCITY_THRESHOLD: u8 = 40;

/// Hue per MIDI channel. Unmapped channels use hue `channel + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHues {
    hues: HashMap<u8, Hue>,
}

impl ChannelHues {
    pub fn new(hues: impl IntoIterator<Item = (u8, Hue)>) -> Self {
        Self {
            hues: hues.into_iter().collect(),
        }
    }

    pub fn hue(&self, channel: u8) -> Hue {
        match self.hues.get(&channel) {
            Some(hue) => *hue,
            None => {
                debug!("no hue mapped for channel {channel}");
                Hue::wrapping(channel.wrapping_add(1))
            }
        }
    }
}

impl Default for ChannelHues {
    fn default() -> Self {
        Self::new([
            (0, Hue::Blue),
            (6, Hue::Green),
            (11, Hue::DarkBlue),
            (12, Hue::Green),
            (14, Hue::Pink),
        ])
    }
}

/// Lights keys for incoming notes and restores them on note-off.
#[derive(Clone)]
pub struct KeyPainter {
    lights: Lights,
    session: Arc<Session>,
    hues: Arc<ChannelHues>,
    key_offset: i32,
}

impl KeyPainter {
    pub fn new(lights: Lights, session: Arc<Session>, hues: ChannelHues, key_offset: i32) -> Self {
        Self {
            lights,
            session,
            hues: Arc::new(hues),
            key_offset,
        }
    }

    pub fn key_for(&self, note: u8) -> i32 {
        i32::from(note) + self.key_offset + self.session.octave_shift() * SEMITONES_PER_OCTAVE
    }

    pub fn color_for(&self, channel: u8, velocity: u8) -> Color {
        let brightness = if velocity > VELOCITY_THRESHOLD {
            Brightness::Normal
        } else {
            Brightness::Dim
        };
        Color::new(self.hues.hue(channel), brightness)
    }

    /// Returns the key index that was lit, if it is on the keybed.
    pub fn note_on(&self, note: u8, channel: u8, velocity: u8) -> Option<i32> {
        let key = self.key_for(note);
        debug!("note on: {note}, channel {channel}, velocity {velocity} -> key {key}");
        self.lights
            .set_key(key, self.color_for(channel, velocity))
            .then_some(key)
    }

    pub fn note_off(&self, note: u8, channel: u8) {
        let key = self.key_for(note);
        debug!("note off: {note}, channel {channel} -> key {key}");
        if key < 0 {
            return;
        }
        self.lights.restore_key(key);
    }
}
