//! LED frame buffers for the key and button planes.
//!
//! Device info:
//! - `0x80` report: colors of the control buttons.
//!   0: M, 1: S, 2-9: top row, 10-13: selector ring (left, top, bottom, right),
//!   14-43: plain on/off buttons, 44-68: strip under the two left wheels.
//! - `0x81` report: colors of the keys, 0-60.
//!
//! A color byte is `hue * 4 + brightness`. 0-3 is black, 68-71 is white.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use hidapi::HidDevice;
use num_derive::FromPrimitive;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::LightsError;

/// Slots in every LED buffer, as the device expects them on the wire.
pub const BUFFER_LEN: usize = 249;
pub const KEY_COUNT: usize = 61;
pub const BUTTON_COUNT: usize = 80;
pub const COLORFUL_BUTTON_COUNT: usize = 69;
/// Buttons that only know on/off; bulk color fills leave them dark.
pub const PLAIN_BUTTONS: RangeInclusive<usize> = 14..=43;

/// Button LED indices.
pub mod button {
    pub const M: usize = 0;
    pub const S: usize = 1;
    pub const TOP_ROW_START: usize = 2;
    pub const WHEEL_LEFT: usize = 10;
    pub const PLAY: usize = 29;
    pub const STRIP_END: usize = 68;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum Hue {
    Black = 0,
    Red,
    Orange0,
    Orange,
    Yellow,
    Yellow2,
    LightGreen,
    Green,
    Sea,
    LightBlue,
    Blue,
    DarkBlue,
    Purple,
    Purple2,
    Pink,
    Pink2,
    Pink3,
    White,
}

impl Hue {
    pub const COUNT: u8 = 18;

    const NAMES: [(&'static str, Hue); 18] = [
        ("black", Hue::Black),
        ("red", Hue::Red),
        ("orange0", Hue::Orange0),
        ("orange", Hue::Orange),
        ("yellow", Hue::Yellow),
        ("yellow2", Hue::Yellow2),
        ("light_green", Hue::LightGreen),
        ("green", Hue::Green),
        ("sea", Hue::Sea),
        ("light_blue", Hue::LightBlue),
        ("blue", Hue::Blue),
        ("dark_blue", Hue::DarkBlue),
        ("purple", Hue::Purple),
        ("purple2", Hue::Purple2),
        ("pink", Hue::Pink),
        ("pink2", Hue::Pink2),
        ("pink3", Hue::Pink3),
        ("white", Hue::White),
    ];

    /// Hue for a raw number, wrapping past white.
    pub fn wrapping(n: u8) -> Hue {
        num::FromPrimitive::from_u8(n % Self::COUNT).unwrap_or(Hue::Black)
    }

    /// Parses a configuration hue name (`"blue"`, `"dark_blue"`, ...).
    pub fn from_name(name: &str) -> Option<Hue> {
        let name = name.trim().to_ascii_lowercase();
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, hue)| *hue)
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        Self::NAMES.iter().map(|(n, _)| *n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum Brightness {
    Off = 0,
    Dim = 1,
    Normal = 2,
    Bright = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub hue: Hue,
    pub brightness: Brightness,
}

impl Color {
    pub const OFF: Color = Color::new(Hue::Black, Brightness::Off);

    pub const fn new(hue: Hue, brightness: Brightness) -> Self {
        Self { hue, brightness }
    }

    pub const fn to_byte(self) -> u8 {
        self.hue as u8 * 4 + self.brightness as u8
    }

    pub fn from_byte(byte: u8) -> Self {
        let brightness = num::FromPrimitive::from_u8(byte % 4).unwrap_or(Brightness::Off);
        Self::new(Hue::wrapping(byte / 4), brightness)
    }
}

impl From<Color> for u8 {
    fn from(color: Color) -> u8 {
        color.to_byte()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    Keys,
    Buttons,
}

impl Plane {
    pub const fn report_id(self) -> u8 {
        match self {
            Plane::Keys => 0x81,
            Plane::Buttons => 0x80,
        }
    }

    /// Number of addressable LEDs on this plane.
    pub const fn size(self) -> usize {
        match self {
            Plane::Keys => KEY_COUNT,
            Plane::Buttons => BUTTON_COUNT,
        }
    }
}

/// Destination for encoded LED reports.
pub trait LedSink: Send {
    fn send(&mut self, report: &[u8]) -> Result<(), LightsError>;
}

impl LedSink for HidDevice {
    fn send(&mut self, report: &[u8]) -> Result<(), LightsError> {
        self.write(report)?;
        Ok(())
    }
}

/// Current and default buffers for both planes.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffers {
    current_keys: [u8; BUFFER_LEN],
    current_buttons: [u8; BUFFER_LEN],
    default_keys: [u8; BUFFER_LEN],
    default_buttons: [u8; BUFFER_LEN],
}

impl FrameBuffers {
    pub fn new() -> Self {
        Self {
            current_keys: [0; BUFFER_LEN],
            current_buttons: [0; BUFFER_LEN],
            default_keys: [0; BUFFER_LEN],
            default_buttons: [0; BUFFER_LEN],
        }
    }

    pub fn current(&self, plane: Plane) -> &[u8; BUFFER_LEN] {
        match plane {
            Plane::Keys => &self.current_keys,
            Plane::Buttons => &self.current_buttons,
        }
    }

    pub fn default_frame(&self, plane: Plane) -> &[u8; BUFFER_LEN] {
        match plane {
            Plane::Keys => &self.default_keys,
            Plane::Buttons => &self.default_buttons,
        }
    }

    fn current_mut(&mut self, plane: Plane) -> &mut [u8; BUFFER_LEN] {
        match plane {
            Plane::Keys => &mut self.current_keys,
            Plane::Buttons => &mut self.current_buttons,
        }
    }

    fn plane_index(plane: Plane, index: i32) -> Option<usize> {
        usize::try_from(index).ok().filter(|&i| i < plane.size())
    }

    /// Sets one LED. Returns false, leaving the buffer untouched, when the
    /// index is outside the plane.
    pub fn set(&mut self, plane: Plane, index: i32, value: impl Into<u8>) -> bool {
        match Self::plane_index(plane, index) {
            Some(i) => {
                self.current_mut(plane)[i] = value.into();
                true
            }
            None => false,
        }
    }

    /// Copies the default color of one LED back into the current frame.
    pub fn restore(&mut self, plane: Plane, index: i32) -> bool {
        match Self::plane_index(plane, index) {
            Some(i) => {
                let value = self.default_frame(plane)[i];
                self.current_mut(plane)[i] = value;
                true
            }
            None => false,
        }
    }

    pub fn fill_keys(&mut self, color: Color) {
        self.current_keys[..KEY_COUNT].fill(color.to_byte());
    }

    pub fn fill_colorful_buttons(&mut self, color: Color) {
        for (i, slot) in self.current_buttons[..COLORFUL_BUTTON_COUNT]
            .iter_mut()
            .enumerate()
        {
            *slot = if PLAIN_BUTTONS.contains(&i) {
                Color::OFF.to_byte()
            } else {
                color.to_byte()
            };
        }
    }

    pub fn capture_default(&mut self, plane: Plane) {
        match plane {
            Plane::Keys => self.default_keys = self.current_keys,
            Plane::Buttons => self.default_buttons = self.current_buttons,
        }
    }

    pub fn clear(&mut self) {
        self.current_keys.fill(0);
        self.current_buttons.fill(0);
    }

    fn report(&self, plane: Plane) -> [u8; BUFFER_LEN + 1] {
        let mut report = [0u8; BUFFER_LEN + 1];
        report[0] = plane.report_id();
        report[1..].copy_from_slice(self.current(plane));
        report
    }
}

impl Default for FrameBuffers {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameBuffers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffers")
            .field("current_keys", &&self.current_keys[..KEY_COUNT])
            .field("current_buttons", &&self.current_buttons[..BUTTON_COUNT])
            .finish_non_exhaustive()
    }
}

struct Shared {
    frames: FrameBuffers,
    sink: Box<dyn LedSink>,
}

impl Shared {
    fn send_plane(&mut self, plane: Plane) -> Result<(), LightsError> {
        let report = self.frames.report(plane);
        self.sink.send(&report)
    }

    fn flush(&mut self) -> Result<(), LightsError> {
        self.send_plane(Plane::Keys)?;
        self.send_plane(Plane::Buttons)
    }
}

/// Owner of the LED frame buffers and the device write handle.
///
/// Every buffer access and every device write happens under one lock.
/// Write-throughs run on detached threads: they are serialized by the lock
/// but carry no ordering against mutations made after they were scheduled,
/// so whichever thread takes the lock last decides what the device shows.
#[derive(Clone)]
pub struct Lights {
    shared: Arc<Mutex<Shared>>,
}

impl Lights {
    pub fn new(sink: impl LedSink + 'static) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                frames: FrameBuffers::new(),
                sink: Box::new(sink),
            })),
        }
    }

    /// Runs `f` on the buffers under the lock. Nothing is written.
    pub fn update<R>(&self, f: impl FnOnce(&mut FrameBuffers) -> R) -> R {
        let mut shared = self.shared.lock();
        f(&mut shared.frames)
    }

    /// Runs `f` on the buffers and sends `plane` before releasing the lock.
    pub fn update_and_send<R>(
        &self,
        plane: Plane,
        f: impl FnOnce(&mut FrameBuffers) -> R,
    ) -> Result<R, LightsError> {
        let mut shared = self.shared.lock();
        let result = f(&mut shared.frames);
        shared.send_plane(plane)?;
        Ok(result)
    }

    pub fn snapshot(&self) -> FrameBuffers {
        self.shared.lock().frames.clone()
    }

    /// Sends both current buffers to the device from a detached thread,
    /// keys first. The handle can be dropped.
    pub fn write_through(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        thread::spawn(move || {
            let mut shared = shared.lock();
            if let Err(e) = shared.flush() {
                warn!("LED write failed: {e}");
            }
        })
    }

    fn set_and_write(&self, plane: Plane, index: i32, color: Color) -> bool {
        let accepted = self.update(|frames| frames.set(plane, index, color));
        if accepted {
            self.write_through();
        } else {
            warn!("{plane:?} index {index} out of range (0..{})", plane.size());
        }
        accepted
    }

    pub fn set_key(&self, index: i32, color: Color) -> bool {
        self.set_and_write(Plane::Keys, index, color)
    }

    pub fn set_button(&self, index: i32, color: Color) -> bool {
        self.set_and_write(Plane::Buttons, index, color)
    }

    /// Puts a key back to its default color.
    pub fn restore_key(&self, index: i32) -> bool {
        let accepted = self.update(|frames| frames.restore(Plane::Keys, index));
        if accepted {
            self.write_through();
        } else {
            warn!("Keys index {index} out of range (0..{KEY_COUNT})");
        }
        accepted
    }

    pub fn set_all_keys(&self, color: Color) {
        self.update(|frames| frames.fill_keys(color));
        self.write_through();
    }

    pub fn fill_colorful_buttons(&self, color: Color) {
        self.update(|frames| frames.fill_colorful_buttons(color));
        self.write_through();
    }

    /// Keys and colorful buttons in one color.
    pub fn paint_all(&self, color: Color) {
        self.update(|frames| {
            frames.fill_keys(color);
            frames.fill_colorful_buttons(color);
        });
        self.write_through();
    }

    pub fn capture_keys_as_default(&self) {
        self.update(|frames| frames.capture_default(Plane::Keys));
    }

    pub fn capture_buttons_as_default(&self) {
        self.update(|frames| frames.capture_default(Plane::Buttons));
    }

    pub fn all_off(&self) {
        debug!("lights off");
        self.update(FrameBuffers::clear);
        self.write_through();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Vec<u8>>>>);

    impl LedSink for Recorder {
        fn send(&mut self, report: &[u8]) -> Result<(), LightsError> {
            self.0.lock().push(report.to_vec());
            Ok(())
        }
    }

    struct Broken;

    impl LedSink for Broken {
        fn send(&mut self, _report: &[u8]) -> Result<(), LightsError> {
            Err(LightsError::SinkClosed)
        }
    }

    #[test]
    fn color_byte_is_hue_times_four_plus_brightness() {
        assert_eq!(Color::new(Hue::Black, Brightness::Off).to_byte(), 0);
        assert_eq!(Color::new(Hue::Blue, Brightness::Normal).to_byte(), 42);
        assert_eq!(Color::new(Hue::White, Brightness::Bright).to_byte(), 71);
        assert_eq!(
            Color::from_byte(42),
            Color::new(Hue::Blue, Brightness::Normal)
        );
    }

    #[test]
    fn hue_names() {
        assert_eq!(Hue::from_name("Dark_Blue"), Some(Hue::DarkBlue));
        assert_eq!(Hue::from_name("magenta"), None);
        assert_eq!(Hue::names().count(), Hue::COUNT as usize);
        assert_eq!(Hue::wrapping(19), Hue::Red);
    }

    #[test]
    fn out_of_range_sets_are_ignored() {
        let lights = Lights::new(Recorder::default());
        let before = lights.snapshot();
        let red = Color::new(Hue::Red, Brightness::Bright);

        assert!(!lights.set_key(-1, red));
        assert!(!lights.set_key(KEY_COUNT as i32, red));
        assert!(!lights.set_button(-12, red));
        assert!(!lights.set_button(BUTTON_COUNT as i32, red));
        assert!(!lights.restore_key(-3));
        assert_eq!(lights.snapshot(), before);

        assert!(lights.set_key(KEY_COUNT as i32 - 1, red));
        assert_eq!(lights.snapshot().current(Plane::Keys)[KEY_COUNT - 1], red.to_byte());
    }

    #[test]
    fn fresh_buffers_are_dark() {
        let frames = FrameBuffers::default();
        assert_eq!(frames, FrameBuffers::new());
        for plane in [Plane::Keys, Plane::Buttons] {
            assert!(frames.current(plane).iter().all(|&b| b == 0));
            assert!(frames.default_frame(plane).iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn colorful_fill_skips_plain_buttons() {
        let mut frames = FrameBuffers::default();
        let green = Color::new(Hue::Green, Brightness::Normal);
        frames.fill_colorful_buttons(green);

        let buttons = frames.current(Plane::Buttons);
        assert_eq!(buttons[0], green.to_byte());
        assert_eq!(buttons[13], green.to_byte());
        assert!(buttons[14..=43].iter().all(|&b| b == 0));
        assert_eq!(buttons[44], green.to_byte());
        assert_eq!(buttons[68], green.to_byte());
        assert_eq!(buttons[69], 0);
    }

    #[test]
    fn write_through_sends_keys_then_buttons() {
        let recorder = Recorder::default();
        let lights = Lights::new(recorder.clone());
        lights.update(|frames| {
            frames.set(Plane::Keys, 3, 9u8);
            frames.set(Plane::Buttons, 4, 7u8);
        });
        lights.write_through().join().unwrap();

        let reports = recorder.0.lock();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].len(), BUFFER_LEN + 1);
        assert_eq!(reports[0][0], 0x81);
        assert_eq!(reports[0][1 + 3], 9);
        assert_eq!(reports[1][0], 0x80);
        assert_eq!(reports[1][1 + 4], 7);
    }

    #[test]
    fn capture_and_restore() {
        let lights = Lights::new(Recorder::default());
        let white = Color::new(Hue::White, Brightness::Normal);
        lights.set_all_keys(white);
        lights.capture_keys_as_default();
        lights.set_key(5, Color::new(Hue::Red, Brightness::Dim));
        assert!(lights.restore_key(5));
        assert_eq!(lights.snapshot().current(Plane::Keys)[5], white.to_byte());
        assert_eq!(lights.snapshot().default_frame(Plane::Buttons)[0], 0);
    }

    #[test]
    fn all_off_zeroes_current_but_keeps_defaults() {
        let lights = Lights::new(Recorder::default());
        let blue = Color::new(Hue::Blue, Brightness::Normal);
        lights.paint_all(blue);
        lights.capture_keys_as_default();
        lights.capture_buttons_as_default();
        lights.all_off();

        let frames = lights.snapshot();
        assert!(frames.current(Plane::Keys).iter().all(|&b| b == 0));
        assert!(frames.current(Plane::Buttons).iter().all(|&b| b == 0));
        assert_eq!(frames.default_frame(Plane::Keys)[0], blue.to_byte());
    }

    #[test]
    fn failed_writes_are_not_fatal() {
        let lights = Lights::new(Broken);
        lights.set_key(0, Color::new(Hue::Red, Brightness::Dim));
        lights.write_through().join().unwrap();
        assert!(
            lights
                .update_and_send(Plane::Buttons, |frames| frames.set(Plane::Buttons, 0, 1u8))
                .is_err()
        );
    }
}
