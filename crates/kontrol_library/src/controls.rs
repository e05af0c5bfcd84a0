//! Input report layout and the decoded device state.

use crate::error::DecodeError;

/// Shortest report the decoder accepts.
pub const REPORT_LEN: usize = 42;
/// Width of the top-row and bottom-row arrays.
pub const ROW_LEN: usize = 8;

/// Report discriminators (first byte).
pub mod report_type {
    pub const FULL: u8 = 1;
    pub const WHEELS: u8 = 170;
}

const TOP_ROW_BYTE: usize = 1;
const TOP_ROW_MASKS: [u8; ROW_LEN] = [16, 32, 64, 128, 1, 2, 4, 8];
const BOTTOM_TOUCH_BYTE: usize = 7;
const BOTTOM_TOUCH_MASKS: [u8; ROW_LEN] = [128, 64, 32, 16, 8, 4, 2, 1];
const BOTTOM_PITCH_BYTE: usize = 10;
const SELECTOR_PITCH_BYTE: usize = 30;
const RIGHT_WHEEL_LO_BYTE: usize = 33;
const RIGHT_WHEEL_HI_BYTE: usize = 34;
const LEFT_WHEEL_BYTE: usize = 35;
const STRIP_BYTE: usize = 37;
/// The right wheel's high byte idles at 32.
const RIGHT_WHEEL_HI_BIAS: i32 = 32;

/// Every logical input of the controller, in declaration order.
///
/// The order of the variants is the order in which changes are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    TopRowButtons,
    BottomRowTouched,
    BottomRowPitch,
    SelectorTouched,
    SelectorPressed,
    SelectorPitch,
    SelectorLeft,
    SelectorTop,
    SelectorBottom,
    SelectorRight,
    M,
    S,
    Shift,
    Scale,
    Arp,
    Undo,
    Quantize,
    Auto,
    Scene,
    Pattern,
    Track,
    KeyMode,
    Clear,
    PresetUp,
    PresetDown,
    Left,
    Right,
    Loop,
    Metro,
    Tempo,
    Play,
    Rec,
    Stop,
    Browser,
    PlugIn,
    Mixer,
    Instance,
    Midi,
    Setup,
    FixedVel,
    OctaveDecrease,
    OctaveIncrease,
    LeftWheelPitch,
    StripValue,
    RightWheelPitch,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::TopRowButtons => "top_row_buttons",
            Field::BottomRowTouched => "bottom_row_touched",
            Field::BottomRowPitch => "bottom_row_pitch",
            Field::SelectorTouched => "selector_touched",
            Field::SelectorPressed => "selector_pressed",
            Field::SelectorPitch => "selector_pitch",
            Field::SelectorLeft => "selector_left",
            Field::SelectorTop => "selector_top",
            Field::SelectorBottom => "selector_bottom",
            Field::SelectorRight => "selector_right",
            Field::M => "m",
            Field::S => "s",
            Field::Shift => "shift",
            Field::Scale => "scale",
            Field::Arp => "arp",
            Field::Undo => "undo",
            Field::Quantize => "quantize",
            Field::Auto => "auto",
            Field::Scene => "scene",
            Field::Pattern => "pattern",
            Field::Track => "track",
            Field::KeyMode => "key_mode",
            Field::Clear => "clear",
            Field::PresetUp => "preset_up",
            Field::PresetDown => "preset_down",
            Field::Left => "left",
            Field::Right => "right",
            Field::Loop => "loop",
            Field::Metro => "metro",
            Field::Tempo => "tempo",
            Field::Play => "play",
            Field::Rec => "rec",
            Field::Stop => "stop",
            Field::Browser => "browser",
            Field::PlugIn => "plug_in",
            Field::Mixer => "mixer",
            Field::Instance => "instance",
            Field::Midi => "midi",
            Field::Setup => "setup",
            Field::FixedVel => "fixed_vel",
            Field::OctaveDecrease => "octave_decrease",
            Field::OctaveIncrease => "octave_increase",
            Field::LeftWheelPitch => "left_wheel_pitch",
            Field::StripValue => "strip_value",
            Field::RightWheelPitch => "right_wheel_pitch",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Single-bit flags of a full report: `(field, byte, mask)`.
pub const FLAG_LAYOUT: [(Field, usize, u8); 38] = [
    (Field::SelectorTouched, 6, 4),
    (Field::SelectorPressed, 6, 8),
    (Field::SelectorLeft, 6, 16),
    (Field::SelectorTop, 6, 32),
    (Field::SelectorBottom, 6, 64),
    (Field::SelectorRight, 6, 128),
    (Field::M, 4, 1),
    (Field::S, 4, 2),
    (Field::Shift, 2, 128),
    (Field::Scale, 2, 8),
    (Field::Arp, 2, 4),
    (Field::Undo, 2, 64),
    (Field::Quantize, 2, 2),
    (Field::Auto, 2, 1),
    (Field::Scene, 4, 4),
    (Field::Pattern, 4, 8),
    (Field::Track, 4, 16),
    (Field::KeyMode, 4, 64),
    (Field::Clear, 4, 32),
    (Field::PresetUp, 3, 16),
    (Field::PresetDown, 3, 64),
    (Field::Left, 3, 128),
    (Field::Right, 3, 32),
    (Field::Loop, 2, 32),
    (Field::Metro, 3, 8),
    (Field::Tempo, 3, 4),
    (Field::Play, 2, 16),
    (Field::Rec, 3, 2),
    (Field::Stop, 3, 1),
    (Field::Browser, 5, 4),
    (Field::PlugIn, 5, 2),
    (Field::Mixer, 5, 1),
    (Field::Instance, 5, 16),
    (Field::Midi, 5, 32),
    (Field::Setup, 5, 8),
    (Field::FixedVel, 8, 4),
    (Field::OctaveDecrease, 8, 1),
    (Field::OctaveIncrease, 8, 2),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectorState {
    pub touched: bool,
    pub pressed: bool,
    pub pitch: u8,
    pub left: bool,
    pub top: bool,
    pub bottom: bool,
    pub right: bool,
}

/// M and S buttons above the top row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuteSolo {
    pub m: bool,
    pub s: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerformanceButtons {
    pub shift: bool,
    pub scale: bool,
    pub arp: bool,
    pub undo: bool,
    pub quantize: bool,
    pub auto: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditButtons {
    pub scene: bool,
    pub pattern: bool,
    pub track: bool,
    pub key_mode: bool,
    pub clear: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigationButtons {
    pub preset_up: bool,
    pub preset_down: bool,
    pub left: bool,
    pub right: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportButtons {
    pub looping: bool,
    pub metro: bool,
    pub tempo: bool,
    pub play: bool,
    pub rec: bool,
    pub stop: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeButtons {
    pub browser: bool,
    pub plug_in: bool,
    pub mixer: bool,
    pub instance: bool,
    pub midi: bool,
    pub setup: bool,
}

/// Buttons beside the pitch and mod wheels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelButtons {
    pub fixed_vel: bool,
    pub octave_decrease: bool,
    pub octave_increase: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Wheels {
    pub left_pitch: u8,
    pub strip: u8,
    pub right_pitch: i32,
}

/// One decoded snapshot of the controller.
///
/// The row arrays are `None` until the first full report arrives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceState {
    pub top_row_buttons: Option<[bool; ROW_LEN]>,
    pub bottom_row_touched: Option<[bool; ROW_LEN]>,
    pub bottom_row_pitch: Option<[u16; ROW_LEN]>,
    pub selector: SelectorState,
    pub mute_solo: MuteSolo,
    pub performance: PerformanceButtons,
    pub edit: EditButtons,
    pub navigation: NavigationButtons,
    pub transport: TransportButtons,
    pub mode: ModeButtons,
    pub wheel_buttons: WheelButtons,
    pub wheels: Wheels,
}

impl DeviceState {
    /// Decodes `raw` on top of `previous`.
    ///
    /// A full report replaces every field; a wheel report only the wheels and
    /// the strip. The result never shares anything with `previous`.
    pub fn decode(raw: &[u8], previous: &DeviceState) -> Result<DeviceState, DecodeError> {
        if raw.len() < REPORT_LEN {
            return Err(DecodeError::Truncated {
                len: raw.len(),
                min: REPORT_LEN,
            });
        }

        let mut state = previous.clone();
        match raw[0] {
            report_type::FULL => {
                state.top_row_buttons = Some(bits(raw[TOP_ROW_BYTE], &TOP_ROW_MASKS));
                state.bottom_row_touched =
                    Some(bits(raw[BOTTOM_TOUCH_BYTE], &BOTTOM_TOUCH_MASKS));
                let mut pitch = [0u16; ROW_LEN];
                for (i, p) in pitch.iter_mut().enumerate() {
                    let at = BOTTOM_PITCH_BYTE + i * 2;
                    *p = u16::from_le_bytes([raw[at], raw[at + 1]]);
                }
                state.bottom_row_pitch = Some(pitch);
                state.selector.pitch = raw[SELECTOR_PITCH_BYTE];
                for (field, byte, mask) in FLAG_LAYOUT {
                    state.set_flag(field, raw[byte] & mask != 0);
                }
                state.wheels = Wheels::decode(raw);
            }
            report_type::WHEELS => {
                state.wheels = Wheels::decode(raw);
            }
            other => return Err(DecodeError::Unrecognized(other)),
        }
        Ok(state)
    }

    /// Builds a full report carrying this state. Unset rows encode as zero.
    pub fn encode(&self) -> [u8; REPORT_LEN] {
        let mut raw = [0u8; REPORT_LEN];
        raw[0] = report_type::FULL;
        if let Some(row) = self.top_row_buttons {
            raw[TOP_ROW_BYTE] = pack(&row, &TOP_ROW_MASKS);
        }
        if let Some(row) = self.bottom_row_touched {
            raw[BOTTOM_TOUCH_BYTE] = pack(&row, &BOTTOM_TOUCH_MASKS);
        }
        if let Some(pitch) = self.bottom_row_pitch {
            for (i, p) in pitch.iter().enumerate() {
                let at = BOTTOM_PITCH_BYTE + i * 2;
                raw[at..at + 2].copy_from_slice(&p.to_le_bytes());
            }
        }
        raw[SELECTOR_PITCH_BYTE] = self.selector.pitch;
        for (field, byte, mask) in FLAG_LAYOUT {
            if self.flag(field) == Some(true) {
                raw[byte] |= mask;
            }
        }
        self.wheels.encode(&mut raw);
        raw
    }

    /// Value of a single-bit flag, `None` for rows and continuous values.
    pub fn flag(&self, field: Field) -> Option<bool> {
        let value = match field {
            Field::SelectorTouched => self.selector.touched,
            Field::SelectorPressed => self.selector.pressed,
            Field::SelectorLeft => self.selector.left,
            Field::SelectorTop => self.selector.top,
            Field::SelectorBottom => self.selector.bottom,
            Field::SelectorRight => self.selector.right,
            Field::M => self.mute_solo.m,
            Field::S => self.mute_solo.s,
            Field::Shift => self.performance.shift,
            Field::Scale => self.performance.scale,
            Field::Arp => self.performance.arp,
            Field::Undo => self.performance.undo,
            Field::Quantize => self.performance.quantize,
            Field::Auto => self.performance.auto,
            Field::Scene => self.edit.scene,
            Field::Pattern => self.edit.pattern,
            Field::Track => self.edit.track,
            Field::KeyMode => self.edit.key_mode,
            Field::Clear => self.edit.clear,
            Field::PresetUp => self.navigation.preset_up,
            Field::PresetDown => self.navigation.preset_down,
            Field::Left => self.navigation.left,
            Field::Right => self.navigation.right,
            Field::Loop => self.transport.looping,
            Field::Metro => self.transport.metro,
            Field::Tempo => self.transport.tempo,
            Field::Play => self.transport.play,
            Field::Rec => self.transport.rec,
            Field::Stop => self.transport.stop,
            Field::Browser => self.mode.browser,
            Field::PlugIn => self.mode.plug_in,
            Field::Mixer => self.mode.mixer,
            Field::Instance => self.mode.instance,
            Field::Midi => self.mode.midi,
            Field::Setup => self.mode.setup,
            Field::FixedVel => self.wheel_buttons.fixed_vel,
            Field::OctaveDecrease => self.wheel_buttons.octave_decrease,
            Field::OctaveIncrease => self.wheel_buttons.octave_increase,
            Field::TopRowButtons
            | Field::BottomRowTouched
            | Field::BottomRowPitch
            | Field::SelectorPitch
            | Field::LeftWheelPitch
            | Field::StripValue
            | Field::RightWheelPitch => return None,
        };
        Some(value)
    }

    fn flag_mut(&mut self, field: Field) -> Option<&mut bool> {
        let slot = match field {
            Field::SelectorTouched => &mut self.selector.touched,
            Field::SelectorPressed => &mut self.selector.pressed,
            Field::SelectorLeft => &mut self.selector.left,
            Field::SelectorTop => &mut self.selector.top,
            Field::SelectorBottom => &mut self.selector.bottom,
            Field::SelectorRight => &mut self.selector.right,
            Field::M => &mut self.mute_solo.m,
            Field::S => &mut self.mute_solo.s,
            Field::Shift => &mut self.performance.shift,
            Field::Scale => &mut self.performance.scale,
            Field::Arp => &mut self.performance.arp,
            Field::Undo => &mut self.performance.undo,
            Field::Quantize => &mut self.performance.quantize,
            Field::Auto => &mut self.performance.auto,
            Field::Scene => &mut self.edit.scene,
            Field::Pattern => &mut self.edit.pattern,
            Field::Track => &mut self.edit.track,
            Field::KeyMode => &mut self.edit.key_mode,
            Field::Clear => &mut self.edit.clear,
            Field::PresetUp => &mut self.navigation.preset_up,
            Field::PresetDown => &mut self.navigation.preset_down,
            Field::Left => &mut self.navigation.left,
            Field::Right => &mut self.navigation.right,
            Field::Loop => &mut self.transport.looping,
            Field::Metro => &mut self.transport.metro,
            Field::Tempo => &mut self.transport.tempo,
            Field::Play => &mut self.transport.play,
            Field::Rec => &mut self.transport.rec,
            Field::Stop => &mut self.transport.stop,
            Field::Browser => &mut self.mode.browser,
            Field::PlugIn => &mut self.mode.plug_in,
            Field::Mixer => &mut self.mode.mixer,
            Field::Instance => &mut self.mode.instance,
            Field::Midi => &mut self.mode.midi,
            Field::Setup => &mut self.mode.setup,
            Field::FixedVel => &mut self.wheel_buttons.fixed_vel,
            Field::OctaveDecrease => &mut self.wheel_buttons.octave_decrease,
            Field::OctaveIncrease => &mut self.wheel_buttons.octave_increase,
            _ => return None,
        };
        Some(slot)
    }

    pub fn set_flag(&mut self, field: Field, value: bool) {
        if let Some(slot) = self.flag_mut(field) {
            *slot = value;
        }
    }
}

impl Wheels {
    fn decode(raw: &[u8]) -> Self {
        Self {
            left_pitch: raw[LEFT_WHEEL_BYTE],
            strip: raw[STRIP_BYTE],
            right_pitch: (raw[RIGHT_WHEEL_HI_BYTE] as i32 - RIGHT_WHEEL_HI_BIAS) * 256
                + raw[RIGHT_WHEEL_LO_BYTE] as i32,
        }
    }

    fn encode(&self, raw: &mut [u8]) {
        raw[LEFT_WHEEL_BYTE] = self.left_pitch;
        raw[STRIP_BYTE] = self.strip;
        raw[RIGHT_WHEEL_LO_BYTE] = self.right_pitch.rem_euclid(256) as u8;
        raw[RIGHT_WHEEL_HI_BYTE] =
            (self.right_pitch.div_euclid(256) + RIGHT_WHEEL_HI_BIAS) as u8;
    }
}

fn bits(byte: u8, masks: &[u8; ROW_LEN]) -> [bool; ROW_LEN] {
    masks.map(|mask| byte & mask != 0)
}

fn pack(row: &[bool; ROW_LEN], masks: &[u8; ROW_LEN]) -> u8 {
    row.iter()
        .zip(masks)
        .filter(|(on, _)| **on)
        .fold(0, |acc, (_, mask)| acc | mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_report() -> [u8; REPORT_LEN] {
        let mut raw = [0u8; REPORT_LEN];
        raw[0] = report_type::FULL;
        raw[RIGHT_WHEEL_HI_BYTE] = 32;
        raw
    }

    #[test]
    fn top_row_bit_order() {
        let mut raw = full_report();
        raw[1] = 128;
        let state = DeviceState::decode(&raw, &DeviceState::default()).unwrap();
        let row = state.top_row_buttons.unwrap();
        assert_eq!(row, [false, false, false, true, false, false, false, false]);

        raw[1] = 1;
        let state = DeviceState::decode(&raw, &state).unwrap();
        assert!(state.top_row_buttons.unwrap()[4]);
    }

    #[test]
    fn bottom_row_touch_is_msb_first() {
        let mut raw = full_report();
        raw[7] = 0b1000_0001;
        let state = DeviceState::decode(&raw, &DeviceState::default()).unwrap();
        let row = state.bottom_row_touched.unwrap();
        assert!(row[0]);
        assert!(row[7]);
        assert_eq!(row.iter().filter(|t| **t).count(), 2);
    }

    #[test]
    fn pitch_and_wheels() {
        let mut raw = full_report();
        raw[10] = 0xc1;
        raw[11] = 0x03;
        raw[24] = 0xff;
        raw[25] = 0x03;
        raw[30] = 9;
        raw[33] = 10;
        raw[34] = 31;
        raw[35] = 77;
        raw[37] = 200;
        let state = DeviceState::decode(&raw, &DeviceState::default()).unwrap();
        let pitch = state.bottom_row_pitch.unwrap();
        assert_eq!(pitch[0], 961);
        assert_eq!(pitch[7], 1023);
        assert_eq!(state.selector.pitch, 9);
        assert_eq!(state.wheels.right_pitch, -246);
        assert_eq!(state.wheels.left_pitch, 77);
        assert_eq!(state.wheels.strip, 200);
    }

    #[test]
    fn flags_follow_layout() {
        let mut raw = full_report();
        raw[2] = 16;
        raw[3] = 2;
        raw[6] = 4;
        raw[8] = 3;
        let state = DeviceState::decode(&raw, &DeviceState::default()).unwrap();
        assert!(state.transport.play);
        assert!(state.transport.rec);
        assert!(state.selector.touched);
        assert!(state.wheel_buttons.octave_decrease);
        assert!(state.wheel_buttons.octave_increase);
        assert!(!state.wheel_buttons.fixed_vel);
        assert!(!state.transport.stop);
    }

    #[test]
    fn wheel_report_keeps_everything_else() {
        let mut raw = full_report();
        raw[2] = 16;
        raw[1] = 0xff;
        let before = DeviceState::decode(&raw, &DeviceState::default()).unwrap();

        let mut wheels = [0u8; REPORT_LEN];
        wheels[0] = report_type::WHEELS;
        wheels[1] = 0;
        wheels[2] = 0;
        wheels[33] = 5;
        wheels[34] = 33;
        wheels[35] = 12;
        wheels[37] = 3;
        let after = DeviceState::decode(&wheels, &before).unwrap();

        assert_eq!(after.top_row_buttons, before.top_row_buttons);
        assert!(after.transport.play);
        assert_eq!(
            after.wheels,
            Wheels {
                left_pitch: 12,
                strip: 3,
                right_pitch: 261,
            }
        );
    }

    #[test]
    fn wheel_report_before_any_full_report_leaves_rows_unset() {
        let mut wheels = [0u8; REPORT_LEN];
        wheels[0] = report_type::WHEELS;
        wheels[34] = 32;
        let state = DeviceState::decode(&wheels, &DeviceState::default()).unwrap();
        assert!(state.top_row_buttons.is_none());
        assert!(state.bottom_row_pitch.is_none());
    }

    #[test]
    fn unknown_and_short_reports_fail() {
        let mut raw = full_report();
        raw[0] = 2;
        assert_eq!(
            DeviceState::decode(&raw, &DeviceState::default()),
            Err(DecodeError::Unrecognized(2))
        );
        assert_eq!(
            DeviceState::decode(&raw[..20], &DeviceState::default()),
            Err(DecodeError::Truncated { len: 20, min: 42 })
        );
    }

    /// Bits of a full report that decode reads.
    fn decoded_mask() -> [u8; REPORT_LEN] {
        let mut mask = [0u8; REPORT_LEN];
        mask[0] = 0xff;
        mask[1] = 0xff;
        mask[7] = 0xff;
        for (_, byte, bit) in FLAG_LAYOUT {
            mask[byte] |= bit;
        }
        for at in (10..26).chain([30, 33, 34, 35, 37]) {
            mask[at] = 0xff;
        }
        mask
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(proptest::test_runner::Config::with_cases(256))]

            #[test]
            fn prop_full_report_round_trips(
                body in proptest::collection::vec(any::<u8>(), REPORT_LEN - 1),
            ) {
                let mut raw = [0u8; REPORT_LEN];
                raw[0] = report_type::FULL;
                raw[1..].copy_from_slice(&body);

                let state = DeviceState::decode(&raw, &DeviceState::default()).unwrap();
                let encoded = state.encode();
                let mask = decoded_mask();
                for i in 0..REPORT_LEN {
                    prop_assert_eq!(encoded[i] & mask[i], raw[i] & mask[i], "byte {}", i);
                }
                let again = DeviceState::decode(&encoded, &DeviceState::default()).unwrap();
                prop_assert_eq!(again, state);
            }
        }
    }
}
