use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use kontrol_library::actions::ActionTargets;
use kontrol_library::animation::AnimationConfig;
use kontrol_library::lights::Hue;
use kontrol_library::notes::{ChannelHues, DEFAULT_KEY_OFFSET};
use kontrol_library::score::Tempo;
use serde::Deserialize;

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub(crate) struct Settings {
    pub device: DeviceSettings,
    pub home_assistant: HomeAssistantSettings,
    pub score: ScoreSettings,
    pub animation: AnimationSettings,
    pub notes: NoteSettings,
    pub midi: MidiSettings,
    pub actions: ActionSettings,
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub(crate) struct DeviceSettings {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            vendor_id: 0x17cc,
            product_id: 0x1620,
            serial_number: "0CD3B416".to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub(crate) struct HomeAssistantSettings {
    /// API root, e.g. `http://homeassistant.local:8123/api/`.
    pub url: String,
    /// Long-lived access token.
    pub token: String,
}

impl Default for HomeAssistantSettings {
    fn default() -> Self {
        Self {
            url: "http://192.168.1.2:8123/api/".to_string(),
            token: "".to_string(),
        }
    }
}

impl fmt::Debug for HomeAssistantSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.token.is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("HomeAssistantSettings")
            .field("url", &self.url)
            .field("token", &token)
            .finish()
    }
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub(crate) struct ScoreSettings {
    pub path: PathBuf,
    /// Playback resolution. The file's own header is ignored.
    pub ticks_per_quarter: u16,
    pub bpm: f64,
}

impl Default for ScoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("Never-Gonna-Give-You-Up-3.mid"),
            ticks_per_quarter: 404,
            bpm: 113.0,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub(crate) struct AnimationSettings {
    pub chase_fps: u32,
    /// Stop the chase after this many seconds. Unset: run until stopped.
    pub chase_duration_secs: Option<u64>,
    pub blink_per_minute: u32,
    pub blink_duration_secs: u64,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            chase_fps: 30,
            chase_duration_secs: None,
            blink_per_minute: 131,
            // 3m32s
            blink_duration_secs: 212,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct ChannelHue {
    pub channel: u8,
    pub hue: String,
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub(crate) struct NoteSettings {
    pub key_offset: i32,
    /// Channels missing here light keys with hue `channel + 1`.
    pub channel_hues: Vec<ChannelHue>,
}

impl Default for NoteSettings {
    fn default() -> Self {
        let hue = |channel, hue: &str| ChannelHue {
            channel,
            hue: hue.to_string(),
        };
        Self {
            key_offset: DEFAULT_KEY_OFFSET,
            channel_hues: vec![
                hue(0, "blue"),
                hue(6, "green"),
                hue(11, "dark_blue"),
                hue(12, "green"),
                hue(14, "pink"),
            ],
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub(crate) struct MidiSettings {
    /// Input port name substrings, tried in order.
    pub input_patterns: Vec<String>,
}

impl Default for MidiSettings {
    fn default() -> Self {
        Self {
            input_patterns: vec![
                "LoopBe Internal MIDI".to_string(),
                "KOMPLETE KONTROL".to_string(),
            ],
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub(crate) struct ActionSettings {
    /// Light that follows the brightness strip.
    pub brightness_light: String,
    /// Automation triggered by the play button.
    pub easter_egg_automation: String,
}

impl Default for ActionSettings {
    fn default() -> Self {
        let targets = ActionTargets::default();
        Self {
            brightness_light: targets.brightness_light,
            easter_egg_automation: targets.easter_egg_automation,
        }
    }
}

impl Settings {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.device.serial_number.is_empty() {
            return Err("Device serial number must not be empty".to_string());
        }

        if self.home_assistant.url.trim().is_empty() {
            return Err("Home Assistant URL must not be empty".to_string());
        }

        if self.score.ticks_per_quarter == 0 {
            return Err("Score ticks per quarter note must be positive".to_string());
        }

        if !(self.score.bpm.is_finite() && self.score.bpm > 0.0) {
            return Err(format!("Score tempo must be positive (found {})", self.score.bpm));
        }

        if self.animation.chase_fps == 0 || self.animation.blink_per_minute == 0 {
            return Err("Animation rates must be positive".to_string());
        }

        for ChannelHue { channel, hue } in &self.notes.channel_hues {
            if *channel > 15 {
                return Err(format!("MIDI channels are 0 to 15 (found {channel})"));
            }
            if Hue::from_name(hue).is_none() {
                let known: Vec<_> = Hue::names().collect();
                return Err(format!(
                    "Unknown hue {hue:?} for channel {channel} (expected one of: {})",
                    known.join(", ")
                ));
            }
        }

        if self.midi.input_patterns.is_empty()
            || self.midi.input_patterns.iter().any(|p| p.is_empty())
        {
            return Err("MIDI input patterns must not be empty".to_string());
        }

        if self.actions.brightness_light.trim().is_empty()
            || self.actions.easter_egg_automation.trim().is_empty()
        {
            return Err("Action entity ids must not be empty".to_string());
        }

        Ok(())
    }

    pub(crate) fn channel_hues(&self) -> ChannelHues {
        ChannelHues::new(
            self.notes
                .channel_hues
                .iter()
                .filter_map(|c| Hue::from_name(&c.hue).map(|hue| (c.channel, hue))),
        )
    }

    pub(crate) fn action_targets(&self) -> ActionTargets {
        ActionTargets {
            brightness_light: self.actions.brightness_light.clone(),
            easter_egg_automation: self.actions.easter_egg_automation.clone(),
        }
    }

    pub(crate) fn animation_config(&self) -> Result<AnimationConfig, String> {
        let tempo = Tempo::new(self.score.ticks_per_quarter, self.score.bpm)
            .map_err(|e| e.to_string())?;
        Ok(AnimationConfig {
            chase_fps: self.animation.chase_fps,
            chase_duration: self.animation.chase_duration_secs.map(Duration::from_secs),
            blink_per_minute: self.animation.blink_per_minute,
            blink_duration: Duration::from_secs(self.animation.blink_duration_secs),
            score_path: self.score.path.clone(),
            tempo,
        })
    }
}
