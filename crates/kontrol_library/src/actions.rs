//! Maps control changes to scenes, room brightness, octave shifts and
//! animations.

use std::sync::Arc;

use tracing::{debug, info};

use crate::animation::{AnimationKind, Animator};
use crate::changes::{ChangeEvent, ChangeHandler, Value};
use crate::controls::{Field, ROW_LEN};
use crate::home_assistant::{self, HomeAutomation, ServiceCall};
use crate::lights::{Brightness, Color, Hue, Lights, Plane, button};
use crate::session::Session;

/// A lighting preset: the service call that sets the room, the color the
/// controller settles on, and the color previewing it on the top row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    pub call: ServiceCall,
    pub color: Color,
    pub preview: Color,
}

/// Service targets of the non-scene actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTargets {
    pub brightness_light: String,
    pub easter_egg_automation: String,
}

impl Default for ActionTargets {
    fn default() -> Self {
        Self {
            brightness_light: "light.bedroom_lights".to_string(),
            easter_egg_automation: "automation.rickroll".to_string(),
        }
    }
}

pub fn default_scenes() -> Vec<Scene> {
    let scene = |call, hue, brightness, preview| Scene {
        call,
        color: Color::new(hue, brightness),
        preview,
    };
    vec![
        scene(
            ServiceCall::script("script.lights_red"),
            Hue::Red,
            Brightness::Dim,
            Color::new(Hue::Red, Brightness::Normal),
        ),
        scene(
            ServiceCall::script("script.lights_white"),
            Hue::White,
            Brightness::Normal,
            Color::new(Hue::White, Brightness::Bright),
        ),
        scene(
            ServiceCall::script("script.lights_off"),
            Hue::Black,
            Brightness::Normal,
            Color::new(Hue::Black, Brightness::Normal),
        ),
        scene(
            ServiceCall::light("light.bedroom_lights", Some(100), Some("green")),
            Hue::Green,
            Brightness::Normal,
            Color::new(Hue::Green, Brightness::Normal),
        ),
        scene(
            ServiceCall::light("light.bedroom_lights", Some(100), Some("blue")),
            Hue::Blue,
            Brightness::Normal,
            Color::new(Hue::Blue, Brightness::Normal),
        ),
    ]
}

/// Touch-strip pitch to a brightness percentage. The ends snap to 0 and 100.
pub fn brightness_percent(pitch: u16) -> u8 {
    match pitch / 10 {
        p if p > 95 => 100,
        p if p < 5 => 0,
        p => p as u8,
    }
}

pub struct Dispatcher {
    lights: Lights,
    session: Arc<Session>,
    animator: Arc<Animator>,
    home: Arc<dyn HomeAutomation>,
    scenes: Vec<Scene>,
    targets: ActionTargets,
    showing_scenes: bool,
    /// Last seen value of the first bottom-row pitch.
    brightness_pitch: u16,
}

impl Dispatcher {
    pub fn new(
        lights: Lights,
        session: Arc<Session>,
        animator: Arc<Animator>,
        home: Arc<dyn HomeAutomation>,
    ) -> Self {
        Self {
            lights,
            session,
            animator,
            home,
            scenes: default_scenes(),
            targets: ActionTargets::default(),
            showing_scenes: false,
            brightness_pitch: 0,
        }
    }

    pub fn with_targets(mut self, targets: ActionTargets) -> Self {
        self.targets = targets;
        self
    }

    pub fn showing_scenes(&self) -> bool {
        self.showing_scenes
    }

    fn toggle_scene_preview(&mut self) {
        self.showing_scenes = !self.showing_scenes;
        let top_row = button::TOP_ROW_START as i32;
        if self.showing_scenes {
            let previews: Vec<Color> = self.scenes.iter().map(|s| s.preview).collect();
            self.lights.update(|frames| {
                for (i, color) in previews.into_iter().enumerate() {
                    frames.set(Plane::Buttons, top_row + 1 + i as i32, color);
                }
            });
        } else {
            self.lights.update(|frames| {
                for i in 0..ROW_LEN as i32 {
                    frames.restore(Plane::Buttons, top_row + i);
                }
            });
        }
        self.lights.write_through();
    }

    fn send_brightness(&self) {
        let percent = brightness_percent(self.brightness_pitch);
        home_assistant::fire(
            &self.home,
            ServiceCall::light(&self.targets.brightness_light, Some(percent), None),
        );
    }

    fn apply_scene(&self, index: usize) {
        let Some(scene) = self.scenes.get(index) else {
            debug!("no scene {index}");
            return;
        };
        info!("scene {index}");
        let color = scene.color;
        self.lights.update(|frames| {
            frames.fill_keys(color);
            frames.fill_colorful_buttons(color);
            frames.capture_default(Plane::Keys);
            frames.capture_default(Plane::Buttons);
        });
        self.lights.write_through();
        home_assistant::fire(&self.home, scene.call.clone());
    }

    fn launch_easter_egg(&self) {
        let animator = Arc::clone(&self.animator);
        home_assistant::fire_then(
            &self.home,
            ServiceCall::automation_trigger(&self.targets.easter_egg_automation),
            move || {
                animator.start(AnimationKind::NoteReplay);
            },
        );
    }
}

impl ChangeHandler for Dispatcher {
    fn on_change(&mut self, event: &ChangeEvent) {
        match (event.field, event.index) {
            (Field::BottomRowPitch, 0) => {
                if let Value::Int(pitch) = event.new {
                    self.brightness_pitch = u16::try_from(pitch).unwrap_or(0);
                }
            }
            (Field::TopRowButtons, 0) => {
                self.toggle_scene_preview();
                if event.is_release() {
                    self.send_brightness();
                }
            }
            (Field::TopRowButtons, i) if event.is_press() => self.apply_scene(i - 1),
            (Field::OctaveDecrease, _) if event.is_press() => {
                info!("octave shift {}", self.session.shift_up());
            }
            (Field::OctaveIncrease, _) if event.is_press() => {
                info!("octave shift {}", self.session.shift_down());
            }
            (Field::Play, _) if event.is_press() => self.launch_easter_egg(),
            (Field::Rec, _) => {
                self.animator.start(AnimationKind::Chase);
            }
            _ => {}
        }
    }
}
