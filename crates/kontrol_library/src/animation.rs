//! Time-driven LED animations.
//!
//! Two kinds share one gate in [`Session`]: a chase that sweeps out from the
//! middle of the keybed, and a note replay that plays a MIDI score onto the
//! keys while blinking the play button. Only one runs at a time. Each run has
//! its own stop signal and releases the gate when its thread exits.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::controls::ROW_LEN;
use crate::lights::{Brightness, Color, FrameBuffers, Hue, KEY_COUNT, Lights, Plane, button};
use crate::notes::KeyPainter;
use crate::score::{NoteKind, Score, Tempo};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationKind {
    Chase,
    NoteReplay,
}

#[derive(Debug, Clone)]
pub struct AnimationConfig {
    pub chase_fps: u32,
    /// `None` keeps the chase going until it is stopped.
    pub chase_duration: Option<Duration>,
    pub blink_per_minute: u32,
    pub blink_duration: Duration,
    pub score_path: PathBuf,
    pub tempo: Tempo,
}

/// Cancellation token of one run.
#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    fn stop(&self) {
        *self.stopped.lock() = true;
        self.cv.notify_all();
    }

    /// Sleeps until `deadline`. Returns true if stopped in the meantime.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.cv.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }

    fn wait_for(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout)
    }
}

/// Fixed-rate tick source.
struct Ticker {
    next: Instant,
    period: Duration,
}

impl Ticker {
    fn new(period: Duration) -> Self {
        Self {
            next: Instant::now() + period,
            period,
        }
    }

    fn every_minute(times: u32) -> Self {
        Self::new(Duration::from_secs(60) / times.max(1))
    }

    /// Waits for the next tick. Returns false once the run is stopped.
    fn tick(&mut self, stop: &StopSignal) -> bool {
        let stopped = stop.wait_until(self.next);
        self.next += self.period;
        !stopped
    }
}

/// Releases the animation gate when the run thread exits.
struct GateGuard(Arc<Session>);

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.0.end_animation();
        debug!("animation gate released");
    }
}

/// Sweep that spreads from the middle key towards both ends.
#[derive(Debug, Clone)]
pub struct Chase {
    cursor: i32,
    current: Color,
    previous: Color,
}

impl Chase {
    const CENTER: i32 = KEY_COUNT as i32 / 2;
    const BAND_CENTER: i32 = (button::TOP_ROW_START + ROW_LEN / 2 - 1) as i32;
    const BAND_STEPS: i32 = ROW_LEN as i32;
    const S_STEP: i32 = 13;
    const M_STEP: i32 = 14;
    /// Hues cycle through 1..LAST_HUE, skipping black.
    const LAST_HUE: u8 = 16;

    pub fn new() -> Self {
        let start = Color::new(Hue::Red, Brightness::Normal);
        Self {
            cursor: 0,
            current: start,
            previous: start,
        }
    }

    pub fn cursor(&self) -> i32 {
        self.cursor
    }

    pub fn current(&self) -> Color {
        self.current
    }

    /// Paints one frame and advances the cursor.
    pub fn step(&mut self, frames: &mut FrameBuffers) {
        let i = self.cursor;
        frames.set(Plane::Keys, Self::CENTER + i, self.current);
        frames.set(Plane::Keys, Self::CENTER - i, self.current);
        frames.set(Plane::Buttons, button::STRIP_END as i32 - i, self.previous);
        if i < Self::BAND_STEPS {
            frames.set(Plane::Buttons, Self::BAND_CENTER - i / 2, self.current);
            frames.set(Plane::Buttons, Self::BAND_CENTER + i / 2 + 1, self.current);
        }
        if i == Self::S_STEP {
            frames.set(Plane::Buttons, button::S as i32, self.current);
        }
        if i == Self::M_STEP {
            frames.set(Plane::Buttons, button::M as i32, self.current);
        }

        self.cursor += 1;
        if self.cursor > Self::CENTER {
            self.previous = self.current;
            self.cursor = 0;
            let mut next = self.current.hue as u8 + 1;
            if next == Self::LAST_HUE {
                next = 1;
            }
            self.current.hue = Hue::wrapping(next);
        }
    }
}

impl Default for Chase {
    fn default() -> Self {
        Self::new()
    }
}

struct Run {
    kind: AnimationKind,
    stop: Arc<StopSignal>,
    handle: JoinHandle<()>,
}

/// Starts and stops animations, one at a time.
pub struct Animator {
    lights: Lights,
    painter: KeyPainter,
    session: Arc<Session>,
    config: AnimationConfig,
    run: Mutex<Option<Run>>,
}

impl Animator {
    pub fn new(
        lights: Lights,
        painter: KeyPainter,
        session: Arc<Session>,
        config: AnimationConfig,
    ) -> Self {
        Self {
            lights,
            painter,
            session,
            config,
            run: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_animating()
    }

    /// Starts `kind` unless another animation holds the gate.
    pub fn start(&self, kind: AnimationKind) -> bool {
        // Held until the new run is stored, so `stop` always sees it.
        let mut slot = self.run.lock();
        if !self.session.try_begin_animation() {
            info!("{kind:?} ignored: an animation is already playing");
            return false;
        }
        if let Some(finished) = slot.take() {
            // The gate was free, so that thread is done or about to be.
            if finished.handle.join().is_err() {
                warn!("{:?} animation thread panicked", finished.kind);
            }
        }
        info!("starting {kind:?} animation");

        let stop = Arc::new(StopSignal::default());
        let gate = GateGuard(Arc::clone(&self.session));
        let lights = self.lights.clone();
        let config = self.config.clone();
        let handle = match kind {
            AnimationKind::Chase => {
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    let _gate = gate;
                    run_chase(&lights, &stop, &config);
                })
            }
            AnimationKind::NoteReplay => {
                let stop = Arc::clone(&stop);
                let painter = self.painter.clone();
                thread::spawn(move || {
                    let _gate = gate;
                    run_note_replay(&lights, &painter, &stop, &config);
                })
            }
        };

        *slot = Some(Run { kind, stop, handle });
        true
    }

    /// Stops the current run, if any, and waits for its thread.
    pub fn stop(&self) {
        let run = self.run.lock().take();
        if let Some(run) = run {
            debug!("stopping {:?} animation", run.kind);
            run.stop.stop();
            if run.handle.join().is_err() {
                warn!("{:?} animation thread panicked", run.kind);
            }
        }
    }
}

impl Drop for Animator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_chase(lights: &Lights, stop: &StopSignal, config: &AnimationConfig) {
    let started = Instant::now();
    let mut chase = Chase::new();
    let mut ticker = Ticker::new(Duration::from_secs(1) / config.chase_fps.max(1));
    while ticker.tick(stop) {
        lights.update(|frames| chase.step(frames));
        lights.write_through();
        if config
            .chase_duration
            .is_some_and(|limit| started.elapsed() >= limit)
        {
            break;
        }
    }
    debug!("chase finished");
}

fn run_note_replay(
    lights: &Lights,
    painter: &KeyPainter,
    stop: &Arc<StopSignal>,
    config: &AnimationConfig,
) {
    lights.all_off();
    lights.capture_keys_as_default();

    let blink = {
        let lights = lights.clone();
        let stop = Arc::clone(stop);
        let ticker = Ticker::every_minute(config.blink_per_minute);
        let deadline = Instant::now() + config.blink_duration;
        thread::spawn(move || blink_play_button(&lights, &stop, ticker, deadline))
    };

    match Score::load(&config.score_path) {
        Ok(score) => play_score(&score, painter, stop, config.tempo),
        Err(e) => warn!("can't play {}: {e}", config.score_path.display()),
    }

    if blink.join().is_err() {
        warn!("blink thread panicked");
    }
    debug!("note replay finished");
}

fn blink_play_button(lights: &Lights, stop: &StopSignal, mut ticker: Ticker, deadline: Instant) {
    const DARK: Color = Color::new(Hue::Black, Brightness::Normal);
    const LIT: Color = Color::new(Hue::White, Brightness::Normal);

    let mut dark = false;
    while ticker.next <= deadline && ticker.tick(stop) {
        dark = !dark;
        let color = if dark { DARK } else { LIT };
        lights.update(|frames| frames.set(Plane::Buttons, button::PLAY as i32, color));
        // Waited for so the device sees the ticks in order.
        if lights.write_through().join().is_err() {
            warn!("blink write panicked");
        }
    }
}

fn play_score(score: &Score, painter: &KeyPainter, stop: &StopSignal, tempo: Tempo) {
    for event in score.events() {
        if stop.wait_for(tempo.delay(event.delta_ticks)) {
            return;
        }
        match event.kind {
            NoteKind::On => {
                painter.note_on(event.key, event.channel, event.velocity);
            }
            NoteKind::Off => painter.note_off(event.key, event.channel),
        }
    }
}
