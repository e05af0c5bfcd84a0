//! Shared fakes for the integration tests.

#![allow(dead_code)] // Each test file uses a different subset

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use kontrol_library::actions::{ActionTargets, Dispatcher};
use kontrol_library::animation::{AnimationConfig, Animator};
use kontrol_library::changes::ChangeLog;
use kontrol_library::controller::Controller;
use kontrol_library::controls::{REPORT_LEN, report_type};
use kontrol_library::error::{HomeAssistantError, LightsError};
use kontrol_library::home_assistant::{HomeAutomation, ServiceCall};
use kontrol_library::lights::{LedSink, Lights};
use kontrol_library::notes::{ChannelHues, DEFAULT_KEY_OFFSET, KeyPainter};
use kontrol_library::score::Tempo;
use kontrol_library::session::Session;
use parking_lot::Mutex;

/// Sink that keeps every report it was given.
#[derive(Clone, Default)]
pub struct RecordingSink(pub Arc<Mutex<Vec<Vec<u8>>>>);

impl RecordingSink {
    pub fn reports(&self) -> Vec<Vec<u8>> {
        self.0.lock().clone()
    }
}

impl LedSink for RecordingSink {
    fn send(&mut self, report: &[u8]) -> Result<(), LightsError> {
        self.0.lock().push(report.to_vec());
        Ok(())
    }
}

/// Home automation stand-in that forwards every call to a channel.
pub struct FakeHome(Mutex<Sender<ServiceCall>>);

impl FakeHome {
    pub fn channel() -> (Arc<dyn HomeAutomation>, Receiver<ServiceCall>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(FakeHome(Mutex::new(tx))), rx)
    }
}

impl HomeAutomation for FakeHome {
    fn call(&self, call: &ServiceCall) -> Result<(), HomeAssistantError> {
        let _ = self.0.lock().send(call.clone());
        Ok(())
    }
}

pub fn test_config(score_path: PathBuf) -> AnimationConfig {
    AnimationConfig {
        chase_fps: 200,
        chase_duration: Some(Duration::from_millis(150)),
        blink_per_minute: 6000,
        blink_duration: Duration::from_millis(100),
        score_path,
        tempo: Tempo::new(404, 113.0).unwrap(),
    }
}

pub fn missing_score() -> PathBuf {
    std::env::temp_dir().join("kontrol-tests-no-such-score.mid")
}

/// Everything the driver wires together, minus the device.
pub struct Rig {
    pub sink: RecordingSink,
    pub lights: Lights,
    pub session: Arc<Session>,
    pub painter: KeyPainter,
    pub animator: Arc<Animator>,
    pub calls: Receiver<ServiceCall>,
    pub controller: Controller<(ChangeLog, Dispatcher)>,
}

impl Rig {
    pub fn new(config: AnimationConfig) -> Self {
        Self::with_targets(config, ActionTargets::default())
    }

    pub fn with_targets(config: AnimationConfig, targets: ActionTargets) -> Self {
        let sink = RecordingSink::default();
        let lights = Lights::new(sink.clone());
        let session = Arc::new(Session::new());
        let painter = KeyPainter::new(
            lights.clone(),
            Arc::clone(&session),
            ChannelHues::default(),
            DEFAULT_KEY_OFFSET,
        );
        let animator = Arc::new(Animator::new(
            lights.clone(),
            painter.clone(),
            Arc::clone(&session),
            config,
        ));
        let (home, calls) = FakeHome::channel();
        let dispatcher = Dispatcher::new(
            lights.clone(),
            Arc::clone(&session),
            Arc::clone(&animator),
            home,
        )
        .with_targets(targets);
        let controller = Controller::new(lights.clone(), (ChangeLog, dispatcher));
        Self {
            sink,
            lights,
            session,
            painter,
            animator,
            calls,
            controller,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.controller.handler().1
    }
}

/// A full report with every control released.
pub fn full_report() -> [u8; REPORT_LEN] {
    let mut raw = [0u8; REPORT_LEN];
    raw[0] = report_type::FULL;
    raw[34] = 32; // right wheel at rest
    raw
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
