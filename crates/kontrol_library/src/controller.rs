//! Read, decode, diff and dispatch loop.

use hidapi::{HidDevice, HidResult};
use tracing::{debug, warn};

use crate::changes::{self, ChangeHandler};
use crate::controls::{DeviceState, REPORT_LEN, report_type};
use crate::error::DecodeError;
use crate::lights::{Brightness, Color, Hue, Lights, Plane, button};

/// Number of LEDs around the selector wheel.
const SELECTOR_RING_LEN: i32 = 4;

/// Where input reports come from.
pub trait ReportSource {
    /// Blocks until a report arrives and returns its length.
    fn read_report(&mut self, buf: &mut [u8]) -> HidResult<usize>;
}

impl ReportSource for HidDevice {
    fn read_report(&mut self, buf: &mut [u8]) -> HidResult<usize> {
        self.read(buf)
    }
}

impl<S: ReportSource + ?Sized> ReportSource for &mut S {
    fn read_report(&mut self, buf: &mut [u8]) -> HidResult<usize> {
        (**self).read_report(buf)
    }
}

/// Holds the last good snapshot and feeds every new one to a change handler.
pub struct Controller<H> {
    lights: Lights,
    state: DeviceState,
    handler: H,
}

impl<H: ChangeHandler> Controller<H> {
    pub fn new(lights: Lights, handler: H) -> Self {
        Self {
            lights,
            state: DeviceState::default(),
            handler,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Handles one raw report. Bad reports are logged and dropped; the
    /// previous snapshot stays current.
    pub fn process(&mut self, raw: &[u8]) -> Result<(), DecodeError> {
        let next = match DeviceState::decode(raw, &self.state) {
            Ok(next) => next,
            Err(e) => {
                warn!("dropping report: {e}");
                return Err(e);
            }
        };
        if raw[0] == report_type::FULL {
            self.light_selector_ring(&next);
        }
        changes::diff(&self.state, &next, &mut self.handler);
        self.state = next;
        Ok(())
    }

    /// Colors the selector ring after the wheel pitch while it is touched,
    /// and puts it back to the defaults otherwise.
    fn light_selector_ring(&self, state: &DeviceState) {
        let touched = state.selector.touched;
        let color = Color::new(Hue::wrapping(state.selector.pitch), Brightness::Normal);
        let first = button::WHEEL_LEFT as i32;
        let result = self.lights.update_and_send(Plane::Buttons, |frames| {
            for i in first..first + SELECTOR_RING_LEN {
                if touched {
                    frames.set(Plane::Buttons, i, color);
                } else {
                    frames.restore(Plane::Buttons, i);
                }
            }
        });
        if let Err(e) = result {
            warn!("selector ring update failed: {e}");
        }
    }

    /// Reads reports until the source fails.
    pub fn run(&mut self, mut source: impl ReportSource) -> HidResult<()> {
        loop {
            let mut buf = [0u8; REPORT_LEN];
            let size = source.read_report(&mut buf)?;
            if size == 0 {
                continue;
            }
            debug!("report 0x{:02X}, {size} bytes", buf[0]);
            // Already logged; a bad report never ends the loop.
            self.process(&buf).ok();
        }
    }
}
