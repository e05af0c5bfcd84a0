//! Error types for report decoding, LED output, score loading and
//! home-automation calls.

use thiserror::Error;

/// Errors raised while decoding a raw input report.
///
/// Both variants are per-cycle conditions: the caller logs them, drops the
/// report and keeps the previous snapshot.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unrecognized report type 0x{0:02X}")]
    Unrecognized(u8),

    #[error("report too short: {len} bytes (need at least {min})")]
    Truncated { len: usize, min: usize },
}

/// Errors raised while pushing LED frames to the device.
#[derive(Error, Debug)]
pub enum LightsError {
    #[error("HID write failed: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("LED sink closed")]
    SinkClosed,
}

/// Errors raised while loading a MIDI score.
#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("can't read score file: {0}")]
    Io(#[from] std::io::Error),

    #[error("can't parse MIDI data: {0}")]
    Midi(#[from] midly::Error),

    #[error("score timing is invalid: {0}")]
    Timing(String),
}

/// Errors raised by a home-automation service call.
#[derive(Error, Debug)]
pub enum HomeAssistantError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
}
