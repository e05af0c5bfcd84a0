mod midi_ports;
mod settings;

use crate::self_test::self_test;
use crate::settings::Settings;
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use config::{Config, Environment};
use kontrol_library::actions::Dispatcher;
use kontrol_library::animation::Animator;
use kontrol_library::changes::ChangeLog;
use kontrol_library::controller::Controller;
use kontrol_library::home_assistant::{HomeAssistant, HomeAutomation};
use kontrol_library::lights::{Brightness, Color, Hue, Lights};
use kontrol_library::notes::KeyPainter;
use kontrol_library::session::Session;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const MIDI_CLIENT_NAME: &str = "Komplete Kontrol S61 MK2 driver";
/// Switches the device from its own LED handling to host-driven LEDs.
const HOST_LED_MODE: u8 = 0xa0;
const REST_COLOR: Color = Color::new(Hue::Red, Brightness::Dim);

#[derive(Parser, Debug)]
#[clap(
    name = "Komplete Kontrol S61 MK2 userspace driver",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Args {
    #[clap(short, long, help = "Config file (see example_config.toml)")]
    config: Option<String>,
}

fn load_settings(config_fn: Option<String>) -> Result<Settings> {
    let mut cfg = Config::builder();

    if let Some(config_fn) = config_fn {
        cfg = cfg.add_source(config::File::with_name(config_fn.as_str()));
    }

    // e.g. KONTROL_HOME_ASSISTANT__TOKEN
    cfg = cfg.add_source(
        Environment::with_prefix("KONTROL")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = cfg
        .build()
        .context("Can't create settings")?
        .try_deserialize()
        .context("Can't parse settings")?;

    settings.validate().map_err(|e| anyhow!(e))?;
    Ok(settings)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let settings = load_settings(args.config)?;
    info!("Running with settings: {settings:?}");

    let api = hidapi::HidApi::new().context("Can't initialise HID API")?;
    let device = &settings.device;
    let open = || {
        api.open_serial(device.vendor_id, device.product_id, &device.serial_number)
            .with_context(|| {
                format!(
                    "Can't open device {:04x}:{:04x} (serial {})",
                    device.vendor_id, device.product_id, device.serial_number
                )
            })
    };
    let input = open()?;
    let output = open()?;
    output
        .write(&[HOST_LED_MODE])
        .context("Can't switch the device to host LED mode")?;

    let lights = Lights::new(output);
    lights.all_off();
    self_test(&lights).context("Self test failed")?;
    // Restores fall back to the rest color rather than off.
    lights.paint_all(REST_COLOR);
    lights.capture_keys_as_default();
    lights.capture_buttons_as_default();

    // Only logged for now; live MIDI input does not drive the LEDs.
    let _midi_port = midi_ports::discover_input(MIDI_CLIENT_NAME, &settings.midi.input_patterns)
        .context("Can't initialise MIDI")?;

    let session = Arc::new(Session::new());
    let painter = KeyPainter::new(
        lights.clone(),
        Arc::clone(&session),
        settings.channel_hues(),
        settings.notes.key_offset,
    );
    let animation = settings.animation_config().map_err(|e| anyhow!(e))?;
    let animator = Arc::new(Animator::new(
        lights.clone(),
        painter,
        Arc::clone(&session),
        animation,
    ));

    if settings.home_assistant.token.is_empty() {
        warn!("No Home Assistant token configured, service calls will be rejected");
    }
    let home: Arc<dyn HomeAutomation> = Arc::new(
        HomeAssistant::new(&settings.home_assistant.url, &settings.home_assistant.token)
            .context("Can't create Home Assistant client")?,
    );

    let dispatcher = Dispatcher::new(lights.clone(), session, animator, home)
        .with_targets(settings.action_targets());
    let mut controller = Controller::new(lights, (ChangeLog, dispatcher));

    info!("Listening to the controller");
    controller.run(input).context("Device read failed")?;

    Ok(())
}
