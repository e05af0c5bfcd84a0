use midir::{InitError, MidiInput};
use tracing::{debug, info, warn};

/// First port name containing a pattern, trying the patterns in order.
fn select_port<'a>(names: &'a [String], patterns: &[String]) -> Option<&'a str> {
    patterns.iter().find_map(|pattern| {
        names
            .iter()
            .find(|name| name.contains(pattern.as_str()))
            .map(String::as_str)
    })
}

/// Looks for the MIDI input port the controller listens to and logs it.
pub(crate) fn discover_input(
    client_name: &str,
    patterns: &[String],
) -> Result<Option<String>, InitError> {
    let input = MidiInput::new(client_name)?;
    let names: Vec<String> = input
        .ports()
        .iter()
        .filter_map(|port| input.port_name(port).ok())
        .collect();
    for (i, name) in names.iter().enumerate() {
        debug!("MIDI input {i}: {name}");
    }

    match select_port(&names, patterns) {
        Some(name) => {
            info!("using MIDI input {name:?}");
            Ok(Some(name.to_string()))
        }
        None => {
            warn!("no MIDI input matches {patterns:?}");
            Ok(None)
        }
    }
}
