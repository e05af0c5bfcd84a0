//! Home Assistant REST service calls.
//!
//! Calls are fire-and-forget: they run on their own thread, failures are
//! logged and nothing is retried.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::HomeAssistantError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceBody {
    pub entity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness_pct: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_name: Option<String>,
    /// Sent as a string, e.g. `"0.4"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// One `POST services/{domain}/{service}` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub body: ServiceBody,
}

impl ServiceCall {
    fn new(domain: &str, service: &str, entity_id: &str) -> Self {
        Self {
            domain: domain.to_string(),
            service: service.to_string(),
            body: ServiceBody {
                entity_id: entity_id.to_string(),
                brightness_pct: None,
                color_name: None,
                volume_level: None,
                message: None,
                language: None,
            },
        }
    }

    /// `script/turn_on` for a script entity.
    pub fn script(entity_id: &str) -> Self {
        Self::new("script", "turn_on", entity_id)
    }

    /// `light/turn_on`, optionally with a brightness and a color.
    pub fn light(entity_id: &str, brightness_pct: Option<u8>, color_name: Option<&str>) -> Self {
        let mut call = Self::new("light", "turn_on", entity_id);
        call.body.brightness_pct = brightness_pct;
        call.body.color_name = color_name.map(str::to_string);
        call
    }

    pub fn automation_trigger(entity_id: &str) -> Self {
        Self::new("automation", "trigger", entity_id)
    }

    /// `media_player/volume_set`, with the level clamped to `0.0..=1.0`.
    pub fn volume_set(entity_id: &str, volume_level: f32) -> Self {
        let mut call = Self::new("media_player", "volume_set", entity_id);
        call.body.volume_level = Some(volume_level.clamp(0.0, 1.0).to_string());
        call
    }

    pub fn tts_say(entity_id: &str, message: &str, language: &str) -> Self {
        let mut call = Self::new("tts", "google_translate_say", entity_id);
        call.body.message = Some(message.to_string());
        call.body.language = Some(language.to_string());
        call
    }

    pub fn path(&self) -> String {
        format!("services/{}/{}", self.domain, self.service)
    }
}

/// Something that can execute service calls.
pub trait HomeAutomation: Send + Sync {
    fn call(&self, call: &ServiceCall) -> Result<(), HomeAssistantError>;

    /// Speaks `message` on a media player: sets its volume, then hands the
    /// text to the TTS service. Nothing is said if the volume call fails.
    fn say(
        &self,
        media_player: &str,
        message: &str,
        language: &str,
        volume_level: f32,
    ) -> Result<(), HomeAssistantError> {
        self.call(&ServiceCall::volume_set(media_player, volume_level))?;
        self.call(&ServiceCall::tts_say(media_player, message, language))
    }
}

/// REST client for a Home Assistant instance.
#[derive(Debug, Clone)]
pub struct HomeAssistant {
    client: Client,
    base_url: String,
    token: String,
}

impl HomeAssistant {
    /// `base_url` is the API root, e.g. `http://host:8123/api/`.
    pub fn new(base_url: &str, token: &str) -> Result<Self, HomeAssistantError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn url_for(&self, call: &ServiceCall) -> String {
        format!("{}/{}", self.base_url, call.path())
    }
}

impl HomeAutomation for HomeAssistant {
    fn call(&self, call: &ServiceCall) -> Result<(), HomeAssistantError> {
        let response = self
            .client
            .post(self.url_for(call))
            .bearer_auth(&self.token)
            .json(&call.body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(HomeAssistantError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        debug!("{} answered {status}", call.path());
        Ok(())
    }
}

fn describe(call: &ServiceCall) -> String {
    let body = serde_json::to_string(&call.body).unwrap_or_default();
    format!("{} {body}", call.path())
}

/// Sends `call` from a detached thread and logs the outcome.
pub fn fire(client: &Arc<dyn HomeAutomation>, call: ServiceCall) {
    fire_then(client, call, || {});
}

/// Like [`fire`], then runs `then` on the same thread once the call has
/// finished, whether it succeeded or not.
pub fn fire_then(
    client: &Arc<dyn HomeAutomation>,
    call: ServiceCall,
    then: impl FnOnce() + Send + 'static,
) {
    let client = Arc::clone(client);
    info!("sending {}", describe(&call));
    thread::spawn(move || {
        if let Err(e) = client.call(&call) {
            warn!("home assistant call {} failed: {e}", call.path());
        }
        then();
    });
}
