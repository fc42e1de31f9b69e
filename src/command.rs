//! Device commands and the dispatcher shared by the menu and voice paths
//!
//! Menu leaves and voice phrases both resolve to a [`DeviceAction`], a closed set
//! of typed command constructors. The dispatcher turns an action into a
//! [`Command`] for the device sink (or a call to a canned device stub) and hands
//! back the confirmation text to show the user.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PhraseConfig;
use crate::device::{DeviceCommandSink, DeviceStubs, UpdateLog};
use crate::error::Error;

/// An instruction for the device, opaque to the interaction core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub payload: String,
}

impl Command {
    pub fn new(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.payload)
    }
}

/// How a firmware update is delivered to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMethod {
    Wifi,
    Usb,
}

impl UpdateMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMethod::Wifi => "wifi",
            UpdateMethod::Usb => "usb",
        }
    }
}

impl fmt::Display for UpdateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device calls answered by a stub instead of the command sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubCall {
    Battery,
    Diagnostics,
    Capture,
}

/// Everything a menu leaf or voice phrase can ask the device to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    NightVisionOn,
    NightVisionOff,
    CapturePhoto,
    RecordStart,
    RecordStop,
    BrightnessUp,
    BrightnessDown,
    BrightnessAuto,
    ZoomIn,
    ZoomOut,
    ZoomReset,
    BatteryStatus,
    Diagnostics,
    FirmwareUpdate(UpdateMethod),
}

impl DeviceAction {
    /// Command sent to the device sink
    pub fn command(&self) -> Command {
        match self {
            DeviceAction::NightVisionOn => Command::new("NIGHT_VISION", "ON"),
            DeviceAction::NightVisionOff => Command::new("NIGHT_VISION", "OFF"),
            DeviceAction::CapturePhoto => Command::new("CAPTURE", "PHOTO"),
            DeviceAction::RecordStart => Command::new("RECORD", "START"),
            DeviceAction::RecordStop => Command::new("RECORD", "STOP"),
            DeviceAction::BrightnessUp => Command::new("BRIGHTNESS", "UP"),
            DeviceAction::BrightnessDown => Command::new("BRIGHTNESS", "DOWN"),
            DeviceAction::BrightnessAuto => Command::new("BRIGHTNESS", "AUTO"),
            DeviceAction::ZoomIn => Command::new("ZOOM", "IN"),
            DeviceAction::ZoomOut => Command::new("ZOOM", "OUT"),
            DeviceAction::ZoomReset => Command::new("ZOOM", "RESET"),
            DeviceAction::BatteryStatus => Command::new("BATTERY", "QUERY"),
            DeviceAction::Diagnostics => Command::new("DIAGNOSTICS", "RUN"),
            DeviceAction::FirmwareUpdate(method) => {
                Command::new("FIRMWARE_UPDATE", method.as_str().to_uppercase())
            }
        }
    }

    /// Stub that answers this action, if it is not a plain sink command
    pub fn stub(&self) -> Option<StubCall> {
        match self {
            DeviceAction::BatteryStatus => Some(StubCall::Battery),
            DeviceAction::Diagnostics => Some(StubCall::Diagnostics),
            DeviceAction::CapturePhoto => Some(StubCall::Capture),
            _ => None,
        }
    }

    /// Confirmation shown after the command has been handed off
    pub fn confirmation(&self) -> String {
        match self {
            DeviceAction::NightVisionOn => "Night vision enabled".to_string(),
            DeviceAction::NightVisionOff => "Night vision disabled".to_string(),
            DeviceAction::CapturePhoto => "Photo captured".to_string(),
            DeviceAction::RecordStart => "Recording started".to_string(),
            DeviceAction::RecordStop => "Recording stopped".to_string(),
            DeviceAction::BrightnessUp => "Brightness increased".to_string(),
            DeviceAction::BrightnessDown => "Brightness decreased".to_string(),
            DeviceAction::BrightnessAuto => "Automatic brightness".to_string(),
            DeviceAction::ZoomIn => "Zoomed in".to_string(),
            DeviceAction::ZoomOut => "Zoomed out".to_string(),
            DeviceAction::ZoomReset => "Zoom reset".to_string(),
            DeviceAction::BatteryStatus => "Battery status requested".to_string(),
            DeviceAction::Diagnostics => "Diagnostics started".to_string(),
            DeviceAction::FirmwareUpdate(UpdateMethod::Wifi) => {
                "Firmware update started over Wi-Fi".to_string()
            }
            DeviceAction::FirmwareUpdate(UpdateMethod::Usb) => {
                "Firmware update started over USB".to_string()
            }
        }
    }

    fn key(&self) -> &'static str {
        match self {
            DeviceAction::NightVisionOn => "night_vision_on",
            DeviceAction::NightVisionOff => "night_vision_off",
            DeviceAction::CapturePhoto => "capture_photo",
            DeviceAction::RecordStart => "record_start",
            DeviceAction::RecordStop => "record_stop",
            DeviceAction::BrightnessUp => "brightness_up",
            DeviceAction::BrightnessDown => "brightness_down",
            DeviceAction::BrightnessAuto => "brightness_auto",
            DeviceAction::ZoomIn => "zoom_in",
            DeviceAction::ZoomOut => "zoom_out",
            DeviceAction::ZoomReset => "zoom_reset",
            DeviceAction::BatteryStatus => "battery_status",
            DeviceAction::Diagnostics => "diagnostics",
            DeviceAction::FirmwareUpdate(UpdateMethod::Wifi) => "firmware_update:wifi",
            DeviceAction::FirmwareUpdate(UpdateMethod::Usb) => "firmware_update:usb",
        }
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Parse the action names used in the config file (`"night_vision_on"`,
/// `"firmware_update:usb"`, ...)
impl FromStr for DeviceAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if let Some(method) = s.strip_prefix("firmware_update:") {
            return match method {
                "wifi" | "wi-fi" => Ok(DeviceAction::FirmwareUpdate(UpdateMethod::Wifi)),
                "usb" => Ok(DeviceAction::FirmwareUpdate(UpdateMethod::Usb)),
                _ => Err(Error::UnknownAction(s.clone())),
            };
        }
        let action = match s.as_str() {
            "night_vision_on" => DeviceAction::NightVisionOn,
            "night_vision_off" => DeviceAction::NightVisionOff,
            "capture_photo" => DeviceAction::CapturePhoto,
            "record_start" => DeviceAction::RecordStart,
            "record_stop" => DeviceAction::RecordStop,
            "brightness_up" => DeviceAction::BrightnessUp,
            "brightness_down" => DeviceAction::BrightnessDown,
            "brightness_auto" => DeviceAction::BrightnessAuto,
            "zoom_in" => DeviceAction::ZoomIn,
            "zoom_out" => DeviceAction::ZoomOut,
            "zoom_reset" => DeviceAction::ZoomReset,
            "battery_status" => DeviceAction::BatteryStatus,
            "diagnostics" => DeviceAction::Diagnostics,
            "firmware_update" => DeviceAction::FirmwareUpdate(UpdateMethod::Wifi),
            _ => return Err(Error::UnknownAction(s)),
        };
        Ok(action)
    }
}

/// Lowercase and replace punctuation with spaces so that "Night-vision!" still
/// contains "night vision"
fn normalize(text: &str) -> String {
    let replaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ordered phrase to action mapping for the voice path
///
/// The first phrase found anywhere in the utterance wins, so more specific
/// phrases must come before the general ones they contain.
#[derive(Debug, Clone)]
pub struct VoicePhraseTable {
    entries: Vec<(String, DeviceAction)>,
}

impl Default for VoicePhraseTable {
    fn default() -> Self {
        use crate::command::DeviceAction::*;
        Self::from_pairs([
            ("night vision off", NightVisionOff),
            ("turn off night vision", NightVisionOff),
            ("switch off night vision", NightVisionOff),
            ("disable night vision", NightVisionOff),
            ("day mode", NightVisionOff),
            ("night vision", NightVisionOn),
            ("take a photo", CapturePhoto),
            ("take a picture", CapturePhoto),
            ("capture", CapturePhoto),
            ("stop recording", RecordStop),
            ("start recording", RecordStart),
            ("auto brightness", BrightnessAuto),
            ("brighter", BrightnessUp),
            ("dimmer", BrightnessDown),
            ("reset zoom", ZoomReset),
            ("zoom in", ZoomIn),
            ("zoom out", ZoomOut),
            ("battery", BatteryStatus),
            ("diagnostic", Diagnostics),
            ("update over usb", FirmwareUpdate(UpdateMethod::Usb)),
            ("usb update", FirmwareUpdate(UpdateMethod::Usb)),
            ("update firmware", FirmwareUpdate(UpdateMethod::Wifi)),
        ])
    }
}

impl VoicePhraseTable {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, DeviceAction)>) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(phrase, action)| (normalize(phrase), action))
                .filter(|(phrase, _)| !phrase.is_empty())
                .collect(),
        }
    }

    /// Build the table from config: configured phrases first, then the
    /// built-in ones unless they are disabled
    pub fn from_config(custom: &[PhraseConfig], include_builtin: bool) -> crate::error::Result<Self> {
        let mut entries = Vec::with_capacity(custom.len());
        for c in custom {
            let action: DeviceAction = c.action.parse()?;
            let phrase = normalize(&c.phrase);
            if !phrase.is_empty() {
                entries.push((phrase, action));
            }
        }
        if include_builtin {
            entries.extend(Self::default().entries);
        }
        Ok(Self { entries })
    }

    pub fn lookup(&self, utterance: &str) -> Option<DeviceAction> {
        let text = normalize(utterance);
        if text.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|(phrase, _)| text.contains(phrase.as_str()))
            .map(|(_, action)| *action)
    }

    pub fn entries(&self) -> &[(String, DeviceAction)] {
        &self.entries
    }
}

/// Turns actions into device commands and confirmation text
///
/// Shared between the frame loop and the voice listener through an `Arc`; it
/// holds no mutable state of its own, and the sink is responsible for
/// serializing concurrent sends.
pub struct CommandDispatcher {
    sink: Arc<dyn DeviceCommandSink>,
    stubs: Arc<dyn DeviceStubs>,
    update_log: Arc<dyn UpdateLog>,
    phrases: VoicePhraseTable,
}

impl CommandDispatcher {
    pub fn new(
        sink: Arc<dyn DeviceCommandSink>,
        stubs: Arc<dyn DeviceStubs>,
        update_log: Arc<dyn UpdateLog>,
        phrases: VoicePhraseTable,
    ) -> Self {
        Self {
            sink,
            stubs,
            update_log,
            phrases,
        }
    }

    /// Execute an action and return the text to show as feedback
    pub fn dispatch(&self, action: &DeviceAction) -> String {
        if let Some(stub) = action.stub() {
            let text = match stub {
                StubCall::Battery => self.stubs.battery(),
                StubCall::Diagnostics => self.stubs.diagnostics(),
                StubCall::Capture => self.stubs.capture(),
            };
            info!("{} answered by stub: {}", action, text);
            return text;
        }

        let command = action.command();
        info!("Dispatching {} ({})", command, action);
        self.sink.send(&command);

        if let DeviceAction::FirmwareUpdate(method) = action {
            self.update_log.record(*method);
        }

        action.confirmation()
    }

    /// Match a recognized utterance and dispatch it
    ///
    /// Returns `None` without side effects when no phrase matches.
    pub fn dispatch_phrase(&self, utterance: &str) -> Option<String> {
        let Some(action) = self.phrases.lookup(utterance) else {
            debug!("No voice command in {:?}", utterance);
            return None;
        };
        Some(self.dispatch(&action))
    }

    pub fn phrases(&self) -> &VoicePhraseTable {
        &self.phrases
    }
}
