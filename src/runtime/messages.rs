//! The message union exchanged between mailbox actors.
//!
//! Dispatch is a total `match` over this enum; there is no runtime type
//! probing. A variant carries exactly the payload its handlers need, plus
//! the timestamp the event is logically "at" (which may differ from wall
//! clock under a scaled time source).

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::runtime::mailbox::MessageSink;
use crate::runtime::services::ServiceContainer;
use crate::storage::ConfigurationManager;

/// One rendered frame bound for a display: a packed 8-bit grayscale buffer
/// of `width * height` pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    /// A frame of the given dimensions filled with one gray level.
    pub fn solid(width: u32, height: u32, level: u8) -> Self {
        Self {
            width,
            height,
            pixels: vec![level; (width as usize) * (height as usize)],
        }
    }

    /// Rotate the buffer 180 degrees in place.
    pub fn rotate_180(&mut self) {
        self.pixels.reverse();
    }
}

/// Options accepted by the application `Start` message.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Root of the source tree holding the NVE template. Defaults to the
    /// process working directory.
    pub base_path: Option<PathBuf>,
    /// Working storage root. Defaults to a `.storage` sibling of base.
    pub storage_path: Option<PathBuf>,
    /// Wipe and re-provision storage before starting.
    pub hard_reset: bool,
}

/// Starts the application with options and the root service container.
#[derive(Clone)]
pub struct StartEvent {
    pub options: StartOptions,
    pub root: ServiceContainer,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Debug for StartEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartEvent")
            .field("options", &self.options)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Asks a task to configure itself from the shared configuration manager.
/// `notify_to` receives the matching [`ConfigureNotify`].
#[derive(Clone)]
pub struct ConfigureEvent {
    pub token: String,
    pub manager: Arc<ConfigurationManager>,
    pub notify_to: Option<MessageSink>,
    pub timestamp: DateTime<Utc>,
}

impl ConfigureEvent {
    /// Report the outcome of configuration back to the requester, if any.
    pub fn notify(&self, error: bool, detail: Option<String>) {
        if let Some(sink) = &self.notify_to {
            let reply = Message::ConfigureNotify(ConfigureNotify {
                token: self.token.clone(),
                error,
                detail,
                timestamp: self.timestamp,
            });
            if let Err(err) = sink.accept(reply) {
                log::warn!("configure.notify '{}' undeliverable: {err}", self.token);
            }
        }
    }
}

impl fmt::Debug for ConfigureEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigureEvent")
            .field("token", &self.token)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Outcome of a [`ConfigureEvent`].
#[derive(Debug, Clone)]
pub struct ConfigureNotify {
    pub token: String,
    pub error: bool,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Announces the active display and its resolution.
#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub timestamp: DateTime<Utc>,
}

/// A frame for the display, titled for logging.
#[derive(Debug, Clone)]
pub struct DisplayImage {
    pub title: String,
    pub frame: Frame,
    pub timestamp: DateTime<Utc>,
}

/// Completion of work handed to the future submitter. Carries the outcome
/// so continuations branch on data instead of unwinding across actors.
#[derive(Debug, Clone)]
pub struct FutureCompleted {
    pub plugin_name: String,
    pub token: String,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl FutureCompleted {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A plugin-addressed event, forwarded by the owning layer to the active
/// plugin when (and only when) the plugin name matches.
#[derive(Debug, Clone)]
pub struct PluginEvent {
    pub plugin_name: String,
    pub event: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// A structured state-transition report emitted by layers.
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub name: String,
    pub values: serde_json::Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Telemetry {
    pub fn new(name: &str, values: serde_json::Map<String, Value>, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            values,
            timestamp,
        }
    }
}

/// Every message the mesh can carry.
#[derive(Debug, Clone)]
pub enum Message {
    /// Shuts the receiving actor down; bypasses normal handling.
    Quit { timestamp: DateTime<Utc> },
    Start(StartEvent),
    Stop { timestamp: DateTime<Utc> },
    Configure(ConfigureEvent),
    ConfigureNotify(ConfigureNotify),
    DisplaySettings(DisplaySettings),
    DisplayImage(DisplayImage),
    StartPlayback { timestamp: DateTime<Utc> },
    NextTrack { timestamp: DateTime<Utc> },
    TimerExpired {
        target: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    FutureCompleted(FutureCompleted),
    PluginReceive(PluginEvent),
    Telemetry(Telemetry),
}

impl Message {
    /// The logical instant the message is about.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Message::Quit { timestamp }
            | Message::Stop { timestamp }
            | Message::StartPlayback { timestamp }
            | Message::NextTrack { timestamp }
            | Message::TimerExpired { timestamp, .. } => *timestamp,
            Message::Start(m) => m.timestamp,
            Message::Configure(m) => m.timestamp,
            Message::ConfigureNotify(m) => m.timestamp,
            Message::DisplaySettings(m) => m.timestamp,
            Message::DisplayImage(m) => m.timestamp,
            Message::FutureCompleted(m) => m.timestamp,
            Message::PluginReceive(m) => m.timestamp,
            Message::Telemetry(m) => m.timestamp,
        }
    }

    /// Short tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Quit { .. } => "quit",
            Message::Start(_) => "start",
            Message::Stop { .. } => "stop",
            Message::Configure(_) => "configure",
            Message::ConfigureNotify(_) => "configure-notify",
            Message::DisplaySettings(_) => "display-settings",
            Message::DisplayImage(_) => "display-image",
            Message::StartPlayback { .. } => "start-playback",
            Message::NextTrack { .. } => "next-track",
            Message::TimerExpired { .. } => "timer-expired",
            Message::FutureCompleted(_) => "future-completed",
            Message::PluginReceive(_) => "plugin-receive",
            Message::Telemetry(_) => "telemetry",
        }
    }
}
