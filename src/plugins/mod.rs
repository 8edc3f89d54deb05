//! # Plugins Module - Track Playback Behaviors
//!
//! A plugin drives one track of playback: the owning layer constructs it
//! per track selection, calls `start`, forwards plugin-addressed messages
//! through `receive`, and calls `stop` when the track ends. Plugins are
//! stateful but owned; they never share mutable state across tracks.
//!
//! Concrete plugin constructors live in the compile-time [`PluginRegistry`]
//! keyed by stable id strings; an id with no entry is a first-class
//! `Unavailable` error, never a reflective lookup.

pub mod debug;
pub mod slide_show;

use serde_json::Value;

use crate::engine::context::ExecutionContext;
use crate::errors::CoreError;
use crate::runtime::messages::Message;
use crate::schedule::{PlaylistSchedule, PluginSchedule, TimerTaskItem};

/// The unit of playback a plugin is started with.
#[derive(Debug, Clone)]
pub enum Track {
    Playlist(PlaylistSchedule),
    Timed(PluginSchedule),
    Task(TimerTaskItem),
}

impl Track {
    pub fn title(&self) -> &str {
        match self {
            Track::Playlist(t) => &t.title,
            Track::Timed(t) => &t.title,
            Track::Task(t) => &t.title,
        }
    }

    /// Id of the plugin that should play this track.
    pub fn plugin_name(&self) -> &str {
        match self {
            Track::Playlist(t) => &t.plugin_name,
            Track::Timed(t) => &t.plugin_name,
            Track::Task(t) => &t.task.plugin_name,
        }
    }

    /// The track's plugin parameters.
    pub fn content(&self) -> &Value {
        match self {
            Track::Playlist(t) => &t.content,
            Track::Timed(t) => &t.content,
            Track::Task(t) => &t.task.content,
        }
    }
}

/// Lifecycle contract every plugin implements.
pub trait Plugin: Send {
    fn id(&self) -> &str;
    fn name(&self) -> &str;

    /// Begin playback of `track`. Long work must go through the future
    /// submitter in the context; `start` itself returns promptly.
    fn start(&mut self, ctx: &ExecutionContext, track: &Track) -> anyhow::Result<()>;

    /// End playback: cancel timers and outstanding work.
    fn stop(&mut self, ctx: &ExecutionContext, track: &Track) -> anyhow::Result<()>;

    /// Handle a plugin-addressed message forwarded by the owning layer.
    fn receive(&mut self, ctx: &ExecutionContext, track: &Track, msg: &Message)
        -> anyhow::Result<()>;
}

/// Descriptor of a registered plugin.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub default_settings: Option<Value>,
}

type PluginCtor = fn(id: &str, name: &str) -> Box<dyn Plugin>;

/// Compile-time map from plugin id to constructor.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    entries: Vec<(PluginInfo, PluginCtor)>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with the built-in plugins.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            PluginInfo {
                id: "debug".into(),
                name: "Debug".into(),
                default_settings: None,
            },
            debug::DebugPlugin::construct,
        );
        registry.register(
            PluginInfo {
                id: "slide-show".into(),
                name: "SlideShow".into(),
                default_settings: Some(serde_json::json!({
                    "slideMinutes": slide_show::DEFAULT_SLIDE_MINUTES,
                    "timeoutSeconds": crate::sources::DEFAULT_TIMEOUT_SECS,
                })),
            },
            slide_show::SlideShow::construct,
        );
        registry
    }

    pub fn register(&mut self, info: PluginInfo, ctor: PluginCtor) {
        self.entries.push((info, ctor));
    }

    pub fn infos(&self) -> Vec<PluginInfo> {
        self.entries.iter().map(|(info, _)| info.clone()).collect()
    }

    /// Instantiate the plugin registered under `id`.
    pub fn create(&self, id: &str) -> Result<Box<dyn Plugin>, CoreError> {
        self.entries
            .iter()
            .find(|(info, _)| info.id == id)
            .map(|(info, ctor)| ctor(&info.id, &info.name))
            .ok_or_else(|| CoreError::Unavailable(format!("plugin '{id}'")))
    }
}
