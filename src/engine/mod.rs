//! # Engine Module - Layers and Supervision
//!
//! The engine is what the runtime carries: the [`display::Display`] actor
//! pushing frames into a driver, the [`playlist::PlaylistLayer`] playing
//! the master schedule's current playlist, the
//! [`timer_layer::TimerLayer`] firing trigger-scheduled tasks, and the
//! [`application::Application`] supervisor that wires the mesh and
//! sequences configure → start → stop.
//!
//! Both layers may run concurrently; an external compositor arbitrates the
//! `display` topic. Layers absorb plugin and data-source failures as
//! telemetry and keep running; they enter `error` only when their own
//! invariants break.

pub mod application;
pub mod context;
pub mod display;
pub mod playlist;
pub mod timer_layer;

use serde_json::Value;

/// Lifecycle states shared by both layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    Uninitialized,
    Loaded,
    Waiting,
    Playing,
    Stopped,
    Error,
}

impl LayerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerState::Uninitialized => "uninitialized",
            LayerState::Loaded => "loaded",
            LayerState::Waiting => "waiting",
            LayerState::Playing => "playing",
            LayerState::Stopped => "stopped",
            LayerState::Error => "error",
        }
    }
}

impl std::fmt::Display for LayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a telemetry value map from key/value pairs.
pub(crate) fn frame_values<const N: usize>(pairs: [(&str, Value); N]) -> serde_json::Map<String, Value> {
    let mut values = serde_json::Map::new();
    for (key, value) in pairs {
        values.insert(key.to_string(), value);
    }
    values
}
