//! Shared helpers for the integration tests: a recording actor that
//! captures every message it receives, and writers for a minimal storage
//! template tree.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use inkboard::plugins::PluginRegistry;
use inkboard::runtime::{spawn_actor, Actor, MailboxHandle, Message};
use inkboard::sources::SourceRegistry;
use inkboard::storage::ConfigurationManager;

/// Actor that forwards every message into an unbounded channel.
pub struct Recorder {
    name: String,
    tx: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl Actor for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&mut self, msg: Message) -> anyhow::Result<()> {
        let _ = self.tx.send(msg);
        Ok(())
    }
}

pub fn spawn_recorder(name: &str) -> (MailboxHandle, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = spawn_actor(Recorder {
        name: name.to_string(),
        tx,
    });
    (handle, rx)
}

/// Wait for the next message satisfying `pred`, or panic after `secs`.
pub async fn expect_message<F>(
    rx: &mut mpsc::UnboundedReceiver<Message>,
    secs: u64,
    mut pred: F,
) -> Message
where
    F: FnMut(&Message) -> bool,
{
    let deadline = std::time::Duration::from_secs(secs);
    tokio::time::timeout(deadline, async {
        loop {
            let msg = rx.recv().await.expect("recorder channel closed");
            if pred(&msg) {
                return msg;
            }
        }
    })
    .await
    .expect("timed out waiting for message")
}

/// Next telemetry frame, as (state, values).
pub async fn expect_telemetry(
    rx: &mut mpsc::UnboundedReceiver<Message>,
    secs: u64,
) -> serde_json::Map<String, Value> {
    let msg = expect_message(rx, secs, |m| matches!(m, Message::Telemetry(_))).await;
    match msg {
        Message::Telemetry(frame) => frame.values,
        _ => unreachable!(),
    }
}

fn write_json(path: &Path, value: &Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

/// Write the schema templates every tree needs (display defaults to the
/// mock driver).
pub fn write_schemas(base: &Path) {
    let schemas = base.join("storage").join("schemas");
    write_json(
        &schemas.join("system.json"),
        &json!({
            "title": "System Settings",
            "default": { "timezoneName": "US/Eastern", "locale": "en-US" }
        }),
    );
    write_json(
        &schemas.join("display.json"),
        &json!({
            "title": "Display Settings",
            "default": {
                "display_type": "mock",
                "orientation": "landscape",
                "rotate180": false,
                "width": 800,
                "height": 480
            }
        }),
    );
    write_json(
        &schemas.join("theme.json"),
        &json!({
            "title": "Theme Settings",
            "default": { "fontFamily": "Jost" }
        }),
    );
}

/// Write one schedule document into the template tree.
pub fn write_schedule(base: &Path, file: &str, value: &Value) {
    write_json(&base.join("storage").join("schedules").join(file), value);
}

/// Build a configuration manager over `base` with storage provisioned
/// inside the tree (so parallel tests never share a storage folder).
pub fn make_cm(
    base: &Path,
    plugins: PluginRegistry,
    sources: SourceRegistry,
) -> Arc<ConfigurationManager> {
    let storage = base.join(".storage");
    let cm = ConfigurationManager::new(base, Some(&storage), plugins, sources);
    cm.hard_reset().expect("storage provisioning");
    cm
}

/// A master schedule without alternatives: `default_name` always plays.
pub fn master_doc(default_name: &str) -> Value {
    json!({
        "type": "urn:inky:storage:schedule:master:1",
        "defaultSchedule": default_name,
        "schedules": []
    })
}

/// A playlist of debug-plugin tracks.
pub fn playlist_doc(id: &str, name: &str, titles: &[&str]) -> Value {
    let items: Vec<Value> = titles
        .iter()
        .enumerate()
        .map(|(ix, title)| {
            json!({
                "plugin_name": "debug",
                "id": format!("t{ix}"),
                "title": title,
                "content": {}
            })
        })
        .collect();
    json!({
        "type": "urn:inky:storage:schedule:playlist:1",
        "id": id,
        "name": name,
        "items": items
    })
}
