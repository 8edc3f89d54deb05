//! Application supervisor lifecycle: start wires the mesh and configures
//! every task, quit shuts it down in order.

mod common;

use chrono::Utc;
use serde_json::json;
use tempfile::tempdir;

use inkboard::engine::application::{AppPhase, Application};
use inkboard::plugins::PluginRegistry;
use inkboard::runtime::{spawn_actor, Message, ServiceContainer, StartEvent, StartOptions};
use inkboard::sources::SourceRegistry;

fn write_full_template(base: &std::path::Path) {
    common::write_schemas(base);
    common::write_schedule(base, "master_schedule.json", &common::master_doc("main"));
    common::write_schedule(
        base,
        "main.json",
        &common::playlist_doc("main", "main", &["One", "Two"]),
    );
    common::write_schedule(
        base,
        "tasks.json",
        &json!({
            "type": "urn:inky:storage:schedule:tasks:1",
            "id": "tasks",
            "name": "tasks",
            "items": [{
                "id": "banner",
                "title": "Banner",
                "enabled": true,
                "task": {
                    "plugin_name": "debug",
                    "title": "Banner",
                    "duration_minutes": 1,
                    "content": {}
                },
                "trigger": {
                    "on_startup": true,
                    "time": { "type": "hourly", "minutes": [0] }
                }
            }]
        }),
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn start_configures_layers_and_quit_stops_them() {
    let dir = tempdir().unwrap();
    let base = dir.path();
    write_full_template(base);

    let (notify, mut notify_rx) = common::spawn_recorder("notify");
    let (app, mut phase) = Application::new(
        "Application",
        PluginRegistry::builtin(),
        SourceRegistry::new(),
        Some(notify.sink()),
    );
    let handle = spawn_actor(app);
    handle
        .sink()
        .accept(Message::Start(StartEvent {
            options: StartOptions {
                base_path: Some(base.to_path_buf()),
                storage_path: Some(base.join(".storage")),
                hard_reset: true,
            },
            root: ServiceContainer::new(),
            timestamp: Utc::now(),
        }))
        .unwrap();

    phase
        .wait_for(|p| *p == AppPhase::Started)
        .await
        .expect("phase channel");

    // Both layers come up and report playback through the telemetry route.
    let mut seen_playlist = false;
    let mut seen_timer = false;
    while !(seen_playlist && seen_timer) {
        let msg = common::expect_message(&mut notify_rx, 10, |m| {
            matches!(m, Message::Telemetry(_))
        })
        .await;
        if let Message::Telemetry(frame) = msg {
            if frame.values.get("state") == Some(&json!("playing")) {
                match frame.name.as_str() {
                    "PlaylistLayer" => seen_playlist = true,
                    "TimerLayer" => seen_timer = true,
                    _ => {}
                }
            }
        }
    }

    handle
        .sink()
        .accept(Message::Quit {
            timestamp: Utc::now(),
        })
        .unwrap();
    handle.join().await;
    assert_eq!(*phase.borrow(), AppPhase::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_without_a_template_fails_and_stops() {
    let dir = tempdir().unwrap();
    let (app, mut phase) = Application::new(
        "Application",
        PluginRegistry::builtin(),
        SourceRegistry::new(),
        None,
    );
    let handle = spawn_actor(app);
    handle
        .sink()
        .accept(Message::Start(StartEvent {
            options: StartOptions {
                base_path: Some(dir.path().to_path_buf()),
                storage_path: None,
                hard_reset: false,
            },
            root: ServiceContainer::new(),
            timestamp: Utc::now(),
        }))
        .unwrap();

    phase
        .wait_for(|p| *p == AppPhase::Stopped)
        .await
        .expect("phase channel");

    handle
        .sink()
        .accept(Message::Quit {
            timestamp: Utc::now(),
        })
        .unwrap();
    handle.join().await;
}
