//! Layer state machines driven end to end over a temporary storage tree:
//! playlist advancement, timer-task startup and trigger firing, and the
//! slide-show plugin pulling frames out of a data source.

mod common;

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tempfile::tempdir;

use inkboard::engine::playlist::PlaylistLayer;
use inkboard::engine::timer_layer::TimerLayer;
use inkboard::plugins::PluginRegistry;
use inkboard::runtime::{
    spawn_actor, ConfigureEvent, DisplaySettings, Frame, MailboxHandle, Message, MessageRouter,
    Route, ScaledTimeOfDay, SystemTimeOfDay, TimeOfDay,
};
use inkboard::sources::{
    DataSourceContext, DataSourceEntry, DataSourceInfo, ListSource, RenderSource, SourceRegistry,
};
use inkboard::storage::ConfigurationManager;

struct Gallery;

impl ListSource for Gallery {
    fn open(&self, _ctx: &DataSourceContext, _params: &Value) -> anyhow::Result<Vec<Value>> {
        Ok(vec![json!("one"), json!("two")])
    }
}

impl RenderSource for Gallery {
    fn render(
        &self,
        ctx: &DataSourceContext,
        _params: &Value,
        _item: &Value,
    ) -> anyhow::Result<Option<Frame>> {
        Ok(Some(Frame::solid(ctx.dimensions.0, ctx.dimensions.1, 128)))
    }
}

fn gallery_registry() -> SourceRegistry {
    let gallery = Arc::new(Gallery);
    let mut registry = SourceRegistry::new();
    registry.register(
        DataSourceEntry::new(DataSourceInfo {
            id: "gallery".into(),
            name: "Gallery".into(),
            default_settings: None,
        })
        .with_list(gallery.clone())
        .with_render(gallery),
    );
    registry
}

struct LayerHarness {
    layer: MailboxHandle,
    telemetry_rx: tokio::sync::mpsc::UnboundedReceiver<Message>,
    display_rx: tokio::sync::mpsc::UnboundedReceiver<Message>,
    time: Arc<dyn TimeOfDay>,
}

impl LayerHarness {
    /// Drive DisplaySettings + Configure into the layer; the layer then
    /// self-dispatches StartPlayback.
    fn configure(&self, cm: Arc<ConfigurationManager>) {
        let now = self.time.now_utc();
        self.layer
            .sink()
            .accept(Message::DisplaySettings(DisplaySettings {
                name: "mock".into(),
                width: 800,
                height: 480,
                timestamp: now,
            }))
            .unwrap();
        self.layer
            .sink()
            .accept(Message::Configure(ConfigureEvent {
                token: "layer".into(),
                manager: cm,
                notify_to: None,
                timestamp: now,
            }))
            .unwrap();
    }

    async fn quit(self) {
        let _ = self.layer.sink().accept(Message::Quit {
            timestamp: self.time.now_utc(),
        });
        self.layer.join().await;
    }
}

fn playlist_harness(time: Arc<dyn TimeOfDay>) -> LayerHarness {
    let router = MessageRouter::new();
    let (telemetry, telemetry_rx) = common::spawn_recorder("telemetry");
    let (display, display_rx) = common::spawn_recorder("display");
    router.add_route(Route::new("telemetry", vec![telemetry.sink()]));
    router.add_route(Route::new("display", vec![display.sink()]));
    let layer = spawn_actor(PlaylistLayer::new("playlistlayer", router, time.clone()));
    LayerHarness {
        layer,
        telemetry_rx,
        display_rx,
        time,
    }
}

fn timer_harness(time: Arc<dyn TimeOfDay>) -> LayerHarness {
    let router = MessageRouter::new();
    let (telemetry, telemetry_rx) = common::spawn_recorder("telemetry");
    let (display, display_rx) = common::spawn_recorder("display");
    router.add_route(Route::new("telemetry", vec![telemetry.sink()]));
    router.add_route(Route::new("display", vec![display.sink()]));
    let layer = spawn_actor(TimerLayer::new("timerlayer", router, time.clone()));
    LayerHarness {
        layer,
        telemetry_rx,
        display_rx,
        time,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn playlist_layer_advances_through_tracks_and_wraps() {
    let dir = tempdir().unwrap();
    let base = dir.path();
    common::write_schemas(base);
    common::write_schedule(base, "master_schedule.json", &common::master_doc("main"));
    common::write_schedule(
        base,
        "main.json",
        &common::playlist_doc("main", "main", &["First", "Second", "Third"]),
    );
    let cm = common::make_cm(base, PluginRegistry::builtin(), SourceRegistry::new());

    let mut harness = playlist_harness(Arc::new(SystemTimeOfDay));
    harness.configure(cm);

    let expectations = [0, 1, 2, 0];
    for (ix, expected) in expectations.iter().enumerate() {
        let frame = common::expect_telemetry(&mut harness.telemetry_rx, 5).await;
        assert_eq!(frame["state"], json!("playing"), "frame: {frame:?}");
        assert_eq!(frame["playlist"], json!("main"));
        assert_eq!(frame["current_track_index"], json!(expected));
        if ix + 1 < expectations.len() {
            harness
                .layer
                .sink()
                .accept(Message::NextTrack {
                    timestamp: harness.time.now_utc(),
                })
                .unwrap();
        }
    }
    harness.quit().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn playlist_layer_reports_configure_failure() {
    // A schedule folder without a master schedule: configuration must
    // fail and say so.
    let dir = tempdir().unwrap();
    let base = dir.path();
    common::write_schemas(base);
    common::write_schedule(base, "main.json", &common::playlist_doc("main", "main", &["One"]));
    let cm = common::make_cm(base, PluginRegistry::builtin(), SourceRegistry::new());

    let mut harness = playlist_harness(Arc::new(SystemTimeOfDay));
    harness.configure(cm);

    let frame = common::expect_telemetry(&mut harness.telemetry_rx, 5).await;
    assert_eq!(frame["state"], json!("error"));
    assert!(frame["message"].as_str().unwrap().contains("master schedule"));
    harness.quit().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timer_layer_plays_startup_tasks_then_waits() {
    let dir = tempdir().unwrap();
    let base = dir.path();
    common::write_schemas(base);
    common::write_schedule(base, "master_schedule.json", &common::master_doc("main"));
    common::write_schedule(base, "main.json", &common::playlist_doc("main", "main", &["One"]));
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
                    "day": { "type": "dayofweek", "days": [0,1,2,3,4,5,6] },
                    "time": { "type": "hourly", "minutes": [0] }
                }
            }]
        }),
    );
    let cm = common::make_cm(base, PluginRegistry::builtin(), SourceRegistry::new());

    let mut harness = timer_harness(Arc::new(SystemTimeOfDay));
    harness.configure(cm);

    // The startup pack plays immediately.
    let frame = common::expect_telemetry(&mut harness.telemetry_rx, 5).await;
    assert_eq!(frame["state"], json!("playing"));
    assert_eq!(frame["current_track_index"], json!(0));

    // With the pack exhausted the layer arms the hourly trigger and waits.
    harness
        .layer
        .sink()
        .accept(Message::NextTrack {
            timestamp: harness.time.now_utc(),
        })
        .unwrap();
    let frame = common::expect_telemetry(&mut harness.telemetry_rx, 5).await;
    assert_eq!(frame["state"], json!("waiting"));
    assert!(frame["schedule_ts"].as_str().is_some());
    harness.quit().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timer_layer_fires_the_armed_trigger() {
    // Scheduled time runs 3600x real time, so the next minute boundary
    // arrives within a fraction of a real second.
    let dir = tempdir().unwrap();
    let base = dir.path();
    common::write_schemas(base);
    common::write_schedule(base, "master_schedule.json", &common::master_doc("main"));
    common::write_schedule(base, "main.json", &common::playlist_doc("main", "main", &["One"]));
    common::write_schedule(
        base,
        "tasks.json",
        &json!({
            "type": "urn:inky:storage:schedule:tasks:1",
            "id": "tasks",
            "name": "tasks",
            "items": [{
                "id": "minutely",
                "title": "Minutely",
                "enabled": true,
                "task": {
                    "plugin_name": "debug",
                    "title": "Minutely",
                    "duration_minutes": 1,
                    "content": {}
                },
                "trigger": {
                    "time": { "type": "hourly", "minutes": (0..60).collect::<Vec<u32>>() }
                }
            }]
        }),
    );
    let cm = common::make_cm(base, PluginRegistry::builtin(), SourceRegistry::new());

    let clock = Arc::new(ScaledTimeOfDay::new(Utc::now(), 3600.0).unwrap());
    let mut harness = timer_harness(clock);
    harness.configure(cm);

    let frame = common::expect_telemetry(&mut harness.telemetry_rx, 5).await;
    assert_eq!(frame["state"], json!("waiting"));

    // The armed timer expires and the pack plays.
    let frame = common::expect_telemetry(&mut harness.telemetry_rx, 5).await;
    assert_eq!(frame["state"], json!("playing"), "frame: {frame:?}");
    assert_eq!(frame["current_track_index"], json!(0));
    harness.quit().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slide_show_renders_frames_and_advances() {
    let dir = tempdir().unwrap();
    let base = dir.path();
    common::write_schemas(base);
    common::write_schedule(base, "master_schedule.json", &common::master_doc("show"));
    common::write_schedule(
        base,
        "show.json",
        &json!({
            "type": "urn:inky:storage:schedule:playlist:1",
            "id": "show",
            "name": "show",
            "items": [{
                "plugin_name": "slide-show",
                "id": "gallery-track",
                "title": "Gallery",
                "content": {
                    "dataSource": "gallery",
                    "slideMinutes": 1,
                    "timeoutSeconds": 5
                }
            }]
        }),
    );
    let cm = common::make_cm(base, PluginRegistry::builtin(), gallery_registry());

    // One slide-minute passes every 100ms of real time.
    let clock = Arc::new(ScaledTimeOfDay::new(Utc::now(), 600.0).unwrap());
    let mut harness = playlist_harness(clock);
    harness.configure(cm);

    let frame = common::expect_telemetry(&mut harness.telemetry_rx, 5).await;
    assert_eq!(frame["state"], json!("playing"));

    // Two slides from the first pass, then the playlist wraps and the
    // show starts over; expect at least three frames.
    for _ in 0..3 {
        let msg =
            common::expect_message(&mut harness.display_rx, 10, |m| {
                matches!(m, Message::DisplayImage(_))
            })
            .await;
        match msg {
            Message::DisplayImage(image) => {
                assert_eq!(image.title, "Gallery");
                assert_eq!(image.frame.width, 800);
                assert_eq!(image.frame.height, 480);
            }
            _ => unreachable!(),
        }
    }
    harness.quit().await;
}
