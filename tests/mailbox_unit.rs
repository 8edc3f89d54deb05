//! Mailbox actor semantics: serial FIFO delivery, quit/close behavior,
//! handler error isolation and router fan-out.

mod common;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use tokio::sync::mpsc;

use inkboard::errors::CoreError;
use inkboard::runtime::{
    spawn_actor, Actor, Message, MessageRouter, PluginEvent, Route,
};

/// Actor that fails on `PluginReceive` and records everything else.
struct Flaky {
    tx: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl Actor for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn handle(&mut self, msg: Message) -> anyhow::Result<()> {
        if matches!(msg, Message::PluginReceive(_)) {
            anyhow::bail!("induced handler failure");
        }
        let _ = self.tx.send(msg);
        Ok(())
    }
}

#[tokio::test]
async fn delivery_is_fifo_per_sender() {
    let (handle, mut rx) = common::spawn_recorder("fifo");
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for ix in 0..200 {
        handle
            .sink()
            .accept(Message::NextTrack {
                timestamp: base + Duration::seconds(ix),
            })
            .unwrap();
    }
    for ix in 0..200 {
        let msg = common::expect_message(&mut rx, 5, |_| true).await;
        match msg {
            Message::NextTrack { timestamp } => {
                assert_eq!(timestamp, base + Duration::seconds(ix));
            }
            other => panic!("unexpected {}", other.kind()),
        }
    }
}

#[tokio::test]
async fn quit_closes_the_sink_and_discards_the_backlog() {
    let (handle, mut rx) = common::spawn_recorder("quitting");
    let now = Utc::now();
    let sink = handle.sink();
    sink.accept(Message::Quit { timestamp: now }).unwrap();
    // Sends after quit fail with Closed.
    let err = sink.accept(Message::NextTrack { timestamp: now }).unwrap_err();
    assert!(matches!(err, CoreError::Closed));
    handle.join().await;
    // Nothing was handled.
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn handler_errors_do_not_kill_the_actor() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = spawn_actor(Flaky { tx });
    let now = Utc::now();
    handle
        .sink()
        .accept(Message::PluginReceive(PluginEvent {
            plugin_name: "nobody".into(),
            event: "boom".into(),
            payload: serde_json::Value::Null,
            timestamp: now,
        }))
        .unwrap();
    handle
        .sink()
        .accept(Message::NextTrack { timestamp: now })
        .unwrap();

    let survived = common::expect_message(&mut rx, 5, |m| {
        matches!(m, Message::NextTrack { .. })
    })
    .await;
    assert_eq!(survived.timestamp(), now);

    handle.sink().accept(Message::Quit { timestamp: now }).unwrap();
    handle.join().await;
}

#[tokio::test]
async fn router_delivers_to_all_live_subscribers() {
    let (alive, mut alive_rx) = common::spawn_recorder("alive");
    let (dead, _dead_rx) = common::spawn_recorder("dead");
    let now = Utc::now();

    let router = MessageRouter::new();
    router.add_route(Route::new("telemetry", vec![dead.sink(), alive.sink()]));

    // Kill the first subscriber; the second must still receive.
    dead.sink().accept(Message::Quit { timestamp: now }).unwrap();
    dead.join().await;

    let delivered = router.send("telemetry", Message::NextTrack { timestamp: now });
    assert_eq!(delivered, 1);
    let msg = common::expect_message(&mut alive_rx, 5, |m| {
        matches!(m, Message::NextTrack { .. })
    })
    .await;
    assert_eq!(msg.timestamp(), now);

    // Unknown topics deliver to nobody.
    assert_eq!(router.send("nowhere", Message::NextTrack { timestamp: now }), 0);
}
