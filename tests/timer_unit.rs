//! Timer service contract: scaled delays, exactly-once delivery,
//! cancellation, and shutdown.

mod common;

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};

use inkboard::errors::CoreError;
use inkboard::runtime::{Message, ScaledTimeOfDay, SystemTimeOfDay, TimerService};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scaled_timer_fires_in_scaled_time() {
    // At scale 60 a sixty-second timer fires after about one real second.
    let clock = Arc::new(ScaledTimeOfDay::new(Utc::now(), 60.0).unwrap());
    let service = TimerService::new(clock);
    let (recorder, mut rx) = common::spawn_recorder("sink");

    let armed_at = Utc::now();
    let started = Instant::now();
    let (future, _cancel) = service
        .create_timer(
            ChronoDuration::seconds(60),
            Some(recorder.sink()),
            Message::NextTrack {
                timestamp: armed_at,
            },
        )
        .unwrap();

    let fired = future.wait().await;
    let elapsed = started.elapsed().as_secs_f64();
    assert!(
        (0.8..=1.6).contains(&elapsed),
        "fired after {elapsed}s, expected ~1s"
    );
    match fired {
        Some(Message::NextTrack { timestamp }) => assert_eq!(timestamp, armed_at),
        other => panic!("unexpected resolution {other:?}"),
    }

    // The sink saw the message exactly once.
    let msg = common::expect_message(&mut rx, 2, |m| matches!(m, Message::NextTrack { .. })).await;
    assert_eq!(msg.timestamp(), armed_at);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_timer_never_reaches_the_sink() {
    let clock = Arc::new(ScaledTimeOfDay::new(Utc::now(), 60.0).unwrap());
    let service = TimerService::new(clock);
    let (recorder, mut rx) = common::spawn_recorder("sink");

    let (future, cancel) = service
        .create_timer(
            ChronoDuration::seconds(60),
            Some(recorder.sink()),
            Message::NextTrack {
                timestamp: Utc::now(),
            },
        )
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    cancel.cancel();
    // A second cancel is harmless.
    cancel.cancel();

    assert!(future.wait().await.is_none());
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err());

    service.shutdown().await;
}

#[tokio::test]
async fn shutdown_cancels_outstanding_timers_and_closes_the_service() {
    let service = TimerService::new(Arc::new(SystemTimeOfDay));
    let (future, _cancel) = service
        .create_timer(
            ChronoDuration::seconds(3600),
            None,
            Message::NextTrack {
                timestamp: Utc::now(),
            },
        )
        .unwrap();

    service.shutdown().await;
    assert!(future.wait().await.is_none());

    let err = service
        .create_timer(
            ChronoDuration::seconds(1),
            None,
            Message::NextTrack {
                timestamp: Utc::now(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::Closed));
}
