//! Delayed delivery of a message to a sink, cancelable, driven by the
//! injected time source.
//!
//! A timer armed for a scheduled-time delta sleeps `delta / scale` of real
//! time. If it expires, the sink receives the message exactly once and the
//! timer future resolves to the message; if it is cancelled first, the sink
//! is never called and the future resolves to `None`.

use std::sync::{Arc, Mutex};

use chrono::Duration as ChronoDuration;
use log::{debug, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::errors::CoreError;
use crate::metrics;
use crate::runtime::clock::TimeOfDay;
use crate::runtime::mailbox::MessageSink;
use crate::runtime::messages::Message;

/// Resolves when the timer fires (`Some(message)`) or is cancelled (`None`).
#[derive(Debug)]
pub struct TimerFuture {
    rx: oneshot::Receiver<Option<Message>>,
}

impl TimerFuture {
    pub async fn wait(self) -> Option<Message> {
        self.rx.await.unwrap_or(None)
    }
}

/// Idempotent cancellation handle for one timer.
#[derive(Clone, Debug)]
pub struct TimerCancel {
    tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl TimerCancel {
    pub fn cancel(&self) {
        let sender = self.tx.lock().expect("timer cancel mutex poisoned").take();
        if let Some(tx) = sender {
            // Receiver may already be gone if the timer fired; harmless.
            let _ = tx.send(());
        }
    }
}

/// Creates and tracks timers so shutdown can cancel them all and wait for
/// the carrier tasks to observe it.
pub struct TimerService {
    time: Arc<dyn TimeOfDay>,
    outstanding: Mutex<Vec<(TimerCancel, JoinHandle<()>)>>,
    shut_down: Mutex<bool>,
}

impl TimerService {
    pub fn new(time: Arc<dyn TimeOfDay>) -> Self {
        Self {
            time,
            outstanding: Mutex::new(Vec::new()),
            shut_down: Mutex::new(false),
        }
    }

    /// Arm a timer for `delta` of scheduled time. When it expires the
    /// message goes to `sink` (if any) and the returned future resolves.
    pub fn create_timer(
        &self,
        delta: ChronoDuration,
        sink: Option<MessageSink>,
        message: Message,
    ) -> Result<(TimerFuture, TimerCancel), CoreError> {
        if *self.shut_down.lock().expect("timer mutex poisoned") {
            return Err(CoreError::Closed);
        }
        let scale = self.time.scale();
        let real_secs = (delta.num_milliseconds().max(0) as f64 / 1000.0) / scale;
        let sleep = std::time::Duration::from_secs_f64(real_secs);

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel::<Option<Message>>();
        let cancel = TimerCancel {
            tx: Arc::new(Mutex::new(Some(cancel_tx))),
        };

        let join = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {
                    metrics::inc_timers_fired();
                    if let Some(sink) = &sink {
                        if let Err(err) = sink.accept(message.clone()) {
                            warn!("timer sink '{}' rejected: {err}", sink.target());
                        }
                    }
                    let _ = done_tx.send(Some(message));
                }
                _ = cancel_rx => {
                    metrics::inc_timers_cancelled();
                    debug!("timer cancelled before expiry");
                    let _ = done_tx.send(None);
                }
            }
        });

        let mut outstanding = self.outstanding.lock().expect("timer mutex poisoned");
        outstanding.retain(|(_, handle)| !handle.is_finished());
        outstanding.push((cancel.clone(), join));
        Ok((TimerFuture { rx: done_rx }, cancel))
    }

    /// Cancel all outstanding timers and wait for their carriers to finish.
    /// Further `create_timer` calls fail with `Closed`.
    pub async fn shutdown(&self) {
        let drained = {
            let mut flag = self.shut_down.lock().expect("timer mutex poisoned");
            *flag = true;
            let mut outstanding = self.outstanding.lock().expect("timer mutex poisoned");
            std::mem::take(&mut *outstanding)
        };
        for (cancel, join) in drained {
            cancel.cancel();
            let _ = join.await;
        }
    }
}
