//! Off-thread work with cooperative cancellation.
//!
//! Work runs on the blocking pool with a cancel-check; when it finishes
//! (value, error, or early return after observing the cancel flag) the
//! continuation turns the outcome into an optional message which is posted
//! to the owner mailbox. Only that message ever crosses back into the
//! owner; the continuation itself stays on the worker.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{error, warn};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::errors::CoreError;
use crate::logutil::escape_log;
use crate::metrics;
use crate::runtime::mailbox::MessageSink;
use crate::runtime::messages::Message;

/// Cancel-check handed to work functions. Work that loops should poll
/// `is_cancelled` and return early when it flips.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Requests cancellation of one submitted work item. Idempotent.
#[derive(Clone, Debug)]
pub struct CancelRequest(CancelFlag);

impl CancelRequest {
    pub fn cancel(&self) {
        self.0 .0.store(true, Ordering::Release);
    }
}

/// Submits work to the blocking pool on behalf of one owner mailbox.
pub struct FutureSource {
    owner: String,
    sink: MessageSink,
    shut_down: Arc<AtomicBool>,
    outstanding: Mutex<Vec<(CancelRequest, JoinHandle<()>)>>,
}

impl FutureSource {
    pub fn new(owner: &str, sink: MessageSink) -> Self {
        Self {
            owner: owner.to_string(),
            sink,
            shut_down: Arc::new(AtomicBool::new(false)),
            outstanding: Mutex::new(Vec::new()),
        }
    }

    /// Run `work` off-thread; on completion run `continuation` with
    /// `(cancelled, result, error)` and post its returned message (if any)
    /// to the owner mailbox.
    ///
    /// A panic inside `work` is routed through the continuation as an
    /// error; a panic inside the continuation is logged and suppressed.
    pub fn submit_future<W, C>(&self, work: W, continuation: C) -> Result<CancelRequest, CoreError>
    where
        W: FnOnce(&CancelFlag) -> anyhow::Result<Value> + Send + 'static,
        C: FnOnce(bool, Option<Value>, Option<String>) -> Option<Message> + Send + 'static,
    {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(CoreError::Closed);
        }
        metrics::inc_futures_submitted();
        let flag = CancelFlag::default();
        let cancel = CancelRequest(flag.clone());
        let sink = self.sink.clone();
        let owner = self.owner.clone();

        let join = tokio::task::spawn_blocking(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| work(&flag)));
            let cancelled = flag.is_cancelled();
            let (result, error) = match outcome {
                Ok(Ok(value)) => (Some(value), None),
                Ok(Err(err)) => (None, Some(format!("{err:#}"))),
                Err(_) => (None, Some("work panicked".to_string())),
            };
            let posted = catch_unwind(AssertUnwindSafe(|| {
                continuation(cancelled, result, error)
            }));
            metrics::inc_futures_completed();
            match posted {
                Ok(Some(msg)) => {
                    if let Err(err) = sink.accept(msg) {
                        warn!("'{owner}' continuation message undeliverable: {err}");
                    }
                }
                Ok(None) => {}
                Err(_) => {
                    error!("'{owner}' continuation panicked; suppressed");
                }
            }
        });

        let mut outstanding = self.outstanding.lock().expect("future mutex poisoned");
        outstanding.retain(|(_, handle)| !handle.is_finished());
        outstanding.push((cancel.clone(), join));
        Ok(cancel)
    }

    /// Owner name, for logs.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Flag all outstanding work cancelled and wait for the workers to
    /// drain. Later submissions fail with `Closed`.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        let drained = {
            let mut outstanding = self.outstanding.lock().expect("future mutex poisoned");
            std::mem::take(&mut *outstanding)
        };
        for (cancel, join) in drained {
            cancel.cancel();
            if let Err(err) = join.await {
                if !err.is_cancelled() {
                    error!("'{}' worker join failed: {}", self.owner, escape_log(&err.to_string()));
                }
            }
        }
    }
}
