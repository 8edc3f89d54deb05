//! Mailbox actors: a private unbounded FIFO inbox drained by one tokio task.
//!
//! `accept` is non-blocking and thread-safe. Delivery within a single actor
//! is strictly serial; a handler error is logged and dropped, it never kills
//! the actor. Only [`Message::Quit`] ends an actor: it bypasses normal
//! handling, runs the shutdown hook, discards whatever is still queued and
//! closes the sink so later sends fail with `Closed`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::CoreError;
use crate::logutil::escape_log;
use crate::metrics;
use crate::runtime::messages::Message;

/// A component that services a mailbox.
#[async_trait]
pub trait Actor: Send + 'static {
    fn name(&self) -> &str;

    /// Called once before the first message, with the actor's own sink.
    /// Lets state machines self-dispatch and hand their address to
    /// sub-services.
    fn attach(&mut self, _own_sink: MessageSink) {}

    /// Handle one message. Errors are logged and swallowed by the loop.
    async fn handle(&mut self, msg: Message) -> anyhow::Result<()>;

    /// Shutdown hook run when `Quit` is dequeued, before the backlog is
    /// discarded.
    async fn on_quit(&mut self) {}
}

/// Cloneable address of a mailbox.
#[derive(Clone)]
pub struct MessageSink {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Message>,
    closed: Arc<AtomicBool>,
}

impl MessageSink {
    /// Enqueue a message. Never blocks. Fails with [`CoreError::Closed`]
    /// once the actor has accepted a `Quit`.
    pub fn accept(&self, msg: Message) -> Result<(), CoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::Closed);
        }
        let is_quit = matches!(msg, Message::Quit { .. });
        if is_quit {
            // No further messages after a quit; the race where another
            // sender slips one in before the flag settles is benign, the
            // drain discards it.
            self.closed.store(true, Ordering::Release);
        }
        self.tx.send(msg).map_err(|_| CoreError::Closed)?;
        Ok(())
    }

    /// Target actor name, for logs.
    pub fn target(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for MessageSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSink")
            .field("target", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Running actor: its address plus the join handle of its worker task.
pub struct MailboxHandle {
    sink: MessageSink,
    join: JoinHandle<()>,
}

impl MailboxHandle {
    pub fn sink(&self) -> MessageSink {
        self.sink.clone()
    }

    /// Wait for the actor's worker to terminate.
    pub async fn join(self) {
        if let Err(err) = self.join.await {
            error!("'{}' worker join failed: {err}", self.sink.target());
        }
    }
}

/// Spawn an actor onto its own worker task and return its handle.
pub fn spawn_actor<A: Actor>(mut actor: A) -> MailboxHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let closed = Arc::new(AtomicBool::new(false));
    let name: Arc<str> = Arc::from(actor.name());
    let sink = MessageSink {
        name: name.clone(),
        tx,
        closed,
    };
    actor.attach(sink.clone());
    let join = tokio::spawn(async move {
        info!("'{name}' start");
        while let Some(msg) = rx.recv().await {
            metrics::inc_messages_dispatched();
            if matches!(msg, Message::Quit { .. }) {
                actor.on_quit().await;
                let mut discarded = 0usize;
                while rx.try_recv().is_ok() {
                    discarded += 1;
                }
                info!("'{name}' end ({discarded} discarded)");
                return;
            }
            debug!("'{name}' <- {}", msg.kind());
            if let Err(err) = actor.handle(msg).await {
                metrics::inc_handler_errors();
                error!(
                    "handler.unhandled '{name}': {}",
                    escape_log(&format!("{err:#}"))
                );
            }
        }
        // All senders dropped without a quit; nothing left to service.
        info!("'{name}' end (senders gone)");
    });
    MailboxHandle { sink, join }
}
