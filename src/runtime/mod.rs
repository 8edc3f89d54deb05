//! # Runtime Module - Message Framework
//!
//! The runtime is the actor mesh underneath the orchestration engine. Each
//! component owns a private FIFO mailbox serviced by a single tokio task;
//! components never call across actor boundaries, they enqueue messages.
//!
//! ## Pieces
//!
//! - [`messages`] - The message union and its payload types
//! - [`mailbox`] - The [`mailbox::Actor`] trait, `spawn_actor` and sinks
//! - [`router`] - Topic fan-out between mailboxes
//! - [`timer`] - Cancelable delayed message delivery
//! - [`futures`] - Off-thread work with continuation-to-message hand-back
//! - [`clock`] - The injected time-of-day source (scalable for tests)
//! - [`services`] - Type-keyed service container handed to plugins
//!
//! ## Ordering guarantees
//!
//! Within one actor, handler invocations are strictly serial and match
//! mailbox insertion order. Across actors the only guarantee is FIFO from a
//! given sender to a given receiver. Timer firings match wall-clock order.

pub mod clock;
pub mod futures;
pub mod mailbox;
pub mod messages;
pub mod router;
pub mod services;
pub mod timer;

pub use clock::{ScaledTimeOfDay, SystemTimeOfDay, TimeOfDay};
pub use futures::{CancelFlag, CancelRequest, FutureSource};
pub use mailbox::{spawn_actor, Actor, MailboxHandle, MessageSink};
pub use messages::{
    ConfigureEvent, ConfigureNotify, DisplayImage, DisplaySettings, Frame, FutureCompleted,
    Message, PluginEvent, StartEvent, StartOptions, Telemetry,
};
pub use router::{MessageRouter, Route};
pub use services::ServiceContainer;
pub use timer::{TimerCancel, TimerFuture, TimerService};
