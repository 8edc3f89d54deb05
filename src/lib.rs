//! # Inkboard - Display Orchestration for E-Ink Billboards
//!
//! Inkboard decides what an electronic-ink style billboard shows at any
//! instant, asks a pluggable producer to render an image, and pushes that
//! image to a physical or simulated display.
//!
//! ## Architecture
//!
//! The runtime is an actor mesh: every component owns a private FIFO
//! mailbox drained by a single worker, and a message router fans messages
//! out by topic. Two layers run in parallel on top of it:
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │  PlaylistLayer  │────→│                 │     ┌──────────────┐
//! └─────────────────┘     │     Display     │────→│ DisplayDriver│
//! ┌─────────────────┐     │     (actor)     │     └──────────────┘
//! │   TimerLayer    │────→│                 │
//! └─────────────────┘     └─────────────────┘
//!          │
//! ┌─────────────────┐     ┌─────────────────┐
//! │ Schedule model  │     │  Configuration  │
//! │ (master/timed/  │     │  storage tree   │
//! │  playlist/task) │     │  (hash-stamped) │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! - The **playlist layer** plays the playlist the master schedule maps the
//!   current instant to, advancing track by track.
//! - The **timer layer** fires one-shot tasks from day/time triggers, plus
//!   an optional startup pack.
//! - Both layers drive plugins, which pull state and frames from data
//!   sources and publish [`runtime::messages::DisplayImage`] frames.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use inkboard::engine::application::Application;
//! use inkboard::plugins::PluginRegistry;
//! use inkboard::runtime::{spawn_actor, Message, ServiceContainer, StartEvent, StartOptions};
//! use inkboard::sources::SourceRegistry;
//! use chrono::Utc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (app, _phase) = Application::new(
//!         "Application",
//!         PluginRegistry::builtin(),
//!         SourceRegistry::new(),
//!         None,
//!     );
//!     let handle = spawn_actor(app);
//!     handle.sink().accept(Message::Start(StartEvent {
//!         options: StartOptions::default(),
//!         root: ServiceContainer::new(),
//!         timestamp: Utc::now(),
//!     }))?;
//!     // ... run until shutdown, then:
//!     handle.sink().accept(Message::Quit { timestamp: Utc::now() })?;
//!     handle.join().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`runtime`] - Mailbox actors, router, timers, future submitter
//! - [`storage`] - Hash-stamped configuration documents and the manager
//! - [`schedule`] - Schedule entities, trigger generators, render window
//! - [`sources`] - Data-source capability contract and worker pool
//! - [`plugins`] - Plugin contract, registry, built-in plugins
//! - [`engine`] - Display actor, the two layers, the supervisor
//!
//! ## Time
//!
//! The core never calls the OS clock. Every timestamp originates from the
//! injected [`runtime::TimeOfDay`] service, so tests (and previews) can run
//! on scaled time.

pub mod engine;
pub mod errors;
pub mod logutil;
pub mod metrics;
pub mod plugins;
pub mod runtime;
pub mod schedule;
pub mod sources;
pub mod storage;
pub mod validation;

pub use errors::CoreError;
