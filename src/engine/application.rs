//! Application supervisor: wires the actor graph and sequences
//! configure → start → stop.
//!
//! Start builds the configuration manager (optionally hard-resetting
//! storage), spawns the display and both layers, registers the routes and
//! configures the display. The display replies with its resolution on the
//! `display-settings` topic, which triggers `Configure` into both layers.
//! Stop (and Quit without a prior Stop) shuts the mesh down in reverse
//! order: timer layer, playlist layer, display.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use tokio::sync::watch;

use crate::engine::display::Display;
use crate::engine::playlist::PlaylistLayer;
use crate::engine::timer_layer::TimerLayer;
use crate::plugins::PluginRegistry;
use crate::runtime::clock::{SystemTimeOfDay, TimeOfDay};
use crate::runtime::mailbox::{spawn_actor, Actor, MailboxHandle, MessageSink};
use crate::runtime::messages::{
    ConfigureEvent, ConfigureNotify, DisplaySettings, Message, StartEvent,
};
use crate::runtime::router::{MessageRouter, Route};
use crate::sources::SourceRegistry;
use crate::storage::ConfigurationManager;

/// Application lifecycle phase, observable through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppPhase {
    Idle,
    Started,
    Stopped,
}

pub struct Application {
    name: String,
    plugins: PluginRegistry,
    sources: SourceRegistry,
    /// External sink receiving telemetry and configuration errors.
    notify_sink: Option<MessageSink>,
    phase: watch::Sender<AppPhase>,
    own_sink: Option<MessageSink>,
    time: Arc<dyn TimeOfDay>,
    cm: Option<Arc<ConfigurationManager>>,
    router: Option<MessageRouter>,
    display: Option<MailboxHandle>,
    playlist_layer: Option<MailboxHandle>,
    timer_layer: Option<MailboxHandle>,
    started: bool,
    stopped: bool,
}

impl Application {
    /// Build the supervisor. The watch receiver observes lifecycle
    /// transitions for the binary and for tests.
    pub fn new(
        name: &str,
        plugins: PluginRegistry,
        sources: SourceRegistry,
        notify_sink: Option<MessageSink>,
    ) -> (Self, watch::Receiver<AppPhase>) {
        let (phase, phase_rx) = watch::channel(AppPhase::Idle);
        (
            Self {
                name: name.to_string(),
                plugins,
                sources,
                notify_sink,
                phase,
                own_sink: None,
                time: Arc::new(SystemTimeOfDay),
                cm: None,
                router: None,
                display: None,
                playlist_layer: None,
                timer_layer: None,
                started: false,
                stopped: false,
            },
            phase_rx,
        )
    }

    fn handle_start(&mut self, event: StartEvent) -> anyhow::Result<()> {
        if let Some(time) = event.root.optional::<Arc<dyn TimeOfDay>>() {
            self.time = time;
        }
        let base_path: PathBuf = match &event.options.base_path {
            Some(path) => path.clone(),
            None => std::env::current_dir()?,
        };
        info!(
            "'{}' base: {} storage: {:?}",
            self.name,
            base_path.display(),
            event.options.storage_path
        );
        let cm = ConfigurationManager::new(
            &base_path,
            event.options.storage_path.as_deref(),
            self.plugins.clone(),
            self.sources.clone(),
        );
        if event.options.hard_reset {
            info!("'{}' hard reset configuration", self.name);
            cm.hard_reset()?;
        } else {
            cm.ensure_folders()?;
        }

        let router = MessageRouter::new();
        let display = spawn_actor(Display::new("Display", router.clone()));
        let playlist = spawn_actor(PlaylistLayer::new(
            "PlaylistLayer",
            router.clone(),
            self.time.clone(),
        ));
        let timer = spawn_actor(TimerLayer::new(
            "TimerLayer",
            router.clone(),
            self.time.clone(),
        ));
        let own = self.own_sink.clone().expect("application attached");
        router.add_route(Route::new("display", vec![display.sink()]));
        router.add_route(Route::new("playlist-layer", vec![playlist.sink()]));
        router.add_route(Route::new("timer-layer", vec![timer.sink()]));
        router.add_route(Route::new(
            "display-settings",
            vec![own.clone(), playlist.sink(), timer.sink()],
        ));
        if let Some(sink) = &self.notify_sink {
            router.add_route(Route::new("telemetry", vec![sink.clone()]));
        }

        display.sink().accept(Message::Configure(ConfigureEvent {
            token: "display".into(),
            manager: cm.clone(),
            notify_to: Some(own),
            timestamp: event.timestamp,
        }))?;

        self.cm = Some(cm);
        self.router = Some(router);
        self.display = Some(display);
        self.playlist_layer = Some(playlist);
        self.timer_layer = Some(timer);
        self.started = true;
        let _ = self.phase.send(AppPhase::Started);
        info!("'{}' started", self.name);
        Ok(())
    }

    fn on_display_settings(&mut self, settings: &DisplaySettings) -> anyhow::Result<()> {
        info!(
            "'{}' DisplaySettings {} {}x{}",
            self.name, settings.name, settings.width, settings.height
        );
        let (Some(cm), Some(router)) = (self.cm.clone(), self.router.clone()) else {
            return Ok(());
        };
        let own = self.own_sink.clone();
        for token in ["playlist-layer", "timer-layer"] {
            router.send(
                token,
                Message::Configure(ConfigureEvent {
                    token: token.into(),
                    manager: cm.clone(),
                    notify_to: own.clone(),
                    timestamp: settings.timestamp,
                }),
            );
        }
        Ok(())
    }

    fn on_configure_notify(&mut self, notify: ConfigureNotify) {
        if notify.error {
            error!(
                "'{}' cannot configure {}: {}",
                self.name,
                notify.token,
                notify.detail.as_deref().unwrap_or("unknown")
            );
            if let Some(sink) = &self.notify_sink {
                let _ = sink.accept(Message::ConfigureNotify(notify));
            }
        } else {
            info!("'{}' {} configured successfully", self.name, notify.token);
        }
    }

    async fn do_stop(&mut self) {
        let now = self.time.now_utc();
        for handle in [
            self.timer_layer.take(),
            self.playlist_layer.take(),
            self.display.take(),
        ]
        .into_iter()
        .flatten()
        {
            let target = handle.sink();
            if let Err(err) = target.accept(Message::Quit { timestamp: now }) {
                warn!("'{}' quit to '{}' failed: {err}", self.name, target.target());
            }
            handle.join().await;
            info!("'{}' stopped '{}'", self.name, target.target());
        }
        self.stopped = true;
        let _ = self.phase.send(AppPhase::Stopped);
    }
}

#[async_trait]
impl Actor for Application {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&mut self, own_sink: MessageSink) {
        self.own_sink = Some(own_sink);
    }

    async fn handle(&mut self, msg: Message) -> anyhow::Result<()> {
        match msg {
            Message::Start(event) => {
                if let Err(err) = self.handle_start(event) {
                    error!("'{}' failed to start: {err:#}", self.name);
                    let _ = self.phase.send(AppPhase::Stopped);
                    return Err(err);
                }
                Ok(())
            }
            Message::Stop { .. } => {
                self.do_stop().await;
                info!("'{}' stopped", self.name);
                Ok(())
            }
            Message::DisplaySettings(settings) => self.on_display_settings(&settings),
            Message::ConfigureNotify(notify) => {
                self.on_configure_notify(notify);
                Ok(())
            }
            other => {
                warn!("'{}' no handler for {}", self.name, other.kind());
                Ok(())
            }
        }
    }

    async fn on_quit(&mut self) {
        info!("'{}' quitting", self.name);
        if self.started && !self.stopped {
            self.do_stop().await;
        } else {
            let _ = self.phase.send(AppPhase::Stopped);
        }
    }
}
