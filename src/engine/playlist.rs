//! Playlist layer: continuous playback of the master schedule's current
//! playlist.
//!
//! State machine: `uninitialized → loaded → playing → stopped | error`.
//! Configuration loads the schedule documents and spins up the layer's
//! sub-services; playback resolves one plugin per track and advances on
//! `NextTrack`. Plugin failures are absorbed as telemetry; the layer
//! enters `error` only when a lifecycle call on the active plugin fails.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde_json::json;

use crate::engine::context::ExecutionContext;
use crate::engine::{frame_values, LayerState};
use crate::logutil::escape_log;
use crate::plugins::{Plugin, Track};
use crate::runtime::clock::TimeOfDay;
use crate::runtime::futures::FutureSource;
use crate::runtime::mailbox::{Actor, MessageSink};
use crate::runtime::messages::{ConfigureEvent, Message, Telemetry};
use crate::runtime::router::MessageRouter;
use crate::runtime::services::ServiceContainer;
use crate::runtime::timer::TimerService;
use crate::schedule::{MasterSchedule, Playlist};
use crate::sources::DataSourceManager;
use crate::storage::ConfigurationManager;

struct ActiveTrack {
    plugin: Box<dyn Plugin>,
    track: Track,
    ctx: ExecutionContext,
    playlist: String,
    track_index: usize,
}

pub struct PlaylistLayer {
    name: String,
    router: MessageRouter,
    time: Arc<dyn TimeOfDay>,
    own_sink: Option<MessageSink>,
    cm: Option<Arc<ConfigurationManager>>,
    playlists: Vec<Playlist>,
    master: Option<MasterSchedule>,
    datasources: Option<Arc<DataSourceManager>>,
    timer: Option<Arc<TimerService>>,
    futures: Option<Arc<FutureSource>>,
    dimensions: (u32, u32),
    state: LayerState,
    active: Option<ActiveTrack>,
}

impl PlaylistLayer {
    pub fn new(name: &str, router: MessageRouter, time: Arc<dyn TimeOfDay>) -> Self {
        Self {
            name: name.to_string(),
            router,
            time,
            own_sink: None,
            cm: None,
            playlists: Vec::new(),
            master: None,
            datasources: None,
            timer: None,
            futures: None,
            dimensions: (800, 480),
            state: LayerState::Uninitialized,
            active: None,
        }
    }

    fn telemetry(&self, mut values: serde_json::Map<String, serde_json::Value>) {
        values.insert("state".into(), json!(self.state.as_str()));
        let frame = Telemetry::new(&self.name, values, self.time.now_utc());
        self.router.send("telemetry", Message::Telemetry(frame));
    }

    fn fail(&mut self, context: &str, err: &anyhow::Error) {
        error!("'{}' {context}: {}", self.name, escape_log(&format!("{err:#}")));
        self.state = LayerState::Error;
        self.active = None;
        self.telemetry(frame_values([("message", json!(format!("{err:#}")))]));
    }

    fn do_configure(&mut self, msg: &ConfigureEvent) -> anyhow::Result<()> {
        let cm = msg.manager.clone();
        let schedule_manager = cm.schedule_manager();
        let set = schedule_manager.load()?;
        schedule_manager.validate(&set)?;
        self.master = Some(set.master);
        self.playlists = set.playlists;

        let sink = self
            .own_sink
            .clone()
            .expect("layer attached before configure");
        self.datasources = Some(Arc::new(DataSourceManager::new(
            cm.source_registry().entries().to_vec(),
            4,
        )));
        self.timer = Some(Arc::new(TimerService::new(self.time.clone())));
        self.futures = Some(Arc::new(FutureSource::new(&self.name, sink)));
        info!(
            "'{}' schedule loaded: {} playlists",
            self.name,
            self.playlists.len()
        );
        self.cm = Some(cm);
        Ok(())
    }

    fn build_context(&self, schedule_ts: DateTime<Utc>) -> anyhow::Result<ExecutionContext> {
        let cm = self
            .cm
            .clone()
            .ok_or_else(|| anyhow::anyhow!("layer is not configured"))?;
        let services = ServiceContainer::new();
        services.insert(cm.settings_manager());
        services.insert(cm.static_manager());
        services.insert(cm);
        services.insert(self.router.clone());
        services.insert(self.time.clone());
        if let Some(dsm) = &self.datasources {
            services.insert(dsm.clone());
        }
        if let Some(timer) = &self.timer {
            services.insert(timer.clone());
        }
        if let Some(futures) = &self.futures {
            services.insert(futures.clone());
        }
        if let Some(sink) = &self.own_sink {
            services.insert(sink.clone());
        }
        Ok(ExecutionContext::new(services, self.dimensions, schedule_ts))
    }

    /// Resolve the playlist the master schedule selects at `t`. A name
    /// without a matching playlist falls back to the first declared one.
    fn select_playlist(&self, t: DateTime<Utc>) -> Option<Playlist> {
        let name = self.master.as_ref().map(|m| m.evaluate(t).to_string())?;
        match self.playlists.iter().find(|p| p.name == name) {
            Some(playlist) => Some(playlist.clone()),
            None => {
                warn!(
                    "'{}' master selected '{}' which is not a playlist; using first",
                    self.name, name
                );
                self.playlists.first().cloned()
            }
        }
    }

    /// Start one track of `playlist`. A plugin id with no registry entry is
    /// non-fatal for the track: telemetry is emitted and the layer stays in
    /// its prior state.
    fn start_track(&mut self, playlist: &Playlist, index: usize, t: DateTime<Utc>) {
        let Some(item) = playlist.items.get(index) else {
            warn!("'{}' playlist '{}' has no track {index}", self.name, playlist.name);
            return;
        };
        let track = Track::Playlist(item.clone());
        let created = match &self.cm {
            Some(cm) => cm.plugin_registry().create(track.plugin_name()),
            None => return,
        };
        let mut plugin = match created {
            Ok(plugin) => plugin,
            Err(err) => {
                warn!(
                    "'{}' track '{}' skipped: {err}",
                    self.name,
                    track.title()
                );
                self.telemetry(frame_values([
                    ("message", json!(format!("{err}"))),
                    ("playlist", json!(playlist.name)),
                    ("current_track_index", json!(index)),
                ]));
                return;
            }
        };
        let ctx = match self.build_context(t) {
            Ok(ctx) => ctx,
            Err(err) => {
                self.fail("context", &err);
                return;
            }
        };
        match plugin.start(&ctx, &track) {
            Ok(()) => {
                self.active = Some(ActiveTrack {
                    plugin,
                    track,
                    ctx,
                    playlist: playlist.name.clone(),
                    track_index: index,
                });
                self.state = LayerState::Playing;
                info!(
                    "'{}' playing '{}' [{}] of '{}'",
                    self.name,
                    playlist.items[index].title,
                    index,
                    playlist.name
                );
                self.telemetry(frame_values([
                    ("playlist", json!(playlist.name)),
                    ("current_track_index", json!(index)),
                ]));
            }
            Err(err) => self.fail("plugin.start", &err),
        }
    }

    fn on_start_playback(&mut self, t: DateTime<Utc>) {
        if self.state != LayerState::Loaded {
            warn!(
                "'{}' cannot start playback, state is '{}'",
                self.name, self.state
            );
            return;
        }
        if self.playlists.is_empty() {
            warn!("'{}' no playlists available to run", self.name);
            self.telemetry(frame_values([("message", json!("no playlists available"))]));
            return;
        }
        if let Some(playlist) = self.select_playlist(t) {
            self.start_track(&playlist, 0, t);
        }
    }

    fn on_next_track(&mut self, t: DateTime<Utc>) {
        if self.state != LayerState::Playing {
            warn!("'{}' NextTrack ignored in state '{}'", self.name, self.state);
            return;
        }
        let Some(mut active) = self.active.take() else {
            warn!("'{}' NextTrack with no active track", self.name);
            return;
        };
        if let Err(err) = active.plugin.stop(&active.ctx, &active.track) {
            self.fail("plugin.stop", &err);
            return;
        }
        let next_index = active.track_index + 1;
        let same = self
            .playlists
            .iter()
            .find(|p| p.name == active.playlist)
            .cloned();
        match same {
            Some(playlist) if next_index < playlist.items.len() => {
                self.start_track(&playlist, next_index, t);
            }
            _ => {
                // Past the last item: the master schedule decides what is
                // next, which may be the same playlist again.
                if let Some(playlist) = self.select_playlist(t) {
                    self.start_track(&playlist, 0, t);
                }
            }
        }
    }

    fn forward_to_plugin(&mut self, plugin_name: &str, msg: &Message) {
        if self.state != LayerState::Playing {
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.plugin.name() != plugin_name {
            log::debug!(
                "'{}' dropping {} for inactive plugin '{plugin_name}'",
                self.name,
                msg.kind()
            );
            return;
        }
        let ctx = active.ctx.clone();
        let track = active.track.clone();
        if let Err(err) = active.plugin.receive(&ctx, &track, msg) {
            self.fail("plugin.receive", &err);
        }
    }
}

#[async_trait]
impl Actor for PlaylistLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&mut self, own_sink: MessageSink) {
        self.own_sink = Some(own_sink);
    }

    async fn handle(&mut self, msg: Message) -> anyhow::Result<()> {
        match msg {
            Message::Configure(configure) => {
                match self.do_configure(&configure) {
                    Ok(()) => {
                        self.state = LayerState::Loaded;
                        configure.notify(false, None);
                        if let Some(sink) = &self.own_sink {
                            sink.accept(Message::StartPlayback {
                                timestamp: configure.timestamp,
                            })?;
                        }
                    }
                    Err(err) => {
                        self.fail("configure", &err);
                        configure.notify(true, Some(format!("{err:#}")));
                    }
                }
                Ok(())
            }
            Message::StartPlayback { timestamp } => {
                self.on_start_playback(timestamp);
                Ok(())
            }
            Message::NextTrack { timestamp } => {
                self.on_next_track(timestamp);
                Ok(())
            }
            Message::DisplaySettings(settings) => {
                info!(
                    "'{}' DisplaySettings {} {}x{}",
                    self.name, settings.name, settings.width, settings.height
                );
                // A track in flight keeps its dimensions; the new ones
                // apply from the next selection.
                self.dimensions = (settings.width, settings.height);
                Ok(())
            }
            Message::FutureCompleted(done) => {
                let plugin_name = done.plugin_name.clone();
                self.forward_to_plugin(&plugin_name, &Message::FutureCompleted(done));
                Ok(())
            }
            Message::PluginReceive(event) => {
                let plugin_name = event.plugin_name.clone();
                self.forward_to_plugin(&plugin_name, &Message::PluginReceive(event));
                Ok(())
            }
            other => {
                warn!("'{}' no handler for {}", self.name, other.kind());
                Ok(())
            }
        }
    }

    async fn on_quit(&mut self) {
        info!("'{}' quitting playback", self.name);
        if let Some(mut active) = self.active.take() {
            if let Err(err) = active.plugin.stop(&active.ctx, &active.track) {
                error!("'{}' stop during quit: {err:#}", self.name);
            }
        }
        if let Some(timer) = self.timer.take() {
            timer.shutdown().await;
        }
        if let Some(dsm) = self.datasources.take() {
            dsm.shutdown();
        }
        if let Some(futures) = self.futures.take() {
            futures.shutdown().await;
        }
        self.state = LayerState::Stopped;
    }
}
