//! Timer layer: startup tasks and trigger-fired task playback.
//!
//! State machine: `uninitialized → loaded → {waiting, playing} → stopped |
//! error`. Unlike the playlist layer, tracks are timer tasks selected by
//! trigger firing: the layer packs the tasks that fire soonest into a
//! synthetic playlist, arms one timer for the target instant and plays the
//! pack when it expires. Ties on the target are kept in declaration order;
//! a trigger with no upcoming fire time is silently excluded.

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
use crate::runtime::timer::{TimerCancel, TimerService};
use crate::schedule::trigger::generate_schedule;
use crate::schedule::TimerTaskItem;
use crate::sources::DataSourceManager;
use crate::storage::ConfigurationManager;

/// The pack of tasks currently playing or armed to play.
struct TaskRun {
    items: Vec<TimerTaskItem>,
    index: usize,
    /// The instant the pack plays "at" (startup time or trigger target).
    schedule_ts: DateTime<Utc>,
}

struct ActiveTask {
    plugin: Box<dyn Plugin>,
    track: Track,
    ctx: ExecutionContext,
}

pub struct TimerLayer {
    name: String,
    router: MessageRouter,
    time: Arc<dyn TimeOfDay>,
    own_sink: Option<MessageSink>,
    cm: Option<Arc<ConfigurationManager>>,
    tasks: Vec<TimerTaskItem>,
    datasources: Option<Arc<DataSourceManager>>,
    timer: Option<Arc<TimerService>>,
    futures: Option<Arc<FutureSource>>,
    dimensions: (u32, u32),
    state: LayerState,
    run: Option<TaskRun>,
    active: Option<ActiveTask>,
    armed_timer: Option<TimerCancel>,
}

impl TimerLayer {
    pub fn new(name: &str, router: MessageRouter, time: Arc<dyn TimeOfDay>) -> Self {
        Self {
            name: name.to_string(),
            router,
            time,
            own_sink: None,
            cm: None,
            tasks: Vec::new(),
            datasources: None,
            timer: None,
            futures: None,
            dimensions: (800, 480),
            state: LayerState::Uninitialized,
            run: None,
            active: None,
            armed_timer: None,
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
        // Enabled tasks of all groups, in declaration order.
        self.tasks = set
            .tasks
            .iter()
            .flat_map(|group| group.items.iter())
            .filter(|item| item.enabled)
            .cloned()
            .collect();

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
        info!("'{}' schedule loaded: {} enabled tasks", self.name, self.tasks.len());
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

    /// Start the current item of `run`, skipping over tracks whose plugin
    /// cannot be resolved (non-fatal per track). With the pack exhausted,
    /// falls through to arming the next trigger.
    fn start_run(&mut self, mut run: TaskRun, now: DateTime<Utc>) {
        loop {
            let Some(item) = run.items.get(run.index).cloned() else {
                self.arm_next(now);
                return;
            };
            let track = Track::Task(item);
            let created = match &self.cm {
                Some(cm) => cm.plugin_registry().create(track.plugin_name()),
                None => return,
            };
            match created {
                Ok(mut plugin) => {
                    let ctx = match self.build_context(run.schedule_ts) {
                        Ok(ctx) => ctx,
                        Err(err) => {
                            self.fail("context", &err);
                            return;
                        }
                    };
                    match plugin.start(&ctx, &track) {
                        Ok(()) => {
                            self.state = LayerState::Playing;
                            info!(
                                "'{}' playing task '{}' [{}]",
                                self.name,
                                track.title(),
                                run.index
                            );
                            self.telemetry(frame_values([
                                ("current_track_index", json!(run.index)),
                                ("schedule_ts", json!(run.schedule_ts.to_rfc3339())),
                            ]));
                            self.active = Some(ActiveTask { plugin, track, ctx });
                            self.run = Some(run);
                        }
                        Err(err) => self.fail("plugin.start", &err),
                    }
                    return;
                }
                Err(err) => {
                    warn!("'{}' task '{}' skipped: {err}", self.name, track.title());
                    self.telemetry(frame_values([
                        ("message", json!(format!("{err}"))),
                        ("current_track_index", json!(run.index)),
                    ]));
                    run.index += 1;
                }
            }
        }
    }

    /// Compute the next scheduled pack: the enabled tasks whose earliest
    /// upcoming fire time is the global minimum, tied on the exact
    /// timestamp. Arms a timer for the target and enters `waiting`.
    fn arm_next(&mut self, now: DateTime<Utc>) {
        let mut target: Option<DateTime<Utc>> = None;
        let mut pack: Vec<TimerTaskItem> = Vec::new();
        for item in &self.tasks {
            let Some(fire) = generate_schedule(now, &item.trigger).next() else {
                continue;
            };
            match target {
                None => {
                    target = Some(fire);
                    pack = vec![item.clone()];
                }
                Some(best) if fire < best => {
                    target = Some(fire);
                    pack = vec![item.clone()];
                }
                Some(best) if fire == best => pack.push(item.clone()),
                Some(_) => {}
            }
        }
        let Some(target) = target else {
            warn!("'{}' no schedulable tasks", self.name);
            self.state = LayerState::Loaded;
            self.telemetry(frame_values([("message", json!("no schedulable tasks"))]));
            return;
        };
        let run = TaskRun {
            items: pack,
            index: 0,
            schedule_ts: target,
        };
        if target <= now {
            self.start_run(run, now);
            return;
        }
        let timer = match &self.timer {
            Some(timer) => timer.clone(),
            None => return,
        };
        let sink = self.own_sink.clone().expect("layer attached");
        match timer.create_timer(
            target - now,
            Some(sink),
            Message::TimerExpired {
                target,
                timestamp: target,
            },
        ) {
            Ok((_, cancel)) => {
                info!("'{}' next task at {}", self.name, target);
                self.armed_timer = Some(cancel);
                self.run = Some(run);
                self.state = LayerState::Waiting;
                self.telemetry(frame_values([
                    ("schedule_ts", json!(target.to_rfc3339())),
                ]));
            }
            Err(err) => {
                self.fail("create_timer", &anyhow::Error::from(err));
            }
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
        if self.tasks.is_empty() {
            warn!("'{}' no tasks available to run", self.name);
            self.telemetry(frame_values([("message", json!("no tasks available"))]));
            return;
        }
        let startup: Vec<TimerTaskItem> = self
            .tasks
            .iter()
            .filter(|item| item.trigger.fires_on_startup())
            .cloned()
            .collect();
        if !startup.is_empty() {
            self.start_run(
                TaskRun {
                    items: startup,
                    index: 0,
                    schedule_ts: t,
                },
                t,
            );
        } else {
            self.arm_next(t);
        }
    }

    fn on_timer_expired(&mut self, target: DateTime<Utc>) {
        if self.state != LayerState::Waiting {
            warn!(
                "'{}' TimerExpired ignored in state '{}'",
                self.name, self.state
            );
            return;
        }
        self.armed_timer = None;
        let Some(run) = self.run.take() else {
            warn!("'{}' TimerExpired with no armed playlist", self.name);
            return;
        };
        info!("'{}' trigger fired for {}", self.name, target);
        self.start_run(run, target);
    }

    fn on_next_track(&mut self, t: DateTime<Utc>) {
        if self.state != LayerState::Playing {
            warn!("'{}' NextTrack ignored in state '{}'", self.name, self.state);
            return;
        }
        if let Some(mut active) = self.active.take() {
            if let Err(err) = active.plugin.stop(&active.ctx, &active.track) {
                self.fail("plugin.stop", &err);
                return;
            }
        }
        match self.run.take() {
            Some(mut run) => {
                run.index += 1;
                if run.index < run.items.len() {
                    self.start_run(run, t);
                } else {
                    self.arm_next(t);
                }
            }
            None => self.arm_next(t),
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
impl Actor for TimerLayer {
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
            Message::TimerExpired { target, .. } => {
                self.on_timer_expired(target);
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
        if let Some(cancel) = self.armed_timer.take() {
            cancel.cancel();
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
