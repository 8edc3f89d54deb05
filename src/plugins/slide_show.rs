//! Slide-show plugin: opens a list source, shows one item at a time and
//! advances on a timer until the list runs dry, then asks the owning layer
//! for the next track.
//!
//! All source work runs through the future submitter; the plugin itself
//! only reacts to the completion and slide-advance messages on the owning
//! layer's worker, where it is safe to arm timers and mutate its state.

use anyhow::{anyhow, bail};
use chrono::Duration as ChronoDuration;
use log::{info, warn};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::engine::context::ExecutionContext;
use crate::runtime::futures::{CancelFlag, CancelRequest, FutureSource};
use crate::runtime::mailbox::MessageSink;
use crate::runtime::messages::{
    DisplayImage, FutureCompleted, Message, PluginEvent,
};
use crate::runtime::router::MessageRouter;
use crate::runtime::timer::{TimerCancel, TimerService};
use crate::sources::{call_timeout, DataSourceManager};

use super::{Plugin, Track};

pub const DEFAULT_SLIDE_MINUTES: u64 = 15;

/// Event tag for the slide-advance timer message.
pub const SLIDE_ADVANCE: &str = "slide-advance";

pub struct SlideShow {
    id: String,
    name: String,
    submit: Option<CancelRequest>,
    slide_timer: Option<TimerCancel>,
}

impl SlideShow {
    pub fn construct(id: &str, name: &str) -> Box<dyn Plugin> {
        Box::new(Self {
            id: id.to_string(),
            name: name.to_string(),
            submit: None,
            slide_timer: None,
        })
    }

    /// Submit work that renders the head of `items` (fetching the list
    /// first when `items` is `None`), publishes the frame, and reports the
    /// remaining items through `FutureCompleted`.
    fn submit_slide(
        &mut self,
        ctx: &ExecutionContext,
        track: &Track,
        items: Option<Vec<Value>>,
        token: &str,
    ) -> anyhow::Result<()> {
        let futures: Arc<FutureSource> = ctx.services.required()?;
        let dsm: Arc<DataSourceManager> = ctx.services.required()?;
        let router: MessageRouter = ctx.services.required()?;

        let settings = track.content().clone();
        let title = track.title().to_string();
        let plugin_name = self.name.clone();
        let ts = ctx.schedule_ts;
        let exec = ctx.clone();

        let work = move |cancel: &CancelFlag| -> anyhow::Result<Value> {
            let source_id = settings
                .get("dataSource")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("dataSource is not specified"))?
                .to_string();
            let dsctx = exec.create_datasource_context(&source_id);
            let timeout = call_timeout(&settings);
            let mut remaining = match items {
                Some(items) => items,
                None => dsm
                    .open_list(&source_id, dsctx.clone(), settings.clone())?
                    .wait(timeout)?,
            };
            if remaining.is_empty() {
                bail!("{source_id}: no media items for slide show");
            }
            if cancel.is_cancelled() {
                return Ok(json!({ "remaining": remaining }));
            }
            let item = remaining.remove(0);
            let frame = dsm
                .render(&source_id, dsctx, settings.clone(), item)?
                .wait(timeout)?;
            match frame {
                Some(frame) => {
                    router.send(
                        "display",
                        Message::DisplayImage(DisplayImage {
                            title,
                            frame,
                            timestamp: ts,
                        }),
                    );
                }
                None => info!("{source_id}: slide produced no frame"),
            }
            Ok(json!({ "remaining": remaining }))
        };

        let token = token.to_string();
        let continuation = move |cancelled: bool, result: Option<Value>, error: Option<String>| {
            if cancelled {
                return None;
            }
            Some(Message::FutureCompleted(FutureCompleted {
                plugin_name,
                token,
                result,
                error,
                timestamp: ts,
            }))
        };

        self.submit = Some(futures.submit_future(work, continuation)?);
        Ok(())
    }

    /// Arm the slide timer that re-enters through the owning layer with
    /// the remaining items.
    fn arm_timer(
        &mut self,
        ctx: &ExecutionContext,
        track: &Track,
        remaining: Vec<Value>,
    ) -> anyhow::Result<()> {
        let timer: Arc<TimerService> = ctx.services.required()?;
        let sink: MessageSink = ctx.services.required()?;
        let slide_minutes = track
            .content()
            .get("slideMinutes")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_SLIDE_MINUTES);
        let expired = Message::PluginReceive(PluginEvent {
            plugin_name: self.name.clone(),
            event: SLIDE_ADVANCE.to_string(),
            payload: Value::Array(remaining),
            timestamp: ctx.schedule_ts,
        });
        let (_, cancel) = timer.create_timer(
            ChronoDuration::minutes(slide_minutes as i64),
            Some(sink),
            expired,
        )?;
        self.slide_timer = Some(cancel);
        Ok(())
    }
}

impl Plugin for SlideShow {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, ctx: &ExecutionContext, track: &Track) -> anyhow::Result<()> {
        info!("{} start '{}'", self.id, track.title());
        match track {
            Track::Playlist(_) | Track::Task(_) => self.submit_slide(ctx, track, None, "start"),
            Track::Timed(_) => bail!("timed tracks are not supported by the slide show"),
        }
    }

    fn stop(&mut self, _ctx: &ExecutionContext, track: &Track) -> anyhow::Result<()> {
        info!("{} stop '{}'", self.id, track.title());
        if let Some(timer) = self.slide_timer.take() {
            timer.cancel();
        }
        if let Some(submit) = self.submit.take() {
            submit.cancel();
        }
        Ok(())
    }

    fn receive(
        &mut self,
        ctx: &ExecutionContext,
        track: &Track,
        msg: &Message,
    ) -> anyhow::Result<()> {
        match msg {
            Message::FutureCompleted(done) => {
                self.submit = None;
                if done.is_success() {
                    let remaining = done
                        .result
                        .as_ref()
                        .and_then(|v| v.get("remaining"))
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    self.arm_timer(ctx, track, remaining)?;
                } else {
                    warn!(
                        "{} '{}' failed: {}",
                        self.id,
                        done.token,
                        done.error.as_deref().unwrap_or("unknown")
                    );
                    let sink: MessageSink = ctx.services.required()?;
                    sink.accept(Message::NextTrack {
                        timestamp: done.timestamp,
                    })?;
                }
                Ok(())
            }
            Message::PluginReceive(event) if event.event == SLIDE_ADVANCE => {
                self.slide_timer = None;
                let remaining = event.payload.as_array().cloned().unwrap_or_default();
                if remaining.is_empty() {
                    info!("{} slide show completed, moving to next track", self.id);
                    let sink: MessageSink = ctx.services.required()?;
                    sink.accept(Message::NextTrack {
                        timestamp: event.timestamp,
                    })?;
                    return Ok(());
                }
                self.submit_slide(ctx, track, Some(remaining), "next")
            }
            other => {
                info!("{} ignoring {}", self.id, other.kind());
                Ok(())
            }
        }
    }
}
