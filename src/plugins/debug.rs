//! Diagnostic plugin: logs every lifecycle call and displays nothing.

use log::info;

use crate::engine::context::ExecutionContext;
use crate::runtime::messages::Message;

use super::{Plugin, Track};

pub struct DebugPlugin {
    id: String,
    name: String,
}

impl DebugPlugin {
    pub fn construct(id: &str, name: &str) -> Box<dyn Plugin> {
        Box::new(Self {
            id: id.to_string(),
            name: name.to_string(),
        })
    }
}

impl Plugin for DebugPlugin {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, ctx: &ExecutionContext, track: &Track) -> anyhow::Result<()> {
        info!(
            "'{}' start '{}' at {} ({}x{})",
            self.name,
            track.title(),
            ctx.schedule_ts,
            ctx.dimensions.0,
            ctx.dimensions.1
        );
        Ok(())
    }

    fn stop(&mut self, _ctx: &ExecutionContext, track: &Track) -> anyhow::Result<()> {
        info!("'{}' stop '{}'", self.name, track.title());
        Ok(())
    }

    fn receive(
        &mut self,
        _ctx: &ExecutionContext,
        track: &Track,
        msg: &Message,
    ) -> anyhow::Result<()> {
        info!("'{}' '{}' receive {}", self.name, track.title(), msg.kind());
        Ok(())
    }
}
