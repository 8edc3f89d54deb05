//! Topic-based fan-out between mailboxes.
//!
//! The router is not a worker: `send` runs briefly on the caller and only
//! enqueues. Delivery errors to one subscriber are logged and do not affect
//! the others.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::metrics;
use crate::runtime::mailbox::MessageSink;
use crate::runtime::messages::Message;

/// One topic and its ordered subscribers.
#[derive(Debug, Clone)]
pub struct Route {
    pub topic: String,
    pub sinks: Vec<MessageSink>,
}

impl Route {
    pub fn new(topic: &str, sinks: Vec<MessageSink>) -> Self {
        Self {
            topic: topic.to_string(),
            sinks,
        }
    }
}

/// Delivers a message by topic to every subscribed mailbox.
#[derive(Clone, Default)]
pub struct MessageRouter {
    routes: Arc<Mutex<HashMap<String, Vec<MessageSink>>>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route. Sinks append to any existing subscribers of the
    /// same topic, preserving registration order.
    pub fn add_route(&self, route: Route) {
        let mut routes = self.routes.lock().expect("router mutex poisoned");
        routes.entry(route.topic).or_default().extend(route.sinks);
    }

    /// Whether anything subscribes to `topic`.
    pub fn has_route(&self, topic: &str) -> bool {
        let routes = self.routes.lock().expect("router mutex poisoned");
        routes.get(topic).is_some_and(|s| !s.is_empty())
    }

    /// Deliver `msg` to every subscriber of `topic`. Returns how many
    /// mailboxes accepted it.
    pub fn send(&self, topic: &str, msg: Message) -> usize {
        if matches!(msg, Message::Telemetry(_)) {
            metrics::inc_telemetry_frames();
        }
        let sinks = {
            let routes = self.routes.lock().expect("router mutex poisoned");
            routes.get(topic).cloned().unwrap_or_default()
        };
        if sinks.is_empty() {
            debug!("route '{topic}' has no subscribers for {}", msg.kind());
            return 0;
        }
        let mut delivered = 0;
        for sink in &sinks {
            match sink.accept(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(
                        "route '{topic}' -> '{}' failed for {}: {err}",
                        sink.target(),
                        msg.kind()
                    );
                }
            }
        }
        delivered
    }
}
