//! # Sources Module - Pluggable Producers of State and Images
//!
//! A data source produces the content a plugin turns into display frames:
//! it can open a session (fetch a list, compute a value), rasterize one
//! item to a [`Frame`], and optionally accept source-addressed messages.
//!
//! Capabilities are explicit slots on the registry entry rather than
//! runtime type probes, so dispatch is total: a plugin asking a list-less
//! source for a list gets `Unavailable`, not a downcast surprise.
//!
//! The [`DataSourceManager`] owns a bounded worker pool; `open`/`render`
//! return [`SourceFuture`] handles the caller waits on with a per-call
//! timeout (default 10 s, `params.timeoutSeconds`). Callers are plugin work
//! functions already running off-thread, so the wait may block.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use log::debug;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::errors::CoreError;
use crate::runtime::messages::{Frame, Message};
use crate::runtime::services::ServiceContainer;

/// Default wait for a source future, overridable per call via
/// `params.timeoutSeconds`.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Context passed to every data-source call: the service provider, the
/// target dimensions, and the schedule timestamp (the logical "now" the
/// image is rendered for, which may differ from wall clock in previews).
#[derive(Clone)]
pub struct DataSourceContext {
    pub services: ServiceContainer,
    pub dimensions: (u32, u32),
    pub schedule_ts: DateTime<Utc>,
    pub source_id: String,
}

/// Opens a session producing a single state value.
pub trait ItemSource: Send + Sync {
    fn open(&self, ctx: &DataSourceContext, params: &Value) -> anyhow::Result<Value>;
}

/// Opens a session producing an ordered list of items.
pub trait ListSource: Send + Sync {
    fn open(&self, ctx: &DataSourceContext, params: &Value) -> anyhow::Result<Vec<Value>>;
}

/// Rasterizes one item to a frame of the context's dimensions. `None`
/// means "nothing to show".
pub trait RenderSource: Send + Sync {
    fn render(
        &self,
        ctx: &DataSourceContext,
        params: &Value,
        item: &Value,
    ) -> anyhow::Result<Option<Frame>>;
}

/// Sink for source-addressed messages.
pub trait SourceReceiver: Send + Sync {
    fn accept(&self, msg: &Message);
}

/// Descriptor of a data source for enumeration and provisioning.
#[derive(Debug, Clone)]
pub struct DataSourceInfo {
    pub id: String,
    pub name: String,
    pub default_settings: Option<Value>,
}

/// One registered source: its descriptor plus the capabilities it offers.
#[derive(Clone)]
pub struct DataSourceEntry {
    pub info: DataSourceInfo,
    pub item: Option<Arc<dyn ItemSource>>,
    pub list: Option<Arc<dyn ListSource>>,
    pub render: Option<Arc<dyn RenderSource>>,
    pub receive: Option<Arc<dyn SourceReceiver>>,
}

impl DataSourceEntry {
    pub fn new(info: DataSourceInfo) -> Self {
        Self {
            info,
            item: None,
            list: None,
            render: None,
            receive: None,
        }
    }

    pub fn with_item(mut self, source: Arc<dyn ItemSource>) -> Self {
        self.item = Some(source);
        self
    }

    pub fn with_list(mut self, source: Arc<dyn ListSource>) -> Self {
        self.list = Some(source);
        self
    }

    pub fn with_render(mut self, source: Arc<dyn RenderSource>) -> Self {
        self.render = Some(source);
        self
    }

    pub fn with_receiver(mut self, source: Arc<dyn SourceReceiver>) -> Self {
        self.receive = Some(source);
        self
    }
}

/// Init-time registry of data sources. Production sources register here;
/// the engine itself ships none.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    entries: Vec<DataSourceEntry>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: DataSourceEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[DataSourceEntry] {
        &self.entries
    }

    pub fn infos(&self) -> Vec<DataSourceInfo> {
        self.entries.iter().map(|e| e.info.clone()).collect()
    }
}

/// Pending result of a pooled source call.
pub struct SourceFuture<T> {
    rx: std::sync::mpsc::Receiver<anyhow::Result<T>>,
}

impl<T> SourceFuture<T> {
    /// Block until the job finishes or the timeout elapses. Only call from
    /// worker threads (plugin work functions), never from an actor loop.
    pub fn wait(self, timeout: std::time::Duration) -> anyhow::Result<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                Err(CoreError::Timeout(timeout).into())
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                Err(CoreError::Cancelled.into())
            }
        }
    }
}

/// Read the per-call timeout from params.
pub fn call_timeout(params: &Value) -> std::time::Duration {
    let secs = params
        .get("timeoutSeconds")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    std::time::Duration::from_secs(secs)
}

/// Hosts the registered sources and executes their calls on a bounded
/// worker pool.
pub struct DataSourceManager {
    sources: HashMap<String, DataSourceEntry>,
    pool: Arc<Semaphore>,
    runtime: tokio::runtime::Handle,
    shut_down: Arc<AtomicBool>,
}

impl DataSourceManager {
    /// Build a manager over `entries` with `workers` concurrent jobs.
    /// Must be called from within a tokio runtime.
    pub fn new(entries: Vec<DataSourceEntry>, workers: usize) -> Self {
        let mut sources = HashMap::new();
        for entry in entries {
            sources.insert(entry.info.id.clone(), entry);
        }
        Self {
            sources,
            pool: Arc::new(Semaphore::new(workers.max(1))),
            runtime: tokio::runtime::Handle::current(),
            shut_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn get_source(&self, id: &str) -> Option<&DataSourceEntry> {
        self.sources.get(id)
    }

    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sources.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Open an item session on the pool.
    pub fn open_item(
        &self,
        source_id: &str,
        ctx: DataSourceContext,
        params: Value,
    ) -> Result<SourceFuture<Value>, CoreError> {
        let source = self.capability(source_id, |e| e.item.clone(), "item")?;
        self.submit(move || source.open(&ctx, &params))
    }

    /// Open a list session on the pool.
    pub fn open_list(
        &self,
        source_id: &str,
        ctx: DataSourceContext,
        params: Value,
    ) -> Result<SourceFuture<Vec<Value>>, CoreError> {
        let source = self.capability(source_id, |e| e.list.clone(), "list")?;
        self.submit(move || source.open(&ctx, &params))
    }

    /// Rasterize one item on the pool.
    pub fn render(
        &self,
        source_id: &str,
        ctx: DataSourceContext,
        params: Value,
        item: Value,
    ) -> Result<SourceFuture<Option<Frame>>, CoreError> {
        let source = self.capability(source_id, |e| e.render.clone(), "render")?;
        self.submit(move || source.render(&ctx, &params, &item))
    }

    /// Forward a source-addressed message; silently ignored when the
    /// source has no receiver.
    pub fn deliver(&self, source_id: &str, msg: &Message) {
        if let Some(entry) = self.sources.get(source_id) {
            if let Some(receiver) = &entry.receive {
                receiver.accept(msg);
                return;
            }
        }
        debug!("source '{source_id}' has no receiver for {}", msg.kind());
    }

    /// Stop accepting jobs and abort the queue. Jobs already running on
    /// the blocking pool finish on their own.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.pool.close();
    }

    fn capability<T: Clone>(
        &self,
        source_id: &str,
        pick: impl Fn(&DataSourceEntry) -> Option<T>,
        what: &str,
    ) -> Result<T, CoreError> {
        let entry = self
            .sources
            .get(source_id)
            .ok_or_else(|| CoreError::Unavailable(format!("data source '{source_id}'")))?;
        pick(entry).ok_or_else(|| {
            CoreError::Unavailable(format!("data source '{source_id}' has no {what} capability"))
        })
    }

    fn submit<T, F>(&self, job: F) -> Result<SourceFuture<T>, CoreError>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(CoreError::Closed);
        }
        let (tx, rx) = std::sync::mpsc::channel();
        let pool = self.pool.clone();
        let _carrier = self.runtime.spawn(async move {
            let permit = match pool.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let _ = tx.send(Err(CoreError::Cancelled.into()));
                    return;
                }
            };
            let outcome = tokio::task::spawn_blocking(job).await;
            drop(permit);
            let flat = match outcome {
                Ok(result) => result,
                Err(join_err) => Err(anyhow!("source job failed: {join_err}")),
            };
            let _ = tx.send(flat);
        });
        Ok(SourceFuture { rx })
    }
}
