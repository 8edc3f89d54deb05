//! Hash-stamped configuration documents.
//!
//! A document is a JSON object persisted at a *moniker* (here: a file
//! path). Its revision is the SHA-256 of the canonical form: UTF-8 JSON,
//! sorted keys, no inter-token whitespace, with the reserved `_rev` and
//! `_id` keys stripped. Readers always get content together with the hash
//! they must present to save; a successful save invalidates the cache so
//! the next read reloads from storage.

use std::path::Path;
use std::sync::{Arc, Mutex};

use log::{debug, error};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::CoreError;

/// Revision key added to wire representations, stripped before hashing.
pub const REV_KEY: &str = "_rev";
/// Identity key added to wire representations, stripped before hashing.
pub const ID_KEY: &str = "_id";

/// A configuration document body.
pub type Document = serde_json::Map<String, Value>;

/// SHA-256 of the canonical JSON form of `doc`, hex encoded.
///
/// `_rev` and `_id` are excluded so the hash is always based purely on
/// content. With default `serde_json` features maps are BTree-backed, so
/// serialization is already key-sorted and compact serialization is the
/// canonical form.
pub fn canonical_hash(doc: &Document) -> String {
    let mut for_hash = doc.clone();
    for_hash.remove(REV_KEY);
    for_hash.remove(ID_KEY);
    let canonical =
        serde_json::to_string(&Value::Object(for_hash)).expect("document serialization");
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Backing storage for documents, keyed by moniker.
pub trait DocumentStore: Send + Sync {
    /// Load the document, `None` when the moniker has no underlying file.
    fn load(&self, moniker: &str) -> Result<Option<Document>, CoreError>;
    /// Persist the document, creating parent folders as needed.
    fn save(&self, moniker: &str, doc: &Document) -> Result<(), CoreError>;
    /// Remove the document. Missing documents are not an error.
    fn delete(&self, moniker: &str) -> Result<(), CoreError>;
}

/// Document store over JSON files. The moniker is the file path.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileStore;

impl DocumentStore for FileStore {
    fn load(&self, moniker: &str) -> Result<Option<Document>, CoreError> {
        let path = Path::new(moniker);
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        match value {
            Value::Object(map) => Ok(Some(map)),
            other => Err(CoreError::InvalidInput(format!(
                "document '{moniker}' is not a JSON object ({})",
                kind_of(&other)
            ))),
        }
    }

    fn save(&self, moniker: &str, doc: &Document) -> Result<(), CoreError> {
        let path = Path::new(moniker);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&Value::Object(doc.clone()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    fn delete(&self, moniker: &str) -> Result<(), CoreError> {
        let path = Path::new(moniker);
        if path.is_file() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Default)]
struct CacheState {
    content: Option<Document>,
    hash: Option<String>,
}

/// Lazily-loading document holder with optimistic-concurrency saves.
///
/// All operations run under a per-object lock; callers on different
/// mailboxes share one object per moniker via the configuration manager so
/// they share one optimistic-concurrency view.
pub struct ConfigurationObject {
    moniker: String,
    store: Arc<dyn DocumentStore>,
    state: Mutex<CacheState>,
}

impl ConfigurationObject {
    pub fn new(moniker: &str, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            moniker: moniker.to_string(),
            store,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn moniker(&self) -> &str {
        &self.moniker
    }

    /// Current `(hash, content copy)`. On a cache miss the document is
    /// loaded and hashed; a missing document yields `(None, None)`.
    pub fn get(&self) -> Result<(Option<String>, Option<Document>), CoreError> {
        let mut state = self.state.lock().expect("configuration object poisoned");
        self.populate(&mut state)?;
        Ok((state.hash.clone(), state.content.clone()))
    }

    /// Persist `content` if `expected_hash` still matches the stored
    /// revision. On success the cache is invalidated and the new hash is
    /// returned; on a stale hash nothing is persisted and `(false, None)`
    /// comes back.
    ///
    /// Saving against a moniker with no underlying document always fails:
    /// a revision can only be presented against content that produced one.
    /// Documents come into existence through provisioning, never through
    /// an optimistic save.
    pub fn save(
        &self,
        expected_hash: &str,
        content: Document,
    ) -> Result<(bool, Option<String>), CoreError> {
        let mut state = self.state.lock().expect("configuration object poisoned");
        self.populate(&mut state)?;
        if state.hash.as_deref() != Some(expected_hash) {
            debug!(
                "'{}' save rejected: presented {} current {:?}",
                self.moniker, expected_hash, state.hash
            );
            return Ok((false, None));
        }
        let mut to_persist = content;
        to_persist.remove(REV_KEY);
        to_persist.remove(ID_KEY);
        self.store.save(&self.moniker, &to_persist)?;
        let new_hash = canonical_hash(&to_persist);
        state.content = None;
        state.hash = None;
        Ok((true, Some(new_hash)))
    }

    /// Drop cached content and hash; the next `get` reloads from storage.
    pub fn evict(&self) {
        let mut state = self.state.lock().expect("configuration object poisoned");
        state.content = None;
        state.hash = None;
    }

    /// Remove the underlying document and drop the cache. Used for
    /// deletable state documents (plugin state).
    pub fn delete(&self) -> Result<(), CoreError> {
        let mut state = self.state.lock().expect("configuration object poisoned");
        if let Err(err) = self.store.delete(&self.moniker) {
            error!("'{}' delete failed: {err}", self.moniker);
            return Err(err);
        }
        state.content = None;
        state.hash = None;
        Ok(())
    }

    fn populate(&self, state: &mut CacheState) -> Result<(), CoreError> {
        if state.content.is_none() {
            state.content = self.store.load(&self.moniker)?;
            state.hash = state.content.as_ref().map(canonical_hash);
        }
        Ok(())
    }
}
