//! Wire-shape helpers for document exchange with the external API surface.
//!
//! On the wire every document carries `_id` (stable identity) and `_rev`
//! (content hash). These helpers add the reserved keys on the way out and
//! enforce them on the way in, mapping failures onto the core error
//! taxonomy the HTTP adapter translates to status codes.

use serde_json::Value;

use crate::errors::CoreError;
use crate::storage::document::{ConfigurationObject, Document, ID_KEY, REV_KEY};

/// Receipt of a committed wire save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReceipt {
    pub id: String,
    pub rev: String,
}

/// Fetch a document and stamp it with `_rev` and `_id` for the wire.
/// Fails with `NotFound` when the moniker has no underlying document.
pub fn document_with_rev(id: &str, object: &ConfigurationObject) -> Result<Document, CoreError> {
    let (hash, content) = object.get()?;
    match (hash, content) {
        (Some(hash), Some(mut content)) => {
            content.insert(REV_KEY.to_string(), Value::String(hash));
            content.insert(ID_KEY.to_string(), Value::String(id.to_string()));
            Ok(content)
        }
        _ => Err(CoreError::NotFound(object.moniker().to_string())),
    }
}

/// Apply an incoming wire document: `_rev` must be present, `_id` must
/// match `id`, and the revision must still be current. On success returns
/// the new revision.
pub fn apply_with_rev(
    id: &str,
    mut incoming: Document,
    object: &ConfigurationObject,
) -> Result<SaveReceipt, CoreError> {
    let rev = match incoming.remove(REV_KEY) {
        Some(Value::String(rev)) => rev,
        _ => {
            return Err(CoreError::InvalidInput(format!("missing {REV_KEY}")));
        }
    };
    match incoming.remove(ID_KEY) {
        Some(Value::String(xid)) if xid == id => {}
        _ => {
            return Err(CoreError::InvalidInput(format!("{ID_KEY} mismatch for '{id}'")));
        }
    }
    let (committed, new_hash) = object.save(&rev, incoming)?;
    if !committed {
        return Err(CoreError::Concurrency { rev });
    }
    Ok(SaveReceipt {
        id: id.to_string(),
        rev: new_hash.unwrap_or_default(),
    })
}
