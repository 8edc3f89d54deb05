use thiserror::Error;

/// Errors that can arise in the orchestration core.
///
/// The variants mirror the failure taxonomy the external API surface maps
/// onto HTTP status codes (400/404/409/500); the core itself only ever
/// branches on them.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing required field, malformed document, or ID mismatch.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Optimistic save rejected because the presented revision is stale.
    #[error("revision mismatch: {rev}")]
    Concurrency { rev: String },

    /// A moniker with no underlying document, or an unknown schedule name.
    #[error("not found: {0}")]
    NotFound(String),

    /// A collaborator that is not (yet) present: configuration manager,
    /// plugin, data source, or service slot.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A source future failed to complete within its deadline.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Work aborted by cooperative cancellation.
    #[error("cancelled")]
    Cancelled,

    /// Send attempted on a mailbox or pool that has shut down.
    #[error("closed")]
    Closed,

    /// Wrapper around IO errors (storage tree, template copies).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapper around JSON serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything else; logged with context at the failure site.
    #[error("internal error: {0}")]
    Internal(String),
}
