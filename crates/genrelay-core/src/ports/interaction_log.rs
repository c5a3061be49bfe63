//! Interaction log port.
//!
//! The interaction log is an append-only sink of `{timestamp, prompt,
//! response}` records. It is never read back by the relay. Writes are best
//! effort: a failed append is observed by the caller but never changes a
//! response that has already been committed to the client.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::InteractionRecord;

/// Errors that can occur while appending to the interaction log.
#[derive(Debug, Error)]
pub enum InteractionLogError {
    #[error("error marshalling log entry: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("error writing to log file: {0}")]
    Io(#[from] std::io::Error),
}

/// Port for appending interaction records.
///
/// Implementations must be safe to call concurrently from many requests;
/// appends from different requests must never interleave within a line.
#[async_trait]
pub trait InteractionLogPort: Send + Sync {
    /// Append one record.
    async fn append(&self, record: InteractionRecord) -> Result<(), InteractionLogError>;
}
