//! # Storage Error Kinds
//!
//! emberdb reports failures through `eyre::Report`, like the rest of the
//! crate. Failures that callers need to tell apart carry a [`StorageError`]
//! inside the report, either as the root error (`bail!(StorageError::...)`)
//! or underneath `wrap_err` context. [`StorageError::of`] walks the report
//! chain and returns the kind, if any.
//!
//! ```ignore
//! match engine.open_or_create(path) {
//!     Err(e) if matches!(StorageError::of(&e), Some(StorageError::CorruptIndex(_))) => { .. }
//!     ..
//! }
//! ```
//!
//! I/O failures are not wrapped in a kind; they propagate with their
//! `wrap_err` context only.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage engine is not open")]
    NotOpen,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt block {block_id}: {reason}")]
    CorruptBlock { block_id: u64, reason: String },

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("block {block_id} full: payload {len} exceeds capacity {capacity}")]
    BlockFull {
        block_id: u64,
        len: usize,
        capacity: usize,
    },

    #[error("merge of {blocks} blocks would overflow: {len} bytes exceeds capacity {capacity}")]
    WouldOverflow {
        blocks: usize,
        len: usize,
        capacity: usize,
    },

    #[error("{0} id space exhausted")]
    IdSpaceExhausted(&'static str),

    #[error("event record of {len} bytes exceeds the limit of {limit} bytes")]
    EventTooLarge { len: usize, limit: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

impl StorageError {
    pub fn of(report: &eyre::Report) -> Option<&StorageError> {
        report
            .chain()
            .find_map(|cause| cause.downcast_ref::<StorageError>())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn corrupt_index(reason: impl Into<String>) -> Self {
        Self::CorruptIndex(reason.into())
    }

    pub fn corrupt_block(block_id: u64, reason: impl Into<String>) -> Self {
        Self::CorruptBlock {
            block_id,
            reason: reason.into(),
        }
    }
}
