//! # emberdb Configuration Constants
//!
//! This module centralizes the sizing constants of the storage file, grouping
//! interdependent values together. Constants that depend on each other are
//! co-located and their relationships are checked at compile time.
//!
//! ## Dependency Graph
//!
//! ```text
//! block_size (runtime, DEFAULT_BLOCK_SIZE by default)
//!       │
//!       ├─> MIN_BLOCK_SIZE <= block_size <= MAX_BLOCK_SIZE
//!       │     block_size must also be a power of two
//!       │
//!       ├─> FILE_HEADER_SIZE (128 bytes, slot 0 only)
//!       │     Must fit inside MIN_BLOCK_SIZE
//!       │
//!       ├─> BLOCK_HEADER_SIZE (32 bytes per slot)
//!       │
//!       └─> capacity = block_size - BLOCK_HEADER_SIZE
//!             max event record = capacity / 2
//!             A split of a full block plus one record always fits in two
//!             blocks only while records are bounded this way.
//!
//! DEFAULT_UNDERFULL_PERCENT (50)
//!       │
//!       └─> compaction only merges blocks filled below this share
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use crate::config::{BLOCK_HEADER_SIZE, DEFAULT_BLOCK_SIZE};
//! ```

// ============================================================================
// FILE LAYOUT CONSTANTS
// ============================================================================

/// Size of the file header at offset 0. The rest of slot 0 is unused.
pub const FILE_HEADER_SIZE: usize = 128;

/// Size of the header at the start of every block slot.
pub const BLOCK_HEADER_SIZE: usize = 32;

/// Size of one fixed-width record in the index segment.
/// id(8) + min_object(8) + max_object(8) + min_ts(8) + max_ts(8) + spanned(1)
pub const INDEX_RECORD_SIZE: usize = 41;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

// ============================================================================
// BLOCK SIZING
// ============================================================================

/// Default size of a block slot in bytes (64KB).
pub const DEFAULT_BLOCK_SIZE: u32 = 64 * 1024;

/// Smallest block size accepted by the builder.
pub const MIN_BLOCK_SIZE: u32 = 512;

/// Largest block size accepted by the builder (16MB).
pub const MAX_BLOCK_SIZE: u32 = 16 * 1024 * 1024;

const _: () = assert!(
    FILE_HEADER_SIZE <= MIN_BLOCK_SIZE as usize,
    "file header must fit in the smallest block slot"
);

const _: () = assert!(
    BLOCK_HEADER_SIZE * 4 <= MIN_BLOCK_SIZE as usize,
    "block header must leave room for payload in the smallest block"
);

const _: () = assert!(
    DEFAULT_BLOCK_SIZE.is_power_of_two() && MIN_BLOCK_SIZE.is_power_of_two(),
    "block sizes must be powers of two"
);

/// Minimum number of slots added when the block region grows.
pub const MIN_SLOT_GROWTH: u32 = 4;

// ============================================================================
// ID SPACES
// ============================================================================

/// First block id handed out by a fresh storage file. Zero marks a free slot.
pub const FIRST_BLOCK_ID: u64 = 1;

/// Block header owner value for a slot that holds no block.
pub const FREE_SLOT_OWNER: u64 = 0;

/// First id assigned in each symbol table.
pub const FIRST_SYMBOL_ID: u32 = 1;

/// Largest id a symbol table may assign.
pub const MAX_SYMBOL_ID: u32 = u32::MAX;

/// Longest accepted symbol name in bytes.
pub const MAX_SYMBOL_NAME_LEN: usize = u16::MAX as usize;

// ============================================================================
// COMPACTION
// ============================================================================

/// A block whose payload fills less than this percentage of its capacity is
/// a compaction candidate.
pub const DEFAULT_UNDERFULL_PERCENT: u8 = 50;

// ============================================================================
// DATABASE DIRECTORY
// ============================================================================

/// Extension of object storage files inside a database root.
pub const STORE_FILE_EXTENSION: &str = "edb";
