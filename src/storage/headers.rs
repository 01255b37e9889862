//! # File and Block Header Definitions
//!
//! This module provides type-safe, zerocopy-based header structs for the
//! emberdb storage file. Two headers exist:
//!
//! 1. **FileHeader** (128 bytes, offset 0): magic, format version, block
//!    size, slot count, id allocator state and the location of the metadata
//!    trailer (symbol tables and block info index).
//! 2. **BlockHeader** (32 bytes, start of every slot): the owning block id,
//!    payload length and payload checksum.
//!
//! ## File Layout
//!
//! ```text
//! +---------------------------+ offset 0
//! | FileHeader (128B)         |
//! | unused to block_size      |
//! +---------------------------+ offset block_size
//! | slot 0: BlockHeader (32B) |
//! |         payload           |
//! +---------------------------+ offset block_size * 2
//! | slot 1 ...                |
//! +---------------------------+ offset block_size * (1 + slot_count)
//! | metadata trailer          |  <- meta_offset, meta_len, meta_checksum
//! +---------------------------+
//! ```
//!
//! A slot whose header owner is 0 is free. On open the block store rebuilds
//! the block id to slot map by scanning slot headers, so the map itself is
//! never persisted.
//!
//! ## Endianness
//!
//! All multi-byte fields are little-endian via zerocopy's `U32`/`U64`.

use eyre::Result;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{
    BLOCK_HEADER_SIZE, FILE_HEADER_SIZE, FORMAT_VERSION, FREE_SLOT_OWNER, MAX_BLOCK_SIZE,
    MIN_BLOCK_SIZE,
};
use crate::error::StorageError;

pub const FILE_MAGIC: &[u8; 16] = b"emberdb blocks\x00\x00";

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FileHeader {
    magic: [u8; 16],
    version: U32,
    block_size: U32,
    slot_count: U32,
    action_count: U32,
    property_count: U32,
    flags: U32,
    next_block_id: U64,
    block_count: U64,
    meta_offset: U64,
    meta_len: U64,
    meta_checksum: U64,
    reserved: [u8; 48],
}

const _: () = assert!(std::mem::size_of::<FileHeader>() == FILE_HEADER_SIZE);

impl FileHeader {
    pub fn new(block_size: u32, next_block_id: u64) -> Self {
        Self {
            magic: *FILE_MAGIC,
            version: U32::new(FORMAT_VERSION),
            block_size: U32::new(block_size),
            slot_count: U32::new(0),
            action_count: U32::new(0),
            property_count: U32::new(0),
            flags: U32::new(0),
            next_block_id: U64::new(next_block_id),
            block_count: U64::new(0),
            meta_offset: U64::new(0),
            meta_len: U64::new(0),
            meta_checksum: U64::new(0),
            reserved: [0u8; 48],
        }
    }

    pub fn read_from(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_HEADER_SIZE {
            eyre::bail!(StorageError::corrupt_index(format!(
                "file too small for header: {} < {}",
                bytes.len(),
                FILE_HEADER_SIZE
            )));
        }

        let header = Self::read_from_bytes(&bytes[..FILE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse FileHeader: {:?}", e))?;

        if &header.magic != FILE_MAGIC {
            eyre::bail!(StorageError::corrupt_index("invalid magic bytes in storage file"));
        }

        if header.version.get() != FORMAT_VERSION {
            eyre::bail!(StorageError::corrupt_index(format!(
                "unsupported format version {} (expected {})",
                header.version.get(),
                FORMAT_VERSION
            )));
        }

        let block_size = header.block_size.get();
        if !block_size.is_power_of_two() || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
            eyre::bail!(StorageError::corrupt_index(format!(
                "invalid block size {} in file header",
                block_size
            )));
        }

        Ok(header)
    }

    pub fn block_size(&self) -> u32 {
        self.block_size.get()
    }

    pub fn slot_count(&self) -> u32 {
        self.slot_count.get()
    }

    pub fn set_slot_count(&mut self, count: u32) {
        self.slot_count = U32::new(count);
    }

    pub fn action_count(&self) -> u32 {
        self.action_count.get()
    }

    pub fn property_count(&self) -> u32 {
        self.property_count.get()
    }

    pub fn set_symbol_counts(&mut self, actions: u32, properties: u32) {
        self.action_count = U32::new(actions);
        self.property_count = U32::new(properties);
    }

    pub fn next_block_id(&self) -> u64 {
        self.next_block_id.get()
    }

    pub fn set_next_block_id(&mut self, id: u64) {
        self.next_block_id = U64::new(id);
    }

    pub fn block_count(&self) -> u64 {
        self.block_count.get()
    }

    pub fn set_block_count(&mut self, count: u64) {
        self.block_count = U64::new(count);
    }

    pub fn meta_offset(&self) -> u64 {
        self.meta_offset.get()
    }

    pub fn meta_len(&self) -> u64 {
        self.meta_len.get()
    }

    pub fn meta_checksum(&self) -> u64 {
        self.meta_checksum.get()
    }

    pub fn set_meta(&mut self, offset: u64, len: u64, checksum: u64) {
        self.meta_offset = U64::new(offset);
        self.meta_len = U64::new(len);
        self.meta_checksum = U64::new(checksum);
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BlockHeader {
    owner: U64,
    checksum: U64,
    payload_len: U32,
    reserved: [u8; 12],
}

const _: () = assert!(std::mem::size_of::<BlockHeader>() == BLOCK_HEADER_SIZE);

impl BlockHeader {
    pub fn new(owner: u64, payload_len: u32, checksum: u64) -> Self {
        Self {
            owner: U64::new(owner),
            checksum: U64::new(checksum),
            payload_len: U32::new(payload_len),
            reserved: [0u8; 12],
        }
    }

    pub fn free() -> Self {
        Self::new(FREE_SLOT_OWNER, 0, 0)
    }

    pub fn read_from(bytes: &[u8]) -> Result<Self> {
        eyre::ensure!(
            bytes.len() >= BLOCK_HEADER_SIZE,
            "buffer too small for BlockHeader: {} < {}",
            bytes.len(),
            BLOCK_HEADER_SIZE
        );

        Self::read_from_bytes(&bytes[..BLOCK_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse BlockHeader: {:?}", e))
    }

    pub fn owner(&self) -> u64 {
        self.owner.get()
    }

    pub fn is_free(&self) -> bool {
        self.owner.get() == FREE_SLOT_OWNER
    }

    pub fn checksum(&self) -> u64 {
        self.checksum.get()
    }

    pub fn payload_len(&self) -> u32 {
        self.payload_len.get()
    }
}
