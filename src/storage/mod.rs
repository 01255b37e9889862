//! # Storage Module
//!
//! The physical layer of emberdb: one memory-mapped file per store, divided
//! into fixed-size block slots plus a metadata trailer.
//!
//! ## Architecture Overview
//!
//! ```text
//! BlockStore           block ids, allocation, split/compact, metadata
//!   ├── BlockFile      mmap, slot addressing, trailer placement
//!   ├── Freelist       free slot reuse
//!   └── headers        FileHeader / BlockHeader (zerocopy)
//! MetaCodec            symbol tables + block info index <-> trailer bytes
//! ```
//!
//! Blocks never move once written, and a block named by the persisted index
//! is never overwritten. Each metadata flush writes a new trailer past the
//! slot region without touching the one the header still points at.
//!
//! ## Safety Model
//!
//! As with any mmap-backed store, slices into the map become invalid when
//! the file is remapped. Every method that can remap takes `&mut self`, so
//! the borrow checker rules out dangling slot references at compile time.
//!
//! ## Integrity
//!
//! Block payloads and the metadata trailer are each covered by a CRC-64
//! (ECMA-182) checksum computed with [`checksum`].
//!
//! ## Thread Safety
//!
//! Nothing in this module is `Sync`-safe for mutation on its own. The
//! engine serializes all writers behind its `RwLock`.

mod block_store;
mod file;
mod freelist;
mod headers;
mod meta;

pub use block_store::BlockStore;
pub use file::BlockFile;
pub use freelist::Freelist;
pub use headers::{BlockHeader, FileHeader, FILE_MAGIC};
pub use meta::{IndexRecord, MetaCodec, Metadata};

use crc::{Crc, CRC_64_ECMA_182};

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

pub fn checksum(bytes: &[u8]) -> u64 {
    CRC64.checksum(bytes)
}
