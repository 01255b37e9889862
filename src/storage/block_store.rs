//! # Block Store
//!
//! The block store owns the storage file and is the only component that
//! knows where a block physically lives. Everything above it addresses
//! blocks by opaque [`BlockId`]s; the store maps each id to a slot.
//!
//! ## Arena Allocation
//!
//! Block ids come from a monotonically increasing counter persisted in the
//! file header and are never reused, even after the block is retired. Slots
//! are reused: a retired block's slot returns to the [`Freelist`] and the
//! next allocation takes the lowest free slot. When no slot is free the
//! slot region grows by a quarter (at least `MIN_SLOT_GROWTH` slots).
//!
//! ## Slot Layout
//!
//! ```text
//! +------------------------------+
//! | BlockHeader (32 bytes)       |  owner id, payload length, CRC-64
//! +------------------------------+
//! | payload (payload length B)   |
//! +------------------------------+
//! | unused                       |
//! +------------------------------+
//! ```
//!
//! `read` verifies the owner, the length bound and the checksum, so a torn
//! or foreign slot surfaces as `CorruptBlock` instead of garbage events.
//!
//! ## Split and Compact
//!
//! Both operations write their results into freshly allocated blocks first
//! and retire the source blocks last. If any write fails, the new blocks are
//! released again and the sources stay untouched.
//!
//! ## Crash Consistency
//!
//! The persisted index only changes when `persist_meta` runs. Until then
//! the file must still match the last persisted index:
//!
//! - Blocks named by the last persisted index are durable. `replace` never
//!   overwrites a durable block: it writes a new block and retires the old
//!   one. Blocks created since the last persist are rewritten in place.
//! - Retired blocks keep their slot (and contents) until the next
//!   `persist_meta`, which zeroes their headers and only then makes the
//!   slots reusable.
//! - A new trailer never overwrites the one the header points at. It goes
//!   right after the slot region when it fits in front of the old trailer,
//!   otherwise behind the old trailer. The header switches over only after
//!   the new trailer is written, and the file is trimmed once it is synced.
//! - Growing the slot region first relocates the trailer past the new
//!   region end, syncs, and only then claims the space for slots.
//!
//! Blocks allocated after the last persist are unknown to the persisted
//! index; the engine reclaims them as orphans on the next open.

use std::path::Path;

use eyre::{Result, WrapErr};
use hashbrown::{HashMap, HashSet};
use tracing::{debug, warn};
use zerocopy::IntoBytes;

use super::file::BlockFile;
use super::freelist::Freelist;
use super::headers::{BlockHeader, FileHeader};
use super::checksum;
use crate::config::{BLOCK_HEADER_SIZE, FIRST_BLOCK_ID, MIN_SLOT_GROWTH};
use crate::error::StorageError;
use crate::types::BlockId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotEntry {
    slot: u32,
    len: u32,
}

#[derive(Debug)]
pub struct BlockStore {
    file: BlockFile,
    header: FileHeader,
    slots: HashMap<BlockId, SlotEntry>,
    freelist: Freelist,
    retired: Vec<u32>,
    durable: HashSet<BlockId>,
    next_block_id: BlockId,
    capacity: usize,
}

impl BlockStore {
    pub fn create<P: AsRef<Path>>(path: P, block_size: u32) -> Result<Self> {
        let header = FileHeader::new(block_size, FIRST_BLOCK_ID);
        let file = BlockFile::create(path, &header)?;

        Ok(Self {
            file,
            header,
            slots: HashMap::new(),
            freelist: Freelist::new(),
            retired: Vec::new(),
            durable: HashSet::new(),
            next_block_id: FIRST_BLOCK_ID,
            capacity: block_size as usize - BLOCK_HEADER_SIZE,
        })
    }

    /// Opens an existing file and rebuilds the slot map from slot headers.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (file, header) = BlockFile::open(path)?;

        let mut slots = HashMap::new();
        let mut freelist = Freelist::new();
        let mut next_block_id = header.next_block_id().max(FIRST_BLOCK_ID);

        for slot in 0..file.slot_count() {
            let block_header = BlockHeader::read_from(file.slot(slot)?)?;
            if block_header.is_free() {
                freelist.release(slot);
                continue;
            }

            let owner = block_header.owner();
            let entry = SlotEntry {
                slot,
                len: block_header.payload_len(),
            };
            if let Some(previous) = slots.insert(owner, entry) {
                eyre::bail!(StorageError::corrupt_index(format!(
                    "block {} claimed by slots {} and {}",
                    owner, previous.slot, slot
                )));
            }
            next_block_id = next_block_id.max(owner.saturating_add(1));
        }

        let capacity = file.block_size() - BLOCK_HEADER_SIZE;
        let durable = slots.keys().copied().collect();

        Ok(Self {
            file,
            header,
            slots,
            freelist,
            retired: Vec::new(),
            durable,
            next_block_id,
            capacity,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn block_size(&self) -> u32 {
        self.file.block_size() as u32
    }

    /// Largest payload a single block can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn slot_count(&self) -> u32 {
        self.file.slot_count()
    }

    pub fn free_slots(&self) -> u32 {
        self.freelist.free_count()
    }

    pub fn block_count(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn next_block_id(&self) -> BlockId {
        self.next_block_id
    }

    pub fn payload_len(&self, id: BlockId) -> Result<usize> {
        Ok(self.entry(id)?.len as usize)
    }

    pub fn allocate_block(&mut self) -> Result<BlockId> {
        let id = self.next_block_id;
        let next = match id.checked_add(1) {
            Some(next) => next,
            None => eyre::bail!(StorageError::IdSpaceExhausted("block")),
        };

        let slot = match self.freelist.allocate() {
            Some(slot) => slot,
            None => self.grow()?,
        };

        self.next_block_id = next;
        self.write_slot(slot, id, &[])?;
        self.slots.insert(id, SlotEntry { slot, len: 0 });

        Ok(id)
    }

    pub fn read(&self, id: BlockId) -> Result<Vec<u8>> {
        let entry = self.entry(id)?;
        let data = self.file.slot(entry.slot)?;
        let header = BlockHeader::read_from(data)?;

        if header.owner() != id {
            eyre::bail!(StorageError::corrupt_block(
                id,
                format!("slot {} is owned by block {}", entry.slot, header.owner())
            ));
        }

        let len = header.payload_len() as usize;
        if len > self.capacity {
            eyre::bail!(StorageError::corrupt_block(
                id,
                format!("stored length {} exceeds capacity {}", len, self.capacity)
            ));
        }

        let payload = &data[BLOCK_HEADER_SIZE..BLOCK_HEADER_SIZE + len];
        if checksum(payload) != header.checksum() {
            eyre::bail!(StorageError::corrupt_block(id, "payload checksum mismatch"));
        }

        Ok(payload.to_vec())
    }

    pub fn write(&mut self, id: BlockId, payload: &[u8]) -> Result<()> {
        let entry = self.entry(id)?;
        if payload.len() > self.capacity {
            eyre::bail!(StorageError::BlockFull {
                block_id: id,
                len: payload.len(),
                capacity: self.capacity,
            });
        }

        self.write_slot(entry.slot, id, payload)?;
        self.slots.insert(
            id,
            SlotEntry {
                slot: entry.slot,
                len: payload.len() as u32,
            },
        );
        Ok(())
    }

    /// Stores `payload` as the new content of `id` and returns the id that
    /// now holds it. A block written since the last `persist_meta` is
    /// rewritten in place; a durable block is left untouched, the payload
    /// goes to a new block and `id` is retired.
    pub fn replace(&mut self, id: BlockId, payload: &[u8]) -> Result<BlockId> {
        self.entry(id)?;
        if !self.durable.contains(&id) {
            self.write(id, payload)?;
            return Ok(id);
        }

        let new_ids = self.write_blocks(&[payload])?;
        self.free(id)?;
        Ok(new_ids[0])
    }

    /// Retires a block. Its slot becomes reusable after the next
    /// `persist_meta`.
    pub fn free(&mut self, id: BlockId) -> Result<()> {
        let entry = self.entry(id)?;
        self.slots.remove(&id);
        self.durable.remove(&id);
        self.retired.push(entry.slot);
        Ok(())
    }

    /// Partitions the stored payload at byte offset `split_point` into two
    /// new blocks and retires the source.
    pub fn split(&mut self, id: BlockId, split_point: usize) -> Result<(BlockId, BlockId)> {
        let payload = self.read(id)?;
        eyre::ensure!(
            split_point <= payload.len(),
            "split point {} past end of block {} ({} bytes)",
            split_point,
            id,
            payload.len()
        );

        let (left, right) = payload.split_at(split_point);
        let new_ids = self.write_blocks(&[left, right])?;
        self.free(id)?;

        debug!(
            block = id,
            left = new_ids[0],
            right = new_ids[1],
            split_point,
            "split block"
        );
        Ok((new_ids[0], new_ids[1]))
    }

    /// Concatenates the payloads of `ids` (in order) into one new block and
    /// retires the sources.
    pub fn compact(&mut self, ids: &[BlockId]) -> Result<BlockId> {
        eyre::ensure!(!ids.is_empty(), "compact needs at least one block");

        let mut total = 0usize;
        for &id in ids {
            total += self.payload_len(id)?;
        }
        if total > self.capacity {
            eyre::bail!(StorageError::WouldOverflow {
                blocks: ids.len(),
                len: total,
                capacity: self.capacity,
            });
        }

        let mut merged = Vec::with_capacity(total);
        for &id in ids {
            merged.extend_from_slice(&self.read(id)?);
        }

        let new_ids = self.write_blocks(&[&merged])?;
        for &id in ids {
            self.free(id)?;
        }

        debug!(merged = new_ids[0], sources = ?ids, len = total, "merged blocks");
        Ok(new_ids[0])
    }

    /// Frees every stored block for which `is_live` is false. Returns the
    /// number of slots reclaimed.
    pub fn reclaim_orphans(&mut self, is_live: impl Fn(BlockId) -> bool) -> Result<usize> {
        let orphans: Vec<BlockId> = self.slots.keys().copied().filter(|&id| !is_live(id)).collect();
        for &id in &orphans {
            warn!(block = id, path = %self.path().display(), "reclaiming unindexed block slot");
            self.free(id)?;
        }
        Ok(orphans.len())
    }

    /// Writes the metadata trailer and a fresh file header, then syncs.
    /// Every live block is durable afterwards.
    pub fn persist_meta(
        &mut self,
        meta: &[u8],
        block_count: u64,
        action_count: u32,
        property_count: u32,
    ) -> Result<()> {
        let region_end = self.file.region_end();
        let len = meta.len() as u64;
        let offset = self.trailer_offset(region_end, len);
        self.file.write_trailer_at(offset, meta)?;

        self.header.set_slot_count(self.file.slot_count());
        self.header.set_next_block_id(self.next_block_id);
        self.header.set_block_count(block_count);
        self.header.set_symbol_counts(action_count, property_count);
        self.header.set_meta(offset, len, checksum(meta));
        self.file.write_header(&self.header);

        self.file
            .sync()
            .wrap_err_with(|| format!("failed to persist metadata of '{}'", self.path().display()))?;

        if offset == region_end {
            self.file.truncate(region_end + len)?;
        }

        self.durable = self.slots.keys().copied().collect();
        for slot in std::mem::take(&mut self.retired) {
            let data = self.file.slot_mut(slot)?;
            data[..BLOCK_HEADER_SIZE].copy_from_slice(BlockHeader::free().as_bytes());
            self.freelist.release(slot);
        }
        Ok(())
    }

    /// Returns the metadata trailer recorded in the header, verifying its checksum.
    pub fn load_meta(&self) -> Result<&[u8]> {
        if self.header.meta_len() == 0 {
            return Ok(&[]);
        }

        let meta = self
            .file
            .read_trailer(self.header.meta_offset(), self.header.meta_len())?;
        if checksum(meta) != self.header.meta_checksum() {
            eyre::bail!(StorageError::corrupt_index("metadata checksum mismatch"));
        }
        Ok(meta)
    }

    fn entry(&self, id: BlockId) -> Result<SlotEntry> {
        match self.slots.get(&id) {
            Some(entry) => Ok(*entry),
            None => eyre::bail!(StorageError::not_found(format!("block {}", id))),
        }
    }

    /// Where the next trailer goes: right after the slot region when it ends
    /// before the current trailer starts, otherwise behind the current one.
    fn trailer_offset(&self, region_end: u64, len: u64) -> u64 {
        let current = self.header.meta_offset();
        let current_len = self.header.meta_len();
        if current_len == 0 || region_end + len <= current {
            region_end
        } else {
            current + current_len
        }
    }

    fn grow(&mut self) -> Result<u32> {
        let old = self.file.slot_count();
        let growth = (old / 4).max(MIN_SLOT_GROWTH);
        let new = old
            .checked_add(growth)
            .ok_or(StorageError::IdSpaceExhausted("slot"))?;
        let new_end = self.file.block_size() as u64 * (1 + new as u64);

        let current = self.header.meta_offset();
        let len = self.header.meta_len();
        if len > 0 && current < new_end {
            let trailer = self.file.read_trailer(current, len)?.to_vec();
            let offset = new_end.max(current + len);
            self.file.write_trailer_at(offset, &trailer)?;
            let checksum = self.header.meta_checksum();
            self.header.set_meta(offset, len, checksum);
            self.file.write_header(&self.header);
            self.file
                .sync()
                .wrap_err("failed to relocate metadata trailer before growth")?;
        }

        self.file.grow_slots(new)?;
        self.file.sync().wrap_err("failed to sync grown slot region")?;
        self.header.set_slot_count(new);
        self.file.write_header(&self.header);

        self.freelist.release_range(old + 1, new);
        Ok(old)
    }

    fn write_slot(&mut self, slot: u32, owner: BlockId, payload: &[u8]) -> Result<()> {
        let header = BlockHeader::new(owner, payload.len() as u32, checksum(payload));
        let data = self.file.slot_mut(slot)?;
        data[..BLOCK_HEADER_SIZE].copy_from_slice(header.as_bytes());
        data[BLOCK_HEADER_SIZE..BLOCK_HEADER_SIZE + payload.len()].copy_from_slice(payload);
        Ok(())
    }

    /// Writes each payload into a newly allocated block. On failure the
    /// blocks written so far are released and nothing else changes.
    pub fn write_blocks(&mut self, payloads: &[&[u8]]) -> Result<Vec<BlockId>> {
        let mut ids = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let written = self
                .allocate_block()
                .and_then(|id| self.write(id, payload).map(|_| id));
            match written {
                Ok(id) => ids.push(id),
                Err(e) => {
                    for &id in &ids {
                        let _ = self.free(id);
                    }
                    return Err(e);
                }
            }
        }
        Ok(ids)
    }
}
