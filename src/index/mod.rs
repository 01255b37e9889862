//! # Block Info Index
//!
//! The in-memory directory of block descriptors for one storage file. It is
//! mirrored on disk as the index segment of the metadata trailer.
//!
//! ## Ordering and Spanning
//!
//! Descriptors are kept sorted by `min_object_id`. For two consecutive
//! entries `A`, `B`:
//!
//! ```text
//! A.max_object_id <= B.min_object_id
//! A.max_object_id == B.min_object_id   iff   A.spanned
//! ```
//!
//! A spanned block shares exactly one object id with its successor: the
//! object whose events were cut across the block boundary. Entries that
//! share a `min_object_id` therefore form a chain and stay in chain order.
//! Fresh blocks enter after existing entries with the same minimum (id
//! order); split and merge results replace their sources in place through
//! [`BlockInfoIndex::replace_run`].
//!
//! Because both bounds are non-decreasing along the index, lookup is a
//! binary search to the first entry whose `max_object_id` reaches the object
//! followed by a forward scan while `min_object_id` still covers it.
//!
//! ## Gaps
//!
//! An object id between two entries' ranges resolves to an empty chain. That
//! is the normal "not yet written" state, not an error.

mod block_info;

pub use block_info::BlockInfo;

use std::ops::Range;

use eyre::Result;
use hashbrown::HashSet;
use smallvec::SmallVec;

use crate::error::StorageError;
use crate::types::{BlockId, ObjectId, TimeRange};

pub type BlockChain = SmallVec<[BlockInfo; 4]>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockInfoIndex {
    blocks: Vec<BlockInfo>,
}

impl BlockInfoIndex {
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Builds an index from persisted descriptors, rejecting any layout that
    /// breaks the ordering or spanning rules.
    pub fn from_blocks(blocks: Vec<BlockInfo>) -> Result<Self> {
        let index = Self { blocks };
        index.validate()?;
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[BlockInfo] {
        &self.blocks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BlockInfo> {
        self.blocks.iter()
    }

    pub fn get(&self, id: BlockId) -> Option<&BlockInfo> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn position(&self, id: BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    pub fn find_blocks(&self, object_id: ObjectId) -> BlockChain {
        self.blocks[self.chain_range(object_id)].iter().copied().collect()
    }

    pub fn find_blocks_in_range(&self, object_id: ObjectId, range: TimeRange) -> BlockChain {
        self.blocks[self.chain_range(object_id)]
            .iter()
            .filter(|b| b.intersects(range))
            .copied()
            .collect()
    }

    /// Positions of the entries whose object range contains `object_id`.
    pub fn chain_range(&self, object_id: ObjectId) -> Range<usize> {
        let start = self
            .blocks
            .partition_point(|b| b.max_object_id < object_id);
        let len = self.blocks[start..]
            .iter()
            .take_while(|b| b.contains_object(object_id))
            .count();
        start..start + len
    }

    /// Position of the block that should absorb an object with no chain yet:
    /// the last entry starting below it, or the first entry when the object
    /// precedes everything.
    pub fn placement_for(&self, object_id: ObjectId) -> Option<usize> {
        if self.blocks.is_empty() {
            return None;
        }
        let after = self
            .blocks
            .partition_point(|b| b.min_object_id <= object_id);
        Some(after.saturating_sub(1))
    }

    pub fn insert_block(&mut self, info: BlockInfo) -> Result<()> {
        if self.position(info.id).is_some() {
            eyre::bail!(StorageError::corrupt_index(format!(
                "block {} already indexed",
                info.id
            )));
        }

        let pos = self
            .blocks
            .partition_point(|b| b.min_object_id <= info.min_object_id);
        self.blocks.insert(pos, info);
        Ok(())
    }

    pub fn update_block(&mut self, info: BlockInfo) -> Result<()> {
        let pos = self.require_position(info.id)?;
        self.blocks[pos] = info;
        Ok(())
    }

    pub fn remove_block(&mut self, id: BlockId) -> Result<BlockInfo> {
        let pos = self.require_position(id)?;
        let removed = self.blocks.remove(pos);
        if pos > 0 {
            self.refresh_spanned(pos - 1);
        }
        Ok(removed)
    }

    /// Replaces one block with `replacements` at the same position.
    pub fn replace_block(&mut self, id: BlockId, replacements: &[BlockInfo]) -> Result<()> {
        let pos = self.require_position(id)?;
        self.replace_run(pos..pos + 1, replacements);
        Ok(())
    }

    /// Replaces a contiguous run of entries and recomputes the spanned flags
    /// around the seam.
    pub fn replace_run(&mut self, run: Range<usize>, replacements: &[BlockInfo]) {
        let start = run.start;
        self.blocks.splice(run, replacements.iter().copied());

        let first = start.saturating_sub(1);
        let last = (start + replacements.len()).min(self.blocks.len());
        for pos in first..last {
            self.refresh_spanned(pos);
        }
    }

    pub fn refresh_spanned(&mut self, pos: usize) {
        let spanned = match (self.blocks.get(pos), self.blocks.get(pos + 1)) {
            (Some(a), Some(b)) => a.max_object_id == b.min_object_id,
            _ => false,
        };
        if let Some(block) = self.blocks.get_mut(pos) {
            block.spanned = spanned;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.blocks.len());

        for (pos, block) in self.blocks.iter().enumerate() {
            if !seen.insert(block.id) {
                eyre::bail!(StorageError::corrupt_index(format!(
                    "duplicate block id {}",
                    block.id
                )));
            }

            if block.min_object_id > block.max_object_id || block.is_empty() {
                eyre::bail!(StorageError::corrupt_index(format!(
                    "block {} has inverted bounds (objects {}..={}, timestamps {}..={})",
                    block.id,
                    block.min_object_id,
                    block.max_object_id,
                    block.min_timestamp,
                    block.max_timestamp
                )));
            }

            match self.blocks.get(pos + 1) {
                Some(next) => {
                    if block.max_object_id > next.min_object_id {
                        eyre::bail!(StorageError::corrupt_index(format!(
                            "blocks {} and {} overlap on object ids {}..={}",
                            block.id, next.id, next.min_object_id, block.max_object_id
                        )));
                    }
                    let shares_object = block.max_object_id == next.min_object_id;
                    if block.spanned != shares_object {
                        eyre::bail!(StorageError::corrupt_index(format!(
                            "block {} spanned flag {} disagrees with successor {}",
                            block.id, block.spanned, next.id
                        )));
                    }
                }
                None if block.spanned => {
                    eyre::bail!(StorageError::corrupt_index(format!(
                        "last block {} is marked spanned",
                        block.id
                    )));
                }
                None => {}
            }
        }

        Ok(())
    }

    fn require_position(&self, id: BlockId) -> Result<usize> {
        match self.position(id) {
            Some(pos) => Ok(pos),
            None => eyre::bail!(StorageError::not_found(format!("block {} in index", id))),
        }
    }
}

impl<'a> IntoIterator for &'a BlockInfoIndex {
    type Item = &'a BlockInfo;
    type IntoIter = std::slice::Iter<'a, BlockInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}
