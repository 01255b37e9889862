//! # Event Fetch
//!
//! `Events` walks an object's block chain lazily. Each block is read and its
//! matching records decoded only when the previous block is exhausted. The
//! iterator holds the engine's read lock for its whole lifetime.

use std::vec;

use eyre::Result;
use parking_lot::MappedRwLockReadGuard;

use super::insert::read_records;
use super::OpenState;
use crate::error::StorageError;
use crate::event::Event;
use crate::index::BlockChain;
use crate::types::{ObjectId, TimeRange};

pub struct Events<'a> {
    state: MappedRwLockReadGuard<'a, OpenState>,
    chain: BlockChain,
    next_block: usize,
    object_id: ObjectId,
    range: TimeRange,
    pending: vec::IntoIter<Event>,
    failed: bool,
}

impl<'a> Events<'a> {
    pub(super) fn new(
        state: MappedRwLockReadGuard<'a, OpenState>,
        chain: BlockChain,
        object_id: ObjectId,
        range: TimeRange,
    ) -> Self {
        Self {
            state,
            chain,
            next_block: 0,
            object_id,
            range,
            pending: Vec::new().into_iter(),
            failed: false,
        }
    }

    /// Number of blocks the fetch will visit.
    pub fn block_count(&self) -> usize {
        self.chain.len()
    }

    fn load_block(&mut self, position: usize) -> Result<Vec<Event>> {
        let id = self.chain[position].id;
        let (payload, records) = read_records(&self.state.store, id)?;

        records
            .iter()
            .filter(|r| r.object_id == self.object_id && self.range.contains(r.timestamp))
            .map(|r| {
                r.decode(&payload).map_err(|e| {
                    eyre::Report::new(StorageError::corrupt_block(
                        id,
                        format!("undecodable record at offset {}: {}", r.start, e),
                    ))
                })
            })
            .collect()
    }
}

impl Iterator for Events<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.next() {
                return Some(Ok(event));
            }
            if self.failed || self.next_block >= self.chain.len() {
                return None;
            }

            let position = self.next_block;
            self.next_block += 1;
            match self.load_block(position) {
                Ok(events) => self.pending = events.into_iter(),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl std::fmt::Debug for Events<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Events")
            .field("object_id", &self.object_id)
            .field("range", &self.range)
            .field("next_block", &self.next_block)
            .field("blocks", &self.chain.len())
            .finish()
    }
}
