//! # Freelist Management
//!
//! Tracks block slots that hold no live block so the block store can reuse
//! them before growing the file.
//!
//! ## Design Overview
//!
//! When a block is retired (after a split, a merge or a delete that empties
//! it) its slot header is zeroed and the slot number is released here.
//! Allocation always hands out the lowest free slot, which keeps live data
//! packed towards the start of the file.
//!
//! ## Persistence
//!
//! The freelist is not persisted. A zeroed slot header marks a free slot on
//! disk, so on open the block store rebuilds the freelist while scanning
//! slot headers.
//!
//! ## Thread Safety
//!
//! `Freelist` is not thread-safe on its own; it lives inside the block
//! store, which is only mutated under the engine's write lock.

#[derive(Debug, Default)]
pub struct Freelist {
    // Sorted descending so the lowest slot is popped first.
    slots: Vec<u32>,
}

impl Freelist {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn free_count(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn allocate(&mut self) -> Option<u32> {
        self.slots.pop()
    }

    pub fn release(&mut self, slot: u32) {
        let pos = self.slots.partition_point(|&s| s > slot);
        if self.slots.get(pos) != Some(&slot) {
            self.slots.insert(pos, slot);
        }
    }

    pub fn release_range(&mut self, start: u32, end: u32) {
        for slot in start..end {
            self.release(slot);
        }
    }
}
