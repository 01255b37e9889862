//! # Event Insertion
//!
//! Inserting an event keeps every payload sorted by `(object_id, timestamp)`
//! across the whole index, with ties kept in insertion order.
//!
//! ## Target Selection
//!
//! ```text
//! object has a chain      last chain block whose first record of the
//!                         object is at or before the new timestamp,
//!                         else the first chain block
//! object has no chain     the block placed right before it in the index
//!                         (or the first block when it precedes all)
//! index is empty          a freshly allocated block
//! ```
//!
//! ## Split Policy
//!
//! When the spliced payload no longer fits, the combined record list
//! (existing records plus the new one) is cut in two. Candidate cuts are
//! record boundaries where both halves fit. Among them an object boundary
//! nearest the byte midpoint wins; otherwise the valid cut nearest the
//! midpoint is used, which cuts an object in two and leaves the left half
//! spanned. Records are at most half a block, so a valid cut always exists
//! and one split per insert is enough.

use eyre::Result;
use tracing::debug;

use super::OpenState;
use crate::error::StorageError;
use crate::event::{scan_records, Event, RecordSpan};
use crate::index::BlockInfo;
use crate::storage::BlockStore;
use crate::types::{BlockId, ObjectId, Timestamp};

impl OpenState {
    pub(super) fn insert(&mut self, event: &Event) -> Result<()> {
        let record = event.encode();
        let limit = self.store.capacity() / 2;
        if record.len() > limit {
            eyre::bail!(StorageError::EventTooLarge {
                len: record.len(),
                limit,
            });
        }
        self.properties.check(event)?;

        let target = match self.insert_target(event.object_id, event.timestamp)? {
            Some(target) => target,
            None => {
                let id = self.store.allocate_block()?;
                self.store.write(id, &record)?;
                let mut info = BlockInfo::empty(id, event.object_id);
                info.include(event.object_id, event.timestamp);
                self.index.insert_block(info)?;
                self.dirty = true;
                return Ok(());
            }
        };

        let (payload, records) = read_records(&self.store, target)?;
        let key = (event.object_id, event.timestamp);
        let at = records.partition_point(|r| r.key() <= key);

        if payload.len() + record.len() <= self.store.capacity() {
            let offset = records.get(at).map_or(payload.len(), |r| r.start);
            let mut updated = Vec::with_capacity(payload.len() + record.len());
            updated.extend_from_slice(&payload[..offset]);
            updated.extend_from_slice(&record);
            updated.extend_from_slice(&payload[offset..]);

            let mut info = *self
                .index
                .get(target)
                .ok_or_else(|| StorageError::not_found(format!("block {} in index", target)))?;
            info.id = self.store.replace(target, &updated)?;
            info.include(event.object_id, event.timestamp);
            self.index.replace_block(target, &[info])?;
        } else {
            self.split_insert(target, &payload, &records, at, event, &record)?;
        }

        self.dirty = true;
        Ok(())
    }

    fn insert_target(&self, object_id: ObjectId, timestamp: Timestamp) -> Result<Option<BlockId>> {
        let chain = self.index.chain_range(object_id);

        if chain.is_empty() {
            return Ok(self
                .index
                .placement_for(object_id)
                .map(|pos| self.index.blocks()[pos].id));
        }

        let blocks = &self.index.blocks()[chain];
        // Every block after the first in a chain starts with the object.
        for info in blocks.iter().skip(1).rev() {
            let (_, records) = read_records(&self.store, info.id)?;
            match records.first() {
                Some(first) if first.key() <= (object_id, timestamp) => return Ok(Some(info.id)),
                _ => {}
            }
        }
        Ok(Some(blocks[0].id))
    }

    fn split_insert(
        &mut self,
        target: BlockId,
        payload: &[u8],
        records: &[RecordSpan],
        at: usize,
        event: &Event,
        record: &[u8],
    ) -> Result<()> {
        let incoming = RecordSpan {
            object_id: event.object_id,
            timestamp: event.timestamp,
            start: 0,
            end: record.len(),
        };
        let mut combined: Vec<RecordSpan> = Vec::with_capacity(records.len() + 1);
        combined.extend_from_slice(&records[..at]);
        combined.push(incoming);
        combined.extend_from_slice(&records[at..]);

        let cut = choose_cut(&combined, self.store.capacity()).ok_or_else(|| {
            StorageError::BlockFull {
                block_id: target,
                len: payload.len() + record.len(),
                capacity: self.store.capacity(),
            }
        })?;

        // Where the cut falls in the existing payload, and which half gets
        // the new record.
        let (split_point, goes_left) = if at < cut {
            (records[cut - 1].start, true)
        } else {
            (records.get(cut).map_or(payload.len(), |r| r.start), false)
        };

        let insert_offset = records.get(at).map_or(payload.len(), |r| r.start);
        let (side_start, side_end) = if goes_left {
            (0, split_point)
        } else {
            (split_point, payload.len())
        };
        let mut side_payload = Vec::with_capacity(side_end - side_start + record.len());
        side_payload.extend_from_slice(&payload[side_start..insert_offset]);
        side_payload.extend_from_slice(record);
        side_payload.extend_from_slice(&payload[insert_offset..side_end]);

        let (left, right) = self.store.split(target, split_point)?;

        // Both halves come from the combined record list, so the index can
        // switch over before the new record lands in its half.
        let left_info = BlockInfo::from_records(left, &combined[..cut], false);
        let right_info = BlockInfo::from_records(right, &combined[cut..], false);
        self.index.replace_block(target, &[left_info, right_info])?;

        let side = if goes_left { left } else { right };
        self.store.write(side, &side_payload)?;

        debug!(
            block = target,
            left,
            right,
            left_len = cut,
            right_len = combined.len() - cut,
            mid_object = combined[cut - 1].object_id == combined[cut].object_id,
            "split full block on insert"
        );
        Ok(())
    }
}

/// Reads a block and indexes its records. Malformed records are reported as
/// a corrupt block.
pub(super) fn read_records(store: &BlockStore, id: BlockId) -> Result<(Vec<u8>, Vec<RecordSpan>)> {
    let payload = store.read(id)?;
    let records = scan_records(&payload).map_err(|e| {
        eyre::Report::new(StorageError::corrupt_block(id, format!("malformed record: {}", e)))
    })?;
    Ok((payload, records))
}

/// Picks the number of records that go into the left half, or `None` when no
/// record boundary leaves both halves within `capacity`.
fn choose_cut(records: &[RecordSpan], capacity: usize) -> Option<usize> {
    let total: usize = records.iter().map(RecordSpan::len).sum();
    let midpoint = total / 2;

    let mut prefix = 0usize;
    let mut best_boundary: Option<(usize, usize)> = None;
    let mut best_any: Option<(usize, usize)> = None;

    for cut in 1..records.len() {
        prefix += records[cut - 1].len();
        if prefix > capacity || total - prefix > capacity {
            continue;
        }

        let distance = prefix.abs_diff(midpoint);
        let closer = |best: Option<(usize, usize)>| best.map_or(true, |(_, d)| distance < d);

        if closer(best_any) {
            best_any = Some((cut, distance));
        }
        if records[cut - 1].object_id != records[cut].object_id && closer(best_boundary) {
            best_boundary = Some((cut, distance));
        }
    }

    best_boundary.or(best_any).map(|(cut, _)| cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(objects_and_lens: &[(ObjectId, usize)]) -> Vec<RecordSpan> {
        let mut start = 0;
        objects_and_lens
            .iter()
            .enumerate()
            .map(|(i, &(object_id, len))| {
                let span = RecordSpan {
                    object_id,
                    timestamp: i as Timestamp,
                    start,
                    end: start + len,
                };
                start += len;
                span
            })
            .collect()
    }

    #[test]
    fn cut_prefers_object_boundary_near_midpoint() {
        let records = spans(&[(1, 10), (1, 10), (2, 10), (2, 10), (3, 10)]);

        assert_eq!(choose_cut(&records, 30), Some(2));
    }

    #[test]
    fn cut_falls_back_to_mid_object() {
        let records = spans(&[(5, 10), (5, 10), (5, 10), (5, 10)]);

        assert_eq!(choose_cut(&records, 30), Some(2));
    }

    #[test]
    fn cut_skips_boundaries_that_overflow() {
        // The only object boundary leaves 40 bytes on the right.
        let records = spans(&[(1, 10), (2, 10), (2, 10), (2, 10), (2, 10)]);

        let cut = choose_cut(&records, 30).unwrap();

        assert_eq!(cut, 2);
        assert_eq!(records[cut - 1].object_id, records[cut].object_id);
    }

    #[test]
    fn single_record_has_no_cut() {
        assert_eq!(choose_cut(&spans(&[(1, 10)]), 30), None);
    }
}
