//! # Block Descriptors
//!
//! A [`BlockInfo`] describes one block: which object ids and timestamps its
//! events cover and whether its last object continues into the next block
//! (`spanned`). Descriptors are always derived from block contents, either
//! widened by one event on insert or recomputed by rescanning a payload
//! after a split, merge or delete.

use crate::event::RecordSpan;
use crate::types::{BlockId, ObjectId, TimeRange, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    pub id: BlockId,
    pub min_object_id: ObjectId,
    pub max_object_id: ObjectId,
    pub min_timestamp: Timestamp,
    pub max_timestamp: Timestamp,
    pub spanned: bool,
}

impl BlockInfo {
    /// Descriptor for a block with no events. The timestamp bounds are the
    /// inverted sentinels, so the block intersects no time range.
    pub fn empty(id: BlockId, object_id: ObjectId) -> Self {
        Self {
            id,
            min_object_id: object_id,
            max_object_id: object_id,
            min_timestamp: Timestamp::MAX,
            max_timestamp: Timestamp::MIN,
            spanned: false,
        }
    }

    /// Recomputes bounds from a scanned payload. `records` must be non-empty
    /// and sorted by object id.
    pub fn from_records(id: BlockId, records: &[RecordSpan], spanned: bool) -> Self {
        let mut info = match records.first() {
            Some(first) => Self::empty(id, first.object_id),
            None => Self::empty(id, 0),
        };

        for record in records {
            info.include(record.object_id, record.timestamp);
        }
        info.spanned = spanned;
        info
    }

    pub fn is_empty(&self) -> bool {
        self.min_timestamp > self.max_timestamp
    }

    pub fn contains_object(&self, object_id: ObjectId) -> bool {
        self.min_object_id <= object_id && object_id <= self.max_object_id
    }

    pub fn intersects(&self, range: TimeRange) -> bool {
        range.intersects(self.min_timestamp, self.max_timestamp)
    }

    pub fn include(&mut self, object_id: ObjectId, timestamp: Timestamp) {
        if self.is_empty() {
            self.min_object_id = object_id;
            self.max_object_id = object_id;
        } else {
            self.min_object_id = self.min_object_id.min(object_id);
            self.max_object_id = self.max_object_id.max(object_id);
        }
        self.min_timestamp = self.min_timestamp.min(timestamp);
        self.max_timestamp = self.max_timestamp.max(timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(object_id: ObjectId, timestamp: Timestamp) -> RecordSpan {
        RecordSpan {
            object_id,
            timestamp,
            start: 0,
            end: 1,
        }
    }

    #[test]
    fn empty_descriptor_has_inverted_sentinels() {
        let info = BlockInfo::empty(1, 0);

        assert!(info.is_empty());
        assert!(!info.intersects(TimeRange::ALL));
    }

    #[test]
    fn include_first_event_replaces_placeholder_object() {
        let mut info = BlockInfo::empty(1, 0);
        info.include(42, 7);

        assert_eq!(info.min_object_id, 42);
        assert_eq!(info.max_object_id, 42);
        assert_eq!((info.min_timestamp, info.max_timestamp), (7, 7));
    }

    #[test]
    fn from_records_covers_all_spans() {
        let records = [span(3, 500), span(3, 100), span(9, -20)];

        let info = BlockInfo::from_records(4, &records, true);

        assert_eq!(info.id, 4);
        assert_eq!((info.min_object_id, info.max_object_id), (3, 9));
        assert_eq!((info.min_timestamp, info.max_timestamp), (-20, 500));
        assert!(info.spanned);
        assert!(info.contains_object(5));
        assert!(!info.contains_object(10));
    }
}
