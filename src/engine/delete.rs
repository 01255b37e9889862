//! Removal of all events of one object.
//!
//! Deletion runs in two phases. The first reads every block of the chain
//! and plans its fate without touching the store. The second writes the
//! surviving records of partly emptied blocks into new blocks, retires the
//! old ones and swaps the run in the index. A corrupt chain block fails
//! the first phase, leaving store and index as they were.

use eyre::Result;
use tracing::debug;

use super::insert::read_records;
use super::OpenState;
use crate::event::RecordSpan;
use crate::index::BlockInfo;
use crate::types::{BlockId, ObjectId};

enum Fate {
    Keep(BlockInfo),
    Drop(BlockId),
    Rewrite {
        id: BlockId,
        payload: Vec<u8>,
        spans: Vec<RecordSpan>,
    },
}

impl OpenState {
    pub(super) fn delete_object(&mut self, object_id: ObjectId) -> Result<usize> {
        let chain = self.index.chain_range(object_id);
        if chain.is_empty() {
            return Ok(0);
        }

        let mut removed = 0;
        let mut plan = Vec::with_capacity(chain.len());
        for info in &self.index.blocks()[chain.clone()] {
            let (payload, records) = read_records(&self.store, info.id)?;
            let kept: Vec<RecordSpan> = records
                .iter()
                .filter(|r| r.object_id != object_id)
                .copied()
                .collect();
            let dropped = records.len() - kept.len();
            removed += dropped;

            let fate = if dropped == 0 {
                Fate::Keep(*info)
            } else if kept.is_empty() {
                Fate::Drop(info.id)
            } else {
                let mut rewritten = Vec::with_capacity(payload.len());
                for record in &kept {
                    rewritten.extend_from_slice(&payload[record.start..record.end]);
                }
                Fate::Rewrite {
                    id: info.id,
                    payload: rewritten,
                    spans: kept,
                }
            };
            plan.push(fate);
        }

        if removed == 0 {
            return Ok(0);
        }

        let payloads: Vec<&[u8]> = plan
            .iter()
            .filter_map(|fate| match fate {
                Fate::Rewrite { payload, .. } => Some(payload.as_slice()),
                _ => None,
            })
            .collect();
        let mut new_ids = self.store.write_blocks(&payloads)?.into_iter();

        let mut survivors = Vec::with_capacity(plan.len());
        for fate in plan {
            match fate {
                Fate::Keep(info) => survivors.push(info),
                Fate::Drop(id) => self.store.free(id)?,
                Fate::Rewrite { id, spans, .. } => {
                    self.store.free(id)?;
                    if let Some(new_id) = new_ids.next() {
                        survivors.push(BlockInfo::from_records(new_id, &spans, false));
                    }
                }
            }
        }

        self.index.replace_run(chain, &survivors);
        self.dirty = true;
        debug!(object = object_id, events = removed, "deleted object");

        Ok(removed)
    }
}
