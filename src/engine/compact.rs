//! # Compaction
//!
//! Merges runs of adjacent underfull blocks into single blocks. A block is
//! underfull when its payload fills less than `underfull_percent` of the
//! block capacity. Runs are built greedily left to right in index order: a
//! run grows while the next block is underfull and the merged payload still
//! fits one block.
//!
//! Adjacent blocks hold consecutive key ranges, so concatenating their
//! payloads keeps records sorted. A merge that swallows a spanned boundary
//! shortens that object's chain by one block.
//!
//! A run that fails to merge (a corrupt source block, say) aborts the
//! compaction. Runs merged before it stay merged and indexed.
//!
//! Running compaction twice in a row is a no-op the second time: every run
//! stopped either at a full-enough block or because one more block would
//! not fit, and both conditions still hold after the merge.

use std::ops::Range;

use eyre::Result;
use tracing::info;

use super::insert::read_records;
use super::OpenState;
use crate::index::BlockInfo;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionSummary {
    pub runs_merged: usize,
    pub blocks_before: usize,
    pub blocks_after: usize,
}

impl OpenState {
    pub(super) fn compact(&mut self) -> Result<CompactionSummary> {
        let blocks_before = self.index.len();
        let runs = self.merge_runs()?;

        // Back to front, so earlier positions stay valid. Each run is scanned
        // before the store merges it; once merged, the index follows at once.
        for run in runs.iter().rev() {
            let ids: Vec<_> = self.index.blocks()[run.clone()].iter().map(|b| b.id).collect();
            let mut spans = Vec::new();
            for &id in &ids {
                let (_, records) = read_records(&self.store, id)?;
                spans.extend(records);
            }

            let merged = self.store.compact(&ids)?;
            let info = BlockInfo::from_records(merged, &spans, false);
            self.index.replace_run(run.clone(), &[info]);
            self.dirty = true;
        }

        let summary = CompactionSummary {
            runs_merged: runs.len(),
            blocks_before,
            blocks_after: self.index.len(),
        };
        info!(
            path = %self.store.path().display(),
            runs = summary.runs_merged,
            before = summary.blocks_before,
            after = summary.blocks_after,
            "compaction finished"
        );
        Ok(summary)
    }

    /// Index position ranges of two or more blocks to merge.
    fn merge_runs(&self) -> Result<Vec<Range<usize>>> {
        let capacity = self.store.capacity();
        let threshold = capacity * self.config.underfull_percent as usize / 100;

        let mut lens = Vec::with_capacity(self.index.len());
        for info in &self.index {
            lens.push(self.store.payload_len(info.id)?);
        }

        let mut runs = Vec::new();
        let mut pos = 0;
        while pos < lens.len() {
            if lens[pos] >= threshold {
                pos += 1;
                continue;
            }

            let start = pos;
            let mut total = lens[pos];
            pos += 1;
            while pos < lens.len() && lens[pos] < threshold && total + lens[pos] <= capacity {
                total += lens[pos];
                pos += 1;
            }

            if pos - start > 1 {
                runs.push(start..pos);
            }
        }

        Ok(runs)
    }
}
