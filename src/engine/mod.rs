//! # Object Storage Engine
//!
//! `Engine` is the facade over one storage file. It owns the block store,
//! the block info index and both symbol tables, and keeps them consistent
//! with each other across inserts, splits, merges and deletes.
//!
//! ## Control Flow
//!
//! ```text
//! insert_event(event)
//!   ├── BlockInfoIndex: pick the target block for (object, timestamp)
//!   ├── BlockStore: read payload, splice the record in
//!   ├── fits?  write back (copy if flushed), widen the descriptor
//!   └── full?  split at a record boundary, replace the descriptor with
//!              two new ones, recompute spanned flags
//!
//! fetch_events(object)
//!   └── BlockInfoIndex chain -> BlockStore reads, decoded lazily per block
//! ```
//!
//! ## Locking
//!
//! All state lives in one `RwLock<Option<OpenState>>`. Mutations (inserts,
//! compaction, deletes, symbol creation, flush, close) take the write lock;
//! lookups and fetch iterators take the read lock. A fetch iterator holds
//! its read guard until dropped, so a writer waits for outstanding
//! iterators. Read paths lock with `read_recursive`: a thread holding an
//! iterator may issue further lookups even while a writer is queued behind
//! it. A closed engine (`None`) answers every call with `NotOpen`.
//!
//! ## Persistence
//!
//! Block payloads are written straight into the mapped file, but never into
//! a block the last flushed index names: such a block is copied to a new
//! one first. The index and the symbol tables are batched: mutations mark
//! them dirty and `flush()` (or `close()`, or dropping the engine) writes a
//! new metadata trailer and syncs the file. A crash therefore reopens to
//! exactly the state of the last flush.

mod builder;
mod compact;
mod delete;
mod fetch;
mod insert;

pub use builder::{EngineBuilder, EngineConfig};
pub use compact::CompactionSummary;
pub use fetch::Events;

use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use hashbrown::HashSet;
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

use crate::error::StorageError;
use crate::event::Event;
use crate::index::{BlockChain, BlockInfo, BlockInfoIndex};
use crate::schema::{PropertyTable, SymbolTable, ACTIONS};
use crate::storage::{BlockStore, MetaCodec};
use crate::types::{DataType, ObjectId, PropertyKind, PropertyType, SymbolId, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub block_size: u32,
    pub capacity: usize,
    pub block_count: usize,
    pub slot_count: u32,
    pub free_slots: u32,
    pub event_bytes: u64,
    pub actions: usize,
    pub properties: usize,
}

#[derive(Debug)]
pub(crate) struct OpenState {
    store: BlockStore,
    index: BlockInfoIndex,
    actions: SymbolTable,
    properties: PropertyTable,
    config: EngineConfig,
    dirty: bool,
}

impl OpenState {
    fn create(path: &Path, config: EngineConfig) -> Result<Self> {
        let store = BlockStore::create(path, config.block_size)?;
        let mut state = Self {
            store,
            index: BlockInfoIndex::new(),
            actions: SymbolTable::new(ACTIONS),
            properties: PropertyTable::new(),
            config,
            dirty: true,
        };
        state.flush()?;
        Ok(state)
    }

    fn open(path: &Path, config: EngineConfig) -> Result<Self> {
        let mut store = BlockStore::open(path)?;
        let meta = MetaCodec::decode(store.load_meta()?)?;

        let header = store.header();
        if header.action_count() as usize != meta.actions.len()
            || header.property_count() as usize != meta.properties.len()
            || header.block_count() as usize != meta.blocks.len()
        {
            eyre::bail!(StorageError::corrupt_index(format!(
                "header counts ({} actions, {} properties, {} blocks) disagree with metadata ({}, {}, {})",
                header.action_count(),
                header.property_count(),
                header.block_count(),
                meta.actions.len(),
                meta.properties.len(),
                meta.blocks.len()
            )));
        }

        let actions = SymbolTable::from_entries(ACTIONS, meta.actions)?;
        let properties = PropertyTable::from_entries(meta.properties)?;
        let index = BlockInfoIndex::from_blocks(meta.blocks)?;

        let mut live = HashSet::with_capacity(index.len());
        for info in &index {
            if !store.contains(info.id) {
                eyre::bail!(StorageError::corrupt_index(format!(
                    "index references block {} but no slot holds it",
                    info.id
                )));
            }
            live.insert(info.id);
        }

        let reclaimed = store.reclaim_orphans(|id| live.contains(&id))?;
        let config = EngineConfig {
            block_size: store.block_size(),
            ..config
        };

        Ok(Self {
            store,
            index,
            actions,
            properties,
            config,
            dirty: reclaimed > 0,
        })
    }

    fn is_dirty(&self) -> bool {
        self.dirty || self.actions.is_dirty() || self.properties.is_dirty()
    }

    fn flush(&mut self) -> Result<()> {
        if !self.is_dirty() {
            return Ok(());
        }

        let actions = self.actions.entries();
        let properties = self.properties.entries();
        let meta = MetaCodec::encode(
            actions.into_iter(),
            properties.into_iter(),
            self.index.blocks(),
        );

        self.store.persist_meta(
            &meta,
            self.index.len() as u64,
            self.actions.len() as u32,
            self.properties.len() as u32,
        )?;

        self.dirty = false;
        self.actions.mark_clean();
        self.properties.mark_clean();
        Ok(())
    }

    fn stats(&self) -> Result<EngineStats> {
        let mut event_bytes = 0u64;
        for info in &self.index {
            event_bytes += self.store.payload_len(info.id)? as u64;
        }

        Ok(EngineStats {
            block_size: self.store.block_size(),
            capacity: self.store.capacity(),
            block_count: self.index.len(),
            slot_count: self.store.slot_count(),
            free_slots: self.store.free_slots(),
            event_bytes,
            actions: self.actions.len(),
            properties: self.properties.len(),
        })
    }
}

#[derive(Debug)]
pub struct Engine {
    path: PathBuf,
    state: RwLock<Option<OpenState>>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Creates a new storage file with default settings.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        EngineBuilder::new().create(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        EngineBuilder::new().open(path)
    }

    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        EngineBuilder::new().open_or_create(path)
    }

    pub(crate) fn create_with(path: &Path, config: EngineConfig) -> Result<Self> {
        let state = OpenState::create(path, config)
            .wrap_err_with(|| format!("failed to create storage file '{}'", path.display()))?;

        info!(path = %path.display(), block_size = config.block_size, "created storage file");

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(Some(state)),
        })
    }

    pub(crate) fn open_with(path: &Path, config: EngineConfig) -> Result<Self> {
        let state = OpenState::open(path, config)
            .wrap_err_with(|| format!("failed to open storage file '{}'", path.display()))?;

        info!(
            path = %path.display(),
            blocks = state.index.len(),
            actions = state.actions.len(),
            properties = state.properties.len(),
            "opened storage file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(Some(state)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.state.read_recursive().is_some()
    }

    /// Flushes dirty metadata and releases the file. Later calls on this
    /// engine fail with `NotOpen`.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.state.write();
        let state = match guard.as_mut() {
            Some(state) => state,
            None => eyre::bail!(StorageError::NotOpen),
        };

        state.flush()?;
        *guard = None;

        info!(path = %self.path.display(), "closed storage file");
        Ok(())
    }

    /// Writes the index and symbol tables to the metadata trailer if they
    /// changed since the last flush.
    pub fn flush(&self) -> Result<()> {
        self.write_state()?.flush()
    }

    /// Stores one event. The engine splits the target block transparently
    /// when the event does not fit.
    pub fn insert_event(&self, event: &Event) -> Result<()> {
        self.write_state()?.insert(event)
    }

    /// Lazily yields every event of `object_id` in timestamp order.
    pub fn fetch_events(&self, object_id: ObjectId) -> Result<Events<'_>> {
        self.fetch_events_in_range(object_id, TimeRange::ALL)
    }

    pub fn fetch_events_in_range(&self, object_id: ObjectId, range: TimeRange) -> Result<Events<'_>> {
        let state = self.read_state()?;
        let chain = state.index.find_blocks_in_range(object_id, range);
        Ok(Events::new(state, chain, object_id, range))
    }

    pub fn compact(&self) -> Result<CompactionSummary> {
        self.write_state()?.compact()
    }

    /// Removes every event of `object_id`. Returns the number removed.
    pub fn delete_object(&self, object_id: ObjectId) -> Result<usize> {
        self.write_state()?.delete_object(object_id)
    }

    pub fn find_blocks(&self, object_id: ObjectId) -> Result<BlockChain> {
        Ok(self.read_state()?.index.find_blocks(object_id))
    }

    pub fn find_blocks_in_range(&self, object_id: ObjectId, range: TimeRange) -> Result<BlockChain> {
        Ok(self.read_state()?.index.find_blocks_in_range(object_id, range))
    }

    /// Snapshot of the block info index in index order.
    pub fn block_infos(&self) -> Result<Vec<BlockInfo>> {
        Ok(self.read_state()?.index.blocks().to_vec())
    }

    pub fn stats(&self) -> Result<EngineStats> {
        self.read_state()?.stats()
    }

    pub fn config(&self) -> Result<EngineConfig> {
        Ok(self.read_state()?.config)
    }

    pub fn find_or_create_action(&self, name: &str) -> Result<SymbolId> {
        self.write_state()?.actions.find_or_create(name)
    }

    pub fn find_or_create_property(&self, name: &str) -> Result<SymbolId> {
        self.write_state()?.properties.find_or_create(name)
    }

    /// Finds or creates a property declared with `kind` and `data_type`.
    /// Later inserts must give it values of that type. Fails with
    /// `TypeMismatch` if the property is already declared differently.
    pub fn define_property(&self, name: &str, kind: PropertyKind, data_type: DataType) -> Result<SymbolId> {
        self.write_state()?.properties.define(name, kind, data_type)
    }

    pub fn property_type(&self, id: SymbolId) -> Result<Option<PropertyType>> {
        self.read_state()?.properties.property_type(id)
    }

    pub fn action_name(&self, id: SymbolId) -> Result<String> {
        Ok(self.read_state()?.actions.name_for(id)?.to_string())
    }

    pub fn action_id(&self, name: &str) -> Result<SymbolId> {
        self.read_state()?.actions.id_for(name)
    }

    pub fn property_name(&self, id: SymbolId) -> Result<String> {
        Ok(self.read_state()?.properties.name_for(id)?.to_string())
    }

    pub fn property_id(&self, name: &str) -> Result<SymbolId> {
        self.read_state()?.properties.id_for(name)
    }

    fn read_state(&self) -> Result<MappedRwLockReadGuard<'_, OpenState>> {
        RwLockReadGuard::try_map(self.state.read_recursive(), Option::as_ref)
            .map_err(|_| eyre::Report::new(StorageError::NotOpen))
    }

    fn write_state(&self) -> Result<MappedRwLockWriteGuard<'_, OpenState>> {
        RwLockWriteGuard::try_map(self.state.write(), Option::as_mut)
            .map_err(|_| eyre::Report::new(StorageError::NotOpen))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(state) = self.state.get_mut().as_mut() {
            if let Err(e) = state.flush() {
                warn!(path = %self.path.display(), error = %e, "failed to flush storage file on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn is_not_open(err: &eyre::Report) -> bool {
        matches!(StorageError::of(err), Some(StorageError::NotOpen))
    }

    #[test]
    fn closed_engine_reports_not_open() {
        let dir = tempdir().unwrap();
        let engine = Engine::create(dir.path().join("store.edb")).unwrap();

        engine.close().unwrap();

        assert!(!engine.is_open());
        assert!(is_not_open(&engine.close().unwrap_err()));
        assert!(is_not_open(&engine.insert_event(&Event::new(1, 1, 1)).unwrap_err()));
        assert!(is_not_open(&engine.fetch_events(1).err().unwrap()));
        assert!(is_not_open(&engine.find_blocks(1).unwrap_err()));
        assert!(is_not_open(&engine.find_or_create_action("login").unwrap_err()));
        assert!(is_not_open(&engine.compact().unwrap_err()));
    }

    #[test]
    fn symbols_are_separate_namespaces() {
        let dir = tempdir().unwrap();
        let engine = Engine::create(dir.path().join("store.edb")).unwrap();

        let login = engine.find_or_create_action("login").unwrap();
        let ip = engine.find_or_create_property("ip").unwrap();
        let also_login = engine.find_or_create_property("login").unwrap();

        assert_eq!(login, 1);
        assert_eq!(ip, 1);
        assert_eq!(also_login, 2);
        assert_eq!(engine.action_name(login).unwrap(), "login");
        assert_eq!(engine.property_id("ip").unwrap(), ip);
    }

    #[test]
    fn stats_reflect_created_file() {
        let dir = tempdir().unwrap();
        let engine = Engine::builder()
            .block_size(4096)
            .create(dir.path().join("store.edb"))
            .unwrap();

        let stats = engine.stats().unwrap();

        assert_eq!(stats.block_size, 4096);
        assert_eq!(stats.capacity, 4096 - crate::config::BLOCK_HEADER_SIZE);
        assert_eq!(stats.block_count, 0);
        assert_eq!(stats.event_bytes, 0);
    }
}
