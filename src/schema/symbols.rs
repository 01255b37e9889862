//! # Symbol Tables
//!
//! A `SymbolTable` maps names to dense numeric ids for one namespace. The
//! engine owns two: actions and properties. Event records only carry ids;
//! names live in the symbol segment of the metadata trailer.

use eyre::{ensure, Result};
use hashbrown::HashMap;

use crate::config::{FIRST_SYMBOL_ID, MAX_SYMBOL_ID, MAX_SYMBOL_NAME_LEN};
use crate::error::StorageError;
use crate::types::SymbolId;

#[derive(Debug, Clone)]
pub struct SymbolTable {
    kind: &'static str,
    by_name: HashMap<String, SymbolId>,
    by_id: HashMap<SymbolId, String>,
    // Wider than SymbolId so the last id can be handed out without overflow.
    next_id: u64,
    max_id: u64,
    dirty: bool,
}

impl SymbolTable {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            by_name: HashMap::new(),
            by_id: HashMap::new(),
            next_id: FIRST_SYMBOL_ID as u64,
            max_id: MAX_SYMBOL_ID as u64,
            dirty: false,
        }
    }

    /// Rebuilds a table from persisted entries. Duplicate ids or names mean
    /// the symbol segment is corrupt.
    pub fn from_entries(
        kind: &'static str,
        entries: impl IntoIterator<Item = (SymbolId, String)>,
    ) -> Result<Self> {
        let mut table = Self::new(kind);

        for (id, name) in entries {
            if id < FIRST_SYMBOL_ID {
                eyre::bail!(StorageError::corrupt_index(format!(
                    "{} '{}' has reserved id {}",
                    kind, name, id
                )));
            }
            if table.by_id.contains_key(&id) {
                eyre::bail!(StorageError::corrupt_index(format!(
                    "duplicate {} id {}",
                    kind, id
                )));
            }
            if table.by_name.contains_key(&name) {
                eyre::bail!(StorageError::corrupt_index(format!(
                    "duplicate {} name '{}'",
                    kind, name
                )));
            }

            table.next_id = table.next_id.max(id as u64 + 1);
            table.by_name.insert(name.clone(), id);
            table.by_id.insert(id, name);
        }

        Ok(table)
    }

    /// Caps the id space, so exhaustion can be exercised without four
    /// billion names.
    pub fn with_max_id(mut self, max_id: SymbolId) -> Self {
        self.max_id = max_id as u64;
        self
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn find_or_create(&mut self, name: &str) -> Result<SymbolId> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }

        ensure!(
            name.len() <= MAX_SYMBOL_NAME_LEN,
            "{} name of {} bytes exceeds the {} byte limit",
            self.kind,
            name.len(),
            MAX_SYMBOL_NAME_LEN
        );

        if self.next_id > self.max_id {
            eyre::bail!(StorageError::IdSpaceExhausted(self.kind));
        }

        let id = self.next_id as SymbolId;
        self.next_id += 1;
        self.by_name.insert(name.to_string(), id);
        self.by_id.insert(id, name.to_string());
        self.dirty = true;

        Ok(id)
    }

    pub fn name_for(&self, id: SymbolId) -> Result<&str> {
        match self.by_id.get(&id) {
            Some(name) => Ok(name),
            None => eyre::bail!(StorageError::not_found(format!("{} id {}", self.kind, id))),
        }
    }

    pub fn id_for(&self, name: &str) -> Result<SymbolId> {
        match self.by_name.get(name) {
            Some(&id) => Ok(id),
            None => eyre::bail!(StorageError::not_found(format!(
                "{} '{}'",
                self.kind, name
            ))),
        }
    }

    /// Entries in id order.
    pub fn entries(&self) -> Vec<(SymbolId, &str)> {
        let mut entries: Vec<_> = self
            .by_id
            .iter()
            .map(|(&id, name)| (id, name.as_str()))
            .collect();
        entries.sort_unstable_by_key(|&(id, _)| id);
        entries
    }
}
