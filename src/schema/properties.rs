//! # Property Table
//!
//! Properties share the symbol machinery of actions and add an optional
//! declaration: the property's kind (object or action) and the data type
//! its values must have. A property created by name alone stays untyped
//! and accepts any value.
//!
//! ```text
//! define("ip", Action, String)    -> 1    typed
//! find_or_create("note")          -> 2    untyped
//! define("note", Object, String)  -> 2    declaration attached once
//! define("ip", Object, String)    -> TypeMismatch
//! ```
//!
//! Declarations never change once made. Inserted events are checked
//! against them before any block is touched.

use eyre::Result;
use hashbrown::HashMap;

use super::{SymbolTable, PROPERTIES};
use crate::error::StorageError;
use crate::event::Event;
use crate::types::{DataType, PropertyKind, PropertyType, SymbolId};

#[derive(Debug, Clone)]
pub struct PropertyTable {
    symbols: SymbolTable,
    types: HashMap<SymbolId, PropertyType>,
    dirty: bool,
}

impl Default for PropertyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyTable {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(PROPERTIES),
            types: HashMap::new(),
            dirty: false,
        }
    }

    pub fn from_entries(
        entries: impl IntoIterator<Item = (SymbolId, String, Option<PropertyType>)>,
    ) -> Result<Self> {
        let mut types = HashMap::new();
        let names: Vec<(SymbolId, String)> = entries
            .into_iter()
            .map(|(id, name, property_type)| {
                if let Some(property_type) = property_type {
                    types.insert(id, property_type);
                }
                (id, name)
            })
            .collect();

        Ok(Self {
            symbols: SymbolTable::from_entries(PROPERTIES, names)?,
            types,
            dirty: false,
        })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty || self.symbols.is_dirty()
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
        self.symbols.mark_clean();
    }

    pub fn find_or_create(&mut self, name: &str) -> Result<SymbolId> {
        self.symbols.find_or_create(name)
    }

    /// Returns the id of `name`, creating it if needed, with the given
    /// declaration. An existing declaration must match exactly.
    pub fn define(&mut self, name: &str, kind: PropertyKind, data_type: DataType) -> Result<SymbolId> {
        let wanted = PropertyType::new(kind, data_type);
        if let Ok(id) = self.symbols.id_for(name) {
            match self.types.get(&id) {
                Some(existing) if *existing == wanted => return Ok(id),
                Some(existing) => eyre::bail!(StorageError::TypeMismatch(format!(
                    "property '{}' is declared {:?} {:?}, not {:?} {:?}",
                    name, existing.kind, existing.data_type, kind, data_type
                ))),
                None => {
                    self.types.insert(id, wanted);
                    self.dirty = true;
                    return Ok(id);
                }
            }
        }

        let id = self.symbols.find_or_create(name)?;
        self.types.insert(id, wanted);
        self.dirty = true;
        Ok(id)
    }

    pub fn name_for(&self, id: SymbolId) -> Result<&str> {
        self.symbols.name_for(id)
    }

    pub fn id_for(&self, name: &str) -> Result<SymbolId> {
        self.symbols.id_for(name)
    }

    /// Declaration of a known property; `None` when it is untyped.
    pub fn property_type(&self, id: SymbolId) -> Result<Option<PropertyType>> {
        self.symbols.name_for(id)?;
        Ok(self.types.get(&id).copied())
    }

    /// Rejects an event whose values contradict a declared data type.
    /// Untyped and unknown property ids pass.
    pub fn check(&self, event: &Event) -> Result<()> {
        for (id, value) in &event.properties {
            if let Some(declared) = self.types.get(id) {
                if value.data_type() != declared.data_type {
                    eyre::bail!(StorageError::TypeMismatch(format!(
                        "property {} expects {:?}, event for object {} carries {:?}",
                        id,
                        declared.data_type,
                        event.object_id,
                        value.data_type()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Entries in id order.
    pub fn entries(&self) -> Vec<(SymbolId, &str, Option<PropertyType>)> {
        self.symbols
            .entries()
            .into_iter()
            .map(|(id, name)| (id, name, self.types.get(&id).copied()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(err: &eyre::Report) -> Option<&StorageError> {
        StorageError::of(err)
    }

    #[test]
    fn define_assigns_ids_and_declarations() {
        let mut table = PropertyTable::new();

        let ip = table.define("ip", PropertyKind::Action, DataType::String).unwrap();
        let age = table.define("age", PropertyKind::Object, DataType::Integer).unwrap();

        assert_eq!((ip, age), (1, 2));
        assert_eq!(
            table.property_type(ip).unwrap(),
            Some(PropertyType::new(PropertyKind::Action, DataType::String))
        );
        assert_eq!(table.define("ip", PropertyKind::Action, DataType::String).unwrap(), ip);
        assert!(table.is_dirty());
    }

    #[test]
    fn conflicting_declaration_is_type_mismatch() {
        let mut table = PropertyTable::new();
        table.define("ip", PropertyKind::Action, DataType::String).unwrap();

        let err = table.define("ip", PropertyKind::Object, DataType::String).unwrap_err();
        assert!(matches!(kind(&err), Some(StorageError::TypeMismatch(_))));

        let err = table.define("ip", PropertyKind::Action, DataType::Float).unwrap_err();
        assert!(matches!(kind(&err), Some(StorageError::TypeMismatch(_))));
    }

    #[test]
    fn untyped_property_takes_a_later_declaration() {
        let mut table = PropertyTable::new();
        let note = table.find_or_create("note").unwrap();
        assert_eq!(table.property_type(note).unwrap(), None);
        table.mark_clean();

        let declared = table.define("note", PropertyKind::Object, DataType::String).unwrap();

        assert_eq!(declared, note);
        assert!(table.is_dirty(), "a new declaration SHOULD be persisted");
        assert_eq!(table.entries()[0].2.map(|t| t.kind), Some(PropertyKind::Object));
    }

    #[test]
    fn check_enforces_declared_data_types() {
        let mut table = PropertyTable::new();
        let age = table.define("age", PropertyKind::Object, DataType::Integer).unwrap();
        let note = table.find_or_create("note").unwrap();

        table
            .check(&Event::new(1, 1, 1).with_property(age, 30i64).with_property(note, true))
            .unwrap();
        table.check(&Event::new(1, 1, 1).with_property(77, "unknown id")).unwrap();

        let err = table
            .check(&Event::new(1, 1, 1).with_property(age, "thirty"))
            .unwrap_err();
        assert!(matches!(kind(&err), Some(StorageError::TypeMismatch(_))));
    }

    #[test]
    fn from_entries_restores_declarations() {
        let entries = vec![
            (1, "ip".to_string(), Some(PropertyType::new(PropertyKind::Action, DataType::String))),
            (2, "note".to_string(), None),
        ];

        let table = PropertyTable::from_entries(entries).unwrap();

        assert!(!table.is_dirty());
        assert_eq!(table.property_type(2).unwrap(), None);
        assert_eq!(table.property_type(1).unwrap().map(|t| t.data_type), Some(DataType::String));
        let err = table.property_type(3).unwrap_err();
        assert!(matches!(kind(&err), Some(StorageError::NotFound(_))));
    }
}
