//! # Schema Tables
//!
//! Name to id mappings used by event payloads. Each open storage file has
//! two independent namespaces:
//!
//! ```text
//! Engine
//! ├── actions      "login" -> 1, "logout" -> 2, ...
//! └── properties   "ip" -> 1, "device" -> 2, ...
//! ```
//!
//! Ids are assigned densely from 1 on first use and never change. Names are
//! case-sensitive. Tables are persisted in the symbol segment of the
//! metadata trailer whenever the engine flushes.
//!
//! Properties may additionally be declared with a [`PropertyKind`] and a
//! [`DataType`](crate::types::DataType); see [`PropertyTable`].
//!
//! [`PropertyKind`]: crate::types::PropertyKind

mod properties;
mod symbols;

pub use properties::PropertyTable;
pub use symbols::SymbolTable;

pub const ACTIONS: &str = "action";
pub const PROPERTIES: &str = "property";
