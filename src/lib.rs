//! # emberdb - Embedded Event Storage Engine
//!
//! emberdb stores time-stamped events grouped by numeric object id. Each
//! storage file holds fixed-size blocks of sorted event records, a block
//! info index describing which objects and timestamps each block covers,
//! and two symbol tables mapping action and property names to compact ids.
//!
//! ## Quick Start
//!
//! ```ignore
//! use emberdb::{Database, Event};
//!
//! let db = Database::create("./data")?;
//! let store = db.open_store("users")?;
//!
//! let login = store.find_or_create_action("login")?;
//! let ip = store.find_or_create_property("ip")?;
//! store.insert_event(&Event::new(5, 100, login).with_property(ip, "10.0.0.1"))?;
//!
//! for event in store.fetch_events(5)? {
//!     println!("{:?}", event?);
//! }
//! db.close()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │         Database (root dir)         │
//! ├─────────────────────────────────────┤
//! │   Engine (one per storage file)     │
//! ├──────────────────┬──────────────────┤
//! │ BlockInfoIndex   │  SymbolTables    │
//! ├──────────────────┴──────────────────┤
//! │   BlockStore (slots, split, merge)  │
//! ├─────────────────────────────────────┤
//! │   Memory-mapped file + trailer      │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: Memory-mapped block file, block store, metadata codec
//! - [`index`]: Block descriptors and the block info index
//! - [`schema`]: Action and property symbol tables
//! - [`engine`]: Insert, fetch, compaction and deletion
//! - [`database`]: Root directory holding named stores
//! - [`event`]: Event records and their binary encoding

pub mod config;
pub mod database;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod event;
pub mod index;
pub mod schema;
pub mod storage;
pub mod types;

pub use database::Database;
pub use engine::{CompactionSummary, Engine, EngineBuilder, EngineConfig, EngineStats, Events};
pub use error::StorageError;
pub use event::Event;
pub use index::{BlockChain, BlockInfo, BlockInfoIndex};
pub use types::{
    BlockId, DataType, ObjectId, PropertyKind, PropertyType, SymbolId, TimeRange, Timestamp, Value,
};
