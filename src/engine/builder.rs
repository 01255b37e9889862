//! # Engine Builder
//!
//! `EngineBuilder` configures and opens an object storage engine. Settings
//! are chained before calling one of the terminal methods.
//!
//! ## Configuration Options
//!
//! | Option            | Default | Description                                  |
//! |-------------------|---------|----------------------------------------------|
//! | block_size        | 64KB    | Slot size for a new file (power of two)      |
//! | underfull_percent | 50      | Fill level below which compaction merges     |
//!
//! `block_size` only applies when a file is created. Opening an existing
//! file always uses the block size recorded in its header.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = Engine::builder()
//!     .block_size(4096)
//!     .underfull_percent(40)
//!     .open_or_create("./events.edb")?;
//! ```

use std::path::Path;

use eyre::Result;

use super::Engine;
use crate::config::{DEFAULT_BLOCK_SIZE, DEFAULT_UNDERFULL_PERCENT, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
use crate::error::StorageError;

/// Validated engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub block_size: u32,
    pub underfull_percent: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            underfull_percent: DEFAULT_UNDERFULL_PERCENT,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let size = self.block_size;
        if !size.is_power_of_two() || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&size) {
            eyre::bail!(StorageError::InvalidConfig(format!(
                "block size {} must be a power of two between {} and {}",
                size, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE
            )));
        }

        if !(1..=100).contains(&self.underfull_percent) {
            eyre::bail!(StorageError::InvalidConfig(format!(
                "underfull threshold {}% must be between 1 and 100",
                self.underfull_percent
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct EngineBuilder {
    block_size: Option<u32>,
    underfull_percent: Option<u8>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the slot size used when a new storage file is created.
    pub fn block_size(mut self, bytes: u32) -> Self {
        self.block_size = Some(bytes);
        self
    }

    /// Sets the fill percentage below which `compact()` treats a block as
    /// a merge candidate.
    pub fn underfull_percent(mut self, percent: u8) -> Self {
        self.underfull_percent = Some(percent);
        self
    }

    pub fn config(&self) -> Result<EngineConfig> {
        let defaults = EngineConfig::default();
        let config = EngineConfig {
            block_size: self.block_size.unwrap_or(defaults.block_size),
            underfull_percent: self.underfull_percent.unwrap_or(defaults.underfull_percent),
        };
        config.validate()?;
        Ok(config)
    }

    /// Creates a new storage file, replacing any file at `path`.
    pub fn create<P: AsRef<Path>>(self, path: P) -> Result<Engine> {
        Engine::create_with(path.as_ref(), self.config()?)
    }

    /// Opens an existing storage file.
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<Engine> {
        Engine::open_with(path.as_ref(), self.config()?)
    }

    pub fn open_or_create<P: AsRef<Path>>(self, path: P) -> Result<Engine> {
        let path = path.as_ref();
        if path.exists() {
            self.open(path)
        } else {
            self.create(path)
        }
    }
}
