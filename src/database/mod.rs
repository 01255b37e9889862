//! # Database
//!
//! A `Database` is a handle bound to a root directory. It owns the object
//! storage engines opened under that root, one storage file per store:
//!
//! ```text
//! root/
//! ├── users.edb       # store "users"
//! └── sessions.edb    # store "sessions"
//! ```
//!
//! Engines are shared: opening the same store twice returns the same
//! `Arc<Engine>`. Engine errors are passed through unchanged.
//!
//! ## Lifecycle
//!
//! ```ignore
//! let db = Database::create("/var/lib/ember")?;
//! let users = db.open_store("users")?;
//! users.insert_event(&event)?;
//! db.close()?;
//! ```
//!
//! `close()` flushes and closes every owned engine. Dropping the database
//! does the same on a best-effort basis.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::STORE_FILE_EXTENSION;
use crate::engine::{Engine, EngineBuilder};
use crate::error::StorageError;

#[derive(Debug)]
pub struct Database {
    path: PathBuf,
    stores: RwLock<HashMap<String, Arc<Engine>>>,
}

impl Database {
    /// Binds a database to `root`, creating the directory if needed.
    pub fn create<P: AsRef<Path>>(root: P) -> Result<Self> {
        let path = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)
            .wrap_err_with(|| format!("failed to create database directory '{}'", path.display()))?;

        Ok(Self {
            path,
            stores: RwLock::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(|c: char| c == '/' || c == '\\' || c == '\0');
        if !valid {
            eyre::bail!(StorageError::InvalidConfig(format!(
                "invalid store name '{}'",
                name
            )));
        }
        Ok(self.path.join(format!("{}.{}", name, STORE_FILE_EXTENSION)))
    }

    /// Opens the named store, creating its storage file on first use.
    pub fn open_store(&self, name: &str) -> Result<Arc<Engine>> {
        self.store_with(name, EngineBuilder::new(), false)
    }

    /// Like [`Database::open_store`] but with explicit engine settings,
    /// which apply if the store has to be created.
    pub fn open_store_with(&self, name: &str, builder: EngineBuilder) -> Result<Arc<Engine>> {
        self.store_with(name, builder, false)
    }

    /// Creates the named store, replacing any existing storage file.
    pub fn create_store(&self, name: &str) -> Result<Arc<Engine>> {
        self.store_with(name, EngineBuilder::new(), true)
    }

    pub fn get_store(&self, name: &str) -> Option<Arc<Engine>> {
        self.stores.read().get(name).cloned()
    }

    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.stores.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn close_store(&self, name: &str) -> Result<()> {
        let engine = match self.stores.write().remove(name) {
            Some(engine) => engine,
            None => eyre::bail!(StorageError::not_found(format!("store '{}'", name))),
        };
        engine.close()
    }

    /// Closes every open store. The first failure is returned after all
    /// stores have been attempted.
    pub fn close(&self) -> Result<()> {
        let stores: Vec<_> = self.stores.write().drain().collect();
        let mut first_error = None;

        for (name, engine) in stores {
            if !engine.is_open() {
                continue;
            }
            if let Err(e) = engine.close() {
                warn!(store = %name, error = %e, "failed to close store");
                first_error.get_or_insert(e);
            }
        }

        info!(path = %self.path.display(), "closed database");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn store_with(&self, name: &str, builder: EngineBuilder, replace: bool) -> Result<Arc<Engine>> {
        let path = self.store_path(name)?;
        let mut stores = self.stores.write();

        if let Some(engine) = stores.get(name).cloned() {
            if !replace && engine.is_open() {
                return Ok(engine);
            }
            stores.remove(name);
            if engine.is_open() {
                engine.close()?;
            }
        }

        let engine = if replace {
            builder.create(&path)?
        } else {
            builder.open_or_create(&path)?
        };
        let engine = Arc::new(engine);
        stores.insert(name.to_string(), Arc::clone(&engine));
        Ok(engine)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        for (name, engine) in self.stores.get_mut().drain() {
            if engine.is_open() {
                if let Err(e) = engine.close() {
                    warn!(store = %name, error = %e, "failed to close store on drop");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_binds_root_path() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("data");

        let db = Database::create(&root).unwrap();

        assert_eq!(db.path(), root.as_path());
        assert!(root.is_dir());
        assert!(db.store_names().is_empty());
    }

    #[test]
    fn open_store_is_shared() {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path()).unwrap();

        let a = db.open_store("users").unwrap();
        let b = db.open_store("users").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.path(), dir.path().join("users.edb"));
        assert_eq!(db.store_names(), vec!["users".to_string()]);
    }

    #[test]
    fn rejects_path_like_names() {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path()).unwrap();

        for name in ["", "../escape", "a/b", ".hidden"] {
            let err = db.open_store(name).unwrap_err();
            assert!(matches!(
                StorageError::of(&err),
                Some(StorageError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn close_closes_every_engine() {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path()).unwrap();
        let users = db.open_store("users").unwrap();
        let sessions = db.open_store("sessions").unwrap();

        db.close().unwrap();

        assert!(!users.is_open());
        assert!(!sessions.is_open());
        assert!(db.store_names().is_empty());
    }

    #[test]
    fn close_store_of_unknown_name_is_not_found() {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path()).unwrap();

        let err = db.close_store("nope").unwrap_err();
        assert!(matches!(StorageError::of(&err), Some(StorageError::NotFound(_))));
    }
}
