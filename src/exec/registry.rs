use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::backend::{Backend, BackendError, TableEngine, TableId, SGI_COLUMNS};
use crate::error::{Error, Result};

/// Object and link subgraph-item tables of one composite vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubgraphTables {
    /// Object rows.
    pub objects: TableId,
    /// Link rows.
    pub links: TableId,
}

/// Intermediate tables keyed by the catenated name of the composite vertex
/// they hold.
///
/// Every table handed to the registry is owned by it: overwriting or
/// clearing an entry releases its tables, and so does dropping the registry.
pub struct TempTableRegistry<'e> {
    backend: &'e dyn Backend,
    entries: BTreeMap<String, SubgraphTables>,
}

impl<'e> TempTableRegistry<'e> {
    /// Empty registry over `backend`.
    pub fn new(backend: &'e dyn Backend) -> Self {
        Self {
            backend,
            entries: BTreeMap::new(),
        }
    }

    /// Backend the tables live in.
    pub fn backend(&self) -> &'e dyn Backend {
        self.backend
    }

    /// Stores a new entry; `links` of `None` stores an empty link table.
    /// Fails when `name` is already present.
    pub fn put(&mut self, name: &str, objects: TableId, links: Option<TableId>) -> Result<()> {
        if self.entries.contains_key(name) {
            return Err(Error::invalid_state(format!(
                "temp tables for '{name}' already exist"
            )));
        }
        let links = match links {
            Some(links) => links,
            None => self.backend.create_table(&SGI_COLUMNS)?,
        };
        debug!(name, %objects, %links, "registry.put");
        self.entries.insert(name.to_owned(), SubgraphTables { objects, links });
        Ok(())
    }

    /// Stores `tables` under `name`, releasing whatever was there before.
    pub fn replace(&mut self, name: &str, tables: SubgraphTables) -> Result<()> {
        if let Some(old) = self.entries.insert(name.to_owned(), tables) {
            if old != tables {
                release_pair(self.backend, old)?;
            }
        }
        debug!(name, objects = %tables.objects, links = %tables.links, "registry.replace");
        Ok(())
    }

    /// Tables stored under `name`.
    pub fn get(&self, name: &str) -> Option<SubgraphTables> {
        self.entries.get(name).copied()
    }

    /// Tables stored under `name`, failing when absent.
    pub fn require(&self, name: &str) -> Result<SubgraphTables> {
        self.get(name)
            .ok_or_else(|| Error::invalid_state(format!("no temp tables for '{name}'")))
    }

    /// Removes an entry without releasing it; the caller now owns the tables.
    pub fn take(&mut self, name: &str) -> Result<SubgraphTables> {
        self.entries
            .remove(name)
            .ok_or_else(|| Error::invalid_state(format!("no temp tables for '{name}'")))
    }

    /// Removes an entry and releases its tables.
    pub fn release(&mut self, name: &str) -> Result<()> {
        let tables = self.take(name)?;
        debug!(name, "registry.release");
        release_pair(self.backend, tables)?;
        Ok(())
    }

    /// Releases every entry.
    pub fn clear(&mut self) -> Result<()> {
        let mut first_err = None;
        for (name, tables) in std::mem::take(&mut self.entries) {
            if let Err(err) = release_pair(self.backend, tables) {
                warn!(name = %name, error = %err, "registry.release_failed");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Whether `name` has an entry.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

impl Drop for TempTableRegistry<'_> {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            let _ = self.clear();
        }
    }
}

fn release_pair(backend: &dyn Backend, tables: SubgraphTables) -> std::result::Result<(), BackendError> {
    let objects = backend.release(tables.objects);
    let links = backend.release(tables.links);
    objects.and(links)
}

/// Tables a step creates along the way; released when the guard drops.
pub struct ScratchTables<'e> {
    backend: &'e dyn Backend,
    tables: Vec<TableId>,
}

impl<'e> ScratchTables<'e> {
    /// Empty guard.
    pub fn new(backend: &'e dyn Backend) -> Self {
        Self {
            backend,
            tables: Vec::new(),
        }
    }

    /// Registers `table` for release and hands it back.
    pub fn track(&mut self, table: TableId) -> TableId {
        self.tables.push(table);
        table
    }

    /// Registers both tables of an entry taken out of the registry.
    pub fn track_pair(&mut self, tables: SubgraphTables) -> SubgraphTables {
        self.tables.push(tables.objects);
        self.tables.push(tables.links);
        tables
    }

    /// Stops tracking `table`; the caller owns it again.
    pub fn keep(&mut self, table: TableId) -> TableId {
        self.tables.retain(|t| *t != table);
        table
    }

    /// Number of tables awaiting release.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether nothing awaits release.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl Drop for ScratchTables<'_> {
    fn drop(&mut self) {
        for table in self.tables.drain(..) {
            if let Err(err) = self.backend.release(table) {
                warn!(%table, error = %err, "scratch.release_failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[test]
    fn put_rejects_duplicates_and_fills_links() {
        let backend = MemoryBackend::new();
        let mut registry = TempTableRegistry::new(&backend);
        let objects = backend.create_table(&SGI_COLUMNS).unwrap();
        registry.put("A", objects, None).unwrap();
        assert_eq!(backend.live_tables(), 2);

        let other = backend.create_table(&SGI_COLUMNS).unwrap();
        let err = registry.put("A", other, None).unwrap_err();
        assert_eq!(err.code(), "invalid_state");
        backend.release(other).unwrap();
        assert_eq!(registry.names(), vec!["A".to_owned()]);
    }

    #[test]
    fn replace_releases_previous_tables() {
        let backend = MemoryBackend::new();
        let mut registry = TempTableRegistry::new(&backend);
        let objects = backend.create_table(&SGI_COLUMNS).unwrap();
        registry.put("A", objects, None).unwrap();
        let fresh = SubgraphTables {
            objects: backend.create_table(&SGI_COLUMNS).unwrap(),
            links: backend.create_table(&SGI_COLUMNS).unwrap(),
        };
        registry.replace("A", fresh).unwrap();
        assert_eq!(backend.live_tables(), 2);
        assert_eq!(registry.require("A").unwrap(), fresh);
    }

    #[test]
    fn drop_releases_everything() {
        let backend = MemoryBackend::new();
        {
            let mut registry = TempTableRegistry::new(&backend);
            for name in ["A", "B"] {
                let objects = backend.create_table(&SGI_COLUMNS).unwrap();
                registry.put(name, objects, None).unwrap();
            }
            let mut scratch = ScratchTables::new(&backend);
            scratch.track(backend.create_table(&["x"]).unwrap());
            assert_eq!(backend.live_tables(), 5);
        }
        assert_eq!(backend.live_tables(), 0);
    }

    #[test]
    fn take_transfers_ownership() {
        let backend = MemoryBackend::new();
        let mut registry = TempTableRegistry::new(&backend);
        let objects = backend.create_table(&SGI_COLUMNS).unwrap();
        registry.put("A", objects, None).unwrap();
        let tables = registry.take("A").unwrap();
        drop(registry);
        assert_eq!(backend.live_tables(), 2);
        backend.release(tables.objects).unwrap();
        backend.release(tables.links).unwrap();
        assert!(TempTableRegistry::new(&backend).require("A").is_err());
    }
}
