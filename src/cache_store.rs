use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
    backends::InMemoryBackend,
};

use crate::{
    error::{Error, Result},
    record::DocumentRecord,
};

/// Cached documents keyed by id, stored as JSON.
const DOCUMENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("documents");
/// Secondary index over `(updatedAt, id)`.
const DOCUMENTS_BY_UPDATED: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("documents_by_updated");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Key under which the index version marker lives in `meta`.
pub const VERSION_KEY: &str = "version";

/// Durable local copy of the remote document set plus the version marker
/// it corresponds to.
pub struct CacheStore {
    db: Database,
}

impl CacheStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Database::create(path)?)
    }

    /// Open a store that lives only as long as this value (for testing and
    /// for sessions without a data directory).
    pub fn open_in_memory() -> Result<Self> {
        let db =
            Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(DOCUMENTS)?;
        txn.open_table(DOCUMENTS_BY_UPDATED)?;
        txn.open_table(META)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Documents --

    pub fn get_all(&self) -> Result<Vec<DocumentRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (_id, bytes) = entry?;
            result.push(serde_json::from_slice(bytes.value())?);
        }
        Ok(result)
    }

    pub fn get(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        match table.get(id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes.value())?)),
            None => Ok(None),
        }
    }

    /// Insert or replace one record.
    pub fn put(&self, record: &DocumentRecord) -> Result<()> {
        self.put_all(std::slice::from_ref(record))
    }

    /// Insert or replace many records in a single transaction.
    pub fn put_all(&self, records: &[DocumentRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut docs = txn.open_table(DOCUMENTS)?;
            let mut by_updated = txn.open_table(DOCUMENTS_BY_UPDATED)?;
            for record in records {
                let bytes = serde_json::to_vec(record)?;
                let previous = docs.insert(record.id.as_str(), bytes.as_slice())?;
                if let Some(previous) = previous {
                    let old: DocumentRecord =
                        serde_json::from_slice(previous.value())?;
                    by_updated.remove((old.updated_at.as_str(), old.id.as_str()))?;
                }
                by_updated
                    .insert((record.updated_at.as_str(), record.id.as_str()), ())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Remove a record. Returns whether it was present; deleting an absent
    /// id is a no-op.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut docs = txn.open_table(DOCUMENTS)?;
            let mut by_updated = txn.open_table(DOCUMENTS_BY_UPDATED)?;
            match docs.remove(id)? {
                Some(previous) => {
                    let old: DocumentRecord =
                        serde_json::from_slice(previous.value())?;
                    by_updated.remove((old.updated_at.as_str(), id))?;
                    true
                }
                None => false,
            }
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Drop every cached document. The version marker is left alone.
    pub fn clear(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            txn.open_table(DOCUMENTS)?.retain(|_, _| false)?;
            txn.open_table(DOCUMENTS_BY_UPDATED)?.retain(|_, _| false)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn count(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        Ok(table.len()?)
    }

    /// Ids of documents whose `updatedAt` sorts at or after `since`, in
    /// `updatedAt` order.
    pub fn list_updated_since(&self, since: &str) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS_BY_UPDATED)?;
        let mut result = Vec::new();
        for entry in table.range((since, "")..)? {
            let (key, _) = entry?;
            let (_updated_at, id) = key.value();
            result.push(id.to_string());
        }
        Ok(result)
    }

    // -- Meta --

    pub fn get_version(&self) -> Result<Option<u64>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(META)?;
        Ok(table.get(VERSION_KEY)?.map(|v| v.value()))
    }

    pub fn set_version(&self, version: u64) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(META)?;
            table.insert(VERSION_KEY, version)?;
        }
        txn.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}

/// A cache store opened on first use.
///
/// The outcome of the first open attempt, success or failure, is kept for
/// the lifetime of the handle. A failed open leaves the engine running
/// without persistence.
pub struct LazyCacheStore {
    path: Option<PathBuf>,
    cell: OnceLock<std::result::Result<CacheStore, String>>,
}

impl LazyCacheStore {
    /// `None` selects an in-memory store.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            cell: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Result<&CacheStore> {
        let opened = self.cell.get_or_init(|| {
            let result = match &self.path {
                Some(path) => CacheStore::open(path),
                None => CacheStore::open_in_memory(),
            };
            result.map_err(|e| {
                tracing::warn!(
                    path = ?self.path,
                    error = %e,
                    "failed to open search cache store"
                );
                e.to_string()
            })
        });
        opened
            .as_ref()
            .map_err(|msg| Error::CacheUnavailable(msg.clone()))
    }
}

impl std::fmt::Debug for LazyCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyCacheStore")
            .field("path", &self.path)
            .field("opened", &self.cell.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, CacheStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::open(&tmp.path().join("cache.redb")).unwrap();
        (tmp, store)
    }

    fn record(id: &str, updated_at: &str) -> DocumentRecord {
        DocumentRecord {
            updated_at: updated_at.to_string(),
            ..DocumentRecord::new(id, format!("title {id}"), "body")
        }
    }

    #[test]
    fn documents_crud() {
        let (_tmp, store) = test_store();

        assert!(store.get_all().unwrap().is_empty());
        assert_eq!(store.get("a").unwrap(), None);

        store.put(&record("a", "2024-01-01")).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(record("a", "2024-01-01")));
        assert_eq!(store.count().unwrap(), 1);

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn put_is_an_upsert() {
        let (_tmp, store) = test_store();

        store.put(&record("a", "2024-01-01")).unwrap();
        let mut updated = record("a", "2024-02-01");
        updated.title = "renamed".to_string();
        store.put(&updated).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get("a").unwrap().unwrap().title, "renamed");
        assert_eq!(store.list_updated_since("").unwrap(), vec!["a"]);
    }

    #[test]
    fn put_all_and_clear() {
        let (_tmp, store) = test_store();

        store
            .put_all(&[record("a", "1"), record("b", "2"), record("c", "3")])
            .unwrap();
        assert_eq!(store.count().unwrap(), 3);
        store.set_version(7).unwrap();

        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.list_updated_since("").unwrap().is_empty());
        assert_eq!(store.get_version().unwrap(), Some(7));
    }

    #[test]
    fn updated_since_follows_timestamps() {
        let (_tmp, store) = test_store();

        store
            .put_all(&[
                record("old", "2024-01-01T00:00:00Z"),
                record("mid", "2024-06-01T00:00:00Z"),
                record("new", "2024-12-01T00:00:00Z"),
            ])
            .unwrap();
        store.delete("mid").unwrap();

        assert_eq!(
            store.list_updated_since("2024-03-01").unwrap(),
            vec!["new"]
        );
        assert_eq!(
            store.list_updated_since("").unwrap(),
            vec!["old", "new"]
        );
    }

    #[test]
    fn version_roundtrip() {
        let (_tmp, store) = test_store();

        assert_eq!(store.get_version().unwrap(), None);
        store.set_version(42).unwrap();
        assert_eq!(store.get_version().unwrap(), Some(42));
        store.set_version(43).unwrap();
        assert_eq!(store.get_version().unwrap(), Some(43));
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.redb");

        {
            let store = CacheStore::open(&path).unwrap();
            store.put(&record("a", "1")).unwrap();
            store.set_version(5).unwrap();
        }

        {
            let store = CacheStore::open(&path).unwrap();
            assert_eq!(store.count().unwrap(), 1);
            assert_eq!(store.get_version().unwrap(), Some(5));
        }
    }

    #[test]
    fn in_memory_store_works() {
        let store = CacheStore::open_in_memory().unwrap();
        store.put(&record("a", "1")).unwrap();
        assert_eq!(store.get_all().unwrap().len(), 1);
    }

    #[test]
    fn lazy_store_opens_once() {
        let tmp = tempfile::tempdir().unwrap();
        let lazy = LazyCacheStore::new(Some(tmp.path().join("cache.redb")));

        lazy.get().unwrap().set_version(1).unwrap();
        assert_eq!(lazy.get().unwrap().get_version().unwrap(), Some(1));
    }

    #[test]
    fn lazy_store_remembers_open_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let lazy = LazyCacheStore::new(Some(blocker.join("cache.redb")));

        let err = lazy.get().unwrap_err();
        assert!(err.is_cache_failure());
        assert!(lazy.get().is_err());
    }
}
