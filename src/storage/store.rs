// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transactional key-value store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! A single table, `entries`, maps namespaced string keys (see
//! [`super::keys`]) to JSON-encoded values. Namespacing keeps related
//! records adjacent so prefix scans are plain range reads.
//!
//! The store is the only component that performs I/O. redb flushes every
//! commit to disk before `commit()` returns, so an acknowledged write
//! survives a process restart.

use std::path::Path;

use redb::{
    backends::InMemoryBackend, Database, ReadOnlyTable, ReadTransaction, ReadableDatabase,
    ReadableTable, Table, TableDefinition,
};
use serde::{de::DeserializeOwned, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

/// Every record: namespaced key → serialized value.
const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt value under {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Read access shared by snapshots and write transactions
// =============================================================================

/// Read operations available both inside a write transaction and on a
/// read-only snapshot.
pub trait KvRead {
    fn get_raw(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix_raw(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>>;

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.get_raw(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_json<T: DeserializeOwned>(&self, prefix: &str) -> StoreResult<Vec<(String, T)>> {
        self.scan_prefix_raw(prefix)?
            .into_iter()
            .map(|(key, bytes)| Ok((key, serde_json::from_slice(&bytes)?)))
            .collect()
    }

    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get_raw(key)?.is_some())
    }
}

fn table_get<T>(table: &T, key: &str) -> StoreResult<Option<Vec<u8>>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    Ok(table.get(key)?.map(|value| value.value().to_vec()))
}

fn table_scan<T>(table: &T, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut entries = Vec::new();
    for entry in table.range(prefix..)? {
        let (key, value) = entry?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        entries.push((key.to_string(), value.value().to_vec()));
    }
    Ok(entries)
}

// =============================================================================
// Store
// =============================================================================

/// Durable transactional key-value store.
pub struct Store {
    db: Database,
}

impl Store {
    /// Open (or create) the store file at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// A store that lives only as long as the process.
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StoreResult<Self> {
        // Pre-create the table so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ENTRIES)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    pub fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.snapshot()?.get_raw(key)
    }

    pub fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.transaction(|txn| txn.put_raw(key, value))
    }

    /// Returns whether the key existed.
    pub fn delete(&self, key: &str) -> StoreResult<bool> {
        self.transaction(|txn| txn.delete(key))
    }

    /// A consistent read-only view as of now.
    pub fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;
        Ok(StoreSnapshot { table, _txn: txn })
    }

    /// Run `f` inside a write transaction.
    ///
    /// `f` sees every earlier commit. Its writes are committed atomically
    /// when it returns `Ok`, and discarded when it returns `Err`. Write
    /// transactions are serialized by redb.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut StoreTxn<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let write_txn = self.db.begin_write().map_err(StoreError::from)?;
        let outcome = {
            let table = write_txn.open_table(ENTRIES).map_err(StoreError::from)?;
            let mut txn = StoreTxn { table };
            f(&mut txn)
        };

        match outcome {
            Ok(value) => {
                write_txn.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = write_txn.abort() {
                    tracing::warn!(error = %abort_err, "Failed to abort store transaction");
                }
                Err(err)
            }
        }
    }

    /// Probe that the store accepts reads.
    pub fn health_check(&self) -> StoreResult<()> {
        self.snapshot().map(|_| ())
    }
}

/// Read-only snapshot.
pub struct StoreSnapshot {
    table: ReadOnlyTable<&'static str, &'static [u8]>,
    _txn: ReadTransaction,
}

impl KvRead for StoreSnapshot {
    fn get_raw(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        table_get(&self.table, key)
    }

    fn scan_prefix_raw(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        table_scan(&self.table, prefix)
    }
}

/// Handle passed to [`Store::transaction`] closures.
pub struct StoreTxn<'t> {
    table: Table<'t, &'static str, &'static [u8]>,
}

impl StoreTxn<'_> {
    pub fn put_raw(&mut self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.table.insert(key, value)?;
        Ok(())
    }

    pub fn put_json<T: Serialize>(&mut self, key: &str, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put_raw(key, &bytes)
    }

    /// Returns whether the key existed.
    pub fn delete(&mut self, key: &str) -> StoreResult<bool> {
        let existed = self.table.remove(key)?.is_some();
        Ok(existed)
    }
}

impl KvRead for StoreTxn<'_> {
    fn get_raw(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        table_get(&self.table, key)
    }

    fn scan_prefix_raw(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        table_scan(&self.table, prefix)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.redb")).unwrap();
        (store, dir)
    }

    #[test]
    fn put_get_delete() {
        let (store, _dir) = temp_store();
        assert_eq!(store.get("account:a").unwrap(), None);

        store.put("account:a", b"one").unwrap();
        assert_eq!(store.get("account:a").unwrap(), Some(b"one".to_vec()));

        assert!(store.delete("account:a").unwrap());
        assert!(!store.delete("account:a").unwrap());
        assert_eq!(store.get("account:a").unwrap(), None);
    }

    #[test]
    fn transaction_commits_all_writes_together() {
        let (store, _dir) = temp_store();
        store
            .transaction(|txn| -> StoreResult<()> {
                txn.put_raw("account:1", b"a")?;
                txn.put_raw("account_by_email:a@x.com", b"1")?;
                Ok(())
            })
            .unwrap();

        assert!(store.get("account:1").unwrap().is_some());
        assert!(store.get("account_by_email:a@x.com").unwrap().is_some());
    }

    #[test]
    fn failed_transaction_discards_writes() {
        let (store, _dir) = temp_store();
        let result = store.transaction(|txn| -> StoreResult<()> {
            txn.put_raw("account:1", b"a")?;
            Err(StoreError::Corrupt("forced".into()))
        });

        assert!(result.is_err());
        assert_eq!(store.get("account:1").unwrap(), None);
    }

    #[test]
    fn transaction_reads_its_own_writes() {
        let (store, _dir) = temp_store();
        let seen = store
            .transaction(|txn| -> StoreResult<Option<Vec<u8>>> {
                txn.put_raw("key:X", b"issued")?;
                txn.get_raw("key:X")
            })
            .unwrap();
        assert_eq!(seen, Some(b"issued".to_vec()));
    }

    #[test]
    fn prefix_scan_stays_within_prefix() {
        let (store, _dir) = temp_store();
        store.put("device:acct1:d2", b"2").unwrap();
        store.put("device:acct1:d1", b"1").unwrap();
        store.put("device:acct10:d9", b"9").unwrap();
        store.put("devices", b"x").unwrap();

        let snapshot = store.snapshot().unwrap();
        let keys: Vec<String> = snapshot
            .scan_prefix_raw("device:acct1:")
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec!["device:acct1:d1", "device:acct1:d2"]);
    }

    #[test]
    fn snapshot_is_isolated_from_later_commits() {
        let (store, _dir) = temp_store();
        store.put("account:1", b"before").unwrap();

        let snapshot = store.snapshot().unwrap();
        store.put("account:1", b"after").unwrap();

        assert_eq!(snapshot.get_raw("account:1").unwrap(), Some(b"before".to_vec()));
        assert_eq!(store.get("account:1").unwrap(), Some(b"after".to_vec()));
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.redb");
        {
            let store = Store::open(&path).unwrap();
            store.put("account:persisted", b"yes").unwrap();
        }
        let reopened = Store::open(&path).unwrap();
        assert_eq!(
            reopened.get("account:persisted").unwrap(),
            Some(b"yes".to_vec())
        );
    }

    #[test]
    fn json_helpers_round_trip_values() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|txn| txn.put_json("meta:test", &vec![1u32, 2, 3]))
            .unwrap();
        let snapshot = store.snapshot().unwrap();
        let value: Option<Vec<u32>> = snapshot.get_json("meta:test").unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
        assert!(snapshot.contains("meta:test").unwrap());
    }
}
