// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Append-only audit log for security-relevant events.
//!
//! Records live in the store under `audit:{seq}` and are appended inside the
//! same write transaction as the mutation they describe, so a record exists
//! iff its mutation committed. `meta:audit_seq` holds the last sequence
//! number; sequence numbers are never reused, even after archiving.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::keys;
use super::store::{KvRead, Store, StoreError, StoreResult, StoreTxn};
use crate::error::ServiceError;

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    // Account events
    AccountCreated,
    AccountDisabled,

    // Auth events
    AuthOk,
    AuthFail,
    AuthLock,

    // Device events
    DeviceAdded,
    DeviceRemoved,
    DeviceLimitReached,

    // Entitlement events
    PurchaseRecorded,
    PurchaseRevoked,
    EntitlementDowngrade,

    // License key events
    KeyIssued,
    KeyActivated,
    KeyRevoked,
}

/// An event about to be appended.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub kind: AuditKind,
    pub account_id: Option<String>,
    pub detail: serde_json::Value,
}

impl AuditEntry {
    pub fn new(kind: AuditKind) -> Self {
        Self {
            kind,
            account_id: None,
            detail: serde_json::Value::Null,
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Structured detail. Never put passwords, tokens or full license codes here.
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// A committed audit record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct AuditRecord {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub account_id: Option<String>,
    pub kind: AuditKind,
    pub detail: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("audit sequence is corrupt")]
    SequenceCorrupt,

    #[error("audit sequence exhausted")]
    SequenceExhausted,

    #[error("archive cutoff {before} is inside the {retention_days}-day retention window")]
    CutoffTooRecent {
        before: DateTime<Utc>,
        retention_days: i64,
    },

    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<AuditError> for ServiceError {
    fn from(err: AuditError) -> Self {
        ServiceError::AuditUnavailable(err.to_string())
    }
}

/// Result of an [`AuditLog::archive`] run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveSummary {
    pub archived: usize,
    pub files: Vec<PathBuf>,
}

/// Stateless access to the audit records in a [`Store`].
pub struct AuditLog;

impl AuditLog {
    /// Append `entry` inside `txn` and return its sequence number.
    ///
    /// Any failure here must abort the caller's transaction; callers
    /// propagate the error with `?`.
    pub fn append(
        txn: &mut StoreTxn<'_>,
        at: DateTime<Utc>,
        entry: AuditEntry,
    ) -> Result<u64, AuditError> {
        let last = match txn.get_raw(keys::AUDIT_SEQ)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| AuditError::SequenceCorrupt)?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        let seq = last.checked_add(1).ok_or(AuditError::SequenceExhausted)?;

        let record = AuditRecord {
            seq,
            at,
            account_id: entry.account_id,
            kind: entry.kind,
            detail: entry.detail,
        };
        txn.put_json(&keys::audit(seq), &record)?;
        txn.put_raw(keys::AUDIT_SEQ, &seq.to_be_bytes())?;
        Ok(seq)
    }

    /// Records with `seq > after`, oldest first, at most `limit`.
    pub fn read(reader: &impl KvRead, after: u64, limit: usize) -> StoreResult<Vec<AuditRecord>> {
        Ok(Self::all(reader)?
            .into_iter()
            .filter(|record| record.seq > after)
            .take(limit)
            .collect())
    }

    /// Every retained record about one account, oldest first.
    pub fn for_account(reader: &impl KvRead, account_id: &str) -> StoreResult<Vec<AuditRecord>> {
        Ok(Self::all(reader)?
            .into_iter()
            .filter(|record| record.account_id.as_deref() == Some(account_id))
            .collect())
    }

    fn all(reader: &impl KvRead) -> StoreResult<Vec<AuditRecord>> {
        Ok(reader
            .scan_json::<AuditRecord>(keys::AUDIT_PREFIX)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// Move records older than `before` into daily `audit-YYYY-MM-DD.jsonl`
    /// files under `dir` and drop them from the store.
    ///
    /// Files are appended to, so repeated runs accumulate. The store delete
    /// only commits after every file write succeeded.
    pub fn archive(
        store: &Store,
        now: DateTime<Utc>,
        retention: Duration,
        before: DateTime<Utc>,
        dir: &Path,
    ) -> Result<ArchiveSummary, AuditError> {
        if before > now - retention {
            return Err(AuditError::CutoffTooRecent {
                before,
                retention_days: retention.num_days(),
            });
        }
        std::fs::create_dir_all(dir)?;

        store.transaction(|txn| -> Result<ArchiveSummary, AuditError> {
            let expired: Vec<AuditRecord> = Self::all(&*txn)?
                .into_iter()
                .filter(|record| record.at < before)
                .collect();

            let mut by_day: BTreeMap<String, Vec<&AuditRecord>> = BTreeMap::new();
            for record in &expired {
                by_day
                    .entry(record.at.format("%Y-%m-%d").to_string())
                    .or_default()
                    .push(record);
            }

            let mut summary = ArchiveSummary::default();
            for (day, records) in by_day {
                let path = dir.join(format!("audit-{day}.jsonl"));
                let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
                let mut content = Vec::new();
                for record in records {
                    serde_json::to_writer(&mut content, record)?;
                    content.push(b'\n');
                }
                file.write_all(&content)?;
                file.sync_all()?;
                summary.files.push(path);
            }

            for record in &expired {
                txn.delete(&keys::audit(record.seq))?;
            }
            summary.archived = expired.len();
            Ok(summary)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn append(store: &Store, at: DateTime<Utc>, entry: AuditEntry) -> u64 {
        store
            .transaction(|txn| AuditLog::append(txn, at, entry))
            .unwrap()
    }

    #[test]
    fn kinds_serialize_in_screaming_case() {
        let value = serde_json::to_value(AuditKind::DeviceLimitReached).unwrap();
        assert_eq!(value, json!("DEVICE_LIMIT_REACHED"));
        let value = serde_json::to_value(AuditKind::AuthOk).unwrap();
        assert_eq!(value, json!("AUTH_OK"));
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let first = append(&store, now, AuditEntry::new(AuditKind::KeyIssued));
        let second = append(
            &store,
            now,
            AuditEntry::new(AuditKind::AccountCreated).with_account("a1"),
        );
        assert_eq!((first, second), (1, 2));

        let records = AuditLog::read(&store.snapshot().unwrap(), 0, 10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind, AuditKind::AccountCreated);

        let tail = AuditLog::read(&store.snapshot().unwrap(), 1, 10).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].seq, 2);
    }

    #[test]
    fn append_is_discarded_with_its_transaction() {
        let store = Store::open_in_memory().unwrap();
        let result = store.transaction(|txn| -> Result<(), AuditError> {
            AuditLog::append(txn, Utc::now(), AuditEntry::new(AuditKind::AuthOk))?;
            Err(AuditError::SequenceCorrupt)
        });
        assert!(result.is_err());
        assert!(AuditLog::read(&store.snapshot().unwrap(), 0, 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn corrupt_sequence_fails_append() {
        let store = Store::open_in_memory().unwrap();
        store.put(keys::AUDIT_SEQ, b"garbage").unwrap();
        let result = store.transaction(|txn| {
            AuditLog::append(txn, Utc::now(), AuditEntry::new(AuditKind::AuthOk))
        });
        assert!(matches!(result, Err(AuditError::SequenceCorrupt)));

        let service_err: ServiceError = AuditError::SequenceCorrupt.into();
        assert!(matches!(service_err, ServiceError::AuditUnavailable(_)));
    }

    #[test]
    fn for_account_filters_records() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        append(&store, now, AuditEntry::new(AuditKind::AuthFail).with_account("a1"));
        append(&store, now, AuditEntry::new(AuditKind::AuthFail).with_account("a2"));
        append(
            &store,
            now,
            AuditEntry::new(AuditKind::AuthLock)
                .with_account("a1")
                .with_detail(json!({ "failures": 5 })),
        );

        let records = AuditLog::for_account(&store.snapshot().unwrap(), "a1").unwrap();
        let kinds: Vec<AuditKind> = records.iter().map(|record| record.kind).collect();
        assert_eq!(kinds, vec![AuditKind::AuthFail, AuditKind::AuthLock]);
        assert_eq!(records[1].detail["failures"], 5);
    }

    #[test]
    fn archive_moves_old_records_to_daily_files() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let old = now - Duration::days(200);

        append(&store, old, AuditEntry::new(AuditKind::KeyIssued));
        append(&store, old, AuditEntry::new(AuditKind::KeyRevoked));
        append(&store, now, AuditEntry::new(AuditKind::AuthOk));

        let summary =
            AuditLog::archive(&store, now, Duration::days(90), now - Duration::days(100), dir.path())
                .unwrap();
        assert_eq!(summary.archived, 2);
        assert_eq!(summary.files.len(), 1);

        let content = std::fs::read_to_string(&summary.files[0]).unwrap();
        assert_eq!(content.lines().count(), 2);

        let remaining = AuditLog::read(&store.snapshot().unwrap(), 0, 10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].seq, 3);

        // Sequence keeps counting after archiving.
        assert_eq!(append(&store, now, AuditEntry::new(AuditKind::AuthOk)), 4);
    }

    #[test]
    fn archive_refuses_cutoff_inside_retention() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let result = AuditLog::archive(
            &store,
            now,
            Duration::days(90),
            now - Duration::days(10),
            dir.path(),
        );
        assert!(matches!(result, Err(AuditError::CutoffTooRecent { .. })));
    }
}
