// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! License key records and the per-account activation index.
//!
//! Codes are stored in canonical form (no dashes). They are not hashed at
//! rest because the admin resend path needs the full code back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::keys;
use super::super::store::{KvRead, StoreResult, StoreTxn};

/// Lifecycle state of a license key.
///
/// Allowed edges: ISSUED→ACTIVATED, ISSUED→REVOKED, ACTIVATED→REVOKED.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyState {
    Issued,
    Activated,
    Revoked,
}

impl KeyState {
    pub fn can_transition_to(self, next: KeyState) -> bool {
        matches!(
            (self, next),
            (KeyState::Issued, KeyState::Activated)
                | (KeyState::Issued, KeyState::Revoked)
                | (KeyState::Activated, KeyState::Revoked)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LicenseKeyRecord {
    /// Canonical code (body + checksum, no separators).
    pub code: String,
    pub state: KeyState,
    pub batch_tag: String,
    pub issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    /// Set at activation; kept after revocation as history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoke_reason: Option<String>,
}

impl LicenseKeyRecord {
    pub fn issued(code: String, batch_tag: String, now: DateTime<Utc>) -> Self {
        Self {
            code,
            state: KeyState::Issued,
            batch_tag,
            issued_at: now,
            activated_at: None,
            revoked_at: None,
            bound_account_id: None,
            revoke_reason: None,
        }
    }

    /// Whether this key currently grants PAID to `account_id`.
    pub fn grants(&self, account_id: &str) -> bool {
        self.state == KeyState::Activated && self.bound_account_id.as_deref() == Some(account_id)
    }
}

pub struct LicenseKeyRepository;

impl LicenseKeyRepository {
    pub fn get(reader: &impl KvRead, code: &str) -> StoreResult<Option<LicenseKeyRecord>> {
        reader.get_json(&keys::license_key(code))
    }

    pub fn put(txn: &mut StoreTxn<'_>, key: &LicenseKeyRecord) -> StoreResult<()> {
        txn.put_json(&keys::license_key(&key.code), key)
    }

    pub fn bind(txn: &mut StoreTxn<'_>, account_id: &str, code: &str) -> StoreResult<()> {
        txn.put_raw(&keys::account_key(account_id, code), &[])
    }

    pub fn unbind(txn: &mut StoreTxn<'_>, account_id: &str, code: &str) -> StoreResult<bool> {
        txn.delete(&keys::account_key(account_id, code))
    }

    /// Keys that currently grant PAID to the account.
    ///
    /// The index is cross-checked against each key record, so a stale
    /// index entry never grants anything.
    pub fn active_for(reader: &impl KvRead, account_id: &str) -> StoreResult<Vec<LicenseKeyRecord>> {
        let prefix = keys::account_keys_of(account_id);
        let mut active = Vec::new();
        for (index_key, _) in reader.scan_prefix_raw(&prefix)? {
            let Some(code) = index_key.strip_prefix(&prefix) else {
                continue;
            };
            if let Some(key) = Self::get(reader, code)? {
                if key.grants(account_id) {
                    active.push(key);
                }
            }
        }
        Ok(active)
    }

    /// Every key issued under a batch tag, in code order.
    pub fn list_batch(reader: &impl KvRead, batch_tag: &str) -> StoreResult<Vec<LicenseKeyRecord>> {
        Ok(reader
            .scan_json::<LicenseKeyRecord>(&keys::license_key(""))?
            .into_iter()
            .map(|(_, key)| key)
            .filter(|key| key.batch_tag == batch_tag)
            .collect())
    }
}
