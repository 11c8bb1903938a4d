// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account records, the email index and per-account login failure state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::super::keys;
use super::super::store::{KvRead, StoreResult, StoreTxn};

/// Account as persisted under `account:{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountRecord {
    /// Server-generated identifier (UUID v4).
    pub id: String,
    /// Normalized email; unique across accounts.
    pub email: String,
    /// Argon2id PHC string. Never the cleartext.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Monotonic purchase flag; only an admin revoke resets it.
    pub purchased: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_started_at: Option<DateTime<Utc>>,
    pub trial_days: u32,
    /// Accounts are never deleted, only disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_at: Option<DateTime<Utc>>,
}

impl AccountRecord {
    pub fn is_disabled(&self) -> bool {
        self.disabled_at.is_some()
    }

    /// Bump `updated_at`, never moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// Recent authentication failures for one account.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginFailures {
    /// Failure instants inside the counting window, oldest first.
    pub failures: Vec<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
}

impl LoginFailures {
    /// Lock expiry if the account is locked at `now`.
    pub fn locked_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.locked_until.filter(|until| *until > now)
    }

    /// Record one failure and return whether it triggers a lock.
    pub fn record(
        &mut self,
        now: DateTime<Utc>,
        window: Duration,
        max_failures: u32,
        lock_duration: Duration,
    ) -> bool {
        self.failures.retain(|at| now - *at < window);
        self.failures.push(now);
        if self.failures.len() >= max_failures as usize {
            self.failures.clear();
            self.locked_until = Some(now + lock_duration);
            true
        } else {
            false
        }
    }
}

/// Typed access to account entries.
pub struct AccountRepository;

impl AccountRepository {
    pub fn get(reader: &impl KvRead, account_id: &str) -> StoreResult<Option<AccountRecord>> {
        reader.get_json(&keys::account(account_id))
    }

    /// Account id registered for a normalized email.
    pub fn id_for_email(reader: &impl KvRead, email: &str) -> StoreResult<Option<String>> {
        reader.get_json(&keys::account_by_email(email))
    }

    pub fn get_by_email(reader: &impl KvRead, email: &str) -> StoreResult<Option<AccountRecord>> {
        match Self::id_for_email(reader, email)? {
            Some(id) => Self::get(reader, &id),
            None => Ok(None),
        }
    }

    /// Write a new account together with its email index entry.
    pub fn insert(txn: &mut StoreTxn<'_>, account: &AccountRecord) -> StoreResult<()> {
        txn.put_json(&keys::account(&account.id), account)?;
        txn.put_json(&keys::account_by_email(&account.email), &account.id)
    }

    pub fn update(txn: &mut StoreTxn<'_>, account: &AccountRecord) -> StoreResult<()> {
        txn.put_json(&keys::account(&account.id), account)
    }

    /// Every account id, ascending.
    pub fn list_ids(reader: &impl KvRead) -> StoreResult<Vec<String>> {
        Ok(reader
            .scan_prefix_raw(keys::ACCOUNT_PREFIX)?
            .into_iter()
            .filter_map(|(key, _)| key.strip_prefix(keys::ACCOUNT_PREFIX).map(str::to_owned))
            .collect())
    }

    pub fn login_failures(reader: &impl KvRead, account_id: &str) -> StoreResult<LoginFailures> {
        Ok(reader
            .get_json(&keys::login_failures(account_id))?
            .unwrap_or_default())
    }

    pub fn set_login_failures(
        txn: &mut StoreTxn<'_>,
        account_id: &str,
        failures: &LoginFailures,
    ) -> StoreResult<()> {
        txn.put_json(&keys::login_failures(account_id), failures)
    }

    pub fn clear_login_failures(txn: &mut StoreTxn<'_>, account_id: &str) -> StoreResult<()> {
        txn.delete(&keys::login_failures(account_id)).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;

    fn sample(id: &str, email: &str) -> AccountRecord {
        let now = Utc::now();
        AccountRecord {
            id: id.to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            created_at: now,
            updated_at: now,
            purchased: false,
            trial_started_at: Some(now),
            trial_days: 14,
            disabled_at: None,
        }
    }

    #[test]
    fn insert_writes_record_and_email_index() {
        let store = Store::open_in_memory().unwrap();
        let account = sample("a1", "alice@x.com");
        store
            .transaction(|txn| AccountRepository::insert(txn, &account))
            .unwrap();

        let snapshot = store.snapshot().unwrap();
        assert_eq!(
            AccountRepository::get(&snapshot, "a1").unwrap(),
            Some(account.clone())
        );
        assert_eq!(
            AccountRepository::id_for_email(&snapshot, "alice@x.com").unwrap(),
            Some("a1".to_string())
        );
        assert_eq!(
            AccountRepository::get_by_email(&snapshot, "alice@x.com").unwrap(),
            Some(account)
        );
        assert_eq!(
            AccountRepository::get_by_email(&snapshot, "bob@x.com").unwrap(),
            None
        );
    }

    #[test]
    fn list_ids_ignores_other_namespaces() {
        let store = Store::open_in_memory().unwrap();
        store
            .transaction(|txn| {
                AccountRepository::insert(txn, &sample("b", "b@x.com"))?;
                AccountRepository::insert(txn, &sample("a", "a@x.com"))
            })
            .unwrap();

        let ids = AccountRepository::list_ids(&store.snapshot().unwrap()).unwrap();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut account = sample("a1", "a@x.com");
        let before = account.updated_at;
        account.touch(before - Duration::seconds(10));
        assert_eq!(account.updated_at, before);
        account.touch(before + Duration::seconds(10));
        assert_eq!(account.updated_at, before + Duration::seconds(10));
    }

    #[test]
    fn failures_lock_after_threshold_inside_window() {
        let now = Utc::now();
        let mut state = LoginFailures::default();
        for i in 0..4 {
            let locked = state.record(
                now + Duration::minutes(i),
                Duration::minutes(15),
                5,
                Duration::minutes(15),
            );
            assert!(!locked);
        }
        let at = now + Duration::minutes(4);
        assert!(state.record(at, Duration::minutes(15), 5, Duration::minutes(15)));
        assert_eq!(state.locked_at(at), Some(at + Duration::minutes(15)));
        assert_eq!(state.locked_at(at + Duration::minutes(15)), None);
    }

    #[test]
    fn failures_outside_window_are_forgotten() {
        let now = Utc::now();
        let mut state = LoginFailures::default();
        for i in 0..4 {
            state.record(
                now + Duration::minutes(i * 10),
                Duration::minutes(15),
                5,
                Duration::minutes(15),
            );
        }
        assert!(state.failures.len() < 4);
        assert!(state.locked_until.is_none());
    }
}
