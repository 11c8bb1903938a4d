// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session records keyed by the SHA-256 of the bearer token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::super::keys;
use super::super::store::{KvRead, StoreResult, StoreTxn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    pub account_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Hex SHA-256 of a session token; the only form ever persisted.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub struct SessionRepository;

impl SessionRepository {
    pub fn get(reader: &impl KvRead, token: &str) -> StoreResult<Option<SessionRecord>> {
        reader.get_json(&keys::session(&token_digest(token)))
    }

    pub fn put(txn: &mut StoreTxn<'_>, token: &str, session: &SessionRecord) -> StoreResult<()> {
        txn.put_json(&keys::session(&token_digest(token)), session)
    }

    pub fn delete(txn: &mut StoreTxn<'_>, token: &str) -> StoreResult<bool> {
        txn.delete(&keys::session(&token_digest(token)))
    }
}
