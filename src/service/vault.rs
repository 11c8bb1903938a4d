// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! License key vault: issuance, activation and revocation.
//!
//! A key is single-use. Activation runs the ISSUED→ACTIVATED edge inside one
//! write transaction, so of several concurrent activations of the same code
//! exactly one commits and the rest observe ACTIVATED.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use super::license_code::{fingerprint, format_grouped, LicenseCode};
use super::engine::mark_tier_paid;
use super::{audit, require_active_account, EntitlementService};
use crate::auth::Role;
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{
    AuditEntry, AuditKind, KeyState, KvRead, LicenseKeyRecord, LicenseKeyRepository,
};

/// Largest batch a single `issue_license_keys` call may create.
pub const MAX_ISSUE_COUNT: usize = 1000;
/// Batch tag used when none is given.
pub const DEFAULT_BATCH_TAG: &str = "default";
const MAX_TAG_LEN: usize = 64;
/// Revocation re-reads the key when its binding moved underneath.
const REVOKE_ATTEMPTS: usize = 3;

/// Admin view of a license key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct KeyStatus {
    /// Grouped printable code
    pub code: String,
    /// Short SHA-256 fingerprint used in logs and audit records
    pub fingerprint: String,
    pub state: KeyState,
    pub batch_tag: String,
    pub issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoke_reason: Option<String>,
}

impl From<&LicenseKeyRecord> for KeyStatus {
    fn from(record: &LicenseKeyRecord) -> Self {
        Self {
            code: format_grouped(&record.code),
            fingerprint: fingerprint(&record.code),
            state: record.state,
            batch_tag: record.batch_tag.clone(),
            issued_at: record.issued_at,
            activated_at: record.activated_at,
            revoked_at: record.revoked_at,
            bound_account_id: record.bound_account_id.clone(),
            revoke_reason: record.revoke_reason.clone(),
        }
    }
}

fn validate_batch_tag(tag: Option<&str>) -> ServiceResult<String> {
    let Some(tag) = tag else {
        return Ok(DEFAULT_BATCH_TAG.to_string());
    };
    let valid = !tag.is_empty()
        && tag.len() <= MAX_TAG_LEN
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !valid {
        return Err(ServiceError::InvalidInput(format!(
            "batch tag must be 1 to {MAX_TAG_LEN} characters of [A-Za-z0-9._-]"
        )));
    }
    Ok(tag.to_string())
}

fn require_key(reader: &impl KvRead, code: &LicenseCode) -> ServiceResult<LicenseKeyRecord> {
    LicenseKeyRepository::get(reader, code.canonical())?.ok_or(ServiceError::KeyNotFound)
}

impl EntitlementService {
    /// Mint `count` fresh ISSUED keys under one batch tag.
    pub fn issue_license_keys(
        &self,
        role: Role,
        count: usize,
        batch_tag: Option<&str>,
    ) -> ServiceResult<Vec<LicenseCode>> {
        role.require(Role::Admin)?;
        if count == 0 || count > MAX_ISSUE_COUNT {
            return Err(ServiceError::InvalidInput(format!(
                "count must be between 1 and {MAX_ISSUE_COUNT}"
            )));
        }
        let batch_tag = validate_batch_tag(batch_tag)?;
        let ctx = self.ctx();
        let now = self.now();

        let codes = self.store().transaction(|txn| {
            let mut codes = Vec::with_capacity(count);
            while codes.len() < count {
                let code = LicenseCode::generate();
                if LicenseKeyRepository::get(&*txn, code.canonical())?.is_some() {
                    continue;
                }
                let record =
                    LicenseKeyRecord::issued(code.canonical().to_string(), batch_tag.clone(), now);
                LicenseKeyRepository::put(txn, &record)?;
                codes.push(code);
            }
            let fingerprints: Vec<String> = codes.iter().map(LicenseCode::fingerprint).collect();
            audit(
                txn,
                now,
                AuditEntry::new(AuditKind::KeyIssued).with_detail(json!({
                    "batch_tag": batch_tag,
                    "count": count,
                    "keys": fingerprints,
                })),
            )?;
            ctx.checkpoint()?;
            Ok::<_, ServiceError>(codes)
        })?;

        tracing::info!(%batch_tag, count, "License keys issued");
        Ok(codes)
    }

    /// Redeem a code for an account.
    ///
    /// `origin` identifies the caller (client address) for the attempt
    /// throttle, which is consulted before the code is even parsed.
    pub fn activate_license(
        &self,
        origin: &str,
        account_id: &str,
        code: &str,
    ) -> ServiceResult<KeyStatus> {
        self.inner.activation_throttle.check(origin)?;
        let code = LicenseCode::parse(code)?;

        let ctx = self.ctx();
        let handle = self.locks().handle(account_id);
        let _guard = ctx.write(&handle)?;
        let now = self.now();

        let result = self.store().transaction(|txn| {
            require_active_account(&*txn, account_id)?;
            let mut key = require_key(&*txn, &code)?;
            match key.state {
                KeyState::Issued => {}
                KeyState::Activated => return Err(ServiceError::KeyAlreadyUsed),
                KeyState::Revoked => return Err(ServiceError::KeyRevoked),
            }
            key.state = KeyState::Activated;
            key.activated_at = Some(now);
            key.bound_account_id = Some(account_id.to_string());
            LicenseKeyRepository::put(txn, &key)?;
            LicenseKeyRepository::bind(txn, account_id, &key.code)?;
            mark_tier_paid(txn, account_id)?;
            audit(
                txn,
                now,
                AuditEntry::new(AuditKind::KeyActivated)
                    .with_account(account_id)
                    .with_detail(json!({ "key": code.fingerprint(), "batch_tag": key.batch_tag })),
            )?;
            ctx.checkpoint()?;
            Ok(KeyStatus::from(&key))
        });

        match &result {
            Ok(_) => tracing::info!(account_id, key = %code.fingerprint(), "License key activated"),
            Err(e) => {
                tracing::warn!(account_id, key = %code.fingerprint(), error = %e, "License activation refused")
            }
        }
        result
    }

    /// Revoke a key. Revoking a REVOKED key is a no-op success.
    ///
    /// The bound account (if any) is write-locked for the transaction; its
    /// entitlement is recomputed on its next read.
    pub fn revoke_license_key(&self, role: Role, code: &str, reason: &str) -> ServiceResult<KeyStatus> {
        role.require(Role::Admin)?;
        let code = LicenseCode::parse(code)?;
        let ctx = self.ctx();

        for _ in 0..REVOKE_ATTEMPTS {
            let observed = require_key(&self.store().snapshot()?, &code)?;
            if observed.state == KeyState::Revoked {
                return Ok(KeyStatus::from(&observed));
            }

            let bound = observed
                .bound_account_id
                .clone()
                .filter(|_| observed.state == KeyState::Activated);
            let handle = bound.as_deref().map(|id| self.locks().handle(id));
            let _guard = handle.as_ref().map(|h| ctx.write(h)).transpose()?;
            let now = self.now();

            let revoked = self.store().transaction(|txn| {
                let mut key = require_key(&*txn, &code)?;
                if key.state != observed.state || key.bound_account_id != observed.bound_account_id {
                    return Ok(None);
                }
                let previous = key.state;
                key.state = KeyState::Revoked;
                key.revoked_at = Some(now);
                key.revoke_reason = Some(reason.to_string());
                LicenseKeyRepository::put(txn, &key)?;
                if let Some(account_id) = &bound {
                    LicenseKeyRepository::unbind(txn, account_id, &key.code)?;
                }
                let mut entry = AuditEntry::new(AuditKind::KeyRevoked).with_detail(json!({
                    "key": code.fingerprint(),
                    "previous_state": previous,
                    "reason": reason,
                }));
                if let Some(account_id) = &bound {
                    entry = entry.with_account(account_id.as_str());
                }
                audit(txn, now, entry)?;
                ctx.checkpoint()?;
                Ok::<_, ServiceError>(Some(key))
            })?;

            if let Some(key) = revoked {
                tracing::info!(
                    key = %code.fingerprint(),
                    account_id = bound.as_deref(),
                    "License key revoked"
                );
                return Ok(KeyStatus::from(&key));
            }
            tracing::debug!(key = %code.fingerprint(), "Key changed during revocation, retrying");
        }
        Err(ServiceError::Timeout)
    }

    /// Current state of a key.
    pub fn key_status(&self, role: Role, code: &str) -> ServiceResult<KeyStatus> {
        role.require(Role::Support)?;
        let code = LicenseCode::parse(code)?;
        let snapshot = self.store().snapshot()?;
        Ok(KeyStatus::from(&require_key(&snapshot, &code)?))
    }

    /// Every key of a batch, with full codes, for resending.
    pub fn list_batch(&self, role: Role, batch_tag: &str) -> ServiceResult<Vec<KeyStatus>> {
        role.require(Role::Admin)?;
        let batch_tag = validate_batch_tag(Some(batch_tag))?;
        let snapshot = self.store().snapshot()?;
        let keys = LicenseKeyRepository::list_batch(&snapshot, &batch_tag)?;
        tracing::info!(%batch_tag, count = keys.len(), "License key batch listed");
        Ok(keys.iter().map(KeyStatus::from).collect())
    }
}
