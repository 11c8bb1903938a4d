// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account registry: registration, authentication and sessions.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;
use zeroize::Zeroizing;

use super::engine::evaluate;
use super::{audit, require_account, EntitlementService};
use crate::auth::email::normalize_email;
use crate::auth::password::{check_policy, hash_password, verify_password, PasswordError};
use crate::auth::Role;
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{
    keys, AccountRecord, AccountRepository, AuditEntry, AuditKind, SessionRecord,
    SessionRepository,
};

/// Session token entropy in bytes.
const SESSION_TOKEN_BYTES: usize = 32;

/// Public view of an account (no password hash).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Account {
    /// Account identifier
    pub account_id: String,
    /// Normalized email
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub purchased: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_started_at: Option<DateTime<Utc>>,
    pub trial_days: u32,
    pub disabled: bool,
}

impl From<&AccountRecord> for Account {
    fn from(record: &AccountRecord) -> Self {
        Self {
            account_id: record.id.clone(),
            email: record.email.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            purchased: record.purchased,
            trial_started_at: record.trial_started_at,
            trial_days: record.trial_days,
            disabled: record.is_disabled(),
        }
    }
}

/// Result of a successful [`EntitlementService::authenticate`].
#[derive(Clone)]
pub struct AuthSession {
    pub account: Account,
    /// Bearer token; only its SHA-256 is stored.
    pub token: Zeroizing<String>,
    pub expires_at: DateTime<Utc>,
}

fn new_session_token() -> Zeroizing<String> {
    let mut bytes = Zeroizing::new([0u8; SESSION_TOKEN_BYTES]);
    OsRng.fill_bytes(&mut bytes[..]);
    Zeroizing::new(Base64UrlUnpadded::encode_string(&bytes[..]))
}

fn hashing_fault(err: PasswordError) -> ServiceError {
    ServiceError::StorageUnavailable(err.to_string())
}

impl EntitlementService {
    /// Create an account and start its trial.
    pub fn register_account(&self, email: &str, password: &str) -> ServiceResult<Account> {
        let ctx = self.ctx();
        let email = normalize_email(email).map_err(|r| ServiceError::InvalidInput(r.into()))?;
        check_policy(password, &email, self.config().password.min_length)
            .map_err(|r| ServiceError::WeakPassword(r.into()))?;

        // Skip the slow hash for an obvious duplicate; the transaction
        // re-checks.
        if AccountRepository::id_for_email(&self.store().snapshot()?, &email)?.is_some() {
            return Err(ServiceError::AlreadyExists);
        }

        let password_hash = hash_password(password, self.hash_cost()).map_err(hashing_fault)?;
        ctx.checkpoint()?;

        let now = self.now();
        let record = AccountRecord {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash,
            created_at: now,
            updated_at: now,
            purchased: false,
            trial_started_at: Some(now),
            trial_days: self.config().trial_days,
            disabled_at: None,
        };

        self.store().transaction(|txn| {
            if AccountRepository::id_for_email(&*txn, &record.email)?.is_some() {
                return Err(ServiceError::AlreadyExists);
            }
            AccountRepository::insert(txn, &record)?;
            let tier = evaluate(&record, 0, now).tier;
            txn.put_json(&keys::tier_seen(&record.id), &tier)?;
            audit(
                txn,
                now,
                AuditEntry::new(AuditKind::AccountCreated)
                    .with_account(&record.id)
                    .with_detail(json!({ "email": record.email, "trial_days": record.trial_days })),
            )?;
            ctx.checkpoint()
        })?;

        tracing::info!(account_id = %record.id, "Account registered");
        Ok(Account::from(&record))
    }

    /// Verify credentials and open a session.
    ///
    /// Five consecutive failures inside the lockout window lock the account;
    /// while locked, the password is not even checked.
    pub fn authenticate(&self, email: &str, password: &str) -> ServiceResult<AuthSession> {
        let ctx = self.ctx();
        let Ok(email) = normalize_email(email) else {
            return Err(ServiceError::InvalidCredentials);
        };

        let Some(account_id) = AccountRepository::id_for_email(&self.store().snapshot()?, &email)?
        else {
            // Comparable cost to a real verification.
            let _ = verify_password(password, &self.inner.dummy_hash);
            ctx.checkpoint()?;
            let now = self.now();
            self.store().transaction(|txn| {
                audit(
                    txn,
                    now,
                    AuditEntry::new(AuditKind::AuthFail).with_detail(json!({ "reason": "unknown_email" })),
                )?;
                ctx.checkpoint()
            })?;
            tracing::warn!("Authentication failed for unknown email");
            return Err(ServiceError::InvalidCredentials);
        };

        let handle = self.locks().handle(&account_id);
        let _guard = ctx.write(&handle)?;

        let snapshot = self.store().snapshot()?;
        let account = require_account(&snapshot, &account_id)?;
        let failures = AccountRepository::login_failures(&snapshot, &account_id)?;
        drop(snapshot);

        if let Some(until) = failures.locked_at(self.now()) {
            tracing::warn!(account_id = %account_id, %until, "Authentication refused, account locked");
            return Err(ServiceError::Locked { until });
        }

        let verified = verify_password(password, &account.password_hash).map_err(hashing_fault)?;
        ctx.checkpoint()?;
        let now = self.now();

        if !verified {
            let lockout = &self.config().lockout;
            let locked_until = self.store().transaction(|txn| {
                let mut failures = AccountRepository::login_failures(&*txn, &account_id)?;
                let locked = failures.record(
                    now,
                    lockout.window,
                    lockout.max_failures,
                    lockout.lock_duration,
                );
                AccountRepository::set_login_failures(txn, &account_id, &failures)?;
                audit(
                    txn,
                    now,
                    AuditEntry::new(AuditKind::AuthFail)
                        .with_account(&account_id)
                        .with_detail(json!({ "recent_failures": failures.failures.len() })),
                )?;
                if locked {
                    audit(
                        txn,
                        now,
                        AuditEntry::new(AuditKind::AuthLock)
                            .with_account(&account_id)
                            .with_detail(json!({ "locked_until": failures.locked_until })),
                    )?;
                }
                ctx.checkpoint()?;
                Ok::<_, ServiceError>(failures.locked_until.filter(|_| locked))
            })?;

            match locked_until {
                Some(until) => {
                    tracing::warn!(account_id = %account_id, %until, "Account locked after repeated failures")
                }
                None => tracing::warn!(account_id = %account_id, "Authentication failed"),
            }
            return Err(ServiceError::InvalidCredentials);
        }

        if account.is_disabled() {
            return Err(ServiceError::AccountDisabled);
        }

        let token = new_session_token();
        let session = SessionRecord {
            account_id: account_id.clone(),
            created_at: now,
            expires_at: now + self.config().session_ttl,
        };
        self.store().transaction(|txn| {
            AccountRepository::clear_login_failures(txn, &account_id)?;
            SessionRepository::put(txn, &token, &session)?;
            audit(
                txn,
                now,
                AuditEntry::new(AuditKind::AuthOk).with_account(&account_id),
            )?;
            ctx.checkpoint()
        })?;

        tracing::info!(account_id = %account_id, "Authenticated");
        Ok(AuthSession {
            account: Account::from(&account),
            token,
            expires_at: session.expires_at,
        })
    }

    /// Account id behind a session token.
    pub fn resolve_session(&self, token: &str) -> ServiceResult<String> {
        let snapshot = self.store().snapshot()?;
        let session = SessionRepository::get(&snapshot, token)?
            .filter(|session| !session.is_expired(self.now()))
            .ok_or(ServiceError::InvalidCredentials)?;
        let account = require_account(&snapshot, &session.account_id).map_err(|e| match e {
            ServiceError::AccountNotFound => ServiceError::InvalidCredentials,
            other => other,
        })?;
        if account.is_disabled() {
            return Err(ServiceError::AccountDisabled);
        }
        Ok(account.id)
    }

    /// End a session. Unknown tokens are ignored.
    pub fn end_session(&self, token: &str) -> ServiceResult<()> {
        let ctx = self.ctx();
        self.store().transaction(|txn| {
            SessionRepository::delete(txn, token)?;
            ctx.checkpoint()
        })
    }

    pub fn get_account(&self, account_id: &str) -> ServiceResult<Account> {
        let snapshot = self.store().snapshot()?;
        Ok(Account::from(&require_account(&snapshot, account_id)?))
    }

    pub fn get_by_email(&self, email: &str) -> ServiceResult<Account> {
        let email = normalize_email(email).map_err(|r| ServiceError::InvalidInput(r.into()))?;
        let snapshot = self.store().snapshot()?;
        AccountRepository::get_by_email(&snapshot, &email)?
            .map(|record| Account::from(&record))
            .ok_or(ServiceError::AccountNotFound)
    }

    /// Disable an account. Idempotent; the account is never deleted.
    pub fn disable_account(&self, role: Role, account_id: &str, reason: &str) -> ServiceResult<Account> {
        role.require(Role::Admin)?;
        let ctx = self.ctx();
        let handle = self.locks().handle(account_id);
        let _guard = ctx.write(&handle)?;
        let now = self.now();

        let account = self.store().transaction(|txn| {
            let mut account = require_account(&*txn, account_id)?;
            if !account.is_disabled() {
                account.disabled_at = Some(now);
                account.touch(now);
                AccountRepository::update(txn, &account)?;
                audit(
                    txn,
                    now,
                    AuditEntry::new(AuditKind::AccountDisabled)
                        .with_account(account_id)
                        .with_detail(json!({ "reason": reason })),
                )?;
            }
            ctx.checkpoint()?;
            Ok::<_, ServiceError>(account)
        })?;

        tracing::info!(account_id, "Account disabled");
        Ok(Account::from(&account))
    }
}
