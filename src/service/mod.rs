// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Entitlement Service
//!
//! [`EntitlementService`] is the whole function API of the service: the HTTP
//! handlers and the admin CLI are thin adapters over it.
//!
//! ## Components
//!
//! - [`registry`]: account creation, authentication, sessions
//! - [`ledger`]: per-account device set with the device cap
//! - [`engine`]: entitlement evaluation (FREE / TRIAL / PAID)
//! - [`vault`]: license key issuance, activation, revocation
//!
//! ## Execution model
//!
//! Calls are synchronous and may block (password hashing, store I/O). Each
//! call runs under an [`OpContext`] holding its deadline and optional
//! cancellation token; mutations take the account's write lock, reads its
//! read lock. Mutations and their audit records commit in one store
//! transaction.

pub mod engine;
pub mod ledger;
pub mod license_code;
pub mod locks;
pub mod registry;
pub mod throttle;
pub mod vault;


use std::path::Path;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::auth::password::{hash_password, PasswordHashCost};
use crate::auth::Role;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, ServiceConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{
    AccountRecord, AccountRepository, ArchiveSummary, AuditEntry, AuditError, AuditLog,
    AuditRecord, KvRead, Store, StoreTxn,
};

pub use crate::storage::{Device, KeyState};
pub use engine::{Entitlement, EntitlementSource, Gating, Tier};
pub use ledger::{DeviceOutcome, RemoveOutcome};
pub use license_code::LicenseCode;
pub use locks::{AccountLocks, OpContext};
pub use registry::{Account, AuthSession};
pub use throttle::AttemptThrottle;
pub use vault::KeyStatus;

struct Inner {
    store: Store,
    config: ServiceConfig,
    clock: Arc<dyn Clock>,
    locks: AccountLocks,
    activation_throttle: AttemptThrottle,
    /// Verified against when the email is unknown, so both paths cost one
    /// Argon2 verification.
    dummy_hash: String,
}

/// Account & device entitlement service.
///
/// Cheap to clone; clones share the store, locks and throttle state.
#[derive(Clone)]
pub struct EntitlementService {
    inner: Arc<Inner>,
    cancel: Option<CancellationToken>,
    timeout: StdDuration,
}

impl EntitlementService {
    pub fn new(store: Store, config: ServiceConfig) -> Result<Self, ConfigError> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Store,
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let dummy_hash = hash_password("dummy-password-for-timing", &config.password.hash_cost)
            .map_err(|e| ConfigError::Invalid(format!("password hash cost: {e}")))?;
        let timeout = config.operation_timeout;
        let activation_throttle = AttemptThrottle::new(config.activation.clone(), clock.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                config,
                clock,
                locks: AccountLocks::new(),
                activation_throttle,
                dummy_hash,
            }),
            cancel: None,
            timeout,
        })
    }

    /// A handle whose calls abort at their next checkpoint once `token` is
    /// cancelled. A call that already committed is unaffected.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: Some(token),
            ..self.clone()
        }
    }

    /// A handle with a different per-call deadline.
    pub fn with_timeout(&self, timeout: StdDuration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// The injected time source, for collaborators that keep their own
    /// time-based state.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.inner.clock.clone()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    fn ctx(&self) -> OpContext {
        OpContext::new(self.timeout, self.cancel.clone())
    }

    fn locks(&self) -> &AccountLocks {
        &self.inner.locks
    }

    fn hash_cost(&self) -> &PasswordHashCost {
        &self.inner.config.password.hash_cost
    }

    /// Probe that the store is readable.
    pub fn health_check(&self) -> ServiceResult<()> {
        Ok(self.store().health_check()?)
    }

    /// Audit records, oldest first: every record after `after`, or only
    /// those about `account_id`.
    pub fn audit_records(
        &self,
        role: Role,
        account_id: Option<&str>,
        after: u64,
        limit: usize,
    ) -> ServiceResult<Vec<AuditRecord>> {
        role.require(Role::Support)?;
        let snapshot = self.store().snapshot()?;
        let records = match account_id {
            Some(id) => AuditLog::for_account(&snapshot, id)?
                .into_iter()
                .filter(|record| record.seq > after)
                .take(limit)
                .collect(),
            None => AuditLog::read(&snapshot, after, limit)?,
        };
        Ok(records)
    }

    /// Export audit records older than `before` to JSONL files in `dir`.
    pub fn archive_audit(
        &self,
        role: Role,
        before: DateTime<Utc>,
        dir: &Path,
    ) -> ServiceResult<ArchiveSummary> {
        role.require(Role::Admin)?;
        let summary = AuditLog::archive(
            self.store(),
            self.now(),
            self.config().audit_retention,
            before,
            dir,
        )
        .map_err(|err| match err {
            AuditError::CutoffTooRecent { .. } => ServiceError::InvalidInput(err.to_string()),
            other => other.into(),
        })?;
        tracing::info!(archived = summary.archived, files = summary.files.len(), "Audit records archived");
        Ok(summary)
    }
}

fn require_account(reader: &impl KvRead, account_id: &str) -> ServiceResult<AccountRecord> {
    AccountRepository::get(reader, account_id)?.ok_or(ServiceError::AccountNotFound)
}

/// Like [`require_account`], but disabled accounts are refused.
fn require_active_account(reader: &impl KvRead, account_id: &str) -> ServiceResult<AccountRecord> {
    let account = require_account(reader, account_id)?;
    if account.is_disabled() {
        return Err(ServiceError::AccountDisabled);
    }
    Ok(account)
}

fn audit(txn: &mut StoreTxn<'_>, at: DateTime<Utc>, entry: AuditEntry) -> ServiceResult<u64> {
    Ok(AuditLog::append(txn, at, entry)?)
}
