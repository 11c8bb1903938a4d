// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Entitlement engine.
//!
//! [`evaluate`] is a pure function of an account record, the number of
//! license keys currently granting PAID, and the current time. Rules, first
//! match wins:
//!
//! 1. purchased, or any activated key bound to the account: PAID
//! 2. trial started and still inside `trial_days`: TRIAL
//! 3. otherwise FREE
//!
//! Downgrades (e.g. after a key revocation) are audited when the client
//! next reads its entitlement. The last tier returned is kept under
//! `tier_seen:{account}` for that comparison only; it never influences the
//! result.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use super::{audit, require_account, EntitlementService, OpContext};
use crate::auth::Role;
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{
    keys, AccountRecord, AccountRepository, AuditEntry, AuditKind, KvRead, LicenseKeyRepository,
    StoreResult, StoreTxn,
};

const SECONDS_PER_DAY: i64 = 86_400;

/// Effective tier, ordered FREE < TRIAL < PAID.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Free,
    Trial,
    Paid,
}

/// Why PAID was granted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementSource {
    Purchase,
    LicenseKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Entitlement {
    pub tier: Tier,
    /// Whole days left in the trial, rounded up; only set for TRIAL.
    pub trial_days_remaining: Option<u32>,
    /// Every reason PAID was granted; empty unless PAID.
    pub sources: BTreeSet<EntitlementSource>,
}

/// Client visibility flags derived from an [`Entitlement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Gating {
    /// Show the "purchase" affordance.
    pub show_purchase: bool,
    /// Show the "enter license key" affordance.
    pub show_license_entry: bool,
    /// Show the trial countdown.
    pub show_trial_countdown: bool,
    /// Gated features are usable.
    pub features_unlocked: bool,
}

impl Entitlement {
    pub fn gating(&self) -> Gating {
        let paid = self.tier == Tier::Paid;
        Gating {
            show_purchase: !paid,
            show_license_entry: !paid,
            show_trial_countdown: self.tier == Tier::Trial,
            features_unlocked: self.tier != Tier::Free,
        }
    }
}

/// Compute the entitlement of `account` at `now`.
pub fn evaluate(account: &AccountRecord, active_keys: usize, now: DateTime<Utc>) -> Entitlement {
    let mut sources = BTreeSet::new();
    if account.purchased {
        sources.insert(EntitlementSource::Purchase);
    }
    if active_keys > 0 {
        sources.insert(EntitlementSource::LicenseKey);
    }
    if !sources.is_empty() {
        return Entitlement {
            tier: Tier::Paid,
            trial_days_remaining: None,
            sources,
        };
    }

    if let Some(started) = account.trial_started_at {
        // A start in the future counts as just started.
        let elapsed = (now - started).num_seconds().max(0);
        let window = i64::from(account.trial_days) * SECONDS_PER_DAY;
        if elapsed < window {
            let remaining = window - elapsed;
            let days = (remaining + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY;
            return Entitlement {
                tier: Tier::Trial,
                trial_days_remaining: Some(days as u32),
                sources,
            };
        }
    }

    Entitlement {
        tier: Tier::Free,
        trial_days_remaining: None,
        sources,
    }
}

/// Move the `tier_seen` marker to PAID inside a change that grants PAID, so
/// a later revocation is audited as a downgrade even if no read happened in
/// between.
pub(super) fn mark_tier_paid(txn: &mut StoreTxn<'_>, account_id: &str) -> StoreResult<()> {
    txn.put_json(&keys::tier_seen(account_id), &Tier::Paid)
}

impl EntitlementService {
    fn evaluate_stored(
        &self,
        reader: &impl KvRead,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<Entitlement> {
        let account = require_account(reader, account_id)?;
        let active_keys = LicenseKeyRepository::active_for(reader, account_id)?.len();
        Ok(evaluate(&account, active_keys, now))
    }

    /// Current entitlement of an account.
    pub fn get_entitlement(&self, account_id: &str) -> ServiceResult<Entitlement> {
        let ctx = self.ctx();
        let handle = self.locks().handle(account_id);
        let _guard = ctx.read(&handle)?;
        let now = self.now();

        let snapshot = self.store().snapshot()?;
        let entitlement = self.evaluate_stored(&snapshot, account_id, now)?;
        let seen: Option<Tier> = snapshot.get_json(&keys::tier_seen(account_id))?;
        drop(snapshot);

        if seen != Some(entitlement.tier) {
            self.record_tier(&ctx, account_id, entitlement.tier, now)?;
        }
        tracing::debug!(account_id, tier = ?entitlement.tier, "Entitlement evaluated");
        Ok(entitlement)
    }

    /// Move the `tier_seen` marker, auditing a downgrade.
    ///
    /// Runs under the account's read lock, so the account's state cannot
    /// change underneath; concurrent readers race only on the marker, which
    /// the transaction re-reads.
    fn record_tier(
        &self,
        ctx: &OpContext,
        account_id: &str,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let downgraded = self.store().transaction(|txn| {
            let seen: Option<Tier> = txn.get_json(&keys::tier_seen(account_id))?;
            if seen == Some(tier) {
                return Ok(None);
            }
            let downgrade = seen.filter(|previous| tier < *previous);
            if let Some(from) = downgrade {
                audit(
                    txn,
                    now,
                    AuditEntry::new(AuditKind::EntitlementDowngrade)
                        .with_account(account_id)
                        .with_detail(json!({ "from": from, "to": tier })),
                )?;
            }
            txn.put_json(&keys::tier_seen(account_id), &tier)?;
            ctx.checkpoint()?;
            Ok::<_, ServiceError>(downgrade)
        })?;

        if let Some(from) = downgraded {
            tracing::info!(account_id, ?from, to = ?tier, "Entitlement downgraded");
        }
        Ok(())
    }

    /// Record a completed purchase. Idempotent; audited only the first time.
    pub fn mark_purchased(&self, account_id: &str) -> ServiceResult<()> {
        let ctx = self.ctx();
        let handle = self.locks().handle(account_id);
        let _guard = ctx.write(&handle)?;
        let now = self.now();

        let recorded = self.store().transaction(|txn| {
            let mut account = require_account(&*txn, account_id)?;
            if account.purchased {
                return Ok(false);
            }
            account.purchased = true;
            account.touch(now);
            AccountRepository::update(txn, &account)?;
            mark_tier_paid(txn, account_id)?;
            audit(
                txn,
                now,
                AuditEntry::new(AuditKind::PurchaseRecorded).with_account(account_id),
            )?;
            ctx.checkpoint()?;
            Ok::<_, ServiceError>(true)
        })?;

        if recorded {
            tracing::info!(account_id, "Purchase recorded");
        }
        Ok(())
    }

    /// Admin reversal of a purchase (e.g. a refund). Returns whether the
    /// flag changed.
    pub fn revoke_purchase(&self, role: Role, account_id: &str, reason: &str) -> ServiceResult<bool> {
        role.require(Role::Admin)?;
        let ctx = self.ctx();
        let handle = self.locks().handle(account_id);
        let _guard = ctx.write(&handle)?;
        let now = self.now();

        let revoked = self.store().transaction(|txn| {
            let mut account = require_account(&*txn, account_id)?;
            if !account.purchased {
                return Ok(false);
            }
            account.purchased = false;
            account.touch(now);
            AccountRepository::update(txn, &account)?;
            audit(
                txn,
                now,
                AuditEntry::new(AuditKind::PurchaseRevoked)
                    .with_account(account_id)
                    .with_detail(json!({ "reason": reason })),
            )?;
            ctx.checkpoint()?;
            Ok::<_, ServiceError>(true)
        })?;

        if revoked {
            tracing::info!(account_id, "Purchase revoked");
        }
        Ok(revoked)
    }

    /// Evaluate several accounts against one consistent snapshot.
    ///
    /// Read locks are taken in ascending account-id order.
    pub fn evaluate_many(
        &self,
        role: Role,
        account_ids: &[String],
    ) -> ServiceResult<BTreeMap<String, Entitlement>> {
        role.require(Role::Admin)?;
        let ctx = self.ctx();
        let handles = self.locks().handles_ordered(account_ids);
        let _guards = handles
            .iter()
            .map(|(_, handle)| ctx.read(handle))
            .collect::<ServiceResult<Vec<_>>>()?;
        let now = self.now();

        let snapshot = self.store().snapshot()?;
        handles
            .iter()
            .map(|(id, _)| Ok((id.clone(), self.evaluate_stored(&snapshot, id, now)?)))
            .collect()
    }
}
