// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-account advisory locks and the per-call operation context.
//!
//! Every externally callable operation holds at most one account lock.
//! Bulk admin scans lock several accounts, always in ascending id order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;

use crate::error::{ServiceError, ServiceResult};

/// Shared handle to one account's lock.
pub type AccountLock = Arc<RwLock<()>>;

/// Idle entries are pruned once the map grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct AccountLocks {
    locks: Mutex<HashMap<String, AccountLock>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for `account_id`, created on first use.
    pub fn handle(&self, account_id: &str) -> AccountLock {
        let mut locks = self.locks.lock();
        if locks.len() > PRUNE_THRESHOLD {
            // Only the map itself holds an idle entry, and new handles are
            // handed out under this mutex, so dropping it is safe.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Handles for several accounts, sorted ascending and deduplicated.
    pub fn handles_ordered(&self, account_ids: &[String]) -> Vec<(String, AccountLock)> {
        let mut ids: Vec<&String> = account_ids.iter().collect();
        ids.sort();
        ids.dedup();
        ids.into_iter()
            .map(|id| (id.clone(), self.handle(id)))
            .collect()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Deadline and cancellation for one service call.
#[derive(Debug, Clone)]
pub struct OpContext {
    deadline: Instant,
    cancel: Option<CancellationToken>,
}

impl OpContext {
    pub fn new(timeout: Duration, cancel: Option<CancellationToken>) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Fail if the caller went away or the deadline passed.
    ///
    /// Called as the last step of every transaction closure, so a late
    /// operation aborts instead of committing.
    pub fn checkpoint(&self) -> ServiceResult<()> {
        if self
            .cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(ServiceError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(ServiceError::Timeout);
        }
        Ok(())
    }

    /// Shared lock on an account, waiting at most until the deadline.
    pub fn read<'a>(&self, lock: &'a AccountLock) -> ServiceResult<RwLockReadGuard<'a, ()>> {
        self.checkpoint()?;
        let guard = lock
            .try_read_for(self.remaining())
            .ok_or(ServiceError::Timeout)?;
        self.checkpoint()?;
        Ok(guard)
    }

    /// Exclusive lock on an account, waiting at most until the deadline.
    pub fn write<'a>(&self, lock: &'a AccountLock) -> ServiceResult<RwLockWriteGuard<'a, ()>> {
        self.checkpoint()?;
        let guard = lock
            .try_write_for(self.remaining())
            .ok_or(ServiceError::Timeout)?;
        self.checkpoint()?;
        Ok(guard)
    }
}
