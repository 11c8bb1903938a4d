// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Devices registered against an account.
//!
//! Each device is stored under `device:{account_id}:{device_id}`, so the
//! set of one account is a single prefix scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::keys;
use super::super::store::{KvRead, StoreResult, StoreTxn};

/// A client installation registered against one account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Device {
    /// Client-generated identifier, stable across launches
    pub device_id: String,
    /// Human-readable label
    pub name: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

pub struct DeviceRepository;

impl DeviceRepository {
    pub fn get(
        reader: &impl KvRead,
        account_id: &str,
        device_id: &str,
    ) -> StoreResult<Option<Device>> {
        reader.get_json(&keys::device(account_id, device_id))
    }

    /// Devices of one account ordered by `first_seen_at`, then `device_id`.
    pub fn list(reader: &impl KvRead, account_id: &str) -> StoreResult<Vec<Device>> {
        let mut devices: Vec<Device> = reader
            .scan_json::<Device>(&keys::devices_of(account_id))?
            .into_iter()
            .map(|(_, device)| device)
            .collect();
        devices.sort_by(|a, b| {
            a.first_seen_at
                .cmp(&b.first_seen_at)
                .then_with(|| a.device_id.cmp(&b.device_id))
        });
        Ok(devices)
    }

    pub fn count(reader: &impl KvRead, account_id: &str) -> StoreResult<usize> {
        Ok(reader
            .scan_prefix_raw(&keys::devices_of(account_id))?
            .len())
    }

    pub fn put(txn: &mut StoreTxn<'_>, account_id: &str, device: &Device) -> StoreResult<()> {
        txn.put_json(&keys::device(account_id, &device.device_id), device)
    }

    /// Returns whether the device existed.
    pub fn delete(txn: &mut StoreTxn<'_>, account_id: &str, device_id: &str) -> StoreResult<bool> {
        txn.delete(&keys::device(account_id, device_id))
    }
}
