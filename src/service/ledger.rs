// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Device ledger: the per-account device set and its cap.
//!
//! The cap is a hard count enforced here, never by the client. Re-adding a
//! known device and removing an absent one are successes, reported through
//! the outcome enums rather than errors.

use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use super::{audit, require_account, require_active_account, EntitlementService};
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{AuditEntry, AuditKind, Device, DeviceRepository};

/// Longest accepted device id.
pub const MAX_DEVICE_ID_LEN: usize = 128;
/// Longest accepted device name after trimming.
pub const MAX_DEVICE_NAME_LEN: usize = 64;

/// Outcome of [`EntitlementService::add_device`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeviceOutcome {
    /// New device registered.
    Added { device: Device },
    /// Device was already registered; `last_seen_at` refreshed.
    AlreadyPresent { device: Device },
    /// Cap reached; nothing changed. Lists the devices the user may remove.
    LimitReached { devices: Vec<Device> },
}

impl DeviceOutcome {
    /// `LimitReached` as an error, the other variants as the device.
    pub fn into_result(self) -> ServiceResult<Device> {
        match self {
            DeviceOutcome::Added { device } | DeviceOutcome::AlreadyPresent { device } => Ok(device),
            DeviceOutcome::LimitReached { devices } => Err(ServiceError::LimitReached { devices }),
        }
    }
}

/// Outcome of [`EntitlementService::remove_device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RemoveOutcome {
    Removed,
    NotPresent,
}

fn validate_device_id(device_id: &str) -> ServiceResult<()> {
    let len = device_id.chars().count();
    if len == 0 || len > MAX_DEVICE_ID_LEN {
        return Err(ServiceError::InvalidInput(format!(
            "device id must be 1 to {MAX_DEVICE_ID_LEN} characters"
        )));
    }
    if device_id
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(ServiceError::InvalidInput(
            "device id must not contain whitespace".into(),
        ));
    }
    Ok(())
}

fn validate_device_name(name: &str) -> ServiceResult<String> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_DEVICE_NAME_LEN {
        return Err(ServiceError::InvalidInput(format!(
            "device name must be 1 to {MAX_DEVICE_NAME_LEN} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(ServiceError::InvalidInput(
            "device name must not contain control characters".into(),
        ));
    }
    Ok(name.to_string())
}

impl EntitlementService {
    /// Register a device against an account, enforcing the device cap.
    pub fn add_device(
        &self,
        account_id: &str,
        device_id: &str,
        name: &str,
    ) -> ServiceResult<DeviceOutcome> {
        validate_device_id(device_id)?;
        let name = validate_device_name(name)?;
        let max_devices = self.config().max_devices;

        let ctx = self.ctx();
        let handle = self.locks().handle(account_id);
        let _guard = ctx.write(&handle)?;
        let now = self.now();

        let outcome = self.store().transaction(|txn| {
            require_active_account(&*txn, account_id)?;

            if let Some(mut device) = DeviceRepository::get(&*txn, account_id, device_id)? {
                device.last_seen_at = device.last_seen_at.max(now);
                DeviceRepository::put(txn, account_id, &device)?;
                ctx.checkpoint()?;
                return Ok(DeviceOutcome::AlreadyPresent { device });
            }

            let devices = DeviceRepository::list(&*txn, account_id)?;
            if devices.len() >= max_devices {
                audit(
                    txn,
                    now,
                    AuditEntry::new(AuditKind::DeviceLimitReached)
                        .with_account(account_id)
                        .with_detail(json!({
                            "device_id": device_id,
                            "registered": devices.len(),
                            "max_devices": max_devices,
                        })),
                )?;
                ctx.checkpoint()?;
                return Ok(DeviceOutcome::LimitReached { devices });
            }

            let device = Device {
                device_id: device_id.to_string(),
                name: name.clone(),
                first_seen_at: now,
                last_seen_at: now,
            };
            DeviceRepository::put(txn, account_id, &device)?;
            audit(
                txn,
                now,
                AuditEntry::new(AuditKind::DeviceAdded)
                    .with_account(account_id)
                    .with_detail(json!({ "device_id": device_id, "name": name })),
            )?;
            ctx.checkpoint()?;
            Ok::<_, ServiceError>(DeviceOutcome::Added { device })
        })?;

        match &outcome {
            DeviceOutcome::Added { .. } => {
                tracing::info!(account_id, device_id, "Device added")
            }
            DeviceOutcome::AlreadyPresent { .. } => {
                tracing::debug!(account_id, device_id, "Device already registered")
            }
            DeviceOutcome::LimitReached { devices } => {
                tracing::warn!(account_id, device_id, registered = devices.len(), "Device limit reached")
            }
        }
        Ok(outcome)
    }

    /// Remove a device. Removing an absent device is a success.
    pub fn remove_device(&self, account_id: &str, device_id: &str) -> ServiceResult<RemoveOutcome> {
        let ctx = self.ctx();
        let handle = self.locks().handle(account_id);
        let _guard = ctx.write(&handle)?;
        let now = self.now();

        let outcome = self.store().transaction(|txn| {
            require_account(&*txn, account_id)?;
            if !DeviceRepository::delete(txn, account_id, device_id)? {
                return Ok(RemoveOutcome::NotPresent);
            }
            audit(
                txn,
                now,
                AuditEntry::new(AuditKind::DeviceRemoved)
                    .with_account(account_id)
                    .with_detail(json!({ "device_id": device_id })),
            )?;
            ctx.checkpoint()?;
            Ok::<_, ServiceError>(RemoveOutcome::Removed)
        })?;

        if outcome == RemoveOutcome::Removed {
            tracing::info!(account_id, device_id, "Device removed");
        }
        Ok(outcome)
    }

    /// Devices ordered by `first_seen_at`, then `device_id`.
    pub fn list_devices(&self, account_id: &str) -> ServiceResult<Vec<Device>> {
        let ctx = self.ctx();
        let handle = self.locks().handle(account_id);
        let _guard = ctx.read(&handle)?;

        let snapshot = self.store().snapshot()?;
        require_account(&snapshot, account_id)?;
        Ok(DeviceRepository::list(&snapshot, account_id)?)
    }

    pub fn is_at_limit(&self, account_id: &str) -> ServiceResult<bool> {
        let ctx = self.ctx();
        let handle = self.locks().handle(account_id);
        let _guard = ctx.read(&handle)?;

        let snapshot = self.store().snapshot()?;
        require_account(&snapshot, account_id)?;
        Ok(DeviceRepository::count(&snapshot, account_id)? >= self.config().max_devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_validation() {
        assert!(validate_device_id("d1").is_ok());
        assert!(validate_device_id("").is_err());
        assert!(validate_device_id("has space").is_err());
        assert!(validate_device_id(&"x".repeat(MAX_DEVICE_ID_LEN)).is_ok());
        assert!(validate_device_id(&"x".repeat(MAX_DEVICE_ID_LEN + 1)).is_err());
    }

    #[test]
    fn device_name_is_trimmed() {
        assert_eq!(validate_device_name("  Phone ").unwrap(), "Phone");
        assert!(validate_device_name("   ").is_err());
        assert!(validate_device_name(&"n".repeat(MAX_DEVICE_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn limit_reached_converts_to_error() {
        let outcome = DeviceOutcome::LimitReached { devices: vec![] };
        assert!(matches!(
            outcome.into_result(),
            Err(ServiceError::LimitReached { .. })
        ));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let value = serde_json::to_value(DeviceOutcome::LimitReached { devices: vec![] }).unwrap();
        assert_eq!(value["outcome"], "limit_reached");
        assert!(value["devices"].is_array());
    }
}
