// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API. Domain types returned by the
//! service ([`Account`], [`Device`], [`Entitlement`], [`KeyStatus`]) are
//! serialized as-is; this module only adds the transport wrappers.
//!
//! Request bodies carrying a password or license code are wiped from memory
//! when dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::service::{Account, Entitlement, Gating, KeyStatus};
use crate::storage::AuditRecord;

// =============================================================================
// Accounts & Sessions
// =============================================================================

/// Request to create an account.
#[derive(Deserialize, ToSchema, Zeroize, ZeroizeOnDrop)]
pub struct RegisterRequest {
    /// Email address (normalized server-side)
    pub email: String,
    /// At least 10 characters, not a common password
    pub password: String,
}

/// Request to sign in.
#[derive(Deserialize, ToSchema, Zeroize, ZeroizeOnDrop)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// A freshly opened session.
#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub account: Account,
    /// Bearer token for client routes; shown once.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Devices
// =============================================================================

/// Request to register the calling device.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AddDeviceRequest {
    /// Client-generated stable identifier
    pub device_id: String,
    /// Human-readable label, e.g. "Phone"
    pub name: String,
}

/// Response for the device list.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceListResponse {
    pub devices: Vec<crate::service::Device>,
    /// Configured cap
    pub max_devices: usize,
    pub at_limit: bool,
}

// =============================================================================
// Entitlement
// =============================================================================

/// Entitlement plus the derived client visibility flags.
#[derive(Debug, Serialize, ToSchema)]
pub struct EntitlementResponse {
    #[serde(flatten)]
    pub entitlement: Entitlement,
    pub gating: Gating,
}

impl From<Entitlement> for EntitlementResponse {
    fn from(entitlement: Entitlement) -> Self {
        let gating = entitlement.gating();
        Self {
            entitlement,
            gating,
        }
    }
}

// =============================================================================
// License Keys
// =============================================================================

/// Request to redeem a license key.
#[derive(Deserialize, ToSchema, Zeroize, ZeroizeOnDrop)]
pub struct ActivateLicenseRequest {
    /// Code as printed; case, dashes and spaces are ignored
    pub code: String,
}

/// Admin request to mint keys.
#[derive(Debug, Deserialize, ToSchema)]
pub struct IssueLicensesRequest {
    /// 1 to 1000
    pub count: usize,
    /// Optional batch tag (`[A-Za-z0-9._-]{1,64}`)
    #[serde(default)]
    pub batch_tag: Option<String>,
}

/// Newly minted codes.
#[derive(Serialize, ToSchema)]
pub struct IssueLicensesResponse {
    pub batch_tag: String,
    pub codes: Vec<String>,
}

/// Admin request to revoke a key.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeLicenseRequest {
    pub reason: String,
}

/// Query for the batch resend listing.
#[derive(Debug, Deserialize, IntoParams)]
pub struct BatchQuery {
    pub batch_tag: String,
}

/// Keys of one batch.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchResponse {
    pub batch_tag: String,
    pub keys: Vec<KeyStatus>,
}

// =============================================================================
// Admin
// =============================================================================

/// Admin request carrying only a reason.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReasonRequest {
    pub reason: String,
}

/// Query parameters for audit reads.
#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditQueryParams {
    /// Only records about this account
    pub account_id: Option<String>,
    /// Only records with a greater sequence number
    #[serde(default)]
    pub after: u64,
    /// Maximum number of records (default 100, max 1000)
    pub limit: Option<usize>,
}

/// Response for audit reads.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub records: Vec<AuditRecord>,
    /// Sequence number to pass as `after` for the next page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_after: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Tier;
    use std::collections::BTreeSet;

    #[test]
    fn entitlement_response_flattens_tier() {
        let response = EntitlementResponse::from(Entitlement {
            tier: Tier::Trial,
            trial_days_remaining: Some(3),
            sources: BTreeSet::new(),
        });
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["tier"], "TRIAL");
        assert_eq!(value["trial_days_remaining"], 3);
        assert_eq!(value["gating"]["show_trial_countdown"], true);
    }

    #[test]
    fn issue_request_tag_is_optional() {
        let request: IssueLicensesRequest = serde_json::from_str(r#"{"count": 5}"#).unwrap();
        assert_eq!(request.count, 5);
        assert!(request.batch_tag.is_none());
    }
}
