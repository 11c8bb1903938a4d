// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Caller roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ServiceError, ServiceResult};

/// Caller roles for authorization.
///
/// ## Role Hierarchy
///
/// - `Admin` - License issuance and revocation, account administration
/// - `Support` - Read-only license status lookups
/// - `Client` - An authenticated account acting on itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access
    Admin,
    /// Support staff (read-only key status)
    Support,
    /// Account holder
    Client,
}

impl Role {
    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        match (self, required) {
            // Admin can do anything
            (Role::Admin, _) => true,
            // Support can do Support things
            (Role::Support, Role::Support) => true,
            (Role::Client, Role::Client) => true,
            _ => false,
        }
    }

    /// `Unauthorized` unless this role carries `required`.
    pub fn require(&self, required: Role) -> ServiceResult<()> {
        if self.has_privilege(required) {
            Ok(())
        } else {
            Err(ServiceError::Unauthorized)
        }
    }
}

impl Default for Role {
    /// Default role is Client (least privilege).
    fn default() -> Self {
        Role::Client
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Support => write!(f, "support"),
            Role::Client => write!(f, "client"),
        }
    }
}
