// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Staff bearer tokens.
//!
//! Admin and support routes authenticate with a static bearer secret from the
//! environment. Presented tokens are compared through HMAC-SHA256 under a
//! per-process random key, so the comparison is constant time regardless of
//! the token's length.

use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::Role;

type HmacSha256 = Hmac<Sha256>;

/// Staff token registry.
pub struct AdminCapability {
    key: Zeroizing<[u8; 32]>,
    tokens: Vec<(Role, Vec<u8>)>,
}

impl AdminCapability {
    /// A registry that accepts nothing until tokens are added.
    pub fn new() -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut key[..]);
        Self {
            key,
            tokens: Vec::new(),
        }
    }

    /// Accept `secret` as a bearer token for `role`.
    pub fn with_token(mut self, role: Role, secret: &str) -> Self {
        if let Some(tag) = self.tag(secret) {
            self.tokens.push((role, tag));
        }
        self
    }

    /// Whether any staff token is configured.
    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Role granted by `presented`, if it matches a configured token.
    ///
    /// Every configured token is checked, so timing does not reveal which
    /// one matched.
    pub fn authorize(&self, presented: &str) -> Option<Role> {
        let mut granted = None;
        for (role, tag) in &self.tokens {
            let Ok(mut mac) = HmacSha256::new_from_slice(&self.key[..]) else {
                return None;
            };
            mac.update(presented.as_bytes());
            if mac.verify_slice(tag).is_ok() && granted.is_none() {
                granted = Some(*role);
            }
        }
        granted
    }

    fn tag(&self, secret: &str) -> Option<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.key[..]).ok()?;
        mac.update(secret.as_bytes());
        Some(mac.finalize().into_bytes().to_vec())
    }
}

impl Default for AdminCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_token_grants_its_role() {
        let capability = AdminCapability::new()
            .with_token(Role::Admin, "admin-secret")
            .with_token(Role::Support, "support-secret");
        assert!(capability.is_enabled());
        assert_eq!(capability.authorize("admin-secret"), Some(Role::Admin));
        assert_eq!(capability.authorize("support-secret"), Some(Role::Support));
    }

    #[test]
    fn other_tokens_are_rejected() {
        let capability = AdminCapability::new().with_token(Role::Admin, "admin-secret");
        assert_eq!(capability.authorize("admin-secreT"), None);
        assert_eq!(capability.authorize(""), None);
        assert_eq!(capability.authorize("admin-secret-and-more"), None);
    }

    #[test]
    fn empty_registry_accepts_nothing() {
        let capability = AdminCapability::default();
        assert!(!capability.is_enabled());
        assert_eq!(capability.authorize("anything"), None);
    }
}
