// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key namespaces for the entry table.
//!
//! ```text
//! account:{account_id}                     AccountRecord
//! account_by_email:{email_folded}          account_id
//! device:{account_id}:{device_id}          DeviceRecord
//! key:{code}                               LicenseKeyRecord
//! account_key:{account_id}:{code}          activated-key index
//! session:{sha256(token)}                  SessionRecord
//! login_failures:{account_id}              LoginFailures
//! tier_seen:{account_id}                   last tier returned or granted
//! audit:{seq:020}                          AuditRecord
//! meta:audit_seq                           last audit sequence (u64 BE)
//! ```

/// Last assigned audit sequence number.
pub const AUDIT_SEQ: &str = "meta:audit_seq";

/// Prefix of every account record.
pub const ACCOUNT_PREFIX: &str = "account:";

/// Prefix of every audit record.
pub const AUDIT_PREFIX: &str = "audit:";

pub fn account(account_id: &str) -> String {
    format!("{ACCOUNT_PREFIX}{account_id}")
}

pub fn account_by_email(email_folded: &str) -> String {
    format!("account_by_email:{email_folded}")
}

pub fn device(account_id: &str, device_id: &str) -> String {
    format!("device:{account_id}:{device_id}")
}

/// Prefix covering every device of one account.
pub fn devices_of(account_id: &str) -> String {
    format!("device:{account_id}:")
}

pub fn license_key(code: &str) -> String {
    format!("key:{code}")
}

pub fn account_key(account_id: &str, code: &str) -> String {
    format!("account_key:{account_id}:{code}")
}

/// Prefix covering every activated key bound to one account.
pub fn account_keys_of(account_id: &str) -> String {
    format!("account_key:{account_id}:")
}

pub fn session(token_hash: &str) -> String {
    format!("session:{token_hash}")
}

pub fn login_failures(account_id: &str) -> String {
    format!("login_failures:{account_id}")
}

pub fn tier_seen(account_id: &str) -> String {
    format!("tier_seen:{account_id}")
}

/// Zero-padded so that key order equals sequence order.
pub fn audit(seq: u64) -> String {
    format!("{AUDIT_PREFIX}{seq:020}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_are_correct() {
        assert_eq!(account("a1"), "account:a1");
        assert_eq!(account_by_email("alice@x.com"), "account_by_email:alice@x.com");
        assert_eq!(device("a1", "d1"), "device:a1:d1");
        assert_eq!(license_key("ABC"), "key:ABC");
        assert_eq!(account_key("a1", "ABC"), "account_key:a1:ABC");
    }

    #[test]
    fn device_prefix_covers_only_one_account() {
        assert!(device("a1", "d1").starts_with(&devices_of("a1")));
        assert!(!device("a10", "d1").starts_with(&devices_of("a1")));
    }

    #[test]
    fn audit_keys_sort_numerically() {
        assert!(audit(9) < audit(10));
        assert!(audit(99) < audit(1_000));
        assert_eq!(audit(7), "audit:00000000000000000007");
    }

    #[test]
    fn account_prefix_does_not_match_email_index() {
        assert!(!account_by_email("a@x.com").starts_with(ACCOUNT_PREFIX));
    }
}
