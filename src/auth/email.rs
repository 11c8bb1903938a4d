// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Email normalization.
//!
//! Every lookup and uniqueness check uses the normalized form, so
//! `Alice@X.com` and ` alice@x.com` name the same account.

use unicode_normalization::UnicodeNormalization;

/// Longest accepted address in bytes (RFC 5321 path limit).
pub const MAX_EMAIL_BYTES: usize = 254;

/// Trim, NFC-normalize and lowercase an email, then check its shape.
///
/// Returns a static reason on rejection; the input is never echoed.
pub fn normalize_email(raw: &str) -> Result<String, &'static str> {
    let email: String = raw.trim().nfc().collect::<String>().to_lowercase();

    if email.is_empty() {
        return Err("email is empty");
    }
    if email.len() > MAX_EMAIL_BYTES {
        return Err("email is too long");
    }
    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err("email contains whitespace");
    }

    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err("email must contain exactly one @");
    };
    if local.is_empty() {
        return Err("email local part is empty");
    }
    if domain.is_empty()
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.contains("..")
    {
        return Err("email domain is invalid");
    }

    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_and_trims() {
        assert_eq!(normalize_email("  Alice@X.com ").unwrap(), "alice@x.com");
        assert_eq!(
            normalize_email("Alice@X.com").unwrap(),
            normalize_email("alice@x.com").unwrap()
        );
    }

    #[test]
    fn applies_nfc() {
        // "e" + combining acute accent composes to U+00E9.
        let decomposed = "jose\u{0301}@example.com";
        let composed = "jos\u{00e9}@example.com";
        assert_eq!(normalize_email(decomposed).unwrap(), composed);
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in [
            "",
            "   ",
            "no-at-sign",
            "@x.com",
            "a@",
            "a@@x.com",
            "a@b@x.com",
            "a@localhost",
            "a@.x.com",
            "a@x.com.",
            "a@x..com",
            "a b@x.com",
        ] {
            assert!(normalize_email(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn rejects_overlong_addresses() {
        let long = format!("{}@x.com", "a".repeat(MAX_EMAIL_BYTES));
        assert_eq!(normalize_email(&long), Err("email is too long"));
    }
}
