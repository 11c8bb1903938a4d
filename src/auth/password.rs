// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password policy and Argon2id hashing.
//!
//! Hashes are stored as PHC strings, so the cost parameters travel with each
//! hash and verification keeps working after the configured cost changes.

use std::time::{Duration, Instant};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// Longest accepted password in bytes; bounds hashing work per request.
pub const MAX_PASSWORD_BYTES: usize = 1024;

/// Upper bound for [`PasswordHashCost::calibrate`].
const MAX_CALIBRATED_ITERATIONS: u32 = 10;

/// Lowercase entries; comparison folds the candidate first.
const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password12",
    "password123",
    "password1234",
    "passw0rd",
    "123456",
    "12345678",
    "123456789",
    "1234567890",
    "12345678910",
    "0123456789",
    "1q2w3e4r5t",
    "1qaz2wsx3edc",
    "qwerty",
    "qwertyuiop",
    "qwerty12345",
    "qwerty123456",
    "asdfghjkl",
    "asdfghjkl1",
    "zxcvbnm123",
    "iloveyou",
    "iloveyou123",
    "letmein",
    "letmein123",
    "welcome",
    "welcome123",
    "welcome1234",
    "administrator",
    "admin12345",
    "changeme",
    "changeme123",
    "football123",
    "baseball123",
    "sunshine123",
    "princess123",
    "trustno1trustno1",
    "superman123",
    "starwars123",
    "whatever123",
    "0000000000",
    "1111111111",
    "aaaaaaaaaa",
    "abcdefghij",
    "abcdefg123",
    "accessmate",
    "accessmate1",
    "accessmate123",
];

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("invalid hash parameters: {0}")]
    Params(String),

    #[error("hashing failed: {0}")]
    Hash(String),

    #[error("stored hash is malformed: {0}")]
    MalformedHash(String),
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHashCost {
    /// Memory in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashCost {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl PasswordHashCost {
    fn hasher(&self) -> Result<Argon2<'static>, PasswordError> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| PasswordError::Params(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Raise the iteration count until one hash takes at least `target`
    /// on this machine (about 250 ms is the usual goal).
    pub fn calibrate(target: Duration) -> Self {
        let mut cost = Self::default();
        while cost.iterations < MAX_CALIBRATED_ITERATIONS {
            let started = Instant::now();
            if hash_password("calibration-probe", &cost).is_err() {
                return Self::default();
            }
            if started.elapsed() >= target {
                break;
            }
            cost.iterations += 1;
        }
        tracing::info!(
            memory_kib = cost.memory_kib,
            iterations = cost.iterations,
            parallelism = cost.parallelism,
            "Calibrated password hash cost"
        );
        cost
    }
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str, cost: &PasswordHashCost) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    cost.hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Verify a password against a stored PHC string in constant time.
///
/// Returns `Ok(false)` on mismatch and an error only when the stored hash
/// cannot be parsed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::MalformedHash(e.to_string())),
    }
}

/// Check a candidate password against the registration policy.
///
/// Returns the reason for rejection. The reason never contains the password.
pub fn check_policy(password: &str, email: &str, min_length: usize) -> Result<(), &'static str> {
    if password.chars().count() < min_length {
        return Err("password is too short");
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err("password is too long");
    }
    let folded = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&folded.as_str()) {
        return Err("password is too common");
    }
    if let Some((local, _)) = email.split_once('@') {
        if !local.is_empty() && folded == local.to_lowercase() {
            return Err("password must not match the email address");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> PasswordHashCost {
        PasswordHashCost {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn correct_password_matches() {
        let hash = hash_password("correct-horse-battery", &cheap()).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct-horse-battery", &hash).unwrap());
    }

    #[test]
    fn wrong_password_does_not_match() {
        let hash = hash_password("correct-horse-battery", &cheap()).unwrap();
        assert!(!verify_password("correct-horse-batterz", &hash).unwrap());
    }

    #[test]
    fn salts_differ_between_hashes() {
        let a = hash_password("correct-horse-battery", &cheap()).unwrap();
        let b = hash_password("correct-horse-battery", &cheap()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_returns_error() {
        assert!(verify_password("pw", "not-a-hash").is_err());
    }

    #[test]
    fn invalid_params_are_rejected() {
        let cost = PasswordHashCost {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(matches!(
            hash_password("correct-horse-battery", &cost),
            Err(PasswordError::Params(_))
        ));
    }

    #[test]
    fn policy_enforces_length() {
        assert_eq!(check_policy("short", "a@x.com", 10), Err("password is too short"));
        assert!(check_policy("correct-horse-battery", "a@x.com", 10).is_ok());
        let long = "x".repeat(MAX_PASSWORD_BYTES + 1);
        assert_eq!(check_policy(&long, "a@x.com", 10), Err("password is too long"));
    }

    #[test]
    fn policy_rejects_common_passwords_case_insensitively() {
        assert_eq!(
            check_policy("Password123", "a@x.com", 10),
            Err("password is too common")
        );
        assert_eq!(
            check_policy("QWERTYUIOP", "a@x.com", 10),
            Err("password is too common")
        );
    }

    #[test]
    fn policy_rejects_email_local_part() {
        assert_eq!(
            check_policy("alice.smith", "alice.smith@x.com", 10),
            Err("password must not match the email address")
        );
    }

    #[test]
    fn calibrate_stops_once_target_is_met() {
        let cost = PasswordHashCost::calibrate(Duration::ZERO);
        assert_eq!(cost, PasswordHashCost::default());
    }
}
