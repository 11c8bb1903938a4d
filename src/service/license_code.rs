// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! License code format.
//!
//! A code is 128 random bits in Crockford base32 (26 characters) followed by
//! a 4-character checksum over the body, printed as six dash-separated
//! groups of five:
//!
//! ```text
//! 7K3QF-0ZXMB-W9D2R-4HNTC-8PEVA-J6Y1S
//! ```
//!
//! Parsing is forgiving about the things people get wrong when typing a
//! code (case, dashes, spaces, `O`/`0`, `I`/`L`/`1`), and the checksum lets
//! a mistyped code be rejected before any store lookup.

use std::fmt;

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{ServiceError, ServiceResult};

/// Random bytes per code.
const ENTROPY_BYTES: usize = 16;
/// Base32 characters carrying the random part.
pub const BODY_LEN: usize = 26;
/// Base32 characters of checksum.
pub const CHECKSUM_LEN: usize = 4;
/// Canonical length (body + checksum, no separators).
pub const CODE_LEN: usize = BODY_LEN + CHECKSUM_LEN;
/// Characters per printed group.
const GROUP_LEN: usize = 5;

const CROCKFORD: &str = "0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// A license code in canonical form. Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct LicenseCode(String);

impl LicenseCode {
    /// Draw a fresh code from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; ENTROPY_BYTES]);
        OsRng.fill_bytes(&mut bytes[..]);
        let mut code = base32::encode(base32::Alphabet::Crockford, &bytes[..]);
        let check = checksum(&code);
        code.push_str(&check);
        Self(code)
    }

    /// Parse user input into a canonical code.
    ///
    /// Shape problems are `InvalidInput`; a well-formed code whose checksum
    /// does not match is `ChecksumFailed`.
    pub fn parse(input: &str) -> ServiceResult<Self> {
        let canonical: String = input
            .chars()
            .filter(|c| !matches!(c, '-' | ' '))
            .map(|c| match c.to_ascii_uppercase() {
                'O' => '0',
                'I' | 'L' => '1',
                other => other,
            })
            .collect();
        let canonical = Zeroizing::new(canonical);

        if canonical.len() != CODE_LEN {
            return Err(ServiceError::InvalidInput(format!(
                "license code must have {CODE_LEN} characters"
            )));
        }
        if !canonical.chars().all(|c| CROCKFORD.contains(c)) {
            return Err(ServiceError::InvalidInput(
                "license code contains invalid characters".into(),
            ));
        }

        let (body, check) = canonical.split_at(BODY_LEN);
        if checksum(body) != check {
            return Err(ServiceError::ChecksumFailed);
        }
        Ok(Self(canonical.as_str().to_owned()))
    }

    /// Canonical form used as the store key.
    pub fn canonical(&self) -> &str {
        &self.0
    }

    /// Short identifier safe for logs and audit records.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

/// Short SHA-256 fingerprint of a canonical code.
pub fn fingerprint(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(&digest[..4])
}

/// Dash-grouped printable form of a canonical code.
pub fn format_grouped(canonical: &str) -> String {
    canonical
        .as_bytes()
        .chunks(GROUP_LEN)
        .map(|group| String::from_utf8_lossy(group).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

fn checksum(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    let mut encoded = base32::encode(base32::Alphabet::Crockford, &digest[..3]);
    encoded.truncate(CHECKSUM_LEN);
    encoded
}

impl fmt::Display for LicenseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_grouped(&self.0))
    }
}

impl fmt::Debug for LicenseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LicenseCode({})", self.fingerprint())
    }
}
