// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Typed access to store entries.
//!
//! Repositories are stateless: reads take any [`KvRead`](super::KvRead)
//! (snapshot or write transaction), writes take a
//! [`StoreTxn`](super::StoreTxn), so callers decide the transaction scope.

pub mod accounts;
pub mod devices;
pub mod license_keys;
pub mod sessions;

pub use accounts::{AccountRecord, AccountRepository, LoginFailures};
pub use devices::{Device, DeviceRepository};
pub use license_keys::{KeyState, LicenseKeyRecord, LicenseKeyRepository};
pub use sessions::{token_digest, SessionRecord, SessionRepository};
