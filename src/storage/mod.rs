// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Durable state of the entitlement service: a single redb file holding
//! accounts, devices, license keys, sessions and the audit log.
//!
//! ## Layout
//!
//! - [`store`]: transactional key-value store (the only component doing I/O)
//! - [`keys`]: key namespaces
//! - [`repository`]: typed records on top of the store
//! - [`audit`]: append-only audit log written inside mutation transactions
//!
//! ## Important Notes
//!
//! - Multi-key updates always go through [`Store::transaction`]
//! - Audit appends share the mutation's transaction; an append failure
//!   aborts the mutation

pub mod audit;
pub mod keys;
pub mod repository;
pub mod store;

pub use audit::{ArchiveSummary, AuditEntry, AuditError, AuditKind, AuditLog, AuditRecord};
pub use repository::{
    AccountRecord, AccountRepository, Device, DeviceRepository, KeyState, LicenseKeyRecord,
    LicenseKeyRepository, LoginFailures, SessionRecord, SessionRepository,
};
pub use store::{KvRead, Store, StoreError, StoreResult, StoreSnapshot, StoreTxn};
