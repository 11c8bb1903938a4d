// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! AccessMate Entitlements - Account & Device Entitlement Service
//!
//! Decides which AccessMate features a signed-in account may use: the
//! per-account device cap, the purchase flag, the trial window and
//! single-use license keys. Every state change is recorded in an
//! append-only audit log inside the same store transaction.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Credentials, staff capability and request extractors
//! - `cli` - Admin command line
//! - `service` - Registry, device ledger, entitlement engine, license vault
//! - `storage` - Transactional key-value store (redb) and audit log

pub mod api;
pub mod auth;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod service;
pub mod state;
pub mod storage;
