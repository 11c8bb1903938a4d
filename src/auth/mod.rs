// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Credentials and caller identity for the entitlement service.
//!
//! ## Auth Flow
//!
//! 1. A client registers (`POST /v1/accounts`) and signs in
//!    (`POST /v1/sessions`), receiving an opaque session token
//! 2. Client requests send `Authorization: Bearer <session token>`;
//!    the [`Auth`] extractor resolves it to an account id
//! 3. Staff requests send `Authorization: Bearer <ADMIN_TOKEN>` (or
//!    `SUPPORT_TOKEN`); [`Staff`] and [`AdminOnly`] map it to a [`Role`]
//!
//! ## Security
//!
//! - Passwords are hashed with Argon2id ([`password`]); only the PHC string
//!   is stored
//! - Session tokens are 256-bit random; only their SHA-256 is stored
//! - Staff tokens are compared in constant time ([`admin`]) and failed
//!   attempts are throttled per origin

pub mod admin;
pub mod email;
pub mod error;
pub mod extractor;
pub mod password;
pub mod roles;

pub use admin::AdminCapability;
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth, AuthenticatedAccount, ClientOrigin, Staff};
pub use roles::Role;
