// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated callers.
//!
//! ```rust,ignore
//! async fn list_devices(Auth(account): Auth, State(state): State<AppState>) { .. }
//! async fn issue_keys(AdminOnly(role): AdminOnly, State(state): State<AppState>) { .. }
//! ```

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use zeroize::Zeroizing;

use super::{AuthError, Role};
use crate::error::ServiceError;
use crate::state::AppState;

/// Origin used when the connection address is unknown (e.g. in tests).
const UNKNOWN_ORIGIN: &str = "unknown";

/// An account holder authenticated by session token.
#[derive(Clone)]
pub struct AuthenticatedAccount {
    pub account_id: String,
    /// Presented bearer token, kept for logout.
    pub session_token: Zeroizing<String>,
}

/// Requires `Authorization: Bearer <session token>`.
pub struct Auth(pub AuthenticatedAccount);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = Zeroizing::new(bearer_token(parts)?.to_string());
        let lookup = token.clone();
        let account_id = state
            .run(move |svc| svc.resolve_session(&lookup))
            .await
            .map_err(|err| match err.code {
                "invalid_credentials" => AuthError::InvalidToken,
                _ => AuthError::Service(err),
            })?;

        Ok(Auth(AuthenticatedAccount {
            account_id,
            session_token: token,
        }))
    }
}

/// Client address, used to key attempt throttles.
pub struct ClientOrigin(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientOrigin {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientOrigin(origin_of(parts)))
    }
}

/// Requires a staff bearer token (admin or support).
///
/// Failed attempts spend the origin's attempt quota like license
/// activation; once it is exhausted the origin is backed off.
pub struct Staff(pub Role);

impl FromRequestParts<AppState> for Staff {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let origin = origin_of(parts);
        if let Some(wait) = state.admin_throttle.blocked_for(&origin) {
            return Err(AuthError::RateLimited {
                retry_after_secs: wait.num_seconds().max(1) as u64,
            });
        }
        if !state.admin.is_enabled() {
            return Err(AuthError::StaffDisabled);
        }

        let token = bearer_token(parts)?;
        match state.admin.authorize(token) {
            Some(role) => Ok(Staff(role)),
            None => {
                tracing::warn!(%origin, "Rejected staff token");
                // Each failure spends one attempt; backoff starts once the
                // origin's quota is gone.
                match state.admin_throttle.check(&origin) {
                    Err(ServiceError::RateLimited { retry_after_secs }) => {
                        Err(AuthError::RateLimited { retry_after_secs })
                    }
                    _ => Err(AuthError::InvalidToken),
                }
            }
        }
    }
}

/// Requires the admin staff token.
pub struct AdminOnly(pub Role);

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Staff(role) = Staff::from_request_parts(parts, state).await?;
        role.require(Role::Admin).map_err(|err| match err {
            ServiceError::Unauthorized => AuthError::InsufficientPermissions,
            other => AuthError::Service(other.into()),
        })?;
        Ok(AdminOnly(role))
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

fn origin_of(parts: &Parts) -> String {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{self, ADMIN_TOKEN, SUPPORT_TOKEN};
    use axum::http::Request;

    fn parts_with(auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/test");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn auth_extractor_requires_auth_header() {
        let state = test_support::state();
        let result = Auth::from_request_parts(&mut parts_with(None), &state).await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));

        let result = Auth::from_request_parts(&mut parts_with(Some("Basic abc")), &state).await;
        assert!(matches!(result, Err(AuthError::InvalidAuthHeader)));
    }

    #[tokio::test]
    async fn auth_extractor_resolves_session() {
        let state = test_support::state();
        let session = state
            .run(|svc| {
                svc.register_account("ext@x.com", "correct-horse-battery")?;
                svc.authenticate("ext@x.com", "correct-horse-battery")
            })
            .await
            .ok()
            .unwrap();

        let header = format!("Bearer {}", session.token.as_str());
        let Auth(account) = Auth::from_request_parts(&mut parts_with(Some(&header)), &state)
            .await
            .unwrap();
        assert_eq!(account.account_id, session.account.account_id);

        let result = Auth::from_request_parts(&mut parts_with(Some("Bearer nope")), &state).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn staff_roles_from_tokens() {
        let state = test_support::state();
        let admin = format!("Bearer {ADMIN_TOKEN}");
        let support = format!("Bearer {SUPPORT_TOKEN}");

        let Staff(role) = Staff::from_request_parts(&mut parts_with(Some(&admin)), &state)
            .await
            .unwrap();
        assert_eq!(role, Role::Admin);

        let Staff(role) = Staff::from_request_parts(&mut parts_with(Some(&support)), &state)
            .await
            .unwrap();
        assert_eq!(role, Role::Support);

        let result = AdminOnly::from_request_parts(&mut parts_with(Some(&support)), &state).await;
        assert!(matches!(result, Err(AuthError::InsufficientPermissions)));
    }

    #[tokio::test]
    async fn one_wrong_staff_token_does_not_lock_out_the_origin() {
        let state = test_support::state();
        let result = Staff::from_request_parts(&mut parts_with(Some("Bearer guess")), &state).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));

        let admin = format!("Bearer {ADMIN_TOKEN}");
        let Staff(role) = Staff::from_request_parts(&mut parts_with(Some(&admin)), &state)
            .await
            .unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[tokio::test]
    async fn repeated_wrong_staff_tokens_are_throttled() {
        let state = test_support::state();
        let per_minute = state.service.config().activation.per_minute;
        for _ in 0..per_minute {
            let result =
                Staff::from_request_parts(&mut parts_with(Some("Bearer guess")), &state).await;
            assert!(matches!(result, Err(AuthError::InvalidToken)));
        }

        let result = Staff::from_request_parts(&mut parts_with(Some("Bearer guess")), &state).await;
        assert!(matches!(result, Err(AuthError::RateLimited { .. })));

        let admin = format!("Bearer {ADMIN_TOKEN}");
        let result = Staff::from_request_parts(&mut parts_with(Some(&admin)), &state).await;
        assert!(matches!(result, Err(AuthError::RateLimited { .. })));
    }
}
