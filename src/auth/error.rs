// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors raised by the request extractors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::ApiError;

#[derive(Debug)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Invalid authorization header format
    InvalidAuthHeader,
    /// Session token unknown or expired, or staff token wrong
    InvalidToken,
    /// Staff routes are disabled (no token configured)
    StaffDisabled,
    /// Authenticated, but the role is too weak
    InsufficientPermissions,
    /// Too many failed staff attempts from this origin
    RateLimited { retry_after_secs: u64 },
    /// Session lookup failed inside the service
    Service(ApiError),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::InvalidToken => "invalid_token",
            AuthError::StaffDisabled => "staff_disabled",
            AuthError::InsufficientPermissions => "insufficient_permissions",
            AuthError::RateLimited { .. } => "rate_limited",
            AuthError::Service(api) => api.code,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader | AuthError::InvalidAuthHeader | AuthError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::StaffDisabled | AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Service(api) => api.status,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Authorization header is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::InvalidToken => write!(f, "Token is invalid or expired"),
            AuthError::StaffDisabled => write!(f, "Staff access is not configured"),
            AuthError::InsufficientPermissions => {
                write!(f, "Insufficient permissions for this operation")
            }
            AuthError::RateLimited { retry_after_secs } => {
                write!(f, "Too many attempts; retry in {retry_after_secs}s")
            }
            AuthError::Service(api) => write!(f, "{}", api.message),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Service(api) = self {
            return api.into_response();
        }
        let details = match &self {
            AuthError::RateLimited { retry_after_secs } => {
                Some(serde_json::json!({ "retry_after_secs": retry_after_secs }))
            }
            _ => None,
        };
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code(),
            details,
        });
        (status, body).into_response()
    }
}
