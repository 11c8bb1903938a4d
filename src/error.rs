// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Service error taxonomy and its HTTP rendering.
//!
//! [`ServiceError`] is what every service operation returns; its
//! [`ErrorKind`] decides the recovery policy. [`ApiError`] is the JSON body
//! the HTTP surface sends back. Neither ever carries a password, session
//! token or license code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::service::Device;
use crate::storage::StoreError;

/// Recovery class of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed email, password, device id or code shape.
    InvalidInput,
    /// Referenced account or key is absent.
    NotFound,
    /// AlreadyExists / AlreadyUsed.
    Conflict,
    /// LimitReached / Locked / Revoked / Disabled.
    PreconditionFailed,
    /// Transient I/O fault; retry with backoff.
    StorageUnavailable,
    /// Audit append failed; the enclosing transaction was aborted.
    AuditUnavailable,
    /// Deadline exceeded or caller went away; state unchanged.
    Timeout,
    /// Missing capability or bad credentials.
    Unauthorized,
    /// Too many attempts from one origin.
    RateLimited,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("password does not meet policy: {0}")]
    WeakPassword(String),

    #[error("account not found")]
    AccountNotFound,

    #[error("license key not found")]
    KeyNotFound,

    #[error("an account with this email already exists")]
    AlreadyExists,

    #[error("license key has already been used")]
    KeyAlreadyUsed,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is locked until {until}")]
    Locked { until: DateTime<Utc> },

    #[error("account is disabled")]
    AccountDisabled,

    #[error("device limit reached ({} registered)", devices.len())]
    LimitReached { devices: Vec<Device> },

    #[error("license key has been revoked")]
    KeyRevoked,

    #[error("license code checksum failed")]
    ChecksumFailed,

    #[error("too many attempts, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("operation requires an admin capability")]
    Unauthorized,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("audit log unavailable: {0}")]
    AuditUnavailable(String),

    #[error("operation deadline exceeded")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::StorageUnavailable(err.to_string())
    }
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidInput(_)
            | ServiceError::WeakPassword(_)
            | ServiceError::ChecksumFailed => ErrorKind::InvalidInput,
            ServiceError::AccountNotFound | ServiceError::KeyNotFound => ErrorKind::NotFound,
            ServiceError::AlreadyExists | ServiceError::KeyAlreadyUsed => ErrorKind::Conflict,
            ServiceError::Locked { .. }
            | ServiceError::AccountDisabled
            | ServiceError::LimitReached { .. }
            | ServiceError::KeyRevoked => ErrorKind::PreconditionFailed,
            ServiceError::InvalidCredentials | ServiceError::Unauthorized => {
                ErrorKind::Unauthorized
            }
            ServiceError::RateLimited { .. } => ErrorKind::RateLimited,
            ServiceError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            ServiceError::AuditUnavailable(_) => ErrorKind::AuditUnavailable,
            ServiceError::Timeout | ServiceError::Cancelled => ErrorKind::Timeout,
        }
    }

    /// Whether the caller may retry the same call later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StorageUnavailable | ErrorKind::Timeout | ErrorKind::RateLimited
        )
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::WeakPassword(_) => "weak_password",
            ServiceError::AccountNotFound => "account_not_found",
            ServiceError::KeyNotFound => "key_not_found",
            ServiceError::AlreadyExists => "already_exists",
            ServiceError::KeyAlreadyUsed => "already_used",
            ServiceError::InvalidCredentials => "invalid_credentials",
            ServiceError::Locked { .. } => "locked",
            ServiceError::AccountDisabled => "account_disabled",
            ServiceError::LimitReached { .. } => "limit_reached",
            ServiceError::KeyRevoked => "revoked",
            ServiceError::ChecksumFailed => "checksum_failed",
            ServiceError::RateLimited { .. } => "rate_limited",
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::StorageUnavailable(_) => "storage_unavailable",
            ServiceError::AuditUnavailable(_) => "audit_unavailable",
            ServiceError::Timeout => "timeout",
            ServiceError::Cancelled => "cancelled",
        }
    }

    /// Short message a client can show to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            ServiceError::WeakPassword(_) => {
                "Choose a longer, less common password (at least 10 characters)."
            }
            ServiceError::AlreadyExists => "An account with this email already exists.",
            ServiceError::InvalidCredentials => "Email or password is incorrect.",
            ServiceError::Locked { .. } => {
                "Too many failed sign-in attempts. Try again in 15 minutes."
            }
            ServiceError::AccountDisabled => "This account has been disabled.",
            ServiceError::LimitReached { .. } => {
                "This account already has the maximum number of devices. Remove one to continue."
            }
            ServiceError::KeyNotFound => "This license key is not recognised.",
            ServiceError::KeyAlreadyUsed => "This license key has already been used.",
            ServiceError::KeyRevoked => "This license key is no longer valid.",
            ServiceError::ChecksumFailed => "This license key looks mistyped. Check it and try again.",
            _ => match self.kind() {
                ErrorKind::InvalidInput => "Some of the information entered is not valid.",
                ErrorKind::NotFound => "The requested item was not found.",
                ErrorKind::Conflict => "This request conflicts with existing data.",
                ErrorKind::PreconditionFailed => "This action is not possible right now.",
                ErrorKind::StorageUnavailable | ErrorKind::AuditUnavailable => {
                    "The service is temporarily unavailable. Please try again."
                }
                ErrorKind::Timeout => "The request took too long. Please try again.",
                ErrorKind::Unauthorized => "You are not allowed to do this.",
                ErrorKind::RateLimited => "Too many attempts. Please wait and try again.",
            },
        }
    }
}

// =============================================================================
// HTTP rendering
// =============================================================================

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ServiceError::Unauthorized => StatusCode::FORBIDDEN,
            ServiceError::LimitReached { .. } => StatusCode::CONFLICT,
            ServiceError::Locked { .. } => StatusCode::LOCKED,
            _ => match err.kind() {
                ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
                ErrorKind::StorageUnavailable | ErrorKind::AuditUnavailable => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
                ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            },
        };

        let api = ApiError::new(status, err.error_code(), err.user_message());
        match err {
            ServiceError::LimitReached { devices } => {
                api.with_details(serde_json::json!({ "devices": devices }))
            }
            ServiceError::RateLimited { retry_after_secs } => {
                api.with_details(serde_json::json!({ "retry_after_secs": retry_after_secs }))
            }
            ServiceError::Locked { until } => {
                api.with_details(serde_json::json!({ "locked_until": until }))
            }
            _ => api,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code,
            details: self.details,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(ServiceError::AlreadyExists.kind(), ErrorKind::Conflict);
        assert_eq!(ServiceError::KeyAlreadyUsed.kind(), ErrorKind::Conflict);
        assert_eq!(ServiceError::KeyRevoked.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(
            ServiceError::LimitReached { devices: vec![] }.kind(),
            ErrorKind::PreconditionFailed
        );
        assert_eq!(ServiceError::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(ServiceError::Cancelled.kind(), ErrorKind::Timeout);
        assert_eq!(
            ServiceError::AuditUnavailable("x".into()).kind(),
            ErrorKind::AuditUnavailable
        );
    }

    #[test]
    fn retryable_only_for_transient_kinds() {
        assert!(ServiceError::StorageUnavailable("io".into()).is_retryable());
        assert!(ServiceError::Timeout.is_retryable());
        assert!(ServiceError::RateLimited { retry_after_secs: 5 }.is_retryable());
        assert!(!ServiceError::KeyAlreadyUsed.is_retryable());
        assert!(!ServiceError::AuditUnavailable("x".into()).is_retryable());
    }

    #[test]
    fn store_errors_become_storage_unavailable() {
        let err: ServiceError = StoreError::Corrupt("account:1".into()).into();
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
    }

    #[test]
    fn http_status_mapping() {
        let cases = [
            (ServiceError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (ServiceError::Unauthorized, StatusCode::FORBIDDEN),
            (ServiceError::AccountNotFound, StatusCode::NOT_FOUND),
            (ServiceError::AlreadyExists, StatusCode::CONFLICT),
            (ServiceError::KeyRevoked, StatusCode::PRECONDITION_FAILED),
            (ServiceError::Locked { until: Utc::now() }, StatusCode::LOCKED),
            (ServiceError::RateLimited { retry_after_secs: 1 }, StatusCode::TOO_MANY_REQUESTS),
            (ServiceError::StorageUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (ServiceError::Timeout, StatusCode::GATEWAY_TIMEOUT),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[tokio::test]
    async fn limit_reached_body_lists_devices() {
        let response = ApiError::from(ServiceError::LimitReached { devices: vec![] }).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "limit_reached");
        assert!(body["details"]["devices"].is_array());
    }

    #[test]
    fn messages_never_echo_secret_material() {
        let err = ServiceError::WeakPassword("found in common-password list".into());
        assert!(!ApiError::from(err).message.contains("hunter2"));
        assert!(!ServiceError::ChecksumFailed.to_string().contains('-'));
    }
}
