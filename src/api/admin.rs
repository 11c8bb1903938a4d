// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Staff API endpoints.
//!
//! These endpoints require a staff bearer token and provide:
//! - License key issuance, lookup, revocation and batch resend
//! - Account disabling and purchase reversal
//! - Audit log reads

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    auth::{AdminOnly, Staff},
    error::ApiError,
    models::{
        AuditLogResponse, AuditQueryParams, BatchQuery, BatchResponse, IssueLicensesRequest,
        IssueLicensesResponse, ReasonRequest, RevokeLicenseRequest,
    },
    service::{Account, KeyStatus},
    state::AppState,
};

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;

// ============================================================================
// License keys
// ============================================================================

/// Mint a batch of license keys. Admin only.
#[utoipa::path(
    post,
    path = "/v1/admin/licenses",
    request_body = IssueLicensesRequest,
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Keys issued", body = IssueLicensesResponse),
        (status = 400, description = "Count or tag out of range"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn issue_licenses(
    AdminOnly(role): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<IssueLicensesRequest>,
) -> Result<(StatusCode, Json<IssueLicensesResponse>), ApiError> {
    let count = request.count;
    let tag = request.batch_tag.clone();
    let codes = state
        .run(move |svc| svc.issue_license_keys(role, count, tag.as_deref()))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(IssueLicensesResponse {
            batch_tag: request
                .batch_tag
                .unwrap_or_else(|| crate::service::vault::DEFAULT_BATCH_TAG.to_string()),
            codes: codes.iter().map(ToString::to_string).collect(),
        }),
    ))
}

/// Look up a license key. Support or admin.
#[utoipa::path(
    get,
    path = "/v1/admin/licenses/{code}",
    params(("code" = String, Path, description = "License code, dashes optional")),
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = KeyStatus),
        (status = 404, description = "Unknown code")
    )
)]
pub async fn key_status(
    Staff(role): Staff,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<KeyStatus>, ApiError> {
    let status = state.run(move |svc| svc.key_status(role, &code)).await?;
    Ok(Json(status))
}

/// Revoke a license key. Admin only; revoking twice is a no-op.
#[utoipa::path(
    post,
    path = "/v1/admin/licenses/{code}/revoke",
    params(("code" = String, Path, description = "License code, dashes optional")),
    request_body = RevokeLicenseRequest,
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Key revoked", body = KeyStatus),
        (status = 404, description = "Unknown code")
    )
)]
pub async fn revoke_license(
    AdminOnly(role): AdminOnly,
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<RevokeLicenseRequest>,
) -> Result<Json<KeyStatus>, ApiError> {
    let status = state
        .run(move |svc| svc.revoke_license_key(role, &code, &request.reason))
        .await?;
    Ok(Json(status))
}

/// Full codes of a batch, for resending. Admin only.
#[utoipa::path(
    get,
    path = "/v1/admin/licenses",
    params(BatchQuery),
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses((status = 200, body = BatchResponse))
)]
pub async fn list_batch(
    AdminOnly(role): AdminOnly,
    State(state): State<AppState>,
    Query(query): Query<BatchQuery>,
) -> Result<Json<BatchResponse>, ApiError> {
    let tag = query.batch_tag.clone();
    let keys = state.run(move |svc| svc.list_batch(role, &tag)).await?;
    Ok(Json(BatchResponse {
        batch_tag: query.batch_tag,
        keys,
    }))
}

// ============================================================================
// Accounts
// ============================================================================

/// Disable an account. Admin only.
#[utoipa::path(
    post,
    path = "/v1/admin/accounts/{account_id}/disable",
    params(("account_id" = String, Path, description = "Account identifier")),
    request_body = ReasonRequest,
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = Account),
        (status = 404, description = "Unknown account")
    )
)]
pub async fn disable_account(
    AdminOnly(role): AdminOnly,
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(request): Json<ReasonRequest>,
) -> Result<Json<Account>, ApiError> {
    let account = state
        .run(move |svc| svc.disable_account(role, &account_id, &request.reason))
        .await?;
    Ok(Json(account))
}

/// Reverse a recorded purchase (refund or chargeback). Admin only.
#[utoipa::path(
    post,
    path = "/v1/admin/accounts/{account_id}/revoke-purchase",
    params(("account_id" = String, Path, description = "Account identifier")),
    request_body = ReasonRequest,
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Purchase flag cleared (or was not set)"),
        (status = 404, description = "Unknown account")
    )
)]
pub async fn revoke_purchase(
    AdminOnly(role): AdminOnly,
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(request): Json<ReasonRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |svc| svc.revoke_purchase(role, &account_id, &request.reason))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Audit
// ============================================================================

/// Query audit records. Support or admin.
#[utoipa::path(
    get,
    path = "/v1/admin/audit",
    params(AuditQueryParams),
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses((status = 200, body = AuditLogResponse))
)]
pub async fn query_audit_log(
    Staff(role): Staff,
    State(state): State<AppState>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    let records = state
        .run(move |svc| svc.audit_records(role, params.account_id.as_deref(), params.after, limit))
        .await?;
    let next_after = (records.len() == limit)
        .then(|| records.last().map(|record| record.seq))
        .flatten();
    Ok(Json(AuditLogResponse {
        records,
        next_after,
    }))
}
