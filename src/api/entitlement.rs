// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Entitlement reads, purchases and license activation.

use axum::{extract::State, http::StatusCode, Json};
use zeroize::Zeroizing;

use crate::{
    auth::{Auth, ClientOrigin},
    error::ApiError,
    models::{ActivateLicenseRequest, EntitlementResponse},
    service::KeyStatus,
    state::AppState,
};

/// Current tier and the client gating flags.
#[utoipa::path(
    get,
    path = "/v1/entitlement",
    tag = "Entitlement",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = EntitlementResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_entitlement(
    Auth(caller): Auth,
    State(state): State<AppState>,
) -> Result<Json<EntitlementResponse>, ApiError> {
    let entitlement = state
        .run(move |svc| svc.get_entitlement(&caller.account_id))
        .await?;
    Ok(Json(entitlement.into()))
}

/// Record a completed in-app purchase. Idempotent.
#[utoipa::path(
    post,
    path = "/v1/purchases",
    tag = "Entitlement",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Purchase recorded", body = EntitlementResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn mark_purchased(
    Auth(caller): Auth,
    State(state): State<AppState>,
) -> Result<Json<EntitlementResponse>, ApiError> {
    let entitlement = state
        .run(move |svc| {
            svc.mark_purchased(&caller.account_id)?;
            svc.get_entitlement(&caller.account_id)
        })
        .await?;
    Ok(Json(entitlement.into()))
}

/// Redeem a license key for the signed-in account.
#[utoipa::path(
    post,
    path = "/v1/licenses/activate",
    request_body = ActivateLicenseRequest,
    tag = "Licenses",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Key activated", body = KeyStatus),
        (status = 400, description = "Malformed code or checksum mismatch"),
        (status = 404, description = "Unknown code"),
        (status = 409, description = "Code already used"),
        (status = 412, description = "Code revoked"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn activate_license(
    Auth(caller): Auth,
    ClientOrigin(origin): ClientOrigin,
    State(state): State<AppState>,
    Json(request): Json<ActivateLicenseRequest>,
) -> Result<(StatusCode, Json<KeyStatus>), ApiError> {
    let code = Zeroizing::new(request.code.clone());
    let status = state
        .run(move |svc| svc.activate_license(&origin, &caller.account_id, &code))
        .await?;
    Ok((StatusCode::CREATED, Json(status)))
}
