// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    auth::Auth,
    error::ApiError,
    models::{AddDeviceRequest, DeviceListResponse},
    service::{Device, DeviceOutcome, RemoveOutcome},
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/v1/devices",
    tag = "Devices",
    security(("bearer_auth" = [])),
    responses((status = 200, body = DeviceListResponse))
)]
pub async fn list_devices(
    Auth(caller): Auth,
    State(state): State<AppState>,
) -> Result<Json<DeviceListResponse>, ApiError> {
    let max_devices = state.service.config().max_devices;
    let devices = state
        .run(move |svc| svc.list_devices(&caller.account_id))
        .await?;
    Ok(Json(DeviceListResponse {
        at_limit: devices.len() >= max_devices,
        devices,
        max_devices,
    }))
}

/// Register the calling device.
///
/// Re-registering a known device is a success (200). At the cap the
/// response is 409 with `details.devices` listing what can be removed.
#[utoipa::path(
    post,
    path = "/v1/devices",
    request_body = AddDeviceRequest,
    tag = "Devices",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Device added", body = Device),
        (status = 200, description = "Device already registered", body = Device),
        (status = 409, description = "Device limit reached")
    )
)]
pub async fn add_device(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Json(request): Json<AddDeviceRequest>,
) -> Result<(StatusCode, Json<Device>), ApiError> {
    let outcome = state
        .run(move |svc| svc.add_device(&caller.account_id, &request.device_id, &request.name))
        .await?;
    let status = match &outcome {
        DeviceOutcome::Added { .. } => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    let device = outcome.into_result()?;
    Ok((status, Json(device)))
}

#[utoipa::path(
    delete,
    path = "/v1/devices/{device_id}",
    params(
        ("device_id" = String, Path, description = "Identifier of the device to remove")
    ),
    tag = "Devices",
    security(("bearer_auth" = [])),
    responses((status = 204, description = "Removed, or was not registered"))
)]
pub async fn remove_device(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let outcome = state
        .run(move |svc| svc.remove_device(&caller.account_id, &device_id))
        .await?;
    if outcome == RemoveOutcome::NotPresent {
        tracing::debug!("Removed device was not registered");
    }
    Ok(StatusCode::NO_CONTENT)
}
