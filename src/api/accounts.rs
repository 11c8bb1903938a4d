// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account registration and sessions.

use axum::{extract::State, http::StatusCode, Json};
use zeroize::Zeroizing;

use crate::{
    auth::Auth,
    error::ApiError,
    models::{LoginRequest, RegisterRequest, SessionResponse},
    service::Account,
    state::AppState,
};

/// Create an account and start its trial.
#[utoipa::path(
    post,
    path = "/v1/accounts",
    request_body = RegisterRequest,
    tag = "Accounts",
    responses(
        (status = 201, description = "Account created", body = Account),
        (status = 400, description = "Malformed email or weak password"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    let email = request.email.clone();
    let password = Zeroizing::new(request.password.clone());
    let account = state
        .run(move |svc| svc.register_account(&email, &password))
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// Sign in and receive a session token.
#[utoipa::path(
    post,
    path = "/v1/sessions",
    request_body = LoginRequest,
    tag = "Accounts",
    responses(
        (status = 201, description = "Session opened", body = SessionResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 412, description = "Account disabled"),
        (status = 423, description = "Account temporarily locked")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let email = request.email.clone();
    let password = Zeroizing::new(request.password.clone());
    let session = state
        .run(move |svc| svc.authenticate(&email, &password))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            account: session.account.clone(),
            token: session.token.to_string(),
            expires_at: session.expires_at,
        }),
    ))
}

/// End the current session.
#[utoipa::path(
    delete,
    path = "/v1/sessions",
    tag = "Accounts",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Session ended"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn logout(Auth(caller): Auth, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let token = caller.session_token.clone();
    state.run(move |svc| svc.end_session(&token)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The signed-in account.
#[utoipa::path(
    get,
    path = "/v1/accounts/me",
    tag = "Accounts",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current account", body = Account),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(Auth(caller): Auth, State(state): State<AppState>) -> Result<Json<Account>, ApiError> {
    let account = state
        .run(move |svc| svc.get_account(&caller.account_id))
        .await?;
    Ok(Json(account))
}
