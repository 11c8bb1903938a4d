// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        ActivateLicenseRequest, AddDeviceRequest, AuditLogResponse, BatchResponse,
        DeviceListResponse, EntitlementResponse, IssueLicensesRequest, IssueLicensesResponse,
        LoginRequest, ReasonRequest, RegisterRequest, RevokeLicenseRequest, SessionResponse,
    },
    service::{Account, Device, EntitlementSource, Gating, KeyState, KeyStatus, Tier},
    state::AppState,
    storage::{AuditKind, AuditRecord},
};

pub mod accounts;
pub mod admin;
pub mod devices;
pub mod entitlement;
pub mod health;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/accounts", post(accounts::register))
        .route("/accounts/me", get(accounts::me))
        .route(
            "/sessions",
            post(accounts::login).delete(accounts::logout),
        )
        .route(
            "/devices",
            get(devices::list_devices).post(devices::add_device),
        )
        .route("/devices/{device_id}", delete(devices::remove_device))
        .route("/entitlement", get(entitlement::get_entitlement))
        .route("/purchases", post(entitlement::mark_purchased))
        .route("/licenses/activate", post(entitlement::activate_license))
        .route(
            "/admin/licenses",
            get(admin::list_batch).post(admin::issue_licenses),
        )
        .route("/admin/licenses/{code}", get(admin::key_status))
        .route("/admin/licenses/{code}/revoke", post(admin::revoke_license))
        .route(
            "/admin/accounts/{account_id}/disable",
            post(admin::disable_account),
        )
        .route(
            "/admin/accounts/{account_id}/revoke-purchase",
            post(admin::revoke_purchase),
        )
        .route("/admin/audit", get(admin::query_audit_log));

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness));

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        accounts::register,
        accounts::login,
        accounts::logout,
        accounts::me,
        devices::list_devices,
        devices::add_device,
        devices::remove_device,
        entitlement::get_entitlement,
        entitlement::mark_purchased,
        entitlement::activate_license,
        admin::issue_licenses,
        admin::key_status,
        admin::revoke_license,
        admin::list_batch,
        admin::disable_account,
        admin::revoke_purchase,
        admin::query_audit_log,
        health::health,
        health::liveness
    ),
    components(
        schemas(
            Account,
            Device,
            Tier,
            EntitlementSource,
            Gating,
            KeyState,
            KeyStatus,
            AuditKind,
            AuditRecord,
            RegisterRequest,
            LoginRequest,
            SessionResponse,
            AddDeviceRequest,
            DeviceListResponse,
            EntitlementResponse,
            ActivateLicenseRequest,
            IssueLicensesRequest,
            IssueLicensesResponse,
            RevokeLicenseRequest,
            BatchResponse,
            ReasonRequest,
            AuditLogResponse,
            health::ReadyResponse,
            health::HealthResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Accounts", description = "Registration and sessions"),
        (name = "Devices", description = "Per-account device registry"),
        (name = "Entitlement", description = "Tier evaluation and purchases"),
        (name = "Licenses", description = "License key redemption"),
        (name = "Admin", description = "Staff operations"),
        (name = "Health", description = "Liveness and store checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{self, ADMIN_TOKEN};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn signed_in(app: &Router, email: &str) -> String {
        let credentials = json!({ "email": email, "password": "correct-horse-battery" });
        let response = send(app, "POST", "/v1/accounts", None, Some(credentials.clone())).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = send(app, "POST", "/v1/sessions", None, Some(credentials)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = router(test_support::state());
        let _ = app.into_make_service();
    }

    #[test]
    fn openapi_lists_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }

    #[tokio::test]
    async fn health_reports_store() {
        let app = router(test_support::state());
        let response = send(&app, "GET", "/health", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["checks"]["store"], "ok");
    }

    #[tokio::test]
    async fn device_flow_over_http() {
        let app = router(test_support::state());
        let token = signed_in(&app, "http@x.com").await;

        for id in ["d1", "d2", "d3"] {
            let body = json!({ "device_id": id, "name": "Phone" });
            let response = send(&app, "POST", "/v1/devices", Some(&token), Some(body)).await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let body = json!({ "device_id": "d1", "name": "Phone" });
        let response = send(&app, "POST", "/v1/devices", Some(&token), Some(body)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json!({ "device_id": "d4", "name": "Watch" });
        let response = send(&app, "POST", "/v1/devices", Some(&token), Some(body)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let error = json_body(response).await;
        assert_eq!(error["error_code"], "limit_reached");
        assert_eq!(error["details"]["devices"].as_array().unwrap().len(), 3);

        let response = send(&app, "DELETE", "/v1/devices/d1", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app, "GET", "/v1/devices", Some(&token), None).await;
        let list = json_body(response).await;
        assert_eq!(list["devices"].as_array().unwrap().len(), 2);
        assert_eq!(list["at_limit"], false);
    }

    #[tokio::test]
    async fn license_flow_over_http() {
        let app = router(test_support::state());
        let token = signed_in(&app, "license@x.com").await;

        let response = send(&app, "POST", "/v1/admin/licenses", Some(ADMIN_TOKEN), Some(json!({ "count": 1 }))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let issued = json_body(response).await;
        let code = issued["codes"][0].as_str().unwrap().to_string();
        assert_eq!(issued["batch_tag"], "default");

        let response = send(&app, "POST", "/v1/licenses/activate", Some(&token), Some(json!({ "code": code }))).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = send(&app, "GET", "/v1/entitlement", Some(&token), None).await;
        let entitlement = json_body(response).await;
        assert_eq!(entitlement["tier"], "PAID");
        assert_eq!(entitlement["gating"]["show_license_entry"], false);

        let response = send(&app, "POST", "/v1/licenses/activate", Some(&token), Some(json!({ "code": code }))).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let uri = format!("/v1/admin/licenses/{code}/revoke");
        let response = send(&app, "POST", &uri, Some(ADMIN_TOKEN), Some(json!({ "reason": "chargeback" }))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["state"], "REVOKED");

        let response = send(&app, "GET", "/v1/entitlement", Some(&token), None).await;
        assert_eq!(json_body(response).await["tier"], "TRIAL");

        // A session token is not a staff token.
        let response = send(&app, "POST", "/v1/admin/licenses", Some(&token), Some(json!({ "count": 1 }))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bad_credentials_are_401() {
        let app = router(test_support::state());
        signed_in(&app, "creds@x.com").await;
        let body = json!({ "email": "creds@x.com", "password": "not-the-password" });
        let response = send(&app, "POST", "/v1/sessions", None, Some(body)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error_code"], "invalid_credentials");

        let response = send(&app, "GET", "/v1/entitlement", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
