// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::process::ExitCode;

use accessmate_entitlements::{
    api::router,
    auth::{AdminCapability, Role},
    config::ServerSettings,
    logging,
    service::EntitlementService,
    state::AppState,
    storage::Store,
};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Server failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = ServerSettings::from_env()?;

    std::fs::create_dir_all(&settings.data_dir)?;
    let store_path = settings.store_path();
    let store = Store::open(&store_path)?;
    tracing::info!(path = %store_path.display(), "Store opened");

    let service = EntitlementService::new(store, settings.service.clone())?;

    let mut admin = AdminCapability::new();
    if let Some(token) = settings.admin_token.as_deref() {
        admin = admin.with_token(Role::Admin, token);
    }
    if let Some(token) = settings.support_token.as_deref() {
        admin = admin.with_token(Role::Support, token);
    }
    if !admin.is_enabled() {
        tracing::warn!("No staff token configured; admin routes will reject every request");
    }

    let app = router(AppState::new(service, admin));

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "AccessMate entitlement service listening (docs at /docs)");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
