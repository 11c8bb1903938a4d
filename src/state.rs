// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::auth::AdminCapability;
use crate::error::{ApiError, ServiceResult};
use crate::service::{AttemptThrottle, EntitlementService};

/// Shared state of the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub service: EntitlementService,
    pub admin: Arc<AdminCapability>,
    /// Failed staff-token attempts, per origin.
    pub admin_throttle: Arc<AttemptThrottle>,
    /// Bounds concurrent blocking store work.
    pool: Arc<Semaphore>,
}

impl AppState {
    pub fn new(service: EntitlementService, admin: AdminCapability) -> Self {
        let pool = Arc::new(Semaphore::new(service.config().store_pool_size));
        let admin_throttle = Arc::new(AttemptThrottle::new(
            service.config().activation.clone(),
            service.clock(),
        ));
        Self {
            service,
            admin: Arc::new(admin),
            admin_throttle,
            pool,
        }
    }

    /// Run a blocking service call off the async runtime.
    ///
    /// If the request future is dropped (client went away), the call's
    /// cancellation token fires and the operation aborts at its next
    /// checkpoint without committing.
    pub async fn run<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&EntitlementService) -> ServiceResult<T> + Send + 'static,
    {
        let permit = self
            .pool
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ApiError::unavailable("service is shutting down"))?;

        let token = CancellationToken::new();
        let on_drop = token.clone().drop_guard();
        let service = self.service.with_cancellation(token);

        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f(&service)
        })
        .await;
        on_drop.disarm();

        match joined {
            Ok(result) => result.map_err(ApiError::from),
            Err(err) => {
                tracing::error!(error = %err, "Service task failed");
                Err(ApiError::internal("service task failed"))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::auth::Role;
    use crate::config::ServiceConfig;
    use crate::storage::Store;

    pub const ADMIN_TOKEN: &str = "test-admin-token";
    pub const SUPPORT_TOKEN: &str = "test-support-token";

    pub fn state() -> AppState {
        let store = Store::open_in_memory().unwrap();
        let service = EntitlementService::new(store, ServiceConfig::for_tests()).unwrap();
        let admin = AdminCapability::new()
            .with_token(Role::Admin, ADMIN_TOKEN)
            .with_token(Role::Support, SUPPORT_TOKEN);
        AppState::new(service, admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;

    #[tokio::test]
    async fn run_maps_service_errors() {
        let state = test_support::state();
        let err = state
            .run(|svc| svc.get_account("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.code, "account_not_found");

        let ok = state.run(|_| Ok::<_, ServiceError>(7)).await.unwrap();
        assert_eq!(ok, 7);
    }
}
