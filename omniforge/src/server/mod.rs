//! HTTP surface: chain inspection and SSE task submission.
//!
//! Every endpoint requires a caller tenant (the `x-tenant-id` header,
//! falling back to the configured default tenant) and resolves the
//! caller's role from `x-role`. Resources owned by another tenant are
//! indistinguishable from missing ones: both are a 404.

mod chains;
mod tasks;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::json;

use crate::agent::AutonomousDriver;
use crate::error::Error;
use crate::repository::{ChainRepository, TaskRepository};
use crate::visibility::{Role, VisibilityController};

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Driver executing submitted tasks.
    pub driver: Arc<AutonomousDriver>,
    /// Chain storage for inspection endpoints.
    pub chains: Arc<dyn ChainRepository>,
    /// Task storage for submission and parent checks.
    pub tasks: Arc<dyn TaskRepository>,
    /// Visibility filter applied to returned chains.
    pub visibility: Arc<VisibilityController>,
    /// Tenant assumed when the caller sends none.
    pub default_tenant: Option<String>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("default_tenant", &self.default_tenant)
            .finish_non_exhaustive()
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/chains/:chain_id", get(chains::get_chain))
        .route(
            "/api/v1/chains/:chain_id/steps",
            get(chains::get_chain_steps),
        )
        .route("/api/v1/tasks/:task_id/chains", get(chains::get_task_chains))
        .route(
            "/api/v1/tenants/:tenant_id/chains",
            get(chains::list_tenant_chains),
        )
        .route("/api/v1/agents/:agent_id/tasks", post(tasks::submit_task))
        .with_state(state)
}

/// API-boundary error carrying the HTTP status and wire body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
}

impl ApiError {
    /// A 404 whose body never reveals whether the resource exists for
    /// another tenant.
    #[must_use]
    pub fn not_found(kind: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found".into(),
            message: format!("{kind} not found"),
        }
    }

    /// A 400 with field detail.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation_error".into(),
            message: message.into(),
        }
    }

    /// A 401 for requests with no resolvable tenant.
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthenticated".into(),
            message: "a tenant identity is required".into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code: err.code().to_owned(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = axum::Json(json!({
            "error_code": self.code,
            "error_message": self.message,
        }));
        (self.status, body).into_response()
    }
}

/// The authenticated caller: tenant plus optional role.
#[derive(Debug, Clone)]
pub struct Caller {
    /// Tenant every lookup is scoped to.
    pub tenant_id: String,
    /// Role used for visibility filtering.
    pub role: Option<Role>,
}

/// Resolve the caller from request headers.
pub(crate) fn caller(headers: &HeaderMap, state: &AppState) -> Result<Caller, ApiError> {
    let tenant_id = headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| state.default_tenant.clone())
        .ok_or_else(ApiError::unauthenticated)?;

    let role = headers
        .get("x-role")
        .and_then(|v| v.to_str().ok())
        .and_then(Role::parse);

    Ok(Caller { tenant_id, role })
}

/// Clamp a caller-supplied limit into `[1, 1000]`.
pub(crate) fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(50).clamp(1, 1000)
}
