//! Chain inspection endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::chain::ChainStatus;

use super::{ApiError, AppState, caller, clamp_limit};

#[derive(Debug, Deserialize)]
pub(crate) struct PageQuery {
    limit: Option<usize>,
    offset: Option<usize>,
    status: Option<String>,
}

/// `GET /api/v1/chains/{chain_id}` — one chain with visibility-filtered
/// steps.
pub(crate) async fn get_chain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chain_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let caller = caller(&headers, &state)?;
    let chain = state
        .chains
        .get_by_id(chain_id, Some(&caller.tenant_id))
        .await?
        .ok_or_else(|| ApiError::not_found("chain"))?;

    let filtered = state.visibility.filter_chain(&chain, caller.role);
    Ok(Json(serde_json::to_value(&filtered).map_err(crate::error::Error::from)?))
}

/// `GET /api/v1/chains/{chain_id}/steps?limit=&offset=` — paginated
/// steps of one chain.
pub(crate) async fn get_chain_steps(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chain_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    let caller = caller(&headers, &state)?;
    let chain = state
        .chains
        .get_by_id(chain_id, Some(&caller.tenant_id))
        .await?
        .ok_or_else(|| ApiError::not_found("chain"))?;

    let filtered = state.visibility.filter_chain(&chain, caller.role);
    let limit = clamp_limit(page.limit);
    let offset = page.offset.unwrap_or(0);
    let steps: Vec<_> = filtered.steps.iter().skip(offset).take(limit).collect();

    Ok(Json(json!({
        "chain_id": chain_id,
        "total": filtered.steps.len(),
        "limit": limit,
        "offset": offset,
        "steps": steps,
    })))
}

/// `GET /api/v1/tasks/{task_id}/chains` — every chain for a task.
pub(crate) async fn get_task_chains(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let caller = caller(&headers, &state)?;
    // The task itself is the tenant boundary; a foreign task 404s
    // before any chain is touched.
    state
        .tasks
        .get(&task_id, Some(&caller.tenant_id))
        .await?
        .ok_or_else(|| ApiError::not_found("task"))?;

    let chains = state.chains.get_by_task(&task_id).await?;
    let filtered: Vec<_> = chains
        .iter()
        .map(|chain| state.visibility.filter_chain(chain, caller.role))
        .collect();

    Ok(Json(json!({ "task_id": task_id, "chains": filtered })))
}

/// `GET /api/v1/tenants/{tenant_id}/chains?status=&limit=&offset=` —
/// tenant-scoped chain listing.
pub(crate) async fn list_tenant_chains(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tenant_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    let caller = caller(&headers, &state)?;
    // A listing for someone else's tenant is indistinguishable from a
    // tenant with no chains.
    if caller.tenant_id != tenant_id {
        return Err(ApiError::not_found("tenant"));
    }

    let status = match page.status.as_deref() {
        None => None,
        Some(raw) => Some(
            ChainStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status '{raw}'")))?,
        ),
    };
    let limit = clamp_limit(page.limit);
    let offset = page.offset.unwrap_or(0);

    let summaries = state
        .chains
        .list_by_tenant(&tenant_id, status, limit, offset)
        .await?;

    Ok(Json(json!({
        "tenant_id": tenant_id,
        "limit": limit,
        "offset": offset,
        "chains": summaries,
    })))
}
