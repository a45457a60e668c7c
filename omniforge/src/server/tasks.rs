//! SSE task submission.

use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Sse;
use axum::response::sse::{Event as SseEvent, KeepAlive};
use futures::{Stream, StreamExt as _};
use serde::Deserialize;

use crate::task::{MessagePart, MessageRole, Task, TaskMessage};

use super::{ApiError, AppState, caller};

/// Body of `POST /api/v1/agents/{agent_id}/tasks`.
#[derive(Debug, Deserialize)]
pub(crate) struct SubmitTaskRequest {
    message_parts: Vec<MessagePart>,
    tenant_id: Option<String>,
    user_id: String,
    parent_task_id: Option<String>,
    skill_name: Option<String>,
}

/// Submit a task and stream its execution as `text/event-stream`.
///
/// Frames carry the event name (`status`, `message`, `reasoning_step`,
/// `chain_*`, `done`, `error`) and the JSON-encoded event as data. The
/// worker's sentinel ends the stream; axum's SSE encoder terminates
/// every frame with the required blank line.
pub(crate) async fn submit_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(agent_id): Path<String>,
    Json(request): Json<SubmitTaskRequest>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let caller = caller(&headers, &state)?;
    let tenant_id = request.tenant_id.unwrap_or(caller.tenant_id);

    let message = TaskMessage::new(MessageRole::User, request.message_parts)
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let mut task = Task::new(&agent_id, &tenant_id, &request.user_id, vec![message]);
    if let Some(skill_name) = request.skill_name {
        task = task.with_skill(skill_name);
    }
    if let Some(parent_task_id) = request.parent_task_id {
        // Parent links are checked at creation; a foreign or missing
        // parent reads the same.
        state
            .tasks
            .get(&parent_task_id, Some(&tenant_id))
            .await?
            .ok_or_else(|| ApiError::not_found("parent task"))?;
        task = task.with_parent(parent_task_id);
    }

    state.tasks.save(&task).await?;

    let handle = state.driver.submit(task);
    let stream = handle.into_stream().map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".into());
        Ok::<_, Infallible>(SseEvent::default().event(event.sse_event_name()).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new()))
}
