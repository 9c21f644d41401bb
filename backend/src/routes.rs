use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde_json::{json, Value};
use shared::{
    Ack, AccessRequest, ApproveRequest, CreateSubtaskRequest, CreateTaskRequest, ListQuery,
    ShareRequest, Subtask, SubtaskCreated, Task, TaskCreated, TaskList, UpdateSubtaskRequest,
    UpdateTaskRequest,
};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/tasks/list", get(list_tasks))
        .route("/tasks/create", post(create_task))
        .route("/tasks/:id", get(get_task))
        .route("/tasks/update/:id", put(update_task))
        .route("/tasks/complete/:id", put(complete_task))
        .route("/tasks/delete/:id", delete(delete_task))
        .route("/tasks/subtask/add", post(add_subtask))
        .route(
            "/tasks/subtask/complete/:task_id/:subtask_id",
            put(toggle_subtask),
        )
        .route(
            "/tasks/subtask/update/:task_id/:subtask_id",
            put(update_subtask),
        )
        .route(
            "/tasks/subtask/delete/:task_id/:subtask_id",
            delete(delete_subtask),
        )
        .route("/tasks/share_task/:id", post(share_task))
        .route("/tasks/request_access/:id", post(request_access))
        .route("/tasks/approve_access/:id", post(approve_access))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn ack(message: impl Into<String>) -> ApiResult<Ack> {
    Ok(Json(Ack {
        message: message.into(),
    }))
}

fn required(value: &str, detail: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(detail));
    }
    Ok(value.to_string())
}

fn contains_email(list: &[String], email: &str) -> bool {
    list.iter().any(|entry| entry.eq_ignore_ascii_case(email))
}

async fn load(state: &AppState, id: Uuid) -> Result<Task, ApiError> {
    state
        .store
        .get(id)
        .await?
        .ok_or_else(ApiError::task_not_found)
}

#[tracing::instrument(skip(state))]
async fn list_tasks(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<TaskList> {
    let mut tasks: Vec<Task> = state
        .store
        .all()
        .await?
        .into_iter()
        .filter(|task| match &query.email {
            Some(email) => task.is_visible_to(email),
            None => true,
        })
        .filter(|task| !(query.only_open && task.done))
        .collect();
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(TaskList { tasks }))
}

#[tracing::instrument(skip(state))]
async fn get_task(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Task> {
    Ok(Json(load(&state, id).await?))
}

#[tracing::instrument(skip(state))]
async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> ApiResult<TaskCreated> {
    required(&request.title, "Title is required")?;
    required(&request.user_email, "Missing user_email")?;
    let client_id = request.client_id;
    let task = Task::new(request);
    state.store.put(&task).await?;
    info!(task = %task.id, "task created");
    Ok(Json(TaskCreated {
        client_id,
        task,
        message: "Task created successfully".to_string(),
    }))
}

#[tracing::instrument(skip(state))]
async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTaskRequest>,
) -> ApiResult<Task> {
    if request.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    let title = request
        .title
        .as_deref()
        .map(|title| required(title, "Title is required"))
        .transpose()?;

    let _write = state.writes.lock().await;
    let mut task = load(&state, id).await?;
    if let Some(title) = title {
        task.title = title;
    }
    if let Some(description) = request.description {
        task.description = description;
    }
    if let Some(due_date) = request.due_date {
        task.due_date = due_date;
    }
    if let Some(priority) = request.priority {
        task.priority = priority;
    }
    if let Some(done) = request.done {
        task.done = done;
    }
    state.store.put(&task).await?;
    Ok(Json(task))
}

#[tracing::instrument(skip(state))]
async fn complete_task(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Ack> {
    let _write = state.writes.lock().await;
    let mut task = load(&state, id).await?;
    task.done = true;
    state.store.put(&task).await?;
    ack("Task marked as complete")
}

#[tracing::instrument(skip(state))]
async fn delete_task(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Ack> {
    let _write = state.writes.lock().await;
    if !state.store.remove(id).await? {
        return Err(ApiError::task_not_found());
    }
    info!(task = %id, "task deleted");
    ack("Task deleted successfully")
}

#[tracing::instrument(skip(state))]
async fn add_subtask(
    State(state): State<AppState>,
    Json(request): Json<CreateSubtaskRequest>,
) -> ApiResult<SubtaskCreated> {
    let title = required(&request.title, "Subtask title is required")?;
    let _write = state.writes.lock().await;
    let mut task = state
        .store
        .get(request.parent_task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Parent task not found".to_string()))?;
    let subtask = Subtask::new(title);
    task.subtasks.push(subtask.clone());
    state.store.put(&task).await?;
    Ok(Json(SubtaskCreated {
        client_id: request.client_id,
        task_id: task.id,
        subtask,
        message: "Subtask added successfully".to_string(),
    }))
}

/// Runs `change` on one subtask and stores the parent.
async fn with_subtask(
    state: &AppState,
    task_id: Uuid,
    subtask_id: Uuid,
    change: impl FnOnce(&mut Subtask),
) -> ApiResult<Subtask> {
    let _write = state.writes.lock().await;
    let mut task = load(state, task_id).await?;
    let subtask = task
        .subtask_mut(subtask_id)
        .ok_or_else(|| ApiError::NotFound("Subtask not found".to_string()))?;
    change(subtask);
    let subtask = subtask.clone();
    state.store.put(&task).await?;
    Ok(Json(subtask))
}

#[tracing::instrument(skip(state))]
async fn toggle_subtask(
    State(state): State<AppState>,
    Path((task_id, subtask_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Subtask> {
    with_subtask(&state, task_id, subtask_id, |subtask| {
        subtask.done = !subtask.done
    })
    .await
}

#[tracing::instrument(skip(state))]
async fn update_subtask(
    State(state): State<AppState>,
    Path((task_id, subtask_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateSubtaskRequest>,
) -> ApiResult<Subtask> {
    if request.title.is_none() && request.done.is_none() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    let title = request
        .title
        .as_deref()
        .map(|title| required(title, "Subtask title is required"))
        .transpose()?;
    with_subtask(&state, task_id, subtask_id, |subtask| {
        if let Some(title) = title {
            subtask.title = title;
        }
        if let Some(done) = request.done {
            subtask.done = done;
        }
    })
    .await
}

#[tracing::instrument(skip(state))]
async fn delete_subtask(
    State(state): State<AppState>,
    Path((task_id, subtask_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Ack> {
    let _write = state.writes.lock().await;
    let mut task = load(&state, task_id).await?;
    let before = task.subtasks.len();
    task.subtasks.retain(|subtask| subtask.id != subtask_id);
    if task.subtasks.len() == before {
        return Err(ApiError::NotFound("Subtask not found".to_string()));
    }
    state.store.put(&task).await?;
    ack("Subtask deleted successfully")
}

#[tracing::instrument(skip(state))]
async fn share_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ShareRequest>,
) -> ApiResult<Ack> {
    let email = required(&request.shared_with, "Missing 'shared_with' email")?;
    let _write = state.writes.lock().await;
    let mut task = load(&state, id).await?;
    if contains_email(&task.pending_requests, &email) {
        return ack(format!("{} already has a pending invite", email));
    }
    if contains_email(&task.collaborators, &email) {
        return ack(format!("{} already has access to this task", email));
    }
    task.pending_requests.push(email.clone());
    state.store.put(&task).await?;
    info!(task = %id, %email, "invitation recorded");
    ack(format!("Invitation sent to {}.", email))
}

#[tracing::instrument(skip(state))]
async fn request_access(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AccessRequest>,
) -> ApiResult<Ack> {
    let email = required(&request.user_email, "Missing user_email")?.to_lowercase();
    let _write = state.writes.lock().await;
    let mut task = load(&state, id).await?;
    if task.user_email.eq_ignore_ascii_case(&email) || contains_email(&task.collaborators, &email) {
        return ack("You already have access");
    }
    if contains_email(&task.pending_requests, &email) {
        return ack("Request already pending");
    }
    task.pending_requests.push(email);
    state.store.put(&task).await?;
    ack(format!("Request sent to owner for '{}'", task.title))
}

#[tracing::instrument(skip(state))]
async fn approve_access(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ApproveRequest>,
) -> ApiResult<Ack> {
    if request.approver_email.trim().is_empty() || request.user_email.trim().is_empty() {
        return Err(ApiError::bad_request("Missing emails"));
    }
    let grantee = request.user_email.trim();
    let _write = state.writes.lock().await;
    let mut task = load(&state, id).await?;
    if !task
        .user_email
        .eq_ignore_ascii_case(request.approver_email.trim())
    {
        return Err(ApiError::Forbidden("Only owner can approve".to_string()));
    }
    let Some(position) = task
        .pending_requests
        .iter()
        .position(|entry| entry.eq_ignore_ascii_case(grantee))
    else {
        return Err(ApiError::bad_request("No pending request"));
    };
    let email = task.pending_requests.remove(position);
    task.collaborators.push(email.clone());
    state.store.put(&task).await?;
    info!(task = %id, %email, "access approved");
    ack(format!("{} approved for '{}'", email, task.title))
}
