//! The reconciliation engine.
//!
//! Every mutating operation follows the same three steps:
//!
//! 1. under the state lock, apply the change optimistically and publish a snapshot;
//! 2. release the lock and await the remote call (bounded by the call timeout);
//! 3. re-take the lock, look the target up again by key, and confirm or roll back.
//!
//! Step 3 runs against whatever the state is at completion time, so calls may resolve in
//! any order and other operations (or a refresh) may have run in between.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use shared::{
    AccessRequest, ApproveRequest, CreateSubtaskRequest, CreateTaskRequest, ListQuery,
    ShareRequest, UpdateSubtaskRequest, UpdateTaskRequest,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{ClientConfig, Identity};
use crate::coordinator::RefreshReason;
use crate::error::{EngineError, EngineResult, GatewayError, SyncError};
use crate::gateway::{GatewayResult, TaskGateway};
use crate::http::HttpGateway;
use crate::model::{Attempt, ItemId, NewTask, Snapshot, SubtaskFields, TaskFields};
use crate::store::{Collection, RefreshReport, SubtaskSlot};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    gateway: Arc<dyn TaskGateway>,
    identity: Identity,
    call_timeout: Duration,
    state: Mutex<Collection>,
    snapshots: watch::Sender<Snapshot>,
    refresh_trigger: Mutex<Option<mpsc::UnboundedSender<RefreshReason>>>,
}

#[derive(Debug, Clone, Copy)]
enum SubtaskCall {
    Toggle,
    Update,
}

impl Engine {
    pub fn new(gateway: Arc<dyn TaskGateway>, identity: Identity, call_timeout: Duration) -> Self {
        let (snapshots, _) = watch::channel(Snapshot::default());
        Self {
            inner: Arc::new(Inner {
                gateway,
                identity,
                call_timeout,
                state: Mutex::new(Collection::default()),
                snapshots,
                refresh_trigger: Mutex::new(None),
            }),
        }
    }

    /// Engine talking HTTP to `config.base_url` on behalf of the configured identity.
    pub fn from_config(config: &ClientConfig) -> Result<Self, GatewayError> {
        let gateway = HttpGateway::from_config(config)?;
        Ok(Self::new(
            Arc::new(gateway),
            config.identity(),
            config.call_timeout(),
        ))
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    /// Receives a new snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.snapshots.borrow().clone()
    }

    pub(crate) fn attach_refresh_trigger(&self, trigger: mpsc::UnboundedSender<RefreshReason>) {
        *lock(&self.inner.refresh_trigger) = Some(trigger);
    }

    fn state(&self) -> MutexGuard<'_, Collection> {
        lock(&self.inner.state)
    }

    fn publish(&self, state: &Collection) {
        let tasks = state.views();
        self.inner.snapshots.send_modify(|snapshot| {
            snapshot.version += 1;
            snapshot.tasks = tasks;
        });
    }

    fn request_refresh(&self, reason: RefreshReason) {
        if let Some(trigger) = lock(&self.inner.refresh_trigger).as_ref() {
            if trigger.send(reason).is_err() {
                debug!(?reason, "refresh coordinator is gone");
            }
        }
    }

    async fn call<T>(&self, call: impl Future<Output = GatewayResult<T>>) -> GatewayResult<T> {
        match tokio::time::timeout(self.inner.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.inner.call_timeout)),
        }
    }

    /// Inserts the task at the head of the collection right away and confirms it with the
    /// server. Resolves to the server-assigned id.
    #[tracing::instrument(skip(self))]
    pub async fn create_task(&self, new: NewTask) -> EngineResult<ItemId> {
        let title = non_blank(&new.title, "task title")?;
        let new = NewTask { title, ..new };
        let client_id = Uuid::new_v4();
        {
            let mut state = self.state();
            state.insert_created_task(
                client_id,
                TaskFields::from(&new),
                self.inner.identity.email.clone(),
            );
            self.publish(&state);
        }
        debug!(%client_id, "optimistic create applied");

        let request = CreateTaskRequest {
            client_id: Some(client_id),
            title: new.title.clone(),
            description: new.description.clone(),
            due_date: new.due_date,
            priority: new.priority,
            user_email: self.inner.identity.email.clone(),
        };
        let result = self.call(self.inner.gateway.create_task(&request)).await;

        let mut state = self.state();
        let outcome = match result {
            Ok(created) => {
                if created.client_id.is_some_and(|echoed| echoed != client_id) {
                    warn!(%client_id, echoed = ?created.client_id, "server echoed a different client id");
                }
                let id = state.confirm_created_task(client_id, &created.task);
                debug!(%client_id, %id, "create confirmed");
                Ok(id)
            }
            Err(source) => {
                state.tasks.remove(client_id);
                warn!(%client_id, %source, "create failed, removed placeholder");
                Err(SyncError {
                    attempt: Attempt::CreateTask(new),
                    source,
                }
                .into())
            }
        };
        self.publish(&state);
        outcome
    }

    /// Sends only the fields set in `patch`. On failure exactly those fields are rolled back.
    #[tracing::instrument(skip(self))]
    pub async fn update_task(&self, id: ItemId, patch: UpdateTaskRequest) -> EngineResult<()> {
        let patch = normalize_task_patch(patch)?;
        self.patch_task(id, move |_| patch).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn toggle_task_complete(&self, id: ItemId) -> EngineResult<()> {
        self.patch_task(id, |current| UpdateTaskRequest {
            done: Some(!current.done),
            ..Default::default()
        })
        .await
    }

    async fn patch_task(
        &self,
        id: ItemId,
        make_patch: impl FnOnce(&TaskFields) -> UpdateTaskRequest,
    ) -> EngineResult<()> {
        let (key, server_id, mutation, patch) = {
            let mut state = self.state();
            let (key, server_id) = state.confirmed_task(&id)?;
            let mutation = state.next_mutation();
            let slot = state.tasks.get_mut(key).ok_or(EngineError::NotFound(id))?;
            let patch = make_patch(&slot.record.current());
            slot.record.begin(mutation, patch.clone());
            self.publish(&state);
            (key, server_id, mutation, patch)
        };
        debug!(task = %id, ?mutation, "optimistic update applied");

        let result = self
            .call(self.inner.gateway.update_task(server_id, &patch))
            .await;

        let mut state = self.state();
        let outcome = match result {
            Ok(echo) => {
                let epoch = state.next_epoch();
                let echo = echo.as_ref().map(TaskFields::from);
                if let Some(slot) = state.tasks.find_mut(key) {
                    slot.record.confirm(mutation, echo.as_ref(), epoch);
                }
                debug!(task = %id, ?mutation, "update confirmed");
                Ok(())
            }
            Err(source) => {
                if let Some(slot) = state.tasks.find_mut(key) {
                    slot.record.rollback(mutation);
                }
                warn!(task = %id, ?mutation, %source, "update failed, rolled back");
                Err(SyncError {
                    attempt: Attempt::UpdateTask {
                        task: ItemId::Confirmed(server_id),
                        patch,
                    },
                    source,
                }
                .into())
            }
        };
        self.publish(&state);
        outcome
    }

    /// Removes the task from the collection right away. If the server refuses, the task comes
    /// back in the same relative position with everything it had.
    #[tracing::instrument(skip(self))]
    pub async fn delete_task(&self, id: ItemId) -> EngineResult<()> {
        let (key, server_id) = {
            let mut state = self.state();
            let (key, server_id) = state.confirmed_task(&id)?;
            state.tasks.park(key);
            self.publish(&state);
            (key, server_id)
        };
        debug!(task = %id, "optimistic delete applied");

        let result = self.call(self.inner.gateway.delete_task(server_id)).await;

        let outcome = {
            let mut state = self.state();
            let outcome = match result {
                Ok(_) => {
                    let epoch = state.next_epoch();
                    state.tasks.forget(key, epoch);
                    debug!(task = %id, "delete confirmed");
                    Ok(())
                }
                Err(source) => {
                    state.tasks.unpark(key);
                    warn!(task = %id, %source, "delete failed, restored");
                    Err(SyncError {
                        attempt: Attempt::DeleteTask(ItemId::Confirmed(server_id)),
                        source,
                    }
                    .into())
                }
            };
            self.publish(&state);
            outcome
        };
        if outcome.is_ok() {
            self.request_refresh(RefreshReason::Deleted);
        }
        outcome
    }

    /// Appends a subtask right away. Resolves to the server-assigned id.
    #[tracing::instrument(skip(self))]
    pub async fn add_subtask(&self, task: ItemId, title: &str) -> EngineResult<ItemId> {
        let title = non_blank(title, "subtask title")?;
        let client_id = Uuid::new_v4();
        let (task_key, task_id) = {
            let mut state = self.state();
            let (task_key, task_id) = state.confirmed_task(&task)?;
            let slot = state
                .tasks
                .get_mut(task_key)
                .ok_or(EngineError::NotFound(task))?;
            let rank = slot.subtasks.tail_rank();
            slot.subtasks
                .insert(SubtaskSlot::creating(client_id, title.clone(), rank));
            self.publish(&state);
            (task_key, task_id)
        };
        debug!(%client_id, "optimistic subtask add applied");

        let request = CreateSubtaskRequest {
            client_id: Some(client_id),
            parent_task_id: task_id,
            title: title.clone(),
        };
        let result = self.call(self.inner.gateway.add_subtask(&request)).await;

        let mut state = self.state();
        let outcome = match result {
            Ok(created) => {
                let epoch = state.next_epoch();
                let id = match state.tasks.find_mut(task_key) {
                    Some(slot) => slot.confirm_subtask_creation(client_id, &created.subtask, epoch),
                    None => ItemId::Confirmed(created.subtask.id),
                };
                debug!(%client_id, %id, "subtask add confirmed");
                Ok(id)
            }
            Err(source) => {
                if let Some(slot) = state.tasks.find_mut(task_key) {
                    slot.subtasks.remove(client_id);
                }
                warn!(%client_id, %source, "subtask add failed, removed placeholder");
                Err(SyncError {
                    attempt: Attempt::AddSubtask {
                        task: ItemId::Confirmed(task_id),
                        title,
                    },
                    source,
                }
                .into())
            }
        };
        self.publish(&state);
        outcome
    }

    #[tracing::instrument(skip(self))]
    pub async fn toggle_subtask(&self, task: ItemId, subtask: ItemId) -> EngineResult<()> {
        self.patch_subtask(task, subtask, SubtaskCall::Toggle, |current| {
            UpdateSubtaskRequest {
                done: Some(!current.done),
                ..Default::default()
            }
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_subtask(
        &self,
        task: ItemId,
        subtask: ItemId,
        patch: UpdateSubtaskRequest,
    ) -> EngineResult<()> {
        if patch.title.is_none() && patch.done.is_none() {
            return Err(EngineError::Validation("nothing to update".to_string()));
        }
        let patch = UpdateSubtaskRequest {
            title: patch
                .title
                .map(|title| non_blank(&title, "subtask title"))
                .transpose()?,
            done: patch.done,
        };
        self.patch_subtask(task, subtask, SubtaskCall::Update, move |_| patch)
            .await
    }

    async fn patch_subtask(
        &self,
        task: ItemId,
        subtask: ItemId,
        call: SubtaskCall,
        make_patch: impl FnOnce(&SubtaskFields) -> UpdateSubtaskRequest,
    ) -> EngineResult<()> {
        let (target, mutation, patch) = {
            let mut state = self.state();
            let target = state.confirmed_subtask(&task, &subtask)?;
            let mutation = state.next_mutation();
            let slot = state
                .tasks
                .get_mut(target.task_key)
                .and_then(|parent| parent.subtasks.get_mut(target.key))
                .ok_or(EngineError::NotFound(subtask))?;
            let patch = make_patch(&slot.record.current());
            slot.record.begin(mutation, patch.clone());
            self.publish(&state);
            (target, mutation, patch)
        };
        debug!(%task, %subtask, ?mutation, "optimistic subtask change applied");

        let gateway = &self.inner.gateway;
        let result = match call {
            SubtaskCall::Toggle => {
                self.call(gateway.toggle_subtask(target.task_id, target.id))
                    .await
            }
            SubtaskCall::Update => {
                self.call(gateway.update_subtask(target.task_id, target.id, &patch))
                    .await
            }
        };

        let mut state = self.state();
        let outcome = match result {
            Ok(echo) => {
                let epoch = state.next_epoch();
                let echo = echo.as_ref().map(SubtaskFields::from);
                if let Some(slot) = state
                    .tasks
                    .find_mut(target.task_key)
                    .and_then(|parent| parent.subtasks.find_mut(target.key))
                {
                    slot.record.confirm(mutation, echo.as_ref(), epoch);
                }
                debug!(%task, %subtask, ?mutation, "subtask change confirmed");
                Ok(())
            }
            Err(source) => {
                if let Some(slot) = state
                    .tasks
                    .find_mut(target.task_key)
                    .and_then(|parent| parent.subtasks.find_mut(target.key))
                {
                    slot.record.rollback(mutation);
                }
                warn!(%task, %subtask, ?mutation, %source, "subtask change failed, rolled back");
                let task = ItemId::Confirmed(target.task_id);
                let subtask = ItemId::Confirmed(target.id);
                let attempt = match call {
                    SubtaskCall::Toggle => Attempt::ToggleSubtask { task, subtask },
                    SubtaskCall::Update => Attempt::UpdateSubtask {
                        task,
                        subtask,
                        patch,
                    },
                };
                Err(SyncError { attempt, source }.into())
            }
        };
        self.publish(&state);
        outcome
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_subtask(&self, task: ItemId, subtask: ItemId) -> EngineResult<()> {
        let target = {
            let mut state = self.state();
            let target = state.confirmed_subtask(&task, &subtask)?;
            if let Some(parent) = state.tasks.get_mut(target.task_key) {
                parent.subtasks.park(target.key);
            }
            self.publish(&state);
            target
        };
        debug!(%task, %subtask, "optimistic subtask delete applied");

        let result = self
            .call(self.inner.gateway.delete_subtask(target.task_id, target.id))
            .await;

        let mut state = self.state();
        let outcome = match result {
            Ok(_) => {
                let epoch = state.next_epoch();
                if let Some(parent) = state.tasks.find_mut(target.task_key) {
                    parent.subtasks.forget(target.key, epoch);
                }
                debug!(%task, %subtask, "subtask delete confirmed");
                Ok(())
            }
            Err(source) => {
                if let Some(parent) = state.tasks.find_mut(target.task_key) {
                    parent.subtasks.unpark(target.key);
                }
                warn!(%task, %subtask, %source, "subtask delete failed, restored");
                Err(SyncError {
                    attempt: Attempt::DeleteSubtask {
                        task: ItemId::Confirmed(target.task_id),
                        subtask: ItemId::Confirmed(target.id),
                    },
                    source,
                }
                .into())
            }
        };
        self.publish(&state);
        outcome
    }

    /// Invites `email` to collaborate. Resolves to the server's message.
    #[tracing::instrument(skip(self))]
    pub async fn share_task(&self, task: ItemId, email: &str) -> EngineResult<String> {
        let email = valid_email(email)?;
        let (_, task_id) = self.state().confirmed_task(&task)?;
        let request = ShareRequest {
            shared_with: email.clone(),
        };
        match self.call(self.inner.gateway.share_task(task_id, &request)).await {
            Ok(ack) => {
                self.request_refresh(RefreshReason::Shared);
                Ok(ack.message)
            }
            Err(source) => {
                warn!(%task, %source, "share failed");
                Err(SyncError {
                    attempt: Attempt::ShareTask {
                        task: ItemId::Confirmed(task_id),
                        email,
                    },
                    source,
                }
                .into())
            }
        }
    }

    /// Asks the owner of `task` to let this identity collaborate.
    #[tracing::instrument(skip(self))]
    pub async fn request_access(&self, task: ItemId) -> EngineResult<String> {
        let (_, task_id) = self.state().confirmed_task(&task)?;
        let request = AccessRequest {
            user_email: self.inner.identity.email.clone(),
        };
        self.call(self.inner.gateway.request_access(task_id, &request))
            .await
            .map(|ack| ack.message)
            .map_err(|source| {
                warn!(%task, %source, "access request failed");
                SyncError {
                    attempt: Attempt::RequestAccess(ItemId::Confirmed(task_id)),
                    source,
                }
                .into()
            })
    }

    /// Grants `grantee` access to `task`; this identity must own the task.
    #[tracing::instrument(skip(self))]
    pub async fn approve_access(&self, task: ItemId, grantee: &str) -> EngineResult<String> {
        let grantee = valid_email(grantee)?;
        let (_, task_id) = self.state().confirmed_task(&task)?;
        let request = ApproveRequest {
            approver_email: self.inner.identity.email.clone(),
            user_email: grantee.clone(),
        };
        match self
            .call(self.inner.gateway.approve_access(task_id, &request))
            .await
        {
            Ok(ack) => {
                self.request_refresh(RefreshReason::Approved);
                Ok(ack.message)
            }
            Err(source) => {
                warn!(%task, %source, "approval failed");
                Err(SyncError {
                    attempt: Attempt::ApproveAccess {
                        task: ItemId::Confirmed(task_id),
                        grantee,
                    },
                    source,
                }
                .into())
            }
        }
    }

    /// Fetches the remote list and merges it without touching anything still in flight.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> EngineResult<RefreshReport> {
        let fetch = Fetch::begin(self);
        let since = fetch.since;
        let query = ListQuery {
            email: Some(self.inner.identity.email.clone()),
            only_open: false,
        };
        match self.call(self.inner.gateway.list_tasks(&query)).await {
            Ok(tasks) => {
                let mut state = self.state();
                let report = state.merge(&tasks, since);
                self.publish(&state);
                debug!(
                    replaced = report.replaced,
                    appended = report.appended,
                    removed = report.removed,
                    deferred = report.deferred.len(),
                    "refresh merged"
                );
                Ok(report)
            }
            Err(source) => {
                warn!(%source, "refresh failed");
                Err(SyncError {
                    attempt: Attempt::Refresh,
                    source,
                }
                .into())
            }
        }
    }

    /// Replays a failed operation. Only ever called on explicit user request.
    pub async fn retry(&self, attempt: Attempt) -> EngineResult<()> {
        match attempt {
            Attempt::CreateTask(new) => self.create_task(new).await.map(drop),
            Attempt::UpdateTask { task, patch } => self.update_task(task, patch).await,
            Attempt::DeleteTask(task) => self.delete_task(task).await,
            Attempt::AddSubtask { task, title } => self.add_subtask(task, &title).await.map(drop),
            Attempt::UpdateSubtask {
                task,
                subtask,
                patch,
            } => self.update_subtask(task, subtask, patch).await,
            Attempt::ToggleSubtask { task, subtask } => self.toggle_subtask(task, subtask).await,
            Attempt::DeleteSubtask { task, subtask } => self.delete_subtask(task, subtask).await,
            Attempt::ShareTask { task, email } => self.share_task(task, &email).await.map(drop),
            Attempt::RequestAccess(task) => self.request_access(task).await.map(drop),
            Attempt::ApproveAccess { task, grantee } => {
                self.approve_access(task, &grantee).await.map(drop)
            }
            Attempt::Refresh => self.refresh().await.map(drop),
        }
    }
}

/// A refresh awaiting its listing. Unregisters on drop, including when the refresh
/// future itself is dropped mid-call.
struct Fetch<'a> {
    engine: &'a Engine,
    since: u64,
}

impl<'a> Fetch<'a> {
    fn begin(engine: &'a Engine) -> Self {
        let since = engine.state().begin_refresh();
        Self { engine, since }
    }
}

impl Drop for Fetch<'_> {
    fn drop(&mut self) {
        self.engine.state().end_refresh(self.since);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn non_blank(value: &str, what: &str) -> EngineResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!("{} must not be empty", what)));
    }
    Ok(trimmed.to_string())
}

fn valid_email(value: &str) -> EngineResult<String> {
    let email = non_blank(value, "email")?;
    if !email.contains('@') {
        return Err(EngineError::Validation(format!("{} is not an email address", email)));
    }
    Ok(email)
}

fn normalize_task_patch(patch: UpdateTaskRequest) -> EngineResult<UpdateTaskRequest> {
    if patch.is_empty() {
        return Err(EngineError::Validation("nothing to update".to_string()));
    }
    Ok(UpdateTaskRequest {
        title: patch
            .title
            .map(|title| non_blank(&title, "task title"))
            .transpose()?,
        ..patch
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockTaskGateway;
    use chrono::Utc;
    use shared::{Priority, Task};

    fn engine(mock: MockTaskGateway) -> Engine {
        Engine::new(
            Arc::new(mock),
            Identity::new("ann@example.com"),
            DEFAULT_CALL_TIMEOUT,
        )
    }

    fn server_task(title: &str) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            due_date: None,
            priority: Priority::Normal,
            done: false,
            user_email: "ann@example.com".to_string(),
            created_at: Utc::now(),
            subtasks: Vec::new(),
            collaborators: Vec::new(),
            pending_requests: Vec::new(),
        }
    }

    #[tokio::test]
    async fn blank_title_never_reaches_the_network() {
        let engine = engine(MockTaskGateway::new());

        let result = engine.create_task(NewTask::titled("   ")).await;

        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert!(engine.snapshot().tasks.is_empty());
    }

    #[tokio::test]
    async fn blank_share_email_is_rejected_locally() {
        let engine = engine(MockTaskGateway::new());

        let result = engine
            .share_task(ItemId::Confirmed(Uuid::new_v4()), "not-an-email")
            .await;

        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn refresh_lists_tasks_for_the_identity() {
        let mut mock = MockTaskGateway::new();
        let task = server_task("Buy milk");
        let listed = task.clone();
        mock.expect_list_tasks()
            .withf(|query| query.email.as_deref() == Some("ann@example.com") && !query.only_open)
            .times(1)
            .returning(move |_| Ok(vec![listed.clone()]));
        let engine = engine(mock);

        let report = engine.refresh().await.unwrap();

        assert_eq!(report.appended, 1);
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.tasks[0].id, ItemId::Confirmed(task.id));
    }

    #[tokio::test]
    async fn toggle_with_bare_ack_keeps_the_value_sent() {
        let mut mock = MockTaskGateway::new();
        let task = server_task("Buy milk");
        let listed = task.clone();
        mock.expect_list_tasks()
            .returning(move |_| Ok(vec![listed.clone()]));
        mock.expect_update_task()
            .withf(|_, request| request.done == Some(true) && request.title.is_none())
            .times(1)
            .returning(|_, _| Ok(None));
        let engine = engine(mock);
        engine.refresh().await.unwrap();

        engine
            .toggle_task_complete(ItemId::Confirmed(task.id))
            .await
            .unwrap();

        let view = engine.snapshot().tasks[0].clone();
        assert!(view.done);
        assert!(!view.pending);
    }

    #[tokio::test]
    async fn failed_update_reports_the_attempted_patch() {
        let mut mock = MockTaskGateway::new();
        let task = server_task("Buy milk");
        let listed = task.clone();
        mock.expect_list_tasks()
            .returning(move |_| Ok(vec![listed.clone()]));
        mock.expect_update_task().returning(|_, _| {
            Err(GatewayError::Rejected {
                status: 404,
                detail: "Task not found".to_string(),
            })
        });
        let engine = engine(mock);
        engine.refresh().await.unwrap();

        let patch = UpdateTaskRequest {
            priority: Some(Priority::High),
            ..Default::default()
        };
        let err = engine
            .update_task(ItemId::Confirmed(task.id), patch.clone())
            .await
            .unwrap_err();

        let sync = err.as_sync().unwrap();
        assert_eq!(
            sync.attempt,
            Attempt::UpdateTask {
                task: ItemId::Confirmed(task.id),
                patch
            }
        );
        assert!(sync.source.is_not_found());
        assert_eq!(engine.snapshot().tasks[0].priority, Priority::Normal);
    }

    #[tokio::test]
    async fn refresh_failure_is_a_sync_error() {
        let mut mock = MockTaskGateway::new();
        mock.expect_list_tasks()
            .returning(|_| Err(GatewayError::Network("connection refused".to_string())));
        let engine = engine(mock);

        let err = engine.refresh().await.unwrap_err();

        assert_eq!(err.as_sync().map(|s| &s.attempt), Some(&Attempt::Refresh));
        assert_eq!(err.to_string(), "refresh failed: network error: connection refused");
    }

    #[test]
    fn empty_patch_is_rejected() {
        let result = normalize_task_patch(UpdateTaskRequest::default());
        assert!(matches!(result, Err(EngineError::Validation(_))));

        let trimmed = normalize_task_patch(UpdateTaskRequest {
            title: Some("  Renamed ".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(trimmed.title.as_deref(), Some("Renamed"));
    }
}
