//! A gateway whose calls stay open until the test answers them, in whatever order it likes.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use client::{Engine, GatewayError, GatewayResult, Identity, TaskGateway};
use shared::{
    Ack, AccessRequest, ApproveRequest, CreateSubtaskRequest, CreateTaskRequest, ListQuery,
    Priority, ShareRequest, Subtask, SubtaskCreated, Task, TaskCreated, UpdateSubtaskRequest,
    UpdateTaskRequest,
};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

pub const OWNER: &str = "ann@example.com";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List(ListQuery),
    CreateTask(CreateTaskRequest),
    UpdateTask(Uuid, UpdateTaskRequest),
    DeleteTask(Uuid),
    AddSubtask(CreateSubtaskRequest),
    UpdateSubtask(Uuid, Uuid, UpdateSubtaskRequest),
    ToggleSubtask(Uuid, Uuid),
    DeleteSubtask(Uuid, Uuid),
    Share(Uuid, ShareRequest),
    RequestAccess(Uuid, AccessRequest),
    Approve(Uuid, ApproveRequest),
}

#[derive(Debug)]
pub enum Reply {
    Tasks(Vec<Task>),
    Created(TaskCreated),
    Task(Option<Task>),
    SubtaskCreated(SubtaskCreated),
    Subtask(Option<Subtask>),
    Ack(Ack),
}

pub struct PendingCall {
    pub call: Call,
    responder: oneshot::Sender<GatewayResult<Reply>>,
}

impl PendingCall {
    pub fn reply(self, reply: Reply) {
        let _ = self.responder.send(Ok(reply));
    }

    pub fn ack(self) {
        self.reply(Reply::Ack(Ack {
            message: "ok".to_string(),
        }))
    }

    pub fn fail(self) {
        let _ = self
            .responder
            .send(Err(GatewayError::Network("connection reset".to_string())));
    }

    pub fn reject(self, status: u16, detail: &str) {
        let _ = self.responder.send(Err(GatewayError::Rejected {
            status,
            detail: detail.to_string(),
        }));
    }

    /// Confirms a create with a server copy built from the request.
    pub fn confirm_create(self) -> Task {
        let Call::CreateTask(request) = &self.call else {
            panic!("expected a create, got {:?}", self.call);
        };
        let task = Task::new(request.clone());
        let client_id = request.client_id;
        self.reply(Reply::Created(TaskCreated {
            client_id,
            task: task.clone(),
            message: "created".to_string(),
        }));
        task
    }

    /// Confirms a subtask add with a server copy built from the request.
    pub fn confirm_subtask(self) -> Subtask {
        let Call::AddSubtask(request) = &self.call else {
            panic!("expected a subtask add, got {:?}", self.call);
        };
        let subtask = Subtask::new(request.title.clone());
        let reply = SubtaskCreated {
            client_id: request.client_id,
            task_id: request.parent_task_id,
            subtask: subtask.clone(),
            message: "added".to_string(),
        };
        self.reply(Reply::SubtaskCreated(reply));
        subtask
    }
}

pub struct ScriptedGateway {
    calls: mpsc::UnboundedSender<PendingCall>,
}

pub struct Calls {
    receiver: mpsc::UnboundedReceiver<PendingCall>,
}

impl Calls {
    /// Waits for the engine's next remote call.
    pub async fn next(&mut self) -> PendingCall {
        tokio::time::timeout(Duration::from_secs(5), self.receiver.recv())
            .await
            .expect("no call arrived")
            .expect("gateway dropped")
    }

    pub fn none_pending(&mut self) -> bool {
        self.receiver.try_recv().is_err()
    }
}

impl ScriptedGateway {
    pub fn new() -> (Self, Calls) {
        let (calls, receiver) = mpsc::unbounded_channel();
        (Self { calls }, Calls { receiver })
    }

    async fn dispatch(&self, call: Call) -> GatewayResult<Reply> {
        let (responder, answer) = oneshot::channel();
        self.calls
            .send(PendingCall { call, responder })
            .map_err(|_| GatewayError::Network("test finished".to_string()))?;
        answer
            .await
            .unwrap_or_else(|_| Err(GatewayError::Network("call dropped".to_string())))
    }
}

fn unexpected<T>(reply: Reply) -> GatewayResult<T> {
    Err(GatewayError::Decode(format!("unexpected reply {:?}", reply)))
}

#[async_trait]
impl TaskGateway for ScriptedGateway {
    async fn list_tasks(&self, query: &ListQuery) -> GatewayResult<Vec<Task>> {
        match self.dispatch(Call::List(query.clone())).await? {
            Reply::Tasks(tasks) => Ok(tasks),
            other => unexpected(other),
        }
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> GatewayResult<TaskCreated> {
        match self.dispatch(Call::CreateTask(request.clone())).await? {
            Reply::Created(created) => Ok(created),
            other => unexpected(other),
        }
    }

    async fn update_task(&self, id: Uuid, request: &UpdateTaskRequest) -> GatewayResult<Option<Task>> {
        match self.dispatch(Call::UpdateTask(id, request.clone())).await? {
            Reply::Task(task) => Ok(task),
            Reply::Ack(_) => Ok(None),
            other => unexpected(other),
        }
    }

    async fn delete_task(&self, id: Uuid) -> GatewayResult<Ack> {
        match self.dispatch(Call::DeleteTask(id)).await? {
            Reply::Ack(ack) => Ok(ack),
            other => unexpected(other),
        }
    }

    async fn add_subtask(&self, request: &CreateSubtaskRequest) -> GatewayResult<SubtaskCreated> {
        match self.dispatch(Call::AddSubtask(request.clone())).await? {
            Reply::SubtaskCreated(created) => Ok(created),
            other => unexpected(other),
        }
    }

    async fn update_subtask(
        &self,
        task_id: Uuid,
        subtask_id: Uuid,
        request: &UpdateSubtaskRequest,
    ) -> GatewayResult<Option<Subtask>> {
        match self
            .dispatch(Call::UpdateSubtask(task_id, subtask_id, request.clone()))
            .await?
        {
            Reply::Subtask(subtask) => Ok(subtask),
            Reply::Ack(_) => Ok(None),
            other => unexpected(other),
        }
    }

    async fn toggle_subtask(&self, task_id: Uuid, subtask_id: Uuid) -> GatewayResult<Option<Subtask>> {
        match self.dispatch(Call::ToggleSubtask(task_id, subtask_id)).await? {
            Reply::Subtask(subtask) => Ok(subtask),
            Reply::Ack(_) => Ok(None),
            other => unexpected(other),
        }
    }

    async fn delete_subtask(&self, task_id: Uuid, subtask_id: Uuid) -> GatewayResult<Ack> {
        match self.dispatch(Call::DeleteSubtask(task_id, subtask_id)).await? {
            Reply::Ack(ack) => Ok(ack),
            other => unexpected(other),
        }
    }

    async fn share_task(&self, task_id: Uuid, request: &ShareRequest) -> GatewayResult<Ack> {
        match self.dispatch(Call::Share(task_id, request.clone())).await? {
            Reply::Ack(ack) => Ok(ack),
            other => unexpected(other),
        }
    }

    async fn request_access(&self, task_id: Uuid, request: &AccessRequest) -> GatewayResult<Ack> {
        match self
            .dispatch(Call::RequestAccess(task_id, request.clone()))
            .await?
        {
            Reply::Ack(ack) => Ok(ack),
            other => unexpected(other),
        }
    }

    async fn approve_access(&self, task_id: Uuid, request: &ApproveRequest) -> GatewayResult<Ack> {
        match self.dispatch(Call::Approve(task_id, request.clone())).await? {
            Reply::Ack(ack) => Ok(ack),
            other => unexpected(other),
        }
    }
}

pub fn engine_with_timeout(timeout: Duration) -> (Engine, Calls) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (gateway, calls) = ScriptedGateway::new();
    let engine = Engine::new(Arc::new(gateway), Identity::new(OWNER), timeout);
    (engine, calls)
}

pub fn engine() -> (Engine, Calls) {
    engine_with_timeout(Duration::from_secs(60))
}

pub fn server_task(title: &str) -> Task {
    Task {
        id: Uuid::new_v4(),
        title: title.to_string(),
        description: None,
        due_date: None,
        priority: Priority::Normal,
        done: false,
        user_email: OWNER.to_string(),
        created_at: Utc::now(),
        subtasks: Vec::new(),
        collaborators: Vec::new(),
        pending_requests: Vec::new(),
    }
}

/// Seeds the engine's collection through a refresh answered with `tasks`.
pub async fn seed(engine: &Engine, calls: &mut Calls, tasks: Vec<Task>) {
    let refresh = tokio::spawn({
        let engine = engine.clone();
        async move { engine.refresh().await }
    });
    let call = calls.next().await;
    assert!(matches!(call.call, Call::List(_)), "expected a list, got {:?}", call.call);
    call.reply(Reply::Tasks(tasks));
    refresh.await.unwrap().unwrap();
}

/// Lets spawned engine operations run up to their remote call.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
