//! Contract of the remote task API as the engine consumes it.

use async_trait::async_trait;
use shared::{
    Ack, AccessRequest, ApproveRequest, CreateSubtaskRequest, CreateTaskRequest, ListQuery,
    ShareRequest, Subtask, SubtaskCreated, Task, TaskCreated, UpdateSubtaskRequest,
    UpdateTaskRequest,
};
use uuid::Uuid;

use crate::error::GatewayError;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Remote calls behind every engine operation.
///
/// Updates and toggles may answer with the entity as stored (`Some`) or with a bare
/// acknowledgement (`None`); the engine then treats the values it sent as confirmed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskGateway: Send + Sync {
    async fn list_tasks(&self, query: &ListQuery) -> GatewayResult<Vec<Task>>;

    async fn create_task(&self, request: &CreateTaskRequest) -> GatewayResult<TaskCreated>;

    async fn update_task(&self, id: Uuid, request: &UpdateTaskRequest) -> GatewayResult<Option<Task>>;

    async fn delete_task(&self, id: Uuid) -> GatewayResult<Ack>;

    async fn add_subtask(&self, request: &CreateSubtaskRequest) -> GatewayResult<SubtaskCreated>;

    async fn update_subtask(
        &self,
        task_id: Uuid,
        subtask_id: Uuid,
        request: &UpdateSubtaskRequest,
    ) -> GatewayResult<Option<Subtask>>;

    /// Flips the subtask's completion flag server-side.
    async fn toggle_subtask(&self, task_id: Uuid, subtask_id: Uuid) -> GatewayResult<Option<Subtask>>;

    async fn delete_subtask(&self, task_id: Uuid, subtask_id: Uuid) -> GatewayResult<Ack>;

    async fn share_task(&self, task_id: Uuid, request: &ShareRequest) -> GatewayResult<Ack>;

    async fn request_access(&self, task_id: Uuid, request: &AccessRequest) -> GatewayResult<Ack>;

    async fn approve_access(&self, task_id: Uuid, request: &ApproveRequest) -> GatewayResult<Ack>;
}
