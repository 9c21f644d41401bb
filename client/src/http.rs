use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    Ack, AccessRequest, ApproveRequest, CreateSubtaskRequest, CreateTaskRequest, ErrorBody,
    ListQuery, ShareRequest, Subtask, SubtaskCreated, Task, TaskCreated, TaskList,
    UpdateSubtaskRequest, UpdateTaskRequest,
};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::GatewayError;
use crate::gateway::{GatewayResult, TaskGateway};

/// [`TaskGateway`] over the JSON API served by the `backend` crate.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> GatewayResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn from_config(config: &ClientConfig) -> GatewayResult<Self> {
        Ok(Self::new(&config.base_url)?.with_token(config.token.clone()))
    }

    /// Bearer token sent with every request.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    #[tracing::instrument(level = "debug", skip(self, builder))]
    async fn send<T: DeserializeOwned>(&self, path: &str, builder: RequestBuilder) -> GatewayResult<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        parse_response(response).await
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> GatewayResult<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.detail)
            .unwrap_or(text);
        return Err(GatewayError::Rejected {
            status: status.as_u16(),
            detail,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| GatewayError::Decode(e.to_string()))
}

#[async_trait]
impl TaskGateway for HttpGateway {
    async fn list_tasks(&self, query: &ListQuery) -> GatewayResult<Vec<Task>> {
        let path = "/tasks/list";
        let list: TaskList = self
            .send(path, self.request(Method::GET, path).query(query))
            .await?;
        Ok(list.tasks)
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> GatewayResult<TaskCreated> {
        let path = "/tasks/create";
        self.send(path, self.request(Method::POST, path).json(request))
            .await
    }

    async fn update_task(&self, id: Uuid, request: &UpdateTaskRequest) -> GatewayResult<Option<Task>> {
        let path = format!("/tasks/update/{}", id);
        let task: Task = self
            .send(&path, self.request(Method::PUT, &path).json(request))
            .await?;
        Ok(Some(task))
    }

    async fn delete_task(&self, id: Uuid) -> GatewayResult<Ack> {
        let path = format!("/tasks/delete/{}", id);
        self.send(&path, self.request(Method::DELETE, &path)).await
    }

    async fn add_subtask(&self, request: &CreateSubtaskRequest) -> GatewayResult<SubtaskCreated> {
        let path = "/tasks/subtask/add";
        self.send(path, self.request(Method::POST, path).json(request))
            .await
    }

    async fn update_subtask(
        &self,
        task_id: Uuid,
        subtask_id: Uuid,
        request: &UpdateSubtaskRequest,
    ) -> GatewayResult<Option<Subtask>> {
        let path = format!("/tasks/subtask/update/{}/{}", task_id, subtask_id);
        let subtask: Subtask = self
            .send(&path, self.request(Method::PUT, &path).json(request))
            .await?;
        Ok(Some(subtask))
    }

    async fn toggle_subtask(&self, task_id: Uuid, subtask_id: Uuid) -> GatewayResult<Option<Subtask>> {
        let path = format!("/tasks/subtask/complete/{}/{}", task_id, subtask_id);
        let subtask: Subtask = self.send(&path, self.request(Method::PUT, &path)).await?;
        Ok(Some(subtask))
    }

    async fn delete_subtask(&self, task_id: Uuid, subtask_id: Uuid) -> GatewayResult<Ack> {
        let path = format!("/tasks/subtask/delete/{}/{}", task_id, subtask_id);
        self.send(&path, self.request(Method::DELETE, &path)).await
    }

    async fn share_task(&self, task_id: Uuid, request: &ShareRequest) -> GatewayResult<Ack> {
        let path = format!("/tasks/share_task/{}", task_id);
        self.send(&path, self.request(Method::POST, &path).json(request))
            .await
    }

    async fn request_access(&self, task_id: Uuid, request: &AccessRequest) -> GatewayResult<Ack> {
        let path = format!("/tasks/request_access/{}", task_id);
        self.send(&path, self.request(Method::POST, &path).json(request))
            .await
    }

    async fn approve_access(&self, task_id: Uuid, request: &ApproveRequest) -> GatewayResult<Ack> {
        let path = format!("/tasks/approve_access/{}", task_id);
        self.send(&path, self.request(Method::POST, &path).json(request))
            .await
    }
}
