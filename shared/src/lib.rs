use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub done: bool,
    pub user_email: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub collaborators: Vec<String>,
    #[serde(default)]
    pub pending_requests: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(request: CreateTaskRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: request.title.trim().to_string(),
            description: request.description,
            due_date: request.due_date,
            priority: request.priority,
            done: false,
            user_email: request.user_email,
            created_at: Utc::now(),
            subtasks: Vec::new(),
            collaborators: Vec::new(),
            pending_requests: Vec::new(),
        }
    }

    /// Whether `email` owns the task or was granted access to it.
    pub fn is_visible_to(&self, email: &str) -> bool {
        self.user_email.eq_ignore_ascii_case(email)
            || self.collaborators.iter().any(|c| c.eq_ignore_ascii_case(email))
    }

    pub fn subtask(&self, id: Uuid) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    pub fn subtask_mut(&mut self, id: Uuid) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == id)
    }
}

impl Subtask {
    pub fn new(title: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.trim().to_string(),
            done: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    /// Transient id the client shows until the server answers; echoed back in [`TaskCreated`].
    #[serde(default)]
    pub client_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    pub user_email: String,
}

/// Partial update of a task.
///
/// `description` and `due_date` are tri-state on the wire: a missing key leaves the
/// field alone, `null` clears it and a value sets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

impl UpdateTaskRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.done.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSubtaskRequest {
    #[serde(default)]
    pub client_id: Option<Uuid>,
    pub parent_task_id: Uuid,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateSubtaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareRequest {
    pub shared_with: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub user_email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub approver_email: String,
    pub user_email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub only_open: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskList {
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCreated {
    #[serde(default)]
    pub client_id: Option<Uuid>,
    pub task: Task,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskCreated {
    #[serde(default)]
    pub client_id: Option<Uuid>,
    pub task_id: Uuid,
    pub subtask: Subtask,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Maps an explicit `null` to `Some(None)`; a missing key falls back to `None` via `#[serde(default)]`.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_uses_lowercase_names_and_defaults_to_normal() {
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
        let parsed: Priority = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(parsed, Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
        assert!(Priority::High > Priority::Normal && Priority::Normal > Priority::Low);
    }

    #[test]
    fn update_request_distinguishes_missing_null_and_value() {
        let missing: UpdateTaskRequest = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert_eq!(missing.due_date, None);

        let cleared: UpdateTaskRequest = serde_json::from_str(r#"{"due_date":null}"#).unwrap();
        assert_eq!(cleared.due_date, Some(None));

        let set: UpdateTaskRequest = serde_json::from_str(r#"{"due_date":"2025-03-01"}"#).unwrap();
        assert_eq!(
            set.due_date,
            Some(Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()))
        );
    }

    #[test]
    fn update_request_only_serializes_changed_fields() {
        let request = UpdateTaskRequest {
            priority: Some(Priority::High),
            description: Some(None),
            ..Default::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"priority": "high", "description": null}));
        assert!(!request.is_empty());
        assert!(UpdateTaskRequest::default().is_empty());
    }

    #[test]
    fn task_tolerates_missing_collections() {
        let json = r#"{
            "id": "6f1c1f0e-4d4a-4f36-9d3c-0b6a6f3f6a10",
            "title": "Buy milk",
            "user_email": "ann@example.com",
            "created_at": "2025-01-01T10:00:00Z"
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert!(task.subtasks.is_empty());
        assert!(task.collaborators.is_empty());
        assert_eq!(task.priority, Priority::Normal);
        assert!(!task.done);
    }

    #[test]
    fn visibility_covers_owner_and_collaborators() {
        let mut task = Task::new(CreateTaskRequest {
            client_id: None,
            title: "  Plan trip ".to_string(),
            description: None,
            due_date: None,
            priority: Priority::Normal,
            user_email: "owner@example.com".to_string(),
        });
        task.collaborators.push("friend@example.com".to_string());

        assert_eq!(task.title, "Plan trip");
        assert!(task.is_visible_to("OWNER@example.com"));
        assert!(task.is_visible_to("friend@example.com"));
        assert!(!task.is_visible_to("stranger@example.com"));
    }
}
