//! Client-side view of tasks and subtasks.

use chrono::{DateTime, NaiveDate, Utc};
use shared::{Priority, Subtask, Task, UpdateSubtaskRequest, UpdateTaskRequest};
use uuid::Uuid;

use crate::record::Record;

/// Identifier of a task or subtask as the presentation layer sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemId {
    /// Client-generated placeholder used until the server answers.
    Transient(Uuid),
    /// Server-assigned identifier.
    Confirmed(Uuid),
}

impl ItemId {
    pub fn uuid(&self) -> Uuid {
        match self {
            ItemId::Transient(id) | ItemId::Confirmed(id) => *id,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ItemId::Transient(_))
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemId::Transient(id) => write!(f, "tmp-{}", id),
            ItemId::Confirmed(id) => write!(f, "{}", id),
        }
    }
}

impl From<Uuid> for ItemId {
    fn from(id: Uuid) -> Self {
        ItemId::Confirmed(id)
    }
}

/// User input for a new task.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority: Priority,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskFields {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority: Priority,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskField {
    Title,
    Description,
    DueDate,
    Priority,
    Done,
}

impl From<&Task> for TaskFields {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            due_date: task.due_date,
            priority: task.priority,
            done: task.done,
        }
    }
}

impl From<&NewTask> for TaskFields {
    fn from(new: &NewTask) -> Self {
        Self {
            title: new.title.clone(),
            description: new.description.clone(),
            due_date: new.due_date,
            priority: new.priority,
            done: false,
        }
    }
}

impl Record for TaskFields {
    type Field = TaskField;
    type Patch = UpdateTaskRequest;

    fn apply(&mut self, patch: &UpdateTaskRequest) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(done) = patch.done {
            self.done = done;
        }
    }

    fn fields(patch: &UpdateTaskRequest) -> Vec<TaskField> {
        let mut fields = Vec::new();
        if patch.title.is_some() {
            fields.push(TaskField::Title);
        }
        if patch.description.is_some() {
            fields.push(TaskField::Description);
        }
        if patch.due_date.is_some() {
            fields.push(TaskField::DueDate);
        }
        if patch.priority.is_some() {
            fields.push(TaskField::Priority);
        }
        if patch.done.is_some() {
            fields.push(TaskField::Done);
        }
        fields
    }

    fn extract(&self, fields: &[TaskField]) -> UpdateTaskRequest {
        let mut patch = UpdateTaskRequest::default();
        for field in fields {
            match field {
                TaskField::Title => patch.title = Some(self.title.clone()),
                TaskField::Description => patch.description = Some(self.description.clone()),
                TaskField::DueDate => patch.due_date = Some(self.due_date),
                TaskField::Priority => patch.priority = Some(self.priority),
                TaskField::Done => patch.done = Some(self.done),
            }
        }
        patch
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubtaskFields {
    pub title: String,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubtaskField {
    Title,
    Done,
}

impl From<&Subtask> for SubtaskFields {
    fn from(subtask: &Subtask) -> Self {
        Self {
            title: subtask.title.clone(),
            done: subtask.done,
        }
    }
}

impl Record for SubtaskFields {
    type Field = SubtaskField;
    type Patch = UpdateSubtaskRequest;

    fn apply(&mut self, patch: &UpdateSubtaskRequest) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(done) = patch.done {
            self.done = done;
        }
    }

    fn fields(patch: &UpdateSubtaskRequest) -> Vec<SubtaskField> {
        let mut fields = Vec::new();
        if patch.title.is_some() {
            fields.push(SubtaskField::Title);
        }
        if patch.done.is_some() {
            fields.push(SubtaskField::Done);
        }
        fields
    }

    fn extract(&self, fields: &[SubtaskField]) -> UpdateSubtaskRequest {
        let mut patch = UpdateSubtaskRequest::default();
        for field in fields {
            match field {
                SubtaskField::Title => patch.title = Some(self.title.clone()),
                SubtaskField::Done => patch.done = Some(self.done),
            }
        }
        patch
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskView {
    pub id: ItemId,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority: Priority,
    pub done: bool,
    pub created_at: DateTime<Utc>,
    pub owner_email: String,
    pub collaborators: Vec<String>,
    pub pending_requests: Vec<String>,
    pub subtasks: Vec<SubtaskView>,
    /// A create, update or subtask change for this task is in flight.
    pub pending: bool,
}

impl TaskView {
    pub fn subtask(&self, id: &ItemId) -> Option<&SubtaskView> {
        self.subtasks.iter().find(|s| s.id == *id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubtaskView {
    pub id: ItemId,
    pub task_id: ItemId,
    pub title: String,
    pub done: bool,
    pub created_at: DateTime<Utc>,
    pub pending: bool,
}

/// Ordered state published to subscribers after every change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub version: u64,
    pub tasks: Vec<TaskView>,
}

impl Snapshot {
    pub fn task(&self, id: &ItemId) -> Option<&TaskView> {
        self.tasks.iter().find(|t| t.id == *id)
    }

    pub fn tasks_titled<'a>(&'a self, title: &'a str) -> impl Iterator<Item = &'a TaskView> + 'a {
        self.tasks.iter().filter(move |t| t.title == title)
    }
}

/// The operation a [`SyncError`](crate::SyncError) belongs to, with its inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    CreateTask(NewTask),
    UpdateTask {
        task: ItemId,
        patch: UpdateTaskRequest,
    },
    DeleteTask(ItemId),
    AddSubtask {
        task: ItemId,
        title: String,
    },
    UpdateSubtask {
        task: ItemId,
        subtask: ItemId,
        patch: UpdateSubtaskRequest,
    },
    ToggleSubtask {
        task: ItemId,
        subtask: ItemId,
    },
    DeleteSubtask {
        task: ItemId,
        subtask: ItemId,
    },
    ShareTask {
        task: ItemId,
        email: String,
    },
    RequestAccess(ItemId),
    ApproveAccess {
        task: ItemId,
        grantee: String,
    },
    Refresh,
}

impl Attempt {
    pub fn operation(&self) -> &'static str {
        match self {
            Attempt::CreateTask(_) => "create task",
            Attempt::UpdateTask { .. } => "update task",
            Attempt::DeleteTask(_) => "delete task",
            Attempt::AddSubtask { .. } => "add subtask",
            Attempt::UpdateSubtask { .. } => "update subtask",
            Attempt::ToggleSubtask { .. } => "toggle subtask",
            Attempt::DeleteSubtask { .. } => "delete subtask",
            Attempt::ShareTask { .. } => "share task",
            Attempt::RequestAccess(_) => "request access",
            Attempt::ApproveAccess { .. } => "approve access",
            Attempt::Refresh => "refresh",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_patch_round_trips_through_extract() {
        let fields = TaskFields {
            title: "Buy milk".to_string(),
            description: None,
            due_date: NaiveDate::from_ymd_opt(2025, 5, 1),
            priority: Priority::High,
            done: true,
        };
        let patch = fields.extract(&[TaskField::DueDate, TaskField::Done]);

        assert_eq!(patch.title, None);
        assert_eq!(patch.due_date, Some(NaiveDate::from_ymd_opt(2025, 5, 1)));
        assert_eq!(patch.done, Some(true));
        assert_eq!(
            TaskFields::fields(&patch),
            vec![TaskField::DueDate, TaskField::Done]
        );
    }

    #[test]
    fn clearing_a_due_date_is_a_field_write() {
        let mut fields = TaskFields::from(&NewTask::titled("x").with_due_date(
            NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
        ));
        let patch = UpdateTaskRequest {
            due_date: Some(None),
            ..Default::default()
        };

        fields.apply(&patch);

        assert_eq!(fields.due_date, None);
        assert_eq!(TaskFields::fields(&patch), vec![TaskField::DueDate]);
    }

    #[test]
    fn item_ids_render_transient_prefix() {
        let id = Uuid::nil();
        assert_eq!(ItemId::Transient(id).to_string(), format!("tmp-{}", id));
        assert_eq!(ItemId::Confirmed(id).to_string(), id.to_string());
        assert!(ItemId::Transient(id).is_transient());
    }
}
