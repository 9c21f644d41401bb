//! Client-side synchronization engine for the task service.
//!
//! [`Engine`] keeps a local collection of tasks and subtasks that the presentation layer can
//! read at any time. Mutations show up immediately and are confirmed or rolled back when the
//! server answers; [`RefreshCoordinator`] periodically merges the server's copy back in.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod http;
pub mod model;
pub mod record;
mod store;
pub mod view;

pub use config::{ClientConfig, Identity};
pub use coordinator::{
    CoordinatorHandle, RefreshCoordinator, RefreshOutcome, RefreshReason, MIN_POLL_INTERVAL,
};
pub use engine::{Engine, DEFAULT_CALL_TIMEOUT};
pub use error::{EngineError, EngineResult, GatewayError, MergeConflict, SyncError};
pub use gateway::{GatewayResult, TaskGateway};
pub use http::HttpGateway;
pub use model::{Attempt, ItemId, NewTask, Snapshot, SubtaskView, TaskView};
pub use store::RefreshReport;
pub use view::{stats, subtask_progress, visible_tasks, Filter, SortOrder, Stats, ViewOptions};
