//! Task persistence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use shared::Task;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("corrupt task record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn all(&self) -> StoreResult<Vec<Task>>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Task>>;

    /// Inserts or overwrites.
    async fn put(&self, task: &Task) -> StoreResult<()>;

    /// Returns whether the task existed.
    async fn remove(&self, id: Uuid) -> StoreResult<bool>;
}

/// Tasks stored as JSON strings under `task:{id}`.
#[derive(Clone)]
pub struct RedisStore {
    client: Arc<Client>,
}

impl RedisStore {
    pub fn open(url: &str) -> StoreResult<Self> {
        Ok(Self {
            client: Arc::new(Client::open(url)?),
        })
    }

    fn key(id: Uuid) -> String {
        format!("task:{}", id)
    }
}

#[async_trait]
impl TaskStore for RedisStore {
    async fn all(&self) -> StoreResult<Vec<Task>> {
        let mut conn = self.client.get_async_connection().await?;
        let keys: Vec<String> = conn.keys("task:*").await?;
        let mut tasks = Vec::with_capacity(keys.len());
        for key in keys {
            let json: Option<String> = conn.get(&key).await?;
            // deleted between KEYS and GET
            let Some(json) = json else { continue };
            match serde_json::from_str::<Task>(&json) {
                Ok(task) => tasks.push(task),
                Err(err) => tracing::warn!(%key, %err, "skipping unreadable task"),
            }
        }
        Ok(tasks)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Task>> {
        let mut conn = self.client.get_async_connection().await?;
        let json: Option<String> = conn.get(Self::key(id)).await?;
        Ok(json.map(|json| serde_json::from_str(&json)).transpose()?)
    }

    async fn put(&self, task: &Task) -> StoreResult<()> {
        let json = serde_json::to_string(task)?;
        let mut conn = self.client.get_async_connection().await?;
        let _: () = conn.set(Self::key(task.id), json).await?;
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> StoreResult<bool> {
        let mut conn = self.client.get_async_connection().await?;
        let deleted: usize = conn.del(Self::key(id)).await?;
        Ok(deleted > 0)
    }
}

#[derive(Default, Clone)]
pub struct MemoryStore {
    tasks: Arc<RwLock<HashMap<Uuid, Task>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn all(&self) -> StoreResult<Vec<Task>> {
        Ok(self.tasks.read().await.values().cloned().collect())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn put(&self, task: &Task) -> StoreResult<()> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tasks.write().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{CreateTaskRequest, Priority};

    fn task(title: &str) -> Task {
        Task::new(CreateTaskRequest {
            client_id: None,
            title: title.to_string(),
            description: None,
            due_date: None,
            priority: Priority::Normal,
            user_email: "ann@example.com".to_string(),
        })
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        let task = task("Buy milk");

        store.put(&task).await.unwrap();
        assert_eq!(store.get(task.id).await.unwrap(), Some(task.clone()));
        assert_eq!(store.all().await.unwrap().len(), 1);

        assert!(store.remove(task.id).await.unwrap());
        assert!(!store.remove(task.id).await.unwrap());
        assert_eq!(store.get(task.id).await.unwrap(), None);
    }
}
