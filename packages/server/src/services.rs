//! Collaborator services the grader depends on but does not own.

use async_trait::async_trait;
use common::{ExecEvent, ExecRequest, Task};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uuid: Uuid,
    pub username: String,
}

#[async_trait]
pub trait UserService: Send + Sync {
    async fn get_user_by_uuid(&self, uuid: Uuid) -> Result<User, ServiceError>;
    async fn get_user_by_username(&self, username: &str) -> Result<User, ServiceError>;
}

#[async_trait]
pub trait TaskService: Send + Sync {
    async fn get_task(&self, short_id: &str) -> Result<Task, ServiceError>;
    async fn get_test_download_url(&self, sha256: &str) -> Result<String, ServiceError>;
}

/// Sandbox that compiles and runs submissions.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Queue a request, returning the execution id to listen on.
    async fn enqueue(&self, request: ExecRequest) -> Result<Uuid, ServiceError>;

    /// Ordered events of one execution. The channel closes after a terminal
    /// event.
    async fn listen(&self, exec_id: Uuid) -> Result<mpsc::Receiver<ExecEvent>, ServiceError>;
}
