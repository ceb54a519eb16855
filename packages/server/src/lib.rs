pub mod broadcast;
pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod grading;
pub mod logging;
pub mod orchestrator;
pub mod repository;
pub mod services;

pub use broadcast::{Broadcaster, DeliveryPolicy, EvalUpdate, Keyed, Subscription};
pub use error::{GradingError, RepoError};
pub use orchestrator::{Collaborators, NewSubmission, Orchestrator};
pub use repository::{MemoryRepository, PgRepository, Repository};
pub use services::{ExecutionService, ServiceError, TaskService, User, UserService};
