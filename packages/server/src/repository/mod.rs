//! Durable storage of submissions and finished evaluations.

mod memory;
mod pg;

pub use memory::MemoryRepository;
pub use pg::PgRepository;

use async_trait::async_trait;
use common::{Evaluation, Submission};
use uuid::Uuid;

use crate::error::RepoError;

#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert a submission, overwriting any previous row with the same uuid.
    async fn store_submission(&self, subm: &Submission) -> Result<(), RepoError>;

    /// Point a submission at its latest evaluation.
    async fn assign_evaluation(&self, subm_uuid: Uuid, eval_uuid: Uuid) -> Result<(), RepoError>;

    async fn get_submission(&self, uuid: Uuid) -> Result<Option<Submission>, RepoError>;

    /// Newest first.
    async fn list_submissions(&self, limit: u64, offset: u64)
    -> Result<Vec<Submission>, RepoError>;

    /// All submissions of one author, newest first.
    async fn list_author_submissions(&self, author_uuid: Uuid)
    -> Result<Vec<Submission>, RepoError>;

    /// Upsert the evaluation and replace all of its children in one
    /// transaction. Storing the same evaluation twice leaves one copy.
    async fn store_evaluation(&self, eval: &Evaluation) -> Result<(), RepoError>;

    async fn get_evaluation(&self, uuid: Uuid) -> Result<Option<Evaluation>, RepoError>;
}
