use std::time::Duration;

use sea_orm::DbErr;
use uuid::Uuid;

use crate::services::ServiceError;

/// Failure of a repository operation.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    /// A stored row could not be turned back into a model value.
    #[error("corrupt {entity} row {id}: {detail}")]
    Corrupt {
        entity: &'static str,
        id: Uuid,
        detail: String,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("repository operation timed out after {0:?}")]
    Timeout(Duration),
}

impl RepoError {
    pub(crate) fn corrupt(entity: &'static str, id: Uuid, detail: impl ToString) -> Self {
        RepoError::Corrupt {
            entity,
            id,
            detail: detail.to_string(),
        }
    }
}

/// Error returned synchronously by grading commands and queries.
///
/// Failures of the grading itself (compilation errors, tester crashes) are
/// not call failures: they are recorded inside the terminal evaluation.
#[derive(Debug, thiserror::Error)]
pub enum GradingError {
    #[error("submission is {size} bytes, the limit is {limit}")]
    SubmissionTooLong { size: usize, limit: usize },
    /// Rate limit exceeded. Contains seconds until retry is allowed.
    #[error("submissions are too frequent, try again in {retry_after} seconds")]
    TooFrequent { retry_after: u64 },
    #[error("user {0} not found")]
    UserNotFound(String),
    #[error("language '{0}' not found")]
    LanguageNotFound(String),
    #[error("task '{0}' not found")]
    TaskNotFound(String),
    #[error("submission {0} not found")]
    SubmissionNotFound(Uuid),
    #[error("evaluation {0} not found")]
    EvaluationNotFound(Uuid),
    #[error("timed out waiting for evaluation {0}")]
    WaitTimeout(Uuid),
    /// A collaborator service failed.
    #[error("{service} service failed: {source}")]
    Dependency {
        service: &'static str,
        #[source]
        source: ServiceError,
    },
    #[error(transparent)]
    Storage(#[from] RepoError),
}

impl GradingError {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`,
    /// `RATE_LIMITED`, `NOT_FOUND`, `TIMEOUT`, `DEPENDENCY_ERROR`,
    /// `INTERNAL_ERROR`.
    pub fn code(&self) -> &'static str {
        match self {
            GradingError::SubmissionTooLong { .. } => "VALIDATION_ERROR",
            GradingError::TooFrequent { .. } => "RATE_LIMITED",
            GradingError::UserNotFound(_)
            | GradingError::LanguageNotFound(_)
            | GradingError::TaskNotFound(_)
            | GradingError::SubmissionNotFound(_)
            | GradingError::EvaluationNotFound(_) => "NOT_FOUND",
            GradingError::WaitTimeout(_) => "TIMEOUT",
            GradingError::Dependency { .. } => "DEPENDENCY_ERROR",
            GradingError::Storage(_) => "INTERNAL_ERROR",
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            GradingError::TooFrequent { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Rejections caused by the request itself rather than by the system.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GradingError::SubmissionTooLong { .. } | GradingError::TooFrequent { .. }
        )
    }

    pub(crate) fn dependency(service: &'static str, source: ServiceError) -> Self {
        GradingError::Dependency { service, source }
    }
}

impl From<DbErr> for GradingError {
    fn from(err: DbErr) -> Self {
        GradingError::Storage(RepoError::Db(err))
    }
}
