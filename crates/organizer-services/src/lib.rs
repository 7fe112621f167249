pub mod directory;
pub mod event;
pub mod gate;
pub mod organization;
pub mod question;
pub mod reconcile;

use organizer_core::organizer_contracts::{Ack, ContractError, FailureKind, OperationResult};
use organizer_storage::{OrganizerStore, Repo, StorageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub use directory::{AccountDirectory, DirectoryError, MembershipDirectory, StaticDirectory};
pub use event::{EventOperations, EventService};
pub use organization::{OrganizationOperations, OrganizationService};
pub use question::{QuestionOperations, QuestionService};

/// Reply text for every gate failure that involves a caller identity.
pub const PERMISSION_DENIED: &str = "Permission denied.";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Denied(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("storage error: {0}")]
    Unknown(#[from] StorageError),
}

impl From<ContractError> for ServiceError {
    fn from(err: ContractError) -> Self {
        ServiceError::InvalidArgument(err.to_string())
    }
}

impl ServiceError {
    /// Folds non-fatal gate failures into a failure reply; everything else
    /// stays an error.
    pub fn into_failure(self) -> Result<OperationResult, ServiceError> {
        match self {
            ServiceError::Conflict(message) => {
                Ok(OperationResult::failed(FailureKind::Conflict, message))
            }
            ServiceError::NotFound(message) => {
                Ok(OperationResult::failed(FailureKind::NotFound, message))
            }
            ServiceError::Denied(message) => {
                Ok(OperationResult::failed(FailureKind::Denied, message))
            }
            other => Err(other),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Conflict(_) => "conflict",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Denied(_) => "denied",
            ServiceError::InvalidArgument(_) => "invalid_argument",
            ServiceError::Unknown(_) => "unknown",
        }
    }
}

/// Location of the organizer database. Every call opens its own connection.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn open(&self) -> Result<OrganizerStore, StorageError> {
        OrganizerStore::open(&self.path)
    }
}

/// Shared collaborators handed to every orchestrator.
#[derive(Clone)]
pub struct ServiceContext {
    pub database: Database,
    pub directory: Arc<dyn AccountDirectory>,
}

impl ServiceContext {
    pub fn new(database: Database, directory: Arc<dyn AccountDirectory>) -> Self {
        Self {
            database,
            directory,
        }
    }

    /// Runs `work` inside a write scope on a fresh connection. The scope
    /// commits only when `work` succeeds.
    pub(crate) fn in_scope<T>(
        &self,
        work: impl FnOnce(&Repo<'_>) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut store = self.database.open()?;
        let scope = store.begin()?;
        let value = work(&scope.repo())?;
        scope.commit()?;
        Ok(value)
    }

    pub(crate) fn read<T>(
        &self,
        work: impl FnOnce(&Repo<'_>) -> Result<T, StorageError>,
    ) -> Result<T, ServiceError> {
        let store = self.database.open()?;
        Ok(work(&store.repo())?)
    }
}

/// Logs a mutation outcome and folds gate failures into the reply.
pub(crate) fn settle(
    operation: &'static str,
    outcome: Result<OperationResult, ServiceError>,
) -> Result<OperationResult, ServiceError> {
    match outcome.or_else(ServiceError::into_failure) {
        Ok(result) => {
            if result.success {
                info!(event = "mutation_applied", operation, message = %result.message);
            } else {
                info!(
                    event = "mutation_rejected",
                    operation,
                    failure = ?result.failure,
                    message = %result.message
                );
            }
            Ok(result)
        }
        Err(err) => {
            warn!(event = "mutation_failed", operation, kind = err.kind(), error = %err);
            Err(err)
        }
    }
}

pub(crate) fn settle_ack(
    operation: &'static str,
    outcome: Result<Ack, ServiceError>,
) -> Result<Ack, ServiceError> {
    match &outcome {
        Ok(_) => info!(event = "mutation_applied", operation),
        Err(err) => warn!(event = "mutation_failed", operation, kind = err.kind(), error = %err),
    }
    outcome
}

/// Maps a duplicate-key insert onto the caller-facing conflict message.
pub(crate) fn conflict_as(message: &str) -> impl Fn(StorageError) -> ServiceError + '_ {
    move |err| match err {
        StorageError::Conflict { .. } => ServiceError::Conflict(message.to_string()),
        other => ServiceError::Unknown(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_failures_fold_into_failure_replies() {
        let folded = ServiceError::Denied(PERMISSION_DENIED.to_string())
            .into_failure()
            .expect("denial is non-fatal");
        assert!(!folded.success);
        assert_eq!(folded.failure, Some(FailureKind::Denied));
        assert_eq!(folded.message, PERMISSION_DENIED);

        let invalid = ServiceError::InvalidArgument("mixed".to_string()).into_failure();
        assert!(matches!(invalid, Err(ServiceError::InvalidArgument(_))));
    }

    #[test]
    fn duplicate_key_maps_to_conflict() {
        let mapped = conflict_as("An event with this ID already exists.")(
            StorageError::Conflict { table: "events" },
        );
        assert!(matches!(mapped, ServiceError::Conflict(message) if message.contains("already exists")));

        let passthrough = conflict_as("unused")(StorageError::Timestamp("bad".to_string()));
        assert!(matches!(passthrough, ServiceError::Unknown(_)));
    }
}
