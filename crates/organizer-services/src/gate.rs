use crate::directory::{AccountDirectory, DirectoryError};
use crate::{ServiceError, PERMISSION_DENIED};
use organizer_core::Capability;
use organizer_storage::{
    Record, Repo, StorageError, StoredEvent, StoredOrganization, StoredQuestionGroup,
};
use std::collections::BTreeSet;
use tracing::debug;

/// Entity a permission check is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTarget {
    Organization(i64),
    Event(i64),
    QuestionGroup(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(String),
}

impl Decision {
    pub fn into_result(self) -> Result<(), ServiceError> {
        match self {
            Decision::Allowed => Ok(()),
            Decision::Denied(reason) => Err(ServiceError::Denied(reason)),
        }
    }
}

/// Checks that `user_id` holds `capability` in the organization owning
/// `target`. Unknown targets, lookup errors and missing capabilities all
/// produce the same denial.
pub fn authorize(
    repo: &Repo<'_>,
    directory: &dyn AccountDirectory,
    user_id: i64,
    target: GateTarget,
    capability: Capability,
) -> Decision {
    authorize_all(repo, directory, user_id, target, &BTreeSet::from([capability]))
}

/// Like `authorize`, but every capability in `required` must be held.
pub fn authorize_all(
    repo: &Repo<'_>,
    directory: &dyn AccountDirectory,
    user_id: i64,
    target: GateTarget,
    required: &BTreeSet<Capability>,
) -> Decision {
    match holds_all(repo, directory, user_id, target, required) {
        Ok(true) => Decision::Allowed,
        Ok(false) => {
            debug!(
                event = "gate_denied",
                user_id,
                gate_target = ?target,
                required = ?required
            );
            Decision::Denied(PERMISSION_DENIED.to_string())
        }
        Err(err) => {
            debug!(
                event = "gate_lookup_failed",
                user_id,
                gate_target = ?target,
                required = ?required,
                error = %err
            );
            Decision::Denied(PERMISSION_DENIED.to_string())
        }
    }
}

fn holds_all(
    repo: &Repo<'_>,
    directory: &dyn AccountDirectory,
    user_id: i64,
    target: GateTarget,
    required: &BTreeSet<Capability>,
) -> Result<bool, DirectoryError> {
    let Some(organization_id) = owning_organization(repo, target)? else {
        return Ok(false);
    };
    let held = directory.capabilities_for(repo, user_id, organization_id)?;
    Ok(required.is_subset(&held))
}

/// Walks `QuestionGroup -> Event -> Organization`. `None` when any link is
/// missing.
pub fn owning_organization(
    repo: &Repo<'_>,
    target: GateTarget,
) -> Result<Option<i64>, StorageError> {
    match target {
        GateTarget::Organization(id) => {
            let exists = repo.exists::<StoredOrganization>(&id)?;
            Ok(exists.then_some(id))
        }
        GateTarget::Event(id) => Ok(repo
            .find_by_id::<StoredEvent>(&id)?
            .map(|event| event.organization_id)),
        GateTarget::QuestionGroup(id) => match repo.find_by_id::<StoredQuestionGroup>(&id)? {
            Some(group) => owning_organization(repo, GateTarget::Event(group.event_id)),
            None => Ok(None),
        },
    }
}

pub fn exists<R: Record>(repo: &Repo<'_>, key: &R::Key) -> Result<bool, StorageError> {
    repo.exists::<R>(key)
}

/// Fails with `Conflict(message)` when a record with `key` is stored.
pub fn require_absent<R: Record>(
    repo: &Repo<'_>,
    key: &R::Key,
    message: &str,
) -> Result<(), ServiceError> {
    if exists::<R>(repo, key)? {
        return Err(ServiceError::Conflict(message.to_string()));
    }
    Ok(())
}

/// Fails with `NotFound(message)` when no record with `key` is stored.
pub fn require_extant<R: Record>(
    repo: &Repo<'_>,
    key: &R::Key,
    message: &str,
) -> Result<(), ServiceError> {
    if !exists::<R>(repo, key)? {
        return Err(ServiceError::NotFound(message.to_string()));
    }
    Ok(())
}
