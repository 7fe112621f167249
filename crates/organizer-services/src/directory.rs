use organizer_core::Capability;
use organizer_storage::{Repo, StorageError, StoredMembership};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("grants parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("grant for user {user_id}: {reason}")]
    Grant { user_id: i64, reason: String },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Answers which capabilities a user holds inside one organization.
pub trait AccountDirectory: Send + Sync {
    fn capabilities_for(
        &self,
        repo: &Repo<'_>,
        user_id: i64,
        organization_id: i64,
    ) -> Result<BTreeSet<Capability>, DirectoryError>;
}

/// Derives capabilities from the caller's membership role.
#[derive(Debug, Clone, Copy, Default)]
pub struct MembershipDirectory;

impl AccountDirectory for MembershipDirectory {
    fn capabilities_for(
        &self,
        repo: &Repo<'_>,
        user_id: i64,
        organization_id: i64,
    ) -> Result<BTreeSet<Capability>, DirectoryError> {
        let membership = repo.find_by_id::<StoredMembership>(&(user_id, organization_id))?;
        Ok(membership
            .map(|membership| membership.role.capabilities())
            .unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct GrantsFile {
    #[serde(default)]
    grants: Vec<Grant>,
}

#[derive(Debug, Deserialize)]
struct Grant {
    user_id: i64,
    organization_id: i64,
    #[serde(default)]
    capabilities: Vec<String>,
}

/// Fixed grants, typically loaded from a JSON file:
///
/// ```json
/// {"grants": [{"user_id": 1, "organization_id": 2, "capabilities": ["EVENT_UPDATE"]}]}
/// ```
///
/// Capability names are case-insensitive and may use dashes.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    grants: HashMap<(i64, i64), BTreeSet<Capability>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, DirectoryError> {
        let file: GrantsFile = serde_json::from_str(raw)?;
        let mut directory = Self::new();
        for grant in file.grants {
            let capabilities = grant
                .capabilities
                .iter()
                .map(|name| name.parse::<Capability>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|reason| DirectoryError::Grant {
                    user_id: grant.user_id,
                    reason,
                })?;
            directory = directory.grant(grant.user_id, grant.organization_id, capabilities);
        }
        Ok(directory)
    }

    pub fn grant(
        mut self,
        user_id: i64,
        organization_id: i64,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        self.grants
            .entry((user_id, organization_id))
            .or_default()
            .extend(capabilities);
        self
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

impl AccountDirectory for StaticDirectory {
    fn capabilities_for(
        &self,
        _repo: &Repo<'_>,
        user_id: i64,
        organization_id: i64,
    ) -> Result<BTreeSet<Capability>, DirectoryError> {
        Ok(self
            .grants
            .get(&(user_id, organization_id))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use organizer_core::MemberRole;
    use organizer_storage::{OrganizerStore, StoredOrganization};

    #[test]
    fn static_grants_parse_and_merge() {
        let directory = StaticDirectory::from_json(
            r#"{"grants": [
                {"user_id": 1, "organization_id": 2, "capabilities": ["EVENT_UPDATE"]},
                {"user_id": 1, "organization_id": 2, "capabilities": ["member-manage"]},
                {"user_id": 4, "organization_id": 2}
            ]}"#,
        )
        .expect("parse grants");
        assert_eq!(directory.len(), 2);

        let store = OrganizerStore::open_in_memory().expect("open db");
        let capabilities = directory
            .capabilities_for(&store.repo(), 1, 2)
            .expect("lookup");
        assert!(capabilities.contains(&Capability::EventUpdate));
        assert!(capabilities.contains(&Capability::MemberManage));
        assert!(directory
            .capabilities_for(&store.repo(), 9, 2)
            .expect("lookup")
            .is_empty());
    }

    #[test]
    fn malformed_grants_are_rejected() {
        let err = StaticDirectory::from_json(r#"{"grants": [{"user_id": "x"}]}"#)
            .expect_err("bad grants");
        assert!(matches!(err, DirectoryError::Parse(_)));

        let err = StaticDirectory::from_json(
            r#"{"grants": [{"user_id": 3, "organization_id": 2, "capabilities": ["EVENT_PUBLISH"]}]}"#,
        )
        .expect_err("unknown capability");
        assert!(matches!(err, DirectoryError::Grant { user_id: 3, .. }));
    }

    #[test]
    fn membership_role_drives_capabilities() {
        let store = OrganizerStore::open_in_memory().expect("open db");
        let repo = store.repo();
        repo.insert(&StoredOrganization {
            id: 2,
            name: "Film society".to_string(),
            is_verified: true,
        })
        .expect("insert organization");
        repo.save(&StoredMembership {
            user_id: 1,
            organization_id: 2,
            role: MemberRole::Admin,
        })
        .expect("save membership");

        let directory = MembershipDirectory;
        let admin = directory.capabilities_for(&repo, 1, 2).expect("lookup");
        assert!(admin.contains(&Capability::MemberManage));
        assert!(!admin.contains(&Capability::OrganizationRemove));
        assert!(directory
            .capabilities_for(&repo, 1, 3)
            .expect("lookup")
            .is_empty());
    }
}
