use crate::gate::{self, GateTarget};
use crate::reconcile::{self, plan_insert_missing, plan_remove_by_ids};
use crate::{conflict_as, settle, ServiceContext, ServiceError};
use organizer_core::organizer_contracts::{
    CreateOrganizationRequest, GetByIdRequest, GetMembersResponse, GetOrganizationByIdResponse,
    GetOrganizationResponse, OperationResult, RemoveOrganizationRequest, UpdateMemberRoleRequest,
    UpdateOrganizationRequest, UpdateUsersInOrganizationRequest,
};
use organizer_core::{Capability, MemberRole};
use organizer_storage::{Entity, Repo, StoredMembership, StoredOrganization};
use std::collections::BTreeSet;
use tracing::debug;

const ORGANIZATION_EXISTS: &str = "An organization with this ID already exists.";
const ORGANIZATION_MISSING: &str = "An organization with this ID does not exist.";
const ORGANIZATION_NOT_FOUND: &str = "Cannot find organization from given ID.";
const MEMBER_MISSING: &str = "This user is not a member of the organization.";
const LAST_OWNER: &str = "An organization must keep at least one owner.";
const USERS_ADDED: &str = "Users added to organization.";
const USERS_REMOVED: &str = "Users removed from organization.";

pub trait OrganizationOperations {
    fn create_organization(
        &self,
        request: CreateOrganizationRequest,
    ) -> Result<OperationResult, ServiceError>;
    fn list_organizations(&self) -> Result<GetOrganizationResponse, ServiceError>;
    fn organization_by_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetOrganizationByIdResponse, ServiceError>;
    fn update_organization(
        &self,
        request: UpdateOrganizationRequest,
    ) -> Result<OperationResult, ServiceError>;
    fn remove_organization(
        &self,
        request: RemoveOrganizationRequest,
    ) -> Result<OperationResult, ServiceError>;

    fn add_users_to_organization(
        &self,
        request: UpdateUsersInOrganizationRequest,
    ) -> Result<OperationResult, ServiceError>;
    fn remove_users_from_organization(
        &self,
        request: UpdateUsersInOrganizationRequest,
    ) -> Result<OperationResult, ServiceError>;
    fn update_member_role(
        &self,
        request: UpdateMemberRoleRequest,
    ) -> Result<OperationResult, ServiceError>;
    fn members_by_organization_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetMembersResponse, ServiceError>;
}

#[derive(Clone)]
pub struct OrganizationService {
    context: ServiceContext,
}

impl OrganizationService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    fn authorize(
        &self,
        repo: &Repo<'_>,
        user_id: i64,
        organization_id: i64,
        required: &BTreeSet<Capability>,
    ) -> Result<(), ServiceError> {
        gate::authorize_all(
            repo,
            self.context.directory.as_ref(),
            user_id,
            GateTarget::Organization(organization_id),
            required,
        )
        .into_result()
    }
}

/// `base` plus every capability of `roles`. A caller may only grant, revoke
/// or reassign roles whose capabilities it holds itself.
fn required_for_roles(
    base: Capability,
    roles: impl IntoIterator<Item = MemberRole>,
) -> BTreeSet<Capability> {
    let mut required = BTreeSet::from([base]);
    for role in roles {
        required.extend(role.capabilities());
    }
    required
}

fn owner_count<'a>(members: impl IntoIterator<Item = &'a StoredMembership>) -> usize {
    members
        .into_iter()
        .filter(|member| member.role == MemberRole::Owner)
        .count()
}

impl OrganizationOperations for OrganizationService {
    fn create_organization(
        &self,
        request: CreateOrganizationRequest,
    ) -> Result<OperationResult, ServiceError> {
        let organization = request.organization;
        let outcome = organization
            .validate()
            .map_err(ServiceError::from)
            .and_then(|()| {
                self.context.in_scope(|repo| {
                    gate::require_absent::<StoredOrganization>(
                        repo,
                        &organization.id,
                        ORGANIZATION_EXISTS,
                    )?;
                    repo.insert(&StoredOrganization::from_message(&organization))
                        .map_err(conflict_as(ORGANIZATION_EXISTS))?;
                    repo.insert(&StoredMembership {
                        user_id: request.user_id,
                        organization_id: organization.id,
                        role: MemberRole::Owner,
                    })?;
                    Ok(OperationResult::successful("Organization creation successful."))
                })
            });
        settle("create_organization", outcome)
    }

    fn list_organizations(&self) -> Result<GetOrganizationResponse, ServiceError> {
        let organizations = self
            .context
            .read(|repo| repo.find_all::<StoredOrganization>())?;
        Ok(GetOrganizationResponse {
            organizations: organizations.iter().map(Entity::to_message).collect(),
        })
    }

    fn organization_by_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetOrganizationByIdResponse, ServiceError> {
        let organization = self
            .context
            .read(|repo| repo.find_by_id::<StoredOrganization>(&request.id))?;
        Ok(GetOrganizationByIdResponse {
            organization: organization.map(|organization| organization.to_message()),
        })
    }

    fn update_organization(
        &self,
        request: UpdateOrganizationRequest,
    ) -> Result<OperationResult, ServiceError> {
        let organization = request.organization;
        let outcome = organization
            .validate()
            .map_err(ServiceError::from)
            .and_then(|()| {
                self.context.in_scope(|repo| {
                    gate::require_extant::<StoredOrganization>(
                        repo,
                        &organization.id,
                        ORGANIZATION_MISSING,
                    )?;
                    self.authorize(
                        repo,
                        request.user_id,
                        organization.id,
                        &BTreeSet::from([Capability::OrganizationUpdate]),
                    )?;
                    repo.save(&StoredOrganization::from_message(&organization))?;
                    Ok(OperationResult::successful("Organization update successful."))
                })
            });
        settle("update_organization", outcome)
    }

    fn remove_organization(
        &self,
        request: RemoveOrganizationRequest,
    ) -> Result<OperationResult, ServiceError> {
        let outcome = self.context.in_scope(|repo| {
            gate::require_extant::<StoredOrganization>(
                repo,
                &request.organization_id,
                ORGANIZATION_NOT_FOUND,
            )?;
            self.authorize(
                repo,
                request.user_id,
                request.organization_id,
                &BTreeSet::from([Capability::OrganizationRemove]),
            )?;
            repo.delete_by_id::<StoredOrganization>(&request.organization_id)?;
            Ok(OperationResult::successful("Organization deletion successful."))
        });
        settle("remove_organization", outcome)
    }

    fn add_users_to_organization(
        &self,
        request: UpdateUsersInOrganizationRequest,
    ) -> Result<OperationResult, ServiceError> {
        if request.user_ids.is_empty() {
            return Ok(OperationResult::successful(USERS_ADDED));
        }

        let outcome = self.context.in_scope(|repo| {
            self.authorize(
                repo,
                request.user_id,
                request.organization_id,
                &required_for_roles(Capability::MemberManage, [request.role]),
            )?;

            let persisted =
                repo.find_all_by_parent_id::<StoredMembership>(request.organization_id)?;
            let submitted = request
                .user_ids
                .iter()
                .map(|&user_id| StoredMembership {
                    user_id,
                    organization_id: request.organization_id,
                    role: request.role,
                })
                .collect();
            let report = reconcile::apply(repo, plan_insert_missing(&persisted, submitted))?;
            debug!(
                event = "members_added",
                organization_id = request.organization_id,
                inserted = report.inserted,
                submitted = request.user_ids.len()
            );
            Ok(OperationResult::successful(USERS_ADDED))
        });
        settle("add_users_to_organization", outcome)
    }

    fn remove_users_from_organization(
        &self,
        request: UpdateUsersInOrganizationRequest,
    ) -> Result<OperationResult, ServiceError> {
        if request.user_ids.is_empty() {
            return Ok(OperationResult::successful(USERS_REMOVED));
        }

        let outcome = self.context.in_scope(|repo| {
            let persisted =
                repo.find_all_by_parent_id::<StoredMembership>(request.organization_id)?;
            let owners = owner_count(&persisted);
            let plan = plan_remove_by_ids(persisted, &request.user_ids);
            self.authorize(
                repo,
                request.user_id,
                request.organization_id,
                &required_for_roles(
                    Capability::MemberManage,
                    plan.deletes.iter().map(|member| member.role),
                ),
            )?;
            if owners > 0 && owner_count(&plan.deletes) == owners {
                return Err(ServiceError::Conflict(LAST_OWNER.to_string()));
            }

            let report = reconcile::apply(repo, plan)?;
            debug!(
                event = "members_removed",
                organization_id = request.organization_id,
                deleted = report.deleted
            );
            Ok(OperationResult::successful(USERS_REMOVED))
        });
        settle("remove_users_from_organization", outcome)
    }

    fn update_member_role(
        &self,
        request: UpdateMemberRoleRequest,
    ) -> Result<OperationResult, ServiceError> {
        let outcome = self.context.in_scope(|repo| {
            self.authorize(
                repo,
                request.user_id,
                request.organization_id,
                &required_for_roles(Capability::RoleManage, [request.role]),
            )?;

            let key = (request.member_id, request.organization_id);
            let Some(mut member) = repo.find_by_id::<StoredMembership>(&key)? else {
                return Err(ServiceError::NotFound(MEMBER_MISSING.to_string()));
            };
            self.authorize(
                repo,
                request.user_id,
                request.organization_id,
                &required_for_roles(Capability::RoleManage, [member.role]),
            )?;
            if member.role == MemberRole::Owner && request.role != MemberRole::Owner {
                let members =
                    repo.find_all_by_parent_id::<StoredMembership>(request.organization_id)?;
                if owner_count(&members) == 1 {
                    return Err(ServiceError::Conflict(LAST_OWNER.to_string()));
                }
            }

            let previous = member.role;
            member.role = request.role;
            repo.save(&member)?;
            debug!(
                event = "member_role_changed",
                organization_id = request.organization_id,
                member_id = request.member_id,
                from = %previous,
                to = %request.role
            );
            Ok(OperationResult::successful("Member role update successful."))
        });
        settle("update_member_role", outcome)
    }

    fn members_by_organization_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetMembersResponse, ServiceError> {
        let members = self
            .context
            .read(|repo| repo.find_all_by_parent_id::<StoredMembership>(request.id))?;
        Ok(GetMembersResponse {
            members: members.iter().map(Entity::to_message).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, MembershipDirectory, StaticDirectory, PERMISSION_DENIED};
    use organizer_core::organizer_contracts::FailureKind;
    use organizer_core::Organization;
    use std::sync::Arc;
    use tempfile::TempDir;

    const FOUNDER: i64 = 1;

    fn organization(id: i64) -> Organization {
        Organization {
            id,
            name: "Photography club".to_string(),
            is_verified: false,
        }
    }

    fn members_request(
        user_id: i64,
        user_ids: Vec<i64>,
        role: MemberRole,
    ) -> UpdateUsersInOrganizationRequest {
        UpdateUsersInOrganizationRequest {
            user_id,
            organization_id: 2,
            user_ids,
            role,
        }
    }

    fn role_request(user_id: i64, member_id: i64, role: MemberRole) -> UpdateMemberRoleRequest {
        UpdateMemberRoleRequest {
            user_id,
            organization_id: 2,
            member_id,
            role,
        }
    }

    fn members(service: &OrganizationService) -> Vec<(i64, MemberRole)> {
        service
            .members_by_organization_id(GetByIdRequest { id: 2 })
            .expect("members")
            .members
            .iter()
            .map(|member| (member.user_id, member.role))
            .collect()
    }

    fn member_ids(service: &OrganizationService) -> Vec<i64> {
        members(service).into_iter().map(|(user_id, _)| user_id).collect()
    }

    /// Organization 2 founded by `FOUNDER`, gated by stored membership roles.
    fn founded(dir: &TempDir) -> OrganizationService {
        let service = OrganizationService::new(ServiceContext::new(
            Database::new(dir.path().join("organizer.db")),
            Arc::new(MembershipDirectory),
        ));
        assert!(service
            .create_organization(CreateOrganizationRequest {
                user_id: FOUNDER,
                organization: organization(2),
            })
            .expect("create")
            .success);
        service
    }

    #[test]
    fn create_update_remove_cycle() {
        let dir = TempDir::new().expect("temp dir");
        let service = founded(&dir);
        assert_eq!(members(&service), vec![(FOUNDER, MemberRole::Owner)]);

        let duplicate = service
            .create_organization(CreateOrganizationRequest {
                user_id: 9,
                organization: organization(2),
            })
            .expect("create");
        assert_eq!(duplicate.failure, Some(FailureKind::Conflict));
        assert_eq!(duplicate.message, ORGANIZATION_EXISTS);
        assert_eq!(members(&service), vec![(FOUNDER, MemberRole::Owner)]);

        let mut verified = organization(2);
        verified.is_verified = true;
        assert!(service
            .update_organization(UpdateOrganizationRequest {
                user_id: FOUNDER,
                organization: verified.clone()
            })
            .expect("update")
            .success);
        assert_eq!(
            service
                .organization_by_id(GetByIdRequest { id: 2 })
                .expect("read")
                .organization,
            Some(verified)
        );

        let missing = service
            .update_organization(UpdateOrganizationRequest {
                user_id: FOUNDER,
                organization: organization(3),
            })
            .expect("update");
        assert_eq!(missing.message, ORGANIZATION_MISSING);

        assert!(service
            .remove_organization(RemoveOrganizationRequest {
                user_id: FOUNDER,
                organization_id: 2
            })
            .expect("remove")
            .success);
        let gone = service
            .remove_organization(RemoveOrganizationRequest {
                user_id: FOUNDER,
                organization_id: 2,
            })
            .expect("remove");
        assert_eq!(gone.failure, Some(FailureKind::NotFound));
        assert!(service.list_organizations().expect("list").organizations.is_empty());
    }

    #[test]
    fn organization_mutations_require_their_capabilities() {
        let dir = TempDir::new().expect("temp dir");
        let service = founded(&dir);
        service
            .add_users_to_organization(members_request(FOUNDER, vec![5], MemberRole::Admin))
            .expect("add admin");
        service
            .add_users_to_organization(members_request(FOUNDER, vec![6], MemberRole::Member))
            .expect("add member");

        let renamed = |user_id| UpdateOrganizationRequest {
            user_id,
            organization: Organization {
                name: "Film club".to_string(),
                ..organization(2)
            },
        };
        let by_member = service.update_organization(renamed(6)).expect("update");
        assert_eq!(by_member.failure, Some(FailureKind::Denied));
        assert!(service.update_organization(renamed(5)).expect("update").success);

        let by_admin = service
            .remove_organization(RemoveOrganizationRequest {
                user_id: 5,
                organization_id: 2,
            })
            .expect("remove");
        assert_eq!(by_admin.failure, Some(FailureKind::Denied));
        assert_eq!(by_admin.message, PERMISSION_DENIED);
        assert!(service
            .organization_by_id(GetByIdRequest { id: 2 })
            .expect("read")
            .organization
            .is_some());
    }

    #[test]
    fn members_are_added_once_and_removed_by_id() {
        let dir = TempDir::new().expect("temp dir");
        let service = OrganizationService::new(ServiceContext::new(
            Database::new(dir.path().join("organizer.db")),
            Arc::new(StaticDirectory::new().grant(
                99,
                2,
                MemberRole::Admin.capabilities(),
            )),
        ));
        service
            .create_organization(CreateOrganizationRequest {
                user_id: 99,
                organization: organization(2),
            })
            .expect("create");

        service
            .add_users_to_organization(members_request(99, vec![1, 3, 5, 7, 3], MemberRole::Member))
            .expect("add");
        service
            .add_users_to_organization(members_request(99, vec![1], MemberRole::Member))
            .expect("add again");
        assert_eq!(member_ids(&service), vec![1, 3, 5, 7, 99]);

        let removed = service
            .remove_users_from_organization(members_request(99, vec![3, 5], MemberRole::Member))
            .expect("remove");
        assert_eq!(removed.message, USERS_REMOVED);
        assert_eq!(member_ids(&service), vec![1, 7, 99]);
    }

    #[test]
    fn readding_members_never_changes_their_role() {
        let dir = TempDir::new().expect("temp dir");
        let service = founded(&dir);
        service
            .add_users_to_organization(members_request(FOUNDER, vec![5], MemberRole::Admin))
            .expect("add admin");

        // an admin re-adding the owner as a plain member is a no-op
        let demote = service
            .add_users_to_organization(members_request(5, vec![FOUNDER], MemberRole::Member))
            .expect("re-add owner");
        assert!(demote.success);

        // nor can it hand out a role above its own
        let promote = service
            .add_users_to_organization(members_request(5, vec![5, 8], MemberRole::Owner))
            .expect("add owners");
        assert_eq!(promote.failure, Some(FailureKind::Denied));

        assert_eq!(
            members(&service),
            vec![(FOUNDER, MemberRole::Owner), (5, MemberRole::Admin)]
        );
    }

    #[test]
    fn admins_cannot_remove_or_reassign_owners() {
        let dir = TempDir::new().expect("temp dir");
        let service = founded(&dir);
        service
            .add_users_to_organization(members_request(FOUNDER, vec![5], MemberRole::Admin))
            .expect("add admin");

        let removal = service
            .remove_users_from_organization(members_request(5, vec![FOUNDER], MemberRole::Member))
            .expect("remove owner");
        assert_eq!(removal.failure, Some(FailureKind::Denied));

        let reassign = service
            .update_member_role(role_request(5, 5, MemberRole::Owner))
            .expect("self promote");
        assert_eq!(reassign.failure, Some(FailureKind::Denied));
        let demote = service
            .update_member_role(role_request(5, FOUNDER, MemberRole::Member))
            .expect("demote owner");
        assert_eq!(demote.failure, Some(FailureKind::Denied));

        assert_eq!(
            members(&service),
            vec![(FOUNDER, MemberRole::Owner), (5, MemberRole::Admin)]
        );
    }

    #[test]
    fn owners_change_roles_but_keep_one_owner() {
        let dir = TempDir::new().expect("temp dir");
        let service = founded(&dir);
        service
            .add_users_to_organization(members_request(FOUNDER, vec![5], MemberRole::Member))
            .expect("add member");

        let last_owner = service
            .update_member_role(role_request(FOUNDER, FOUNDER, MemberRole::Admin))
            .expect("demote self");
        assert_eq!(last_owner.failure, Some(FailureKind::Conflict));
        assert_eq!(last_owner.message, LAST_OWNER);
        let orphaned = service
            .remove_users_from_organization(members_request(FOUNDER, vec![FOUNDER], MemberRole::Member))
            .expect("remove self");
        assert_eq!(orphaned.failure, Some(FailureKind::Conflict));

        let missing = service
            .update_member_role(role_request(FOUNDER, 404, MemberRole::Admin))
            .expect("unknown member");
        assert_eq!(missing.failure, Some(FailureKind::NotFound));
        assert_eq!(missing.message, MEMBER_MISSING);

        assert!(service
            .update_member_role(role_request(FOUNDER, 5, MemberRole::Owner))
            .expect("promote")
            .success);
        assert!(service
            .update_member_role(role_request(FOUNDER, FOUNDER, MemberRole::Admin))
            .expect("step down")
            .success);
        assert_eq!(
            members(&service),
            vec![(FOUNDER, MemberRole::Admin), (5, MemberRole::Owner)]
        );
    }

    #[test]
    fn member_management_is_gated_by_membership_role() {
        let dir = TempDir::new().expect("temp dir");
        let service = founded(&dir);

        let denied = service
            .add_users_to_organization(members_request(5, vec![6], MemberRole::Member))
            .expect("add");
        assert_eq!(denied.failure, Some(FailureKind::Denied));
        assert_eq!(member_ids(&service), vec![FOUNDER]);

        assert!(service
            .add_users_to_organization(members_request(FOUNDER, vec![5], MemberRole::Member))
            .expect("add")
            .success);
        assert_eq!(member_ids(&service), vec![FOUNDER, 5]);

        // plain members cannot manage other members
        let still_denied = service
            .remove_users_from_organization(members_request(5, vec![FOUNDER], MemberRole::Member))
            .expect("remove");
        assert_eq!(still_denied.failure, Some(FailureKind::Denied));
    }

    #[test]
    fn empty_member_batch_skips_the_gate() {
        let dir = TempDir::new().expect("temp dir");
        let service = OrganizationService::new(ServiceContext::new(
            Database::new(dir.path().join("organizer.db")),
            Arc::new(StaticDirectory::new()),
        ));

        let added = service
            .add_users_to_organization(members_request(5, Vec::new(), MemberRole::Member))
            .expect("add");
        assert!(added.success);
        assert!(!dir.path().join("organizer.db").exists());
    }
}
