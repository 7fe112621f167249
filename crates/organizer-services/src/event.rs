use crate::gate::{self, GateTarget};
use crate::reconcile::{self, plan_full_replace, plan_insert_missing, plan_remove_by_ids};
use crate::{conflict_as, settle, ServiceContext, ServiceError};
use organizer_core::organizer_contracts::{
    CreateEventRequest, CreateFacilityRequest, FailureKind, GetByIdRequest,
    GetEventByIdResponse, GetEventDurationsResponse, GetEventResponse, GetEventTagsResponse,
    GetFacilityByIdResponse, GetRegistrationsResponse, HasEventRequest, OperationResult,
    RemoveEventRequest, UpdateEventDurationRequest, UpdateEventFacilityRequest,
    UpdateEventInfoRequest, UpdateEventTagsRequest, UpdateRegistrationRequestRequest,
};
use organizer_core::Capability;
use organizer_storage::{
    Entity, Repo, StoredEvent, StoredEventDuration, StoredEventRegistration, StoredEventTag,
    StoredFacility,
};
use tracing::debug;

const EVENT_EXISTS: &str = "An event with this ID already exists.";
const EVENT_MISSING: &str = "An event with this ID does not exist.";
const EVENT_NOT_FOUND: &str = "Cannot find event from given ID.";
const FACILITY_EXISTS: &str = "A facility with this ID already exists.";
const FACILITY_MISSING: &str = "A facility with this ID does not exist.";
const REGISTRATION_MISSING: &str = "There is no request associated with this event and user.";
const EVENT_NOT_HOSTED: &str = "The event is not hosted by this organization.";
const TAGS_ADDED: &str = "Tags added to event.";
const TAGS_REMOVED: &str = "Tags removed from event.";

pub trait EventOperations {
    fn create_event(&self, request: CreateEventRequest) -> Result<OperationResult, ServiceError>;
    fn list_events(&self) -> Result<GetEventResponse, ServiceError>;
    fn event_by_id(&self, request: GetByIdRequest) -> Result<GetEventByIdResponse, ServiceError>;
    fn update_event_info(
        &self,
        request: UpdateEventInfoRequest,
    ) -> Result<OperationResult, ServiceError>;
    fn remove_event(&self, request: RemoveEventRequest) -> Result<OperationResult, ServiceError>;

    fn create_facility(
        &self,
        request: CreateFacilityRequest,
    ) -> Result<OperationResult, ServiceError>;
    fn facility_by_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetFacilityByIdResponse, ServiceError>;
    fn update_event_facility(
        &self,
        request: UpdateEventFacilityRequest,
    ) -> Result<OperationResult, ServiceError>;

    fn replace_event_durations(
        &self,
        request: UpdateEventDurationRequest,
    ) -> Result<OperationResult, ServiceError>;
    fn durations_by_event_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetEventDurationsResponse, ServiceError>;

    fn update_registration_request(
        &self,
        request: UpdateRegistrationRequestRequest,
    ) -> Result<OperationResult, ServiceError>;
    fn registrations_by_event_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetRegistrationsResponse, ServiceError>;

    fn tags_by_event_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetEventTagsResponse, ServiceError>;
    fn add_event_tags(
        &self,
        request: UpdateEventTagsRequest,
    ) -> Result<OperationResult, ServiceError>;
    fn remove_event_tags(
        &self,
        request: UpdateEventTagsRequest,
    ) -> Result<OperationResult, ServiceError>;

    fn has_event(&self, request: HasEventRequest) -> Result<OperationResult, ServiceError>;
}

#[derive(Clone)]
pub struct EventService {
    context: ServiceContext,
}

impl EventService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    fn authorize(
        &self,
        repo: &Repo<'_>,
        user_id: i64,
        target: GateTarget,
        capability: Capability,
    ) -> Result<(), ServiceError> {
        gate::authorize(
            repo,
            self.context.directory.as_ref(),
            user_id,
            target,
            capability,
        )
        .into_result()
    }
}

impl EventOperations for EventService {
    fn create_event(&self, request: CreateEventRequest) -> Result<OperationResult, ServiceError> {
        let event = request.event;
        let outcome = event.validate().map_err(ServiceError::from).and_then(|()| {
            self.context.in_scope(|repo| {
                self.authorize(
                    repo,
                    request.user_id,
                    GateTarget::Organization(event.organization_id),
                    Capability::EventCreate,
                )?;
                gate::require_absent::<StoredEvent>(repo, &event.id, EVENT_EXISTS)?;
                repo.insert(&StoredEvent::from_message(&event))
                    .map_err(conflict_as(EVENT_EXISTS))?;
                Ok(OperationResult::successful("Event creation successful."))
            })
        });
        settle("create_event", outcome)
    }

    fn list_events(&self) -> Result<GetEventResponse, ServiceError> {
        let events = self.context.read(|repo| repo.find_all::<StoredEvent>())?;
        Ok(GetEventResponse {
            events: events.iter().map(Entity::to_message).collect(),
        })
    }

    fn event_by_id(&self, request: GetByIdRequest) -> Result<GetEventByIdResponse, ServiceError> {
        let event = self
            .context
            .read(|repo| repo.find_by_id::<StoredEvent>(&request.id))?;
        Ok(GetEventByIdResponse {
            event: event.map(|event| event.to_message()),
        })
    }

    fn update_event_info(
        &self,
        request: UpdateEventInfoRequest,
    ) -> Result<OperationResult, ServiceError> {
        let event = request.event;
        let outcome = event.validate().map_err(ServiceError::from).and_then(|()| {
            self.context.in_scope(|repo| {
                let Some(stored) = repo.find_by_id::<StoredEvent>(&event.id)? else {
                    return Err(ServiceError::NotFound(EVENT_MISSING.to_string()));
                };
                self.authorize(
                    repo,
                    request.user_id,
                    GateTarget::Event(event.id),
                    Capability::EventUpdate,
                )?;
                // moving an event means creating it under the new host
                if stored.organization_id != event.organization_id {
                    self.authorize(
                        repo,
                        request.user_id,
                        GateTarget::Organization(event.organization_id),
                        Capability::EventCreate,
                    )?;
                }
                repo.save(&StoredEvent::from_message(&event))?;
                Ok(OperationResult::successful("Event update successful."))
            })
        });
        settle("update_event_info", outcome)
    }

    fn remove_event(&self, request: RemoveEventRequest) -> Result<OperationResult, ServiceError> {
        let outcome = self.context.in_scope(|repo| {
            gate::require_extant::<StoredEvent>(repo, &request.event_id, EVENT_NOT_FOUND)?;
            self.authorize(
                repo,
                request.user_id,
                GateTarget::Event(request.event_id),
                Capability::EventRemove,
            )?;
            repo.delete_by_id::<StoredEvent>(&request.event_id)?;
            Ok(OperationResult::successful("Event deletion successful."))
        });
        settle("remove_event", outcome)
    }

    fn create_facility(
        &self,
        request: CreateFacilityRequest,
    ) -> Result<OperationResult, ServiceError> {
        let facility = request.facility;
        let outcome = facility.validate().map_err(ServiceError::from).and_then(|()| {
            self.context.in_scope(|repo| {
                gate::require_absent::<StoredFacility>(repo, &facility.id, FACILITY_EXISTS)?;
                repo.insert(&StoredFacility::from_message(&facility))
                    .map_err(conflict_as(FACILITY_EXISTS))?;
                Ok(OperationResult::successful("Facility creation successful."))
            })
        });
        settle("create_facility", outcome)
    }

    fn facility_by_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetFacilityByIdResponse, ServiceError> {
        let facility = self
            .context
            .read(|repo| repo.find_by_id::<StoredFacility>(&request.id))?;
        Ok(GetFacilityByIdResponse {
            facility: facility.map(|facility| facility.to_message()),
        })
    }

    fn update_event_facility(
        &self,
        request: UpdateEventFacilityRequest,
    ) -> Result<OperationResult, ServiceError> {
        let facility = request.facility;
        let outcome = facility.validate().map_err(ServiceError::from).and_then(|()| {
            self.context.in_scope(|repo| {
                gate::require_extant::<StoredFacility>(repo, &facility.id, FACILITY_MISSING)?;
                repo.save(&StoredFacility::from_message(&facility))?;
                Ok(OperationResult::successful("Facility update successful."))
            })
        });
        settle("update_event_facility", outcome)
    }

    fn replace_event_durations(
        &self,
        request: UpdateEventDurationRequest,
    ) -> Result<OperationResult, ServiceError> {
        let UpdateEventDurationRequest {
            user_id,
            event_id,
            durations,
        } = request;

        let validated = durations
            .iter()
            .try_for_each(|duration| duration.validate())
            .map_err(ServiceError::from);
        let outcome = validated.and_then(|()| {
            self.context.in_scope(|repo| {
                self.authorize(repo, user_id, GateTarget::Event(event_id), Capability::EventUpdate)?;

                let persisted = repo.find_all_by_parent_id::<StoredEventDuration>(event_id)?;
                let submitted = durations
                    .iter()
                    .map(|duration| StoredEventDuration {
                        id: None,
                        event_id,
                        start: duration.start,
                        finish: duration.finish,
                    })
                    .collect();
                let report = reconcile::apply(repo, plan_full_replace(persisted, submitted))?;
                debug!(
                    event = "durations_replaced",
                    event_id,
                    deleted = report.deleted,
                    inserted = report.inserted
                );
                Ok(OperationResult::successful("Event duration update successful."))
            })
        });
        settle("replace_event_durations", outcome)
    }

    fn durations_by_event_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetEventDurationsResponse, ServiceError> {
        let durations = self
            .context
            .read(|repo| repo.find_all_by_parent_id::<StoredEventDuration>(request.id))?;
        Ok(GetEventDurationsResponse {
            durations: durations.iter().map(Entity::to_message).collect(),
        })
    }

    fn update_registration_request(
        &self,
        request: UpdateRegistrationRequestRequest,
    ) -> Result<OperationResult, ServiceError> {
        let outcome = self.context.in_scope(|repo| {
            self.authorize(
                repo,
                request.user_id,
                GateTarget::Event(request.registered_event_id),
                Capability::RegistrationManage,
            )?;

            let key = (request.registered_user_id, request.registered_event_id);
            let Some(mut registration) = repo.find_by_id::<StoredEventRegistration>(&key)? else {
                return Err(ServiceError::NotFound(REGISTRATION_MISSING.to_string()));
            };
            registration.status = request.status;
            repo.save(&registration)?;
            Ok(OperationResult::successful(
                "Event registration update successful.",
            ))
        });
        settle("update_registration_request", outcome)
    }

    fn registrations_by_event_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetRegistrationsResponse, ServiceError> {
        let registrations = self
            .context
            .read(|repo| repo.find_all_by_parent_id::<StoredEventRegistration>(request.id))?;
        Ok(GetRegistrationsResponse {
            registrations: registrations.iter().map(Entity::to_message).collect(),
        })
    }

    fn tags_by_event_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetEventTagsResponse, ServiceError> {
        let tags = self
            .context
            .read(|repo| repo.find_all_by_parent_id::<StoredEventTag>(request.id))?;
        Ok(GetEventTagsResponse {
            tags: tags.iter().map(Entity::to_message).collect(),
        })
    }

    fn add_event_tags(
        &self,
        request: UpdateEventTagsRequest,
    ) -> Result<OperationResult, ServiceError> {
        if request.tag_ids.is_empty() {
            return Ok(OperationResult::successful(TAGS_ADDED));
        }

        let outcome = self.context.in_scope(|repo| {
            self.authorize(
                repo,
                request.user_id,
                GateTarget::Event(request.event_id),
                Capability::EventUpdate,
            )?;
            let persisted = repo.find_all_by_parent_id::<StoredEventTag>(request.event_id)?;
            let submitted = request
                .tag_ids
                .iter()
                .map(|&tag_id| StoredEventTag {
                    event_id: request.event_id,
                    tag_id,
                })
                .collect();
            let report = reconcile::apply(repo, plan_insert_missing(&persisted, submitted))?;
            debug!(
                event = "tags_added",
                event_id = request.event_id,
                inserted = report.inserted
            );
            Ok(OperationResult::successful(TAGS_ADDED))
        });
        settle("add_event_tags", outcome)
    }

    fn remove_event_tags(
        &self,
        request: UpdateEventTagsRequest,
    ) -> Result<OperationResult, ServiceError> {
        if request.tag_ids.is_empty() {
            return Ok(OperationResult::successful(TAGS_REMOVED));
        }

        let outcome = self.context.in_scope(|repo| {
            self.authorize(
                repo,
                request.user_id,
                GateTarget::Event(request.event_id),
                Capability::EventUpdate,
            )?;
            let persisted = repo.find_all_by_parent_id::<StoredEventTag>(request.event_id)?;
            let report = reconcile::apply(repo, plan_remove_by_ids(persisted, &request.tag_ids))?;
            debug!(
                event = "tags_removed",
                event_id = request.event_id,
                deleted = report.deleted
            );
            Ok(OperationResult::successful(TAGS_REMOVED))
        });
        settle("remove_event_tags", outcome)
    }

    fn has_event(&self, request: HasEventRequest) -> Result<OperationResult, ServiceError> {
        let event = self
            .context
            .read(|repo| repo.find_by_id::<StoredEvent>(&request.event_id))?;
        let hosted = event.is_some_and(|event| event.organization_id == request.organization_id);
        if hosted {
            Ok(OperationResult::successful(
                "The specified organization has the specified event.",
            ))
        } else {
            Ok(OperationResult::failed(
                FailureKind::NotFound,
                EVENT_NOT_HOSTED,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, StaticDirectory, PERMISSION_DENIED};
    use chrono::{TimeZone, Utc};
    use organizer_core::organizer_contracts::ContractError;
    use organizer_core::{Duration, Event, EventTag, Facility, RegistrationStatus};
    use organizer_storage::StoredOrganization;
    use std::sync::Arc;
    use tempfile::TempDir;

    const EDITOR: i64 = 42;
    const HELPER: i64 = 43;

    /// Organizations 8 and 9 exist. `EDITOR` runs events in 9 and may only
    /// edit in 8; `HELPER` may only edit in 9.
    fn service(dir: &TempDir) -> EventService {
        let database = Database::new(dir.path().join("organizer.db"));
        {
            let store = database.open().expect("open db");
            for id in [8, 9] {
                store
                    .repo()
                    .insert(&StoredOrganization {
                        id,
                        name: format!("Club {id}"),
                        is_verified: true,
                    })
                    .expect("seed organization");
            }
        }
        let directory = StaticDirectory::new()
            .grant(
                EDITOR,
                9,
                [
                    Capability::EventCreate,
                    Capability::EventUpdate,
                    Capability::EventRemove,
                    Capability::RegistrationManage,
                ],
            )
            .grant(EDITOR, 8, [Capability::EventUpdate])
            .grant(HELPER, 9, [Capability::EventUpdate]);
        EventService::new(ServiceContext::new(database, Arc::new(directory)))
    }

    fn create(events: &EventService, event: Event) -> OperationResult {
        events
            .create_event(CreateEventRequest {
                user_id: EDITOR,
                event,
            })
            .expect("create")
    }

    fn event(id: i64, organization_id: i64) -> Event {
        Event {
            id,
            organization_id,
            event_name: "Hack night".to_string(),
            description: "Bring a laptop".to_string(),
            about: String::new(),
            video: String::new(),
            location_id: Some(3),
            contact: String::new(),
            picture: String::new(),
            is_visible: true,
        }
    }

    fn window(day: u32) -> Duration {
        Duration {
            start: Utc
                .with_ymd_and_hms(2026, 5, day, 18, 0, 0)
                .single()
                .expect("start"),
            finish: Utc
                .with_ymd_and_hms(2026, 5, day, 22, 0, 0)
                .single()
                .expect("finish"),
        }
    }

    #[test]
    fn create_then_duplicate_create_conflicts() {
        let dir = TempDir::new().expect("temp dir");
        let events = service(&dir);

        let created = create(&events, event(1, 9));
        assert!(created.success);
        assert_eq!(created.message, "Event creation successful.");

        let duplicate = create(&events, event(1, 9));
        assert!(!duplicate.success);
        assert_eq!(duplicate.failure, Some(FailureKind::Conflict));
        assert_eq!(duplicate.message, EVENT_EXISTS);
    }

    #[test]
    fn update_and_remove_of_unknown_event_are_not_found() {
        let dir = TempDir::new().expect("temp dir");
        let events = service(&dir);

        let update = events
            .update_event_info(UpdateEventInfoRequest {
                user_id: EDITOR,
                event: event(5, 9),
            })
            .expect("update");
        assert_eq!(update.failure, Some(FailureKind::NotFound));
        assert_eq!(update.message, EVENT_MISSING);

        let remove = events
            .remove_event(RemoveEventRequest {
                user_id: EDITOR,
                event_id: 5,
            })
            .expect("remove");
        assert_eq!(remove.failure, Some(FailureKind::NotFound));
        assert!(events
            .event_by_id(GetByIdRequest { id: 5 })
            .expect("read")
            .event
            .is_none());
    }

    #[test]
    fn blank_event_name_is_invalid() {
        let dir = TempDir::new().expect("temp dir");
        let events = service(&dir);
        let mut blank = event(1, 9);
        blank.event_name = "  ".to_string();

        let expected = ContractError::EmptyField {
            field: "event_name",
        }
        .to_string();
        let err = events
            .create_event(CreateEventRequest {
                user_id: EDITOR,
                event: blank,
            })
            .expect_err("blank name");
        assert!(matches!(err, ServiceError::InvalidArgument(message) if message == expected));
        assert!(events.list_events().expect("list").events.is_empty());
    }

    #[test]
    fn durations_replace_requires_event_update() {
        let dir = TempDir::new().expect("temp dir");
        let events = service(&dir);
        create(&events, event(1, 9));

        let denied = events
            .replace_event_durations(UpdateEventDurationRequest {
                user_id: 7,
                event_id: 1,
                durations: vec![window(1)],
            })
            .expect("replace");
        assert_eq!(denied.failure, Some(FailureKind::Denied));

        let replaced = events
            .replace_event_durations(UpdateEventDurationRequest {
                user_id: EDITOR,
                event_id: 1,
                durations: vec![window(1), window(2)],
            })
            .expect("replace");
        assert!(replaced.success);

        let stored = events
            .durations_by_event_id(GetByIdRequest { id: 1 })
            .expect("durations")
            .durations;
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|duration| duration.id.is_some()));
    }

    #[test]
    fn backwards_duration_is_rejected_before_the_gate() {
        let dir = TempDir::new().expect("temp dir");
        let events = service(&dir);
        let reversed = Duration {
            start: window(3).finish,
            finish: window(3).start,
        };

        let err = events
            .replace_event_durations(UpdateEventDurationRequest {
                user_id: 1,
                event_id: 1,
                durations: vec![reversed],
            })
            .expect_err("reversed window");
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    #[test]
    fn facility_lifecycle() {
        let dir = TempDir::new().expect("temp dir");
        let events = service(&dir);
        let mut hall = Facility {
            id: 4,
            name: "Main hall".to_string(),
            latitude: 13.73,
            longitude: 100.53,
            operating_hours: "08:00-20:00".to_string(),
        };

        let missing = events
            .update_event_facility(UpdateEventFacilityRequest {
                facility: hall.clone(),
            })
            .expect("update");
        assert_eq!(missing.message, FACILITY_MISSING);

        assert!(events
            .create_facility(CreateFacilityRequest {
                facility: hall.clone()
            })
            .expect("create")
            .success);
        hall.operating_hours = "closed".to_string();
        assert!(events
            .update_event_facility(UpdateEventFacilityRequest {
                facility: hall.clone()
            })
            .expect("update")
            .success);
        assert_eq!(
            events
                .facility_by_id(GetByIdRequest { id: 4 })
                .expect("read")
                .facility,
            Some(hall)
        );
    }

    #[test]
    fn registration_update_needs_an_existing_request() {
        let dir = TempDir::new().expect("temp dir");
        let events = service(&dir);
        create(&events, event(1, 9));

        let request = UpdateRegistrationRequestRequest {
            user_id: EDITOR,
            registered_event_id: 1,
            registered_user_id: 77,
            status: RegistrationStatus::Accepted,
        };
        let missing = events
            .update_registration_request(request.clone())
            .expect("update");
        assert_eq!(missing.failure, Some(FailureKind::NotFound));
        assert_eq!(missing.message, REGISTRATION_MISSING);
        assert!(events
            .registrations_by_event_id(GetByIdRequest { id: 1 })
            .expect("registrations")
            .registrations
            .is_empty());

        {
            let store = events.context.database.open().expect("open db");
            store
                .repo()
                .save(&StoredEventRegistration {
                    user_id: 77,
                    event_id: 1,
                    status: RegistrationStatus::Pending,
                })
                .expect("seed registration");
        }

        assert!(events
            .update_registration_request(request)
            .expect("update")
            .success);
        let registrations = events
            .registrations_by_event_id(GetByIdRequest { id: 1 })
            .expect("registrations")
            .registrations;
        assert_eq!(registrations[0].status, RegistrationStatus::Accepted);
    }

    #[test]
    fn has_event_does_not_reveal_which_check_failed() {
        let dir = TempDir::new().expect("temp dir");
        let events = service(&dir);
        create(&events, event(1, 9));

        assert!(events
            .has_event(HasEventRequest {
                organization_id: 9,
                event_id: 1
            })
            .expect("has event")
            .success);

        let wrong_host = events
            .has_event(HasEventRequest {
                organization_id: 8,
                event_id: 1,
            })
            .expect("has event");
        let missing = events
            .has_event(HasEventRequest {
                organization_id: 9,
                event_id: 2,
            })
            .expect("has event");
        assert_eq!(wrong_host, missing);
        assert!(!missing.success);
    }

    #[test]
    fn event_lifecycle_is_gated_per_capability() {
        let dir = TempDir::new().expect("temp dir");
        let events = service(&dir);

        let foreign = events
            .create_event(CreateEventRequest {
                user_id: EDITOR,
                event: event(2, 8),
            })
            .expect("create");
        assert_eq!(foreign.failure, Some(FailureKind::Denied));
        let unknown_host = events
            .create_event(CreateEventRequest {
                user_id: EDITOR,
                event: event(3, 77),
            })
            .expect("create");
        assert_eq!(unknown_host, foreign);
        assert_eq!(unknown_host.message, PERMISSION_DENIED);

        create(&events, event(1, 9));
        let mut renamed = event(1, 9);
        renamed.event_name = "Hack day".to_string();
        assert!(events
            .update_event_info(UpdateEventInfoRequest {
                user_id: HELPER,
                event: renamed,
            })
            .expect("update")
            .success);

        let removal = events
            .remove_event(RemoveEventRequest {
                user_id: HELPER,
                event_id: 1,
            })
            .expect("remove");
        assert_eq!(removal.failure, Some(FailureKind::Denied));
        assert_eq!(
            events
                .event_by_id(GetByIdRequest { id: 1 })
                .expect("read")
                .event
                .map(|event| event.event_name),
            Some("Hack day".to_string())
        );

        assert!(events
            .remove_event(RemoveEventRequest {
                user_id: EDITOR,
                event_id: 1,
            })
            .expect("remove")
            .success);
    }

    #[test]
    fn moving_an_event_needs_create_rights_at_the_new_host() {
        let dir = TempDir::new().expect("temp dir");
        let events = service(&dir);
        create(&events, event(1, 9));

        let moved = events
            .update_event_info(UpdateEventInfoRequest {
                user_id: EDITOR,
                event: event(1, 8),
            })
            .expect("update");
        assert_eq!(moved.failure, Some(FailureKind::Denied));
        assert!(events
            .has_event(HasEventRequest {
                organization_id: 9,
                event_id: 1,
            })
            .expect("has event")
            .success);
    }

    #[test]
    fn tags_are_added_once_and_removed_by_id() {
        let dir = TempDir::new().expect("temp dir");
        let events = service(&dir);
        create(&events, event(1, 9));
        let tags_request = |user_id, tag_ids| UpdateEventTagsRequest {
            user_id,
            event_id: 1,
            tag_ids,
        };
        let tag_ids = |events: &EventService| -> Vec<i64> {
            events
                .tags_by_event_id(GetByIdRequest { id: 1 })
                .expect("tags")
                .tags
                .iter()
                .map(|tag| tag.tag_id)
                .collect()
        };

        let added = events
            .add_event_tags(tags_request(EDITOR, vec![4, 2, 4]))
            .expect("add");
        assert_eq!(added.message, TAGS_ADDED);
        events
            .add_event_tags(tags_request(EDITOR, vec![2, 6]))
            .expect("add again");
        assert_eq!(tag_ids(&events), vec![2, 4, 6]);

        let denied = events
            .remove_event_tags(tags_request(7, vec![2]))
            .expect("remove");
        assert_eq!(denied.failure, Some(FailureKind::Denied));

        events
            .remove_event_tags(tags_request(EDITOR, vec![2, 6, 99]))
            .expect("remove");
        assert_eq!(
            events.tags_by_event_id(GetByIdRequest { id: 1 }).expect("tags").tags,
            vec![EventTag {
                event_id: 1,
                tag_id: 4
            }]
        );

        events
            .remove_event(RemoveEventRequest {
                user_id: EDITOR,
                event_id: 1,
            })
            .expect("remove event");
        assert!(tag_ids(&events).is_empty());
    }

    #[test]
    fn tags_on_unknown_event_are_denied() {
        let dir = TempDir::new().expect("temp dir");
        let events = service(&dir);

        let result = events
            .add_event_tags(UpdateEventTagsRequest {
                user_id: EDITOR,
                event_id: 404,
                tag_ids: vec![1],
            })
            .expect("add");
        assert_eq!(result.failure, Some(FailureKind::Denied));
        assert_eq!(result.message, PERMISSION_DENIED);
    }
}
