use crate::{
    Duration, Event, EventDuration, EventRegistration, EventTag, Facility, MemberRole,
    Organization, Question, QuestionGroup, RegistrationStatus, UserOrganization,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("batch mixed parents: expected {expected}, found {found}")]
    CrossParentBatch { expected: i64, found: i64 },
    #[error("required field is empty: {field}")]
    EmptyField { field: &'static str },
    #[error("invalid time window: finish must be >= start")]
    InvalidTimeWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Conflict,
    NotFound,
    Denied,
}

/// Uniform reply for mutations that report an outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    #[serde(skip)]
    pub failure: Option<FailureKind>,
}

impl OperationResult {
    pub fn successful(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            failure: None,
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            failure: Some(kind),
        }
    }
}

/// Typed empty acknowledgement for mutations with no payload.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack {}

/// Selects persisted children for removal, either by id or by value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemovalSelector<T> {
    Ids(Vec<i64>),
    Records(Vec<T>),
}

impl<T> RemovalSelector<T> {
    pub fn is_empty(&self) -> bool {
        match self {
            RemovalSelector::Ids(ids) => ids.is_empty(),
            RemovalSelector::Records(records) => records.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RemovalSelector::Ids(ids) => ids.len(),
            RemovalSelector::Records(records) => records.len(),
        }
    }
}

impl<T> Default for RemovalSelector<T> {
    fn default() -> Self {
        RemovalSelector::Ids(Vec::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetByIdRequest {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub user_id: i64,
    pub event: Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEventInfoRequest {
    pub user_id: i64,
    pub event: Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveEventRequest {
    pub user_id: i64,
    pub event_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFacilityRequest {
    pub facility: Facility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEventFacilityRequest {
    pub facility: Facility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEventDurationRequest {
    pub user_id: i64,
    pub event_id: i64,
    #[serde(default)]
    pub durations: Vec<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRegistrationRequestRequest {
    pub user_id: i64,
    pub registered_event_id: i64,
    pub registered_user_id: i64,
    pub status: RegistrationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HasEventRequest {
    pub organization_id: i64,
    pub event_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganizationRequest {
    /// Becomes the organization's first owner.
    pub user_id: i64,
    pub organization: Organization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrganizationRequest {
    pub user_id: i64,
    pub organization: Organization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveOrganizationRequest {
    pub user_id: i64,
    pub organization_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUsersInOrganizationRequest {
    pub user_id: i64,
    pub organization_id: i64,
    #[serde(default)]
    pub user_ids: Vec<i64>,
    #[serde(default)]
    pub role: MemberRole,
}

/// Changes the role of one existing member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMemberRoleRequest {
    pub user_id: i64,
    pub organization_id: i64,
    pub member_id: i64,
    pub role: MemberRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEventTagsRequest {
    pub user_id: i64,
    pub event_id: i64,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddQuestionGroupsRequest {
    pub user_id: i64,
    #[serde(default)]
    pub question_groups: Vec<QuestionGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveQuestionGroupsRequest {
    pub user_id: i64,
    pub event_id: i64,
    #[serde(default)]
    pub selector: RemovalSelector<QuestionGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddQuestionsRequest {
    pub user_id: i64,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveQuestionsRequest {
    pub user_id: i64,
    pub question_group_id: i64,
    #[serde(default)]
    pub selector: RemovalSelector<Question>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetEventResponse {
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetEventByIdResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetFacilityByIdResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility: Option<Facility>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetEventDurationsResponse {
    pub durations: Vec<EventDuration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetEventTagsResponse {
    pub tags: Vec<EventTag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetRegistrationsResponse {
    pub registrations: Vec<EventRegistration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetOrganizationResponse {
    pub organizations: Vec<Organization>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetOrganizationByIdResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<Organization>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetMembersResponse {
    pub members: Vec<UserOrganization>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetQuestionGroupsByEventIdResponse {
    pub question_groups: Vec<QuestionGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetQuestionsByGroupIdResponse {
    pub questions: Vec<Question>,
}

/// Returns the single parent id shared by every record of `batch`, or `None`
/// for an empty batch.
pub fn validate_single_parent<T>(
    batch: &[T],
    parent_of: impl Fn(&T) -> i64,
) -> Result<Option<i64>, ContractError> {
    let Some(first) = batch.first() else {
        return Ok(None);
    };
    let expected = parent_of(first);
    for record in &batch[1..] {
        let found = parent_of(record);
        if found != expected {
            return Err(ContractError::CrossParentBatch { expected, found });
        }
    }
    Ok(Some(expected))
}

impl Event {
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.event_name.trim().is_empty() {
            return Err(ContractError::EmptyField {
                field: "event_name",
            });
        }
        Ok(())
    }
}

impl Organization {
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.name.trim().is_empty() {
            return Err(ContractError::EmptyField { field: "name" });
        }
        Ok(())
    }
}

impl Facility {
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.name.trim().is_empty() {
            return Err(ContractError::EmptyField { field: "name" });
        }
        Ok(())
    }
}

impl Duration {
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.finish < self.start {
            return Err(ContractError::InvalidTimeWindow);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn group(event_id: i64) -> QuestionGroup {
        QuestionGroup {
            id: None,
            event_id,
            group_type: Default::default(),
            seq: 0,
            title: "Before you come".to_string(),
        }
    }

    #[test]
    fn single_parent_rejects_mixed_batch() {
        let batch = vec![group(10), group(10), group(11)];
        let err = validate_single_parent(&batch, |group| group.event_id)
            .expect_err("mixed batch must fail");
        assert_eq!(
            err,
            ContractError::CrossParentBatch {
                expected: 10,
                found: 11
            }
        );
    }

    #[test]
    fn single_parent_accepts_uniform_and_empty_batches() {
        let batch = vec![group(7), group(7)];
        assert_eq!(
            validate_single_parent(&batch, |group| group.event_id),
            Ok(Some(7))
        );
        let empty: Vec<QuestionGroup> = Vec::new();
        assert_eq!(validate_single_parent(&empty, |group| group.event_id), Ok(None));
    }

    #[test]
    fn removal_selector_parses_ids_and_records() {
        let by_id: RemoveQuestionGroupsRequest = serde_json::from_str(
            r#"{"user_id": 1, "event_id": 2, "selector": {"ids": [3, 5]}}"#,
        )
        .expect("parse ids");
        assert_eq!(by_id.selector, RemovalSelector::Ids(vec![3, 5]));

        let by_value: RemoveQuestionGroupsRequest = serde_json::from_str(
            r#"{"user_id": 1, "event_id": 2, "selector": {"records": [{"event_id": 2, "title": "A"}]}}"#,
        )
        .expect("parse records");
        assert_eq!(by_value.selector.len(), 1);
    }

    #[test]
    fn operation_result_hides_failure_kind_on_the_wire() {
        let result = OperationResult::failed(FailureKind::Denied, "Permission denied.");
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json, serde_json::json!({"success": false, "message": "Permission denied."}));
    }

    #[test]
    fn duration_window_must_not_run_backwards() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("ts");
        let finish = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).single().expect("ts");
        assert_eq!(
            Duration { start, finish }.validate(),
            Err(ContractError::InvalidTimeWindow)
        );
        assert!(Duration {
            start: finish,
            finish: start
        }
        .validate()
        .is_ok());
    }
}
