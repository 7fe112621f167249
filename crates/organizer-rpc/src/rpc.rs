use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use organizer_core::organizer_contracts::{
    AddQuestionGroupsRequest, AddQuestionsRequest, CreateEventRequest, CreateFacilityRequest,
    CreateOrganizationRequest, GetByIdRequest, HasEventRequest, OperationResult,
    RemoveEventRequest, RemoveOrganizationRequest, RemoveQuestionGroupsRequest,
    RemoveQuestionsRequest, UpdateEventDurationRequest, UpdateEventFacilityRequest,
    UpdateEventInfoRequest, UpdateEventTagsRequest, UpdateMemberRoleRequest,
    UpdateOrganizationRequest, UpdateRegistrationRequestRequest, UpdateUsersInOrganizationRequest,
};
use organizer_services::{
    EventOperations, EventService, OrganizationOperations, OrganizationService,
    QuestionOperations, QuestionService, ServiceContext, ServiceError,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error};

const INTERNAL_ERROR: &str = "Internal error.";

#[derive(Clone)]
pub struct AppState {
    events: EventService,
    organizations: OrganizationService,
    questions: QuestionService,
    workers: Arc<Semaphore>,
}

impl AppState {
    pub fn new(context: ServiceContext, workers: usize) -> Self {
        Self {
            events: EventService::new(context.clone()),
            organizations: OrganizationService::new(context.clone()),
            questions: QuestionService::new(context),
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/organizer/create_event", post(create_event))
        .route("/organizer/list_events", post(list_events))
        .route("/organizer/event_by_id", post(event_by_id))
        .route("/organizer/update_event_info", post(update_event_info))
        .route("/organizer/remove_event", post(remove_event))
        .route("/organizer/create_facility", post(create_facility))
        .route("/organizer/facility_by_id", post(facility_by_id))
        .route("/organizer/update_event_facility", post(update_event_facility))
        .route(
            "/organizer/replace_event_durations",
            post(replace_event_durations),
        )
        .route("/organizer/durations_by_event_id", post(durations_by_event_id))
        .route(
            "/organizer/update_registration_request",
            post(update_registration_request),
        )
        .route(
            "/organizer/registrations_by_event_id",
            post(registrations_by_event_id),
        )
        .route("/organizer/tags_by_event_id", post(tags_by_event_id))
        .route("/organizer/add_event_tags", post(add_event_tags))
        .route("/organizer/remove_event_tags", post(remove_event_tags))
        .route("/organizer/has_event", post(has_event))
        .route("/organizer/create_organization", post(create_organization))
        .route("/organizer/list_organizations", post(list_organizations))
        .route("/organizer/organization_by_id", post(organization_by_id))
        .route("/organizer/update_organization", post(update_organization))
        .route("/organizer/remove_organization", post(remove_organization))
        .route(
            "/organizer/add_users_to_organization",
            post(add_users_to_organization),
        )
        .route(
            "/organizer/remove_users_from_organization",
            post(remove_users_from_organization),
        )
        .route("/organizer/update_member_role", post(update_member_role))
        .route(
            "/organizer/members_by_organization_id",
            post(members_by_organization_id),
        )
        .route(
            "/organizer/question_groups_by_event_id",
            post(question_groups_by_event_id),
        )
        .route("/organizer/add_question_groups", post(add_question_groups))
        .route("/organizer/remove_question_groups", post(remove_question_groups))
        .route("/organizer/questions_by_group_id", post(questions_by_group_id))
        .route("/organizer/add_questions", post(add_questions))
        .route("/organizer/remove_questions", post(remove_questions))
        .with_state(state)
}

/// Runs one service call on the blocking pool once a worker permit is free.
async fn dispatch<T, F>(state: &AppState, operation: &'static str, work: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(AppState) -> Result<T, ServiceError> + Send + 'static,
{
    let permit = match Arc::clone(&state.workers).acquire_owned().await {
        Ok(permit) => permit,
        Err(err) => {
            error!(event = "worker_pool_closed", operation, error = %err);
            return failure(StatusCode::SERVICE_UNAVAILABLE, INTERNAL_ERROR);
        }
    };

    let worker_state = state.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        work(worker_state)
    })
    .await;

    match joined {
        Ok(Ok(reply)) => {
            debug!(event = "rpc_ok", operation);
            Json(reply).into_response()
        }
        Ok(Err(err)) => error_response(operation, err),
        Err(err) => {
            error!(event = "worker_failed", operation, error = %err);
            failure(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

/// Gate failures stay in-band as a failed result; only malformed input and
/// internal errors get a distinct status.
fn error_response(operation: &'static str, err: ServiceError) -> Response {
    match err {
        ServiceError::InvalidArgument(message) => {
            debug!(event = "rpc_invalid_argument", operation, message = %message);
            failure(StatusCode::BAD_REQUEST, message)
        }
        ServiceError::Unknown(err) => {
            error!(event = "rpc_internal_error", operation, error = %err);
            failure(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
        other => match other.into_failure() {
            Ok(result) => Json(result).into_response(),
            Err(err) => failure(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        },
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    let body = OperationResult {
        success: false,
        message: message.into(),
        failure: None,
    };
    (status, Json(body)).into_response()
}

macro_rules! rpc_handler {
    ($name:ident, $service:ident, $request:ty) => {
        async fn $name(State(state): State<AppState>, Json(request): Json<$request>) -> Response {
            dispatch(&state, stringify!($name), move |state| {
                state.$service.$name(request)
            })
            .await
        }
    };
    ($name:ident, $service:ident) => {
        async fn $name(State(state): State<AppState>) -> Response {
            dispatch(&state, stringify!($name), move |state| state.$service.$name()).await
        }
    };
}

rpc_handler!(create_event, events, CreateEventRequest);
rpc_handler!(list_events, events);
rpc_handler!(event_by_id, events, GetByIdRequest);
rpc_handler!(update_event_info, events, UpdateEventInfoRequest);
rpc_handler!(remove_event, events, RemoveEventRequest);
rpc_handler!(create_facility, events, CreateFacilityRequest);
rpc_handler!(facility_by_id, events, GetByIdRequest);
rpc_handler!(update_event_facility, events, UpdateEventFacilityRequest);
rpc_handler!(replace_event_durations, events, UpdateEventDurationRequest);
rpc_handler!(durations_by_event_id, events, GetByIdRequest);
rpc_handler!(update_registration_request, events, UpdateRegistrationRequestRequest);
rpc_handler!(registrations_by_event_id, events, GetByIdRequest);
rpc_handler!(tags_by_event_id, events, GetByIdRequest);
rpc_handler!(add_event_tags, events, UpdateEventTagsRequest);
rpc_handler!(remove_event_tags, events, UpdateEventTagsRequest);
rpc_handler!(has_event, events, HasEventRequest);

rpc_handler!(create_organization, organizations, CreateOrganizationRequest);
rpc_handler!(list_organizations, organizations);
rpc_handler!(organization_by_id, organizations, GetByIdRequest);
rpc_handler!(update_organization, organizations, UpdateOrganizationRequest);
rpc_handler!(remove_organization, organizations, RemoveOrganizationRequest);
rpc_handler!(add_users_to_organization, organizations, UpdateUsersInOrganizationRequest);
rpc_handler!(remove_users_from_organization, organizations, UpdateUsersInOrganizationRequest);
rpc_handler!(update_member_role, organizations, UpdateMemberRoleRequest);
rpc_handler!(members_by_organization_id, organizations, GetByIdRequest);

rpc_handler!(question_groups_by_event_id, questions, GetByIdRequest);
rpc_handler!(add_question_groups, questions, AddQuestionGroupsRequest);
rpc_handler!(remove_question_groups, questions, RemoveQuestionGroupsRequest);
rpc_handler!(questions_by_group_id, questions, GetByIdRequest);
rpc_handler!(add_questions, questions, AddQuestionsRequest);
rpc_handler!(remove_questions, questions, RemoveQuestionsRequest);
