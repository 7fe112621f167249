use crate::gate::{self, GateTarget};
use crate::reconcile::{self, plan_add, plan_remove_by_ids, plan_remove_by_value, Reconcilable};
use crate::{settle_ack, ServiceContext, ServiceError};
use organizer_core::organizer_contracts::{
    validate_single_parent, Ack, AddQuestionGroupsRequest, AddQuestionsRequest, GetByIdRequest,
    GetQuestionGroupsByEventIdResponse, GetQuestionsByGroupIdResponse, RemovalSelector,
    RemoveQuestionGroupsRequest, RemoveQuestionsRequest,
};
use organizer_core::Capability;
use organizer_storage::{Entity, Repo, StoredQuestion, StoredQuestionGroup};
use tracing::debug;

const MIXED_GROUP_EVENTS: &str = "Cannot add question groups with different event IDs.";
const MIXED_REMOVAL_EVENTS: &str = "Cannot remove question groups with different event IDs.";
const MIXED_QUESTION_GROUPS: &str = "Cannot add questions with different question group IDs.";
const MIXED_REMOVAL_GROUPS: &str = "Cannot remove questions with different question group IDs.";

pub trait QuestionOperations {
    fn question_groups_by_event_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetQuestionGroupsByEventIdResponse, ServiceError>;
    fn add_question_groups(&self, request: AddQuestionGroupsRequest) -> Result<Ack, ServiceError>;
    fn remove_question_groups(
        &self,
        request: RemoveQuestionGroupsRequest,
    ) -> Result<Ack, ServiceError>;

    fn questions_by_group_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetQuestionsByGroupIdResponse, ServiceError>;
    fn add_questions(&self, request: AddQuestionsRequest) -> Result<Ack, ServiceError>;
    fn remove_questions(&self, request: RemoveQuestionsRequest) -> Result<Ack, ServiceError>;
}

#[derive(Clone)]
pub struct QuestionService {
    context: ServiceContext,
}

impl QuestionService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    fn require_event_update(
        &self,
        repo: &Repo<'_>,
        user_id: i64,
        target: GateTarget,
    ) -> Result<(), ServiceError> {
        gate::authorize(
            repo,
            self.context.directory.as_ref(),
            user_id,
            target,
            Capability::EventUpdate,
        )
        .into_result()
    }

    /// Adds or updates `submitted` under one parent after the batch and the
    /// caller have been checked.
    fn add_children<R>(
        &self,
        user_id: i64,
        submitted: Vec<R>,
        target: impl Fn(i64) -> GateTarget,
        mixed_message: &str,
    ) -> Result<Ack, ServiceError>
    where
        R: Reconcilable,
    {
        let parent_id = validate_single_parent(&submitted, |record| record.parent_id())
            .map_err(|_| ServiceError::InvalidArgument(mixed_message.to_string()))?;
        let Some(parent_id) = parent_id else {
            return Ok(Ack {});
        };

        self.context.in_scope(|repo| {
            self.require_event_update(repo, user_id, target(parent_id))?;
            let persisted = repo.find_all_by_parent_id::<R>(parent_id)?;
            let report = reconcile::apply(repo, plan_add(&persisted, submitted))?;
            debug!(
                event = "children_added",
                table = R::TABLE,
                parent_id,
                inserted = report.inserted,
                updated = report.updated
            );
            Ok(Ack {})
        })
    }

    /// Removes children of `parent_id` selected by id or by value.
    fn remove_children<R>(
        &self,
        user_id: i64,
        parent_id: i64,
        selector: RemovalSelector<R>,
        target: GateTarget,
        mixed_message: &str,
    ) -> Result<Ack, ServiceError>
    where
        R: Reconcilable,
    {
        if selector.is_empty() {
            return Ok(Ack {});
        }
        if let RemovalSelector::Records(records) = &selector {
            if records.iter().any(|record| record.parent_id() != parent_id) {
                return Err(ServiceError::InvalidArgument(mixed_message.to_string()));
            }
        }

        self.context.in_scope(|repo| {
            self.require_event_update(repo, user_id, target)?;
            let persisted = repo.find_all_by_parent_id::<R>(parent_id)?;
            let plan = match &selector {
                RemovalSelector::Ids(ids) => plan_remove_by_ids(persisted, ids),
                RemovalSelector::Records(records) => plan_remove_by_value(persisted, records),
            };
            let report = reconcile::apply(repo, plan)?;
            debug!(
                event = "children_removed",
                table = R::TABLE,
                parent_id,
                submitted = selector.len(),
                deleted = report.deleted
            );
            Ok(Ack {})
        })
    }
}

impl QuestionOperations for QuestionService {
    fn question_groups_by_event_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetQuestionGroupsByEventIdResponse, ServiceError> {
        let groups = self
            .context
            .read(|repo| repo.find_all_by_parent_id::<StoredQuestionGroup>(request.id))?;
        Ok(GetQuestionGroupsByEventIdResponse {
            question_groups: groups.iter().map(Entity::to_message).collect(),
        })
    }

    fn add_question_groups(&self, request: AddQuestionGroupsRequest) -> Result<Ack, ServiceError> {
        let submitted: Vec<StoredQuestionGroup> = request
            .question_groups
            .iter()
            .map(StoredQuestionGroup::from_message)
            .collect();
        let outcome = self.add_children(
            request.user_id,
            submitted,
            GateTarget::Event,
            MIXED_GROUP_EVENTS,
        );
        settle_ack("add_question_groups", outcome)
    }

    fn remove_question_groups(
        &self,
        request: RemoveQuestionGroupsRequest,
    ) -> Result<Ack, ServiceError> {
        let selector = match request.selector {
            RemovalSelector::Ids(ids) => RemovalSelector::Ids(ids),
            RemovalSelector::Records(groups) => RemovalSelector::Records(
                groups.iter().map(StoredQuestionGroup::from_message).collect(),
            ),
        };
        let outcome = self.remove_children(
            request.user_id,
            request.event_id,
            selector,
            GateTarget::Event(request.event_id),
            MIXED_REMOVAL_EVENTS,
        );
        settle_ack("remove_question_groups", outcome)
    }

    fn questions_by_group_id(
        &self,
        request: GetByIdRequest,
    ) -> Result<GetQuestionsByGroupIdResponse, ServiceError> {
        let questions = self
            .context
            .read(|repo| repo.find_all_by_parent_id::<StoredQuestion>(request.id))?;
        Ok(GetQuestionsByGroupIdResponse {
            questions: questions.iter().map(Entity::to_message).collect(),
        })
    }

    fn add_questions(&self, request: AddQuestionsRequest) -> Result<Ack, ServiceError> {
        let submitted: Vec<StoredQuestion> = request
            .questions
            .iter()
            .map(StoredQuestion::from_message)
            .collect();
        let outcome = self.add_children(
            request.user_id,
            submitted,
            GateTarget::QuestionGroup,
            MIXED_QUESTION_GROUPS,
        );
        settle_ack("add_questions", outcome)
    }

    fn remove_questions(&self, request: RemoveQuestionsRequest) -> Result<Ack, ServiceError> {
        let selector = match request.selector {
            RemovalSelector::Ids(ids) => RemovalSelector::Ids(ids),
            RemovalSelector::Records(questions) => RemovalSelector::Records(
                questions.iter().map(StoredQuestion::from_message).collect(),
            ),
        };
        let outcome = self.remove_children(
            request.user_id,
            request.question_group_id,
            selector,
            GateTarget::QuestionGroup(request.question_group_id),
            MIXED_REMOVAL_GROUPS,
        );
        settle_ack("remove_questions", outcome)
    }
}
