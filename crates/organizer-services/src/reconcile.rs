//! Reconciles a submitted child collection against the persisted children of
//! one parent.
//!
//! Two policies exist. Full replace drops every persisted child and inserts the
//! submitted set. Incremental reconcile adds or updates by id and removes by id
//! or by value. Membership-style children, keyed by subject, are only ever
//! inserted when missing. Matching always goes through hash sets, so every plan is linear
//! in `persisted + submitted`.

use chrono::{DateTime, Utc};
use organizer_core::{AnswerType, MemberRole, QuestionGroupType};
use organizer_storage::{
    ChildRecord, Repo, StorageError, StoredEventDuration, StoredEventTag, StoredMembership,
    StoredQuestion, StoredQuestionGroup,
};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// A child record the reconciler can match by id and by value.
pub trait Reconcilable: ChildRecord + Eq + Hash {
    /// Every semantic field except the id, parent id included.
    type Content: Eq + Hash;

    /// Identity within the parent. Surrogate-keyed records return their row id
    /// once stored; membership records return the subject id.
    fn child_id(&self) -> Option<i64>;

    fn content(&self) -> Self::Content;

    /// Drops an id that does not belong to this parent so storage assigns a
    /// fresh one. Records keyed by subject keep theirs.
    fn detach(&mut self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan<R> {
    pub deletes: Vec<R>,
    pub updates: Vec<R>,
    pub inserts: Vec<R>,
}

impl<R> Default for ReconcilePlan<R> {
    fn default() -> Self {
        Self {
            deletes: Vec::new(),
            updates: Vec::new(),
            inserts: Vec::new(),
        }
    }
}

impl<R> ReconcilePlan<R> {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.updates.is_empty() && self.inserts.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub deleted: usize,
    pub updated: usize,
    pub inserted: usize,
}

/// Deletes every persisted child and inserts every submitted record.
pub fn plan_full_replace<R: Reconcilable>(persisted: Vec<R>, submitted: Vec<R>) -> ReconcilePlan<R> {
    let inserts = submitted
        .into_iter()
        .map(|mut record| {
            record.detach();
            record
        })
        .collect();
    ReconcilePlan {
        deletes: persisted,
        updates: Vec::new(),
        inserts,
    }
}

/// Records whose id matches a persisted child become updates; the rest are
/// inserted. Repeated ids collapse to the last submitted record.
pub fn plan_add<R: Reconcilable>(persisted: &[R], submitted: Vec<R>) -> ReconcilePlan<R> {
    let known: HashSet<i64> = persisted.iter().filter_map(|record| record.child_id()).collect();

    let mut position_by_id: HashMap<i64, usize> = HashMap::new();
    let mut unique: Vec<R> = Vec::with_capacity(submitted.len());
    for record in submitted {
        match record.child_id() {
            Some(id) => match position_by_id.get(&id) {
                Some(&position) => unique[position] = record,
                None => {
                    position_by_id.insert(id, unique.len());
                    unique.push(record);
                }
            },
            None => unique.push(record),
        }
    }

    let mut plan = ReconcilePlan::default();
    for mut record in unique {
        match record.child_id() {
            Some(id) if known.contains(&id) => plan.updates.push(record),
            _ => {
                record.detach();
                plan.inserts.push(record);
            }
        }
    }
    plan
}

/// Inserts submitted records whose id is not persisted yet. Persisted children
/// are left as they are, and a repeated id keeps its first record.
pub fn plan_insert_missing<R: Reconcilable>(
    persisted: &[R],
    submitted: Vec<R>,
) -> ReconcilePlan<R> {
    let mut seen: HashSet<i64> = persisted.iter().filter_map(|record| record.child_id()).collect();
    let mut plan = ReconcilePlan::default();
    for mut record in submitted {
        match record.child_id() {
            Some(id) if !seen.insert(id) => {}
            Some(_) => plan.inserts.push(record),
            None => {
                record.detach();
                plan.inserts.push(record);
            }
        }
    }
    plan
}

/// Deletes every persisted child whose id is in `ids`.
pub fn plan_remove_by_ids<R: Reconcilable>(persisted: Vec<R>, ids: &[i64]) -> ReconcilePlan<R> {
    let lookup: HashSet<i64> = ids.iter().copied().collect();
    let deletes = persisted
        .into_iter()
        .filter(|record| record.child_id().is_some_and(|id| lookup.contains(&id)))
        .collect();
    ReconcilePlan {
        deletes,
        ..ReconcilePlan::default()
    }
}

/// Deletes every persisted child equal to a submitted record. A submitted
/// record without an id matches all persisted children with equal content.
pub fn plan_remove_by_value<R: Reconcilable>(
    persisted: Vec<R>,
    submitted: &[R],
) -> ReconcilePlan<R> {
    let mut exact: HashSet<&R> = HashSet::new();
    let mut equivalent: HashSet<R::Content> = HashSet::new();
    for record in submitted {
        if record.child_id().is_some() {
            exact.insert(record);
        } else {
            equivalent.insert(record.content());
        }
    }

    let deletes = persisted
        .into_iter()
        .filter(|record| exact.contains(record) || equivalent.contains(&record.content()))
        .collect();
    ReconcilePlan {
        deletes,
        ..ReconcilePlan::default()
    }
}

/// Writes a plan through `repo`. Callers run this inside a store scope so a
/// failure leaves nothing behind.
pub fn apply<R: Reconcilable>(
    repo: &Repo<'_>,
    plan: ReconcilePlan<R>,
) -> Result<ReconcileReport, StorageError> {
    if plan.is_empty() {
        return Ok(ReconcileReport::default());
    }
    let deleted = repo.delete_all(&plan.deletes)?;
    let updated = repo.save_all(&plan.updates)?.len();
    let mut inserted = 0;
    for record in &plan.inserts {
        repo.insert(record)?;
        inserted += 1;
    }
    Ok(ReconcileReport {
        deleted,
        updated,
        inserted,
    })
}

impl Reconcilable for StoredEventDuration {
    type Content = (i64, DateTime<Utc>, DateTime<Utc>);

    fn child_id(&self) -> Option<i64> {
        self.id
    }

    fn content(&self) -> Self::Content {
        (self.event_id, self.start, self.finish)
    }

    fn detach(&mut self) {
        self.id = None;
    }
}

impl Reconcilable for StoredMembership {
    type Content = (i64, MemberRole);

    fn child_id(&self) -> Option<i64> {
        Some(self.user_id)
    }

    fn content(&self) -> Self::Content {
        (self.organization_id, self.role)
    }
}

impl Reconcilable for StoredEventTag {
    type Content = i64;

    fn child_id(&self) -> Option<i64> {
        Some(self.tag_id)
    }

    fn content(&self) -> Self::Content {
        self.event_id
    }
}

impl Reconcilable for StoredQuestionGroup {
    type Content = (i64, QuestionGroupType, i32, String);

    fn child_id(&self) -> Option<i64> {
        self.id
    }

    fn content(&self) -> Self::Content {
        (self.event_id, self.group_type, self.seq, self.title.clone())
    }

    fn detach(&mut self) {
        self.id = None;
    }
}

impl Reconcilable for StoredQuestion {
    type Content = (i64, i32, AnswerType, bool, String, String);

    fn child_id(&self) -> Option<i64> {
        self.id
    }

    fn content(&self) -> Self::Content {
        (
            self.question_group_id,
            self.seq,
            self.answer_type,
            self.is_optional,
            self.title.clone(),
            self.subtitle.clone(),
        )
    }

    fn detach(&mut self) {
        self.id = None;
    }
}
