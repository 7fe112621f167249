use crate::{parse_timestamp, StorageError};
use chrono::{DateTime, Utc};
use organizer_core::{
    AnswerType, Event, EventDuration, EventRegistration, EventTag, Facility, MemberRole,
    Organization, Question, QuestionGroup, QuestionGroupType, RegistrationStatus,
    UserOrganization,
};
use rusqlite::types::{Type, Value};
use rusqlite::Row;
use std::str::FromStr;

/// Maps a persisted struct onto one table.
///
/// `COLUMNS` lists every column with the key columns first; `values` and
/// `from_row` follow the same order.
pub trait Record: Sized + Clone {
    type Key: Clone;

    const TABLE: &'static str;
    const KEY_COLUMNS: &'static [&'static str];
    const COLUMNS: &'static [&'static str];

    fn key(&self) -> Option<Self::Key>;
    fn key_values(key: &Self::Key) -> Vec<Value>;
    fn values(&self) -> Vec<Value>;
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Called after an insert that let storage pick the key.
    fn assign_rowid(&mut self, _rowid: i64) {}
}

/// A record owned by exactly one parent through a foreign key.
pub trait ChildRecord: Record {
    const PARENT_COLUMN: &'static str;

    fn parent_id(&self) -> i64;
}

/// Conversion between a wire message and its persisted shape.
pub trait Entity: Record {
    type Message;

    fn from_message(message: &Self::Message) -> Self;
    fn to_message(&self) -> Self::Message;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOrganization {
    pub id: i64,
    pub name: String,
    pub is_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub id: i64,
    pub organization_id: i64,
    pub event_name: String,
    pub description: String,
    pub about: String,
    pub video: String,
    pub location_id: Option<i64>,
    pub contact: String,
    pub picture: String,
    pub is_visible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredFacility {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub operating_hours: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredEventDuration {
    pub id: Option<i64>,
    pub event_id: i64,
    pub start: DateTime<Utc>,
    pub finish: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredEventRegistration {
    pub user_id: i64,
    pub event_id: i64,
    pub status: RegistrationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoredEventTag {
    pub event_id: i64,
    pub tag_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredMembership {
    pub user_id: i64,
    pub organization_id: i64,
    pub role: MemberRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredQuestionGroup {
    pub id: Option<i64>,
    pub event_id: i64,
    pub group_type: QuestionGroupType,
    pub seq: i32,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredQuestion {
    pub id: Option<i64>,
    pub question_group_id: i64,
    pub seq: i32,
    pub answer_type: AnswerType,
    pub is_optional: bool,
    pub title: String,
    pub subtitle: String,
}

impl Record for StoredOrganization {
    type Key = i64;

    const TABLE: &'static str = "organizations";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const COLUMNS: &'static [&'static str] = &["id", "name", "is_verified"];

    fn key(&self) -> Option<i64> {
        Some(self.id)
    }

    fn key_values(key: &i64) -> Vec<Value> {
        vec![Value::from(*key)]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::from(self.id),
            Value::from(self.name.clone()),
            Value::from(self.is_verified),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            is_verified: row.get(2)?,
        })
    }
}

impl Entity for StoredOrganization {
    type Message = Organization;

    fn from_message(message: &Organization) -> Self {
        Self {
            id: message.id,
            name: message.name.clone(),
            is_verified: message.is_verified,
        }
    }

    fn to_message(&self) -> Organization {
        Organization {
            id: self.id,
            name: self.name.clone(),
            is_verified: self.is_verified,
        }
    }
}

impl Record for StoredEvent {
    type Key = i64;

    const TABLE: &'static str = "events";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "organization_id",
        "event_name",
        "description",
        "about",
        "video",
        "location_id",
        "contact",
        "picture",
        "is_visible",
    ];

    fn key(&self) -> Option<i64> {
        Some(self.id)
    }

    fn key_values(key: &i64) -> Vec<Value> {
        vec![Value::from(*key)]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::from(self.id),
            Value::from(self.organization_id),
            Value::from(self.event_name.clone()),
            Value::from(self.description.clone()),
            Value::from(self.about.clone()),
            Value::from(self.video.clone()),
            Value::from(self.location_id),
            Value::from(self.contact.clone()),
            Value::from(self.picture.clone()),
            Value::from(self.is_visible),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            event_name: row.get(2)?,
            description: row.get(3)?,
            about: row.get(4)?,
            video: row.get(5)?,
            location_id: row.get(6)?,
            contact: row.get(7)?,
            picture: row.get(8)?,
            is_visible: row.get(9)?,
        })
    }
}

impl Entity for StoredEvent {
    type Message = Event;

    fn from_message(message: &Event) -> Self {
        Self {
            id: message.id,
            organization_id: message.organization_id,
            event_name: message.event_name.clone(),
            description: message.description.clone(),
            about: message.about.clone(),
            video: message.video.clone(),
            location_id: message.location_id,
            contact: message.contact.clone(),
            picture: message.picture.clone(),
            is_visible: message.is_visible,
        }
    }

    fn to_message(&self) -> Event {
        Event {
            id: self.id,
            organization_id: self.organization_id,
            event_name: self.event_name.clone(),
            description: self.description.clone(),
            about: self.about.clone(),
            video: self.video.clone(),
            location_id: self.location_id,
            contact: self.contact.clone(),
            picture: self.picture.clone(),
            is_visible: self.is_visible,
        }
    }
}

impl Record for StoredFacility {
    type Key = i64;

    const TABLE: &'static str = "facilities";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const COLUMNS: &'static [&'static str] =
        &["id", "name", "latitude", "longitude", "operating_hours"];

    fn key(&self) -> Option<i64> {
        Some(self.id)
    }

    fn key_values(key: &i64) -> Vec<Value> {
        vec![Value::from(*key)]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::from(self.id),
            Value::from(self.name.clone()),
            Value::from(self.latitude),
            Value::from(self.longitude),
            Value::from(self.operating_hours.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            operating_hours: row.get(4)?,
        })
    }
}

impl Entity for StoredFacility {
    type Message = Facility;

    fn from_message(message: &Facility) -> Self {
        Self {
            id: message.id,
            name: message.name.clone(),
            latitude: message.latitude,
            longitude: message.longitude,
            operating_hours: message.operating_hours.clone(),
        }
    }

    fn to_message(&self) -> Facility {
        Facility {
            id: self.id,
            name: self.name.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            operating_hours: self.operating_hours.clone(),
        }
    }
}

impl Record for StoredEventDuration {
    type Key = i64;

    const TABLE: &'static str = "event_durations";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const COLUMNS: &'static [&'static str] = &["id", "event_id", "start", "finish"];

    fn key(&self) -> Option<i64> {
        self.id
    }

    fn key_values(key: &i64) -> Vec<Value> {
        vec![Value::from(*key)]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::from(self.id),
            Value::from(self.event_id),
            Value::from(self.start.to_rfc3339()),
            Value::from(self.finish.to_rfc3339()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            event_id: row.get(1)?,
            start: timestamp_column(row, 2)?,
            finish: timestamp_column(row, 3)?,
        })
    }

    fn assign_rowid(&mut self, rowid: i64) {
        self.id.get_or_insert(rowid);
    }
}

impl ChildRecord for StoredEventDuration {
    const PARENT_COLUMN: &'static str = "event_id";

    fn parent_id(&self) -> i64 {
        self.event_id
    }
}

impl Entity for StoredEventDuration {
    type Message = EventDuration;

    fn from_message(message: &EventDuration) -> Self {
        Self {
            id: message.id,
            event_id: message.event_id,
            start: message.start,
            finish: message.finish,
        }
    }

    fn to_message(&self) -> EventDuration {
        EventDuration {
            id: self.id,
            event_id: self.event_id,
            start: self.start,
            finish: self.finish,
        }
    }
}

impl Record for StoredEventRegistration {
    type Key = (i64, i64);

    const TABLE: &'static str = "event_registrations";
    const KEY_COLUMNS: &'static [&'static str] = &["user_id", "event_id"];
    const COLUMNS: &'static [&'static str] = &["user_id", "event_id", "status"];

    fn key(&self) -> Option<(i64, i64)> {
        Some((self.user_id, self.event_id))
    }

    fn key_values(key: &(i64, i64)) -> Vec<Value> {
        vec![Value::from(key.0), Value::from(key.1)]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::from(self.user_id),
            Value::from(self.event_id),
            Value::from(self.status.as_str().to_string()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            event_id: row.get(1)?,
            status: text_column(row, 2)?,
        })
    }
}

impl ChildRecord for StoredEventRegistration {
    const PARENT_COLUMN: &'static str = "event_id";

    fn parent_id(&self) -> i64 {
        self.event_id
    }
}

impl Entity for StoredEventRegistration {
    type Message = EventRegistration;

    fn from_message(message: &EventRegistration) -> Self {
        Self {
            user_id: message.user_id,
            event_id: message.event_id,
            status: message.status,
        }
    }

    fn to_message(&self) -> EventRegistration {
        EventRegistration {
            user_id: self.user_id,
            event_id: self.event_id,
            status: self.status,
        }
    }
}

impl Record for StoredEventTag {
    type Key = (i64, i64);

    const TABLE: &'static str = "event_tags";
    const KEY_COLUMNS: &'static [&'static str] = &["event_id", "tag_id"];
    const COLUMNS: &'static [&'static str] = &["event_id", "tag_id"];

    fn key(&self) -> Option<(i64, i64)> {
        Some((self.event_id, self.tag_id))
    }

    fn key_values(key: &(i64, i64)) -> Vec<Value> {
        vec![Value::from(key.0), Value::from(key.1)]
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::from(self.event_id), Value::from(self.tag_id)]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            event_id: row.get(0)?,
            tag_id: row.get(1)?,
        })
    }
}

impl ChildRecord for StoredEventTag {
    const PARENT_COLUMN: &'static str = "event_id";

    fn parent_id(&self) -> i64 {
        self.event_id
    }
}

impl Entity for StoredEventTag {
    type Message = EventTag;

    fn from_message(message: &EventTag) -> Self {
        Self {
            event_id: message.event_id,
            tag_id: message.tag_id,
        }
    }

    fn to_message(&self) -> EventTag {
        EventTag {
            event_id: self.event_id,
            tag_id: self.tag_id,
        }
    }
}

impl Record for StoredMembership {
    type Key = (i64, i64);

    const TABLE: &'static str = "user_organizations";
    const KEY_COLUMNS: &'static [&'static str] = &["user_id", "organization_id"];
    const COLUMNS: &'static [&'static str] = &["user_id", "organization_id", "role"];

    fn key(&self) -> Option<(i64, i64)> {
        Some((self.user_id, self.organization_id))
    }

    fn key_values(key: &(i64, i64)) -> Vec<Value> {
        vec![Value::from(key.0), Value::from(key.1)]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::from(self.user_id),
            Value::from(self.organization_id),
            Value::from(self.role.as_str().to_string()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            organization_id: row.get(1)?,
            role: text_column(row, 2)?,
        })
    }
}

impl ChildRecord for StoredMembership {
    const PARENT_COLUMN: &'static str = "organization_id";

    fn parent_id(&self) -> i64 {
        self.organization_id
    }
}

impl Entity for StoredMembership {
    type Message = UserOrganization;

    fn from_message(message: &UserOrganization) -> Self {
        Self {
            user_id: message.user_id,
            organization_id: message.organization_id,
            role: message.role,
        }
    }

    fn to_message(&self) -> UserOrganization {
        UserOrganization {
            user_id: self.user_id,
            organization_id: self.organization_id,
            role: self.role,
        }
    }
}

impl Record for StoredQuestionGroup {
    type Key = i64;

    const TABLE: &'static str = "question_groups";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const COLUMNS: &'static [&'static str] = &["id", "event_id", "group_type", "seq", "title"];

    fn key(&self) -> Option<i64> {
        self.id
    }

    fn key_values(key: &i64) -> Vec<Value> {
        vec![Value::from(*key)]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::from(self.id),
            Value::from(self.event_id),
            Value::from(self.group_type.as_str().to_string()),
            Value::from(self.seq),
            Value::from(self.title.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            event_id: row.get(1)?,
            group_type: text_column(row, 2)?,
            seq: row.get(3)?,
            title: row.get(4)?,
        })
    }

    fn assign_rowid(&mut self, rowid: i64) {
        self.id.get_or_insert(rowid);
    }
}

impl ChildRecord for StoredQuestionGroup {
    const PARENT_COLUMN: &'static str = "event_id";

    fn parent_id(&self) -> i64 {
        self.event_id
    }
}

impl Entity for StoredQuestionGroup {
    type Message = QuestionGroup;

    fn from_message(message: &QuestionGroup) -> Self {
        Self {
            id: message.id,
            event_id: message.event_id,
            group_type: message.group_type,
            seq: message.seq,
            title: message.title.clone(),
        }
    }

    fn to_message(&self) -> QuestionGroup {
        QuestionGroup {
            id: self.id,
            event_id: self.event_id,
            group_type: self.group_type,
            seq: self.seq,
            title: self.title.clone(),
        }
    }
}

impl Record for StoredQuestion {
    type Key = i64;

    const TABLE: &'static str = "questions";
    const KEY_COLUMNS: &'static [&'static str] = &["id"];
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "question_group_id",
        "seq",
        "answer_type",
        "is_optional",
        "title",
        "subtitle",
    ];

    fn key(&self) -> Option<i64> {
        self.id
    }

    fn key_values(key: &i64) -> Vec<Value> {
        vec![Value::from(*key)]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::from(self.id),
            Value::from(self.question_group_id),
            Value::from(self.seq),
            Value::from(self.answer_type.as_str().to_string()),
            Value::from(self.is_optional),
            Value::from(self.title.clone()),
            Value::from(self.subtitle.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            question_group_id: row.get(1)?,
            seq: row.get(2)?,
            answer_type: text_column(row, 3)?,
            is_optional: row.get(4)?,
            title: row.get(5)?,
            subtitle: row.get(6)?,
        })
    }

    fn assign_rowid(&mut self, rowid: i64) {
        self.id.get_or_insert(rowid);
    }
}

impl ChildRecord for StoredQuestion {
    const PARENT_COLUMN: &'static str = "question_group_id";

    fn parent_id(&self) -> i64 {
        self.question_group_id
    }
}

impl Entity for StoredQuestion {
    type Message = Question;

    fn from_message(message: &Question) -> Self {
        Self {
            id: message.id,
            question_group_id: message.question_group_id,
            seq: message.seq,
            answer_type: message.answer_type,
            is_optional: message.is_optional,
            title: message.title.clone(),
            subtitle: message.subtitle.clone(),
        }
    }

    fn to_message(&self) -> Question {
        Question {
            id: self.id,
            question_group_id: self.question_group_id,
            seq: self.seq,
            answer_type: self.answer_type,
            is_optional: self.is_optional,
            title: self.title.clone(),
            subtitle: self.subtitle.clone(),
        }
    }
}

fn text_column<T>(row: &Row<'_>, index: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(index)?;
    raw.parse::<T>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Text,
            Box::new(StorageError::Serialization(err)),
        )
    })
}

fn timestamp_column(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_timestamp(row.get::<_, String>(index)?).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
    })
}
