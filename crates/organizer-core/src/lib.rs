pub mod capability;
pub mod organizer_contracts;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use capability::Capability;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub is_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub id: i64,
    pub organization_id: i64,
    pub event_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub about: String,
    #[serde(default)]
    pub video: String,
    #[serde(default)]
    pub location_id: Option<i64>,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub picture: String,
    #[serde(default)]
    pub is_visible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Facility {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub operating_hours: String,
}

/// A bare time window as submitted for a full duration replace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Duration {
    pub start: DateTime<Utc>,
    pub finish: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventDuration {
    #[serde(default)]
    pub id: Option<i64>,
    pub event_id: i64,
    pub start: DateTime<Utc>,
    pub finish: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionGroup {
    #[serde(default)]
    pub id: Option<i64>,
    pub event_id: i64,
    #[serde(default)]
    pub group_type: QuestionGroupType,
    #[serde(default)]
    pub seq: i32,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    #[serde(default)]
    pub id: Option<i64>,
    pub question_group_id: i64,
    #[serde(default)]
    pub seq: i32,
    #[serde(default)]
    pub answer_type: AnswerType,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserOrganization {
    pub user_id: i64,
    pub organization_id: i64,
    #[serde(default)]
    pub role: MemberRole,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventTag {
    pub event_id: i64,
    pub tag_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRegistration {
    pub user_id: i64,
    pub event_id: i64,
    #[serde(default)]
    pub status: RegistrationStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionGroupType {
    #[default]
    PreEvent,
    PostEvent,
}

impl QuestionGroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionGroupType::PreEvent => "pre_event",
            QuestionGroupType::PostEvent => "post_event",
        }
    }
}

impl fmt::Display for QuestionGroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionGroupType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "pre_event" | "pre-event" => Ok(QuestionGroupType::PreEvent),
            "post_event" | "post-event" => Ok(QuestionGroupType::PostEvent),
            other => Err(format!("Unknown question group type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    Scale,
    #[default]
    Text,
}

impl AnswerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerType::Scale => "scale",
            AnswerType::Text => "text",
        }
    }
}

impl fmt::Display for AnswerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "scale" => Ok(AnswerType::Scale),
            "text" => Ok(AnswerType::Text),
            other => Err(format!("Unknown answer type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Admin,
    #[default]
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "owner" => Ok(MemberRole::Owner),
            "admin" => Ok(MemberRole::Admin),
            "member" => Ok(MemberRole::Member),
            other => Err(format!("Unknown member role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Accepted => "accepted",
            RegistrationStatus::Rejected => "rejected",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "pending" => Ok(RegistrationStatus::Pending),
            "accepted" | "approved" => Ok(RegistrationStatus::Accepted),
            "rejected" => Ok(RegistrationStatus::Rejected),
            "cancelled" | "canceled" => Ok(RegistrationStatus::Cancelled),
            other => Err(format!("Unknown registration status: {other}")),
        }
    }
}
