use crate::MemberRole;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    OrganizationUpdate,
    OrganizationRemove,
    MemberManage,
    EventCreate,
    EventUpdate,
    EventRemove,
    RegistrationManage,
    RoleManage,
}

pub const ALL_CAPABILITIES: [Capability; 8] = [
    Capability::OrganizationUpdate,
    Capability::OrganizationRemove,
    Capability::MemberManage,
    Capability::EventCreate,
    Capability::EventUpdate,
    Capability::EventRemove,
    Capability::RegistrationManage,
    Capability::RoleManage,
];

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::OrganizationUpdate => "ORGANIZATION_UPDATE",
            Capability::OrganizationRemove => "ORGANIZATION_REMOVE",
            Capability::MemberManage => "MEMBER_MANAGE",
            Capability::EventCreate => "EVENT_CREATE",
            Capability::EventUpdate => "EVENT_UPDATE",
            Capability::EventRemove => "EVENT_REMOVE",
            Capability::RegistrationManage => "REGISTRATION_MANAGE",
            Capability::RoleManage => "ROLE_MANAGE",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_uppercase().replace('-', "_");
        ALL_CAPABILITIES
            .into_iter()
            .find(|capability| capability.as_str() == normalized)
            .ok_or_else(|| format!("Unknown capability: {}", input.trim()))
    }
}

impl MemberRole {
    /// Capabilities a membership role grants inside its organization.
    ///
    /// Each role's set contains the set of every role below it, so holding a
    /// role's capabilities is enough to grant that role to someone else.
    pub fn capabilities(&self) -> BTreeSet<Capability> {
        match self {
            MemberRole::Owner => ALL_CAPABILITIES.into_iter().collect(),
            MemberRole::Admin => [
                Capability::OrganizationUpdate,
                Capability::MemberManage,
                Capability::EventCreate,
                Capability::EventUpdate,
                Capability::EventRemove,
                Capability::RegistrationManage,
            ]
            .into_iter()
            .collect(),
            MemberRole::Member => [Capability::EventUpdate, Capability::RegistrationManage]
                .into_iter()
                .collect(),
        }
    }
}
