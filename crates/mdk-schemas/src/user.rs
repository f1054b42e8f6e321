use std::fmt;

use serde::{Deserialize, Serialize};

use crate::MemoError;

/// Roles an admin can register. Fixed enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Nurse,
    Electrician,
    Plumber,
    Dean,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Nurse, Role::Electrician, Role::Plumber, Role::Dean];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Nurse => "Nurse",
            Role::Electrician => "Electrician",
            Role::Plumber => "Plumber",
            Role::Dean => "Dean",
        }
    }

    /// Exact-name parse. Registration only accepts the fixed enumeration.
    pub fn parse(s: &str) -> Result<Self, MemoError> {
        let t = s.trim();
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == t)
            .ok_or_else(|| MemoError::validation(format!("unknown role: {s}")))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    Create,
    Respond,
    Escalate,
    Approve,
    Monitor,
}

impl Privilege {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::Create => "create",
            Privilege::Respond => "respond",
            Privilege::Escalate => "escalate",
            Privilege::Approve => "approve",
            Privilege::Monitor => "monitor",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user store persists. Privileges are not stored; they are
/// derived from `role` whenever a [`User`] view is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Stable id issued by the authentication provider.
    pub user_id: String,
    pub phone: String,
    pub role: Role,
}

/// User as served to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub phone: String,
    pub role: Role,
    pub privileges: Vec<Privilege>,
}
