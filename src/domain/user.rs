//! Users known to the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::UserId;
use super::role::{Caller, Role};

/// A user row. The password hash is stored but never serialized out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub designation: String,
    pub is_admin: bool,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The identity this user acts with
    pub fn caller(&self) -> Caller {
        Caller::from_user(self.id, self.role, self.is_admin)
    }
}

/// Fields needed to register a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub password_hash: String,
    pub designation: String,
    #[serde(default)]
    pub is_admin: bool,
    pub role: Role,
}

impl NewUser {
    pub fn new(username: impl Into<String>, designation: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            password_hash: String::new(),
            designation: designation.into(),
            is_admin: role == Role::Admin,
            role,
        }
    }
}
