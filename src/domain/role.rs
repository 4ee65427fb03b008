//! Roles and the identity of the caller.
//!
//! The role set is closed: every access decision matches on it
//! exhaustively, so adding a role forces every policy to be revisited.

use serde::{Deserialize, Serialize};

use super::job::UserId;

/// A user's role within the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Creates jobs, may write every stage
    Admin,

    /// Sees every job, writes nothing
    Subadmin,

    /// Sees the jobs they created
    Stage1Employee,

    /// Customs & documentation
    Stage2Employee,

    /// Clearance & logistics
    Stage3Employee,

    /// Billing acknowledgement
    Customer,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Admin,
        Role::Subadmin,
        Role::Stage1Employee,
        Role::Stage2Employee,
        Role::Stage3Employee,
        Role::Customer,
    ];

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "subadmin" => Some(Self::Subadmin),
            "stage1_employee" => Some(Self::Stage1Employee),
            "stage2_employee" => Some(Self::Stage2Employee),
            "stage3_employee" => Some(Self::Stage3Employee),
            "customer" => Some(Self::Customer),
            _ => None,
        }
    }

    /// Database string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Subadmin => "subadmin",
            Self::Stage1Employee => "stage1_employee",
            Self::Stage2Employee => "stage2_employee",
            Self::Stage3Employee => "stage3_employee",
            Self::Customer => "customer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated identity behind a request.
///
/// Credentials are verified upstream; everything here is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Build a caller from a user row. The legacy `is_admin` flag wins
    /// over the stored role.
    pub fn from_user(user_id: UserId, role: Role, is_admin: bool) -> Self {
        let role = if is_admin { Role::Admin } else { role };
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_string_round_trip() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn test_admin_flag_overrides_role() {
        let caller = Caller::from_user(7, Role::Stage2Employee, true);
        assert!(caller.is_admin());

        let caller = Caller::from_user(7, Role::Stage2Employee, false);
        assert_eq!(caller.role, Role::Stage2Employee);
    }

    #[test]
    fn test_role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::Stage3Employee).unwrap();
        assert_eq!(json, "\"stage3_employee\"");
    }
}
