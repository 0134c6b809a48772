//! User (staff/owner account) types.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::{OrganizationId, UserId};

/// Role of a login-capable user within an organization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UserRole {
    Owner,
    Admin,
    Staff,
    Trainer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Owner => "owner",
            UserRole::Admin => "admin",
            UserRole::Staff => "staff",
            UserRole::Trainer => "trainer",
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(UserRole::Owner),
            "admin" => Ok(UserRole::Admin),
            "staff" => Ok(UserRole::Staff),
            "trainer" => Ok(UserRole::Trainer),
            _ => Err(format!("unknown user role: {}", s)),
        }
    }
}

/// User record.
#[derive(Clone, Debug)]
pub struct User {
    pub id: UserId,
    pub organization_id: OrganizationId,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    /// One-way flag, set by billing sync the first time a subscription
    /// reaches Trialing. Never unset afterwards.
    pub has_used_trial: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Owner account attached during organization provisioning.
#[derive(Clone, Debug)]
pub enum OwnerParams {
    /// Create a fresh user with role Owner in the new organization.
    New { email: String, name: String },
    /// Re-home an existing user onto the new organization as Owner.
    Existing(UserId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_role_round_trip() {
        for role in [
            UserRole::Owner,
            UserRole::Admin,
            UserRole::Staff,
            UserRole::Trainer,
        ] {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
        assert!("member".parse::<UserRole>().is_err());
    }
}
