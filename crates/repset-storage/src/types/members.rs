//! Member types.
//!
//! A member is a person tracked by an organization, not a login-capable user.

use chrono::{DateTime, Utc};

use super::{MemberId, OrganizationId};

/// Member record.
#[derive(Clone, Debug)]
pub struct Member {
    pub id: MemberId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub email: Option<String>,
    /// Derived: true iff the member has at least one non-deleted membership
    /// with status Active. Only the unit of work's cascades write this.
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a member.
#[derive(Clone, Debug)]
pub struct CreateMemberParams {
    pub name: String,
    pub email: Option<String>,
}
