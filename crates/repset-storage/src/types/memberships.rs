//! Membership types and the status state machine.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::{MemberId, MembershipId, OrganizationId, PlanId};

/// Membership status.
///
/// Explicit transitions: `Pending -> Active`, `Pending -> Cancelled`,
/// `Active -> {Expired, Cancelled}`. Time-driven transitions (activation on
/// start date, expiry on end date) belong to an external periodic process.
/// Restore does not change status, it only clears the soft-delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MembershipStatus {
    Pending,
    Active,
    Expired,
    Cancelled,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Pending => "pending",
            MembershipStatus::Active => "active",
            MembershipStatus::Expired => "expired",
            MembershipStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a membership in this status grants the member access.
    pub fn grants_access(&self) -> bool {
        matches!(self, MembershipStatus::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MembershipStatus::Expired | MembershipStatus::Cancelled)
    }

    /// Whether an explicit transition to `next` is allowed.
    pub fn can_transition_to(&self, next: MembershipStatus) -> bool {
        matches!(
            (self, next),
            (MembershipStatus::Pending, MembershipStatus::Active)
                | (MembershipStatus::Pending, MembershipStatus::Cancelled)
                | (MembershipStatus::Active, MembershipStatus::Expired)
                | (MembershipStatus::Active, MembershipStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MembershipStatus::Pending),
            "active" => Ok(MembershipStatus::Active),
            "expired" => Ok(MembershipStatus::Expired),
            "cancelled" => Ok(MembershipStatus::Cancelled),
            _ => Err(format!("unknown membership status: {}", s)),
        }
    }
}

/// Membership record: a time-bounded grant of one member's access under one
/// plan, within one organization. A member may accumulate several over time.
#[derive(Clone, Debug)]
pub struct Membership {
    pub id: MembershipId,
    pub organization_id: OrganizationId,
    pub member_id: MemberId,
    pub plan_id: PlanId,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub price_paid_cents: i64,
    pub status: MembershipStatus,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a membership (fields already defaulted by core).
#[derive(Clone, Debug)]
pub struct CreateMembershipParams {
    pub member_id: MemberId,
    pub plan_id: PlanId,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub price_paid_cents: i64,
    pub status: MembershipStatus,
}
