//! Strongly-typed identifiers (avoid mixing strings/UUIDs arbitrarily).

use uuid::Uuid;

/// Organization (tenant) identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrganizationId(pub Uuid);

/// Organization plan identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlanId(pub Uuid);

/// Subscription identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub Uuid);

/// Member identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberId(pub Uuid);

/// Membership identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MembershipId(pub Uuid);

/// User (staff/owner account) identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);
