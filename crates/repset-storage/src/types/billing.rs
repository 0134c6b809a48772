//! Normalized billing-provider event payload.

use chrono::{DateTime, Utc};

use super::{OrganizationId, PlanId, SubscriptionStatus, UserId};

/// Normalized subscription event, applied idempotently by
/// `Store::apply_subscription_event`. Redelivering the same payload must be
/// a no-op on the final state.
#[derive(Clone, Debug)]
pub struct SubscriptionEventParams {
    pub organization_id: OrganizationId,
    pub organization_plan_id: PlanId,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub status: SubscriptionStatus,
    pub price_paid_cents: i64,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    /// Owner whose `has_used_trial` flag is stamped when `status` is Trialing.
    pub user_id: Option<UserId>,
}
