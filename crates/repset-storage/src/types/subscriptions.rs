//! Subscription types (exactly one per organization).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OrganizationId, SubscriptionId};

/// Billing subscription status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Trial period (no payment required yet).
    Trialing,
    /// Active subscription.
    Active,
    /// Payment failed, still in grace period.
    PastDue,
    /// Cancelled (scheduled to end or ended).
    Cancelled,
    /// Payment failed, subscription suspended.
    Unpaid,
    /// Initial payment incomplete.
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            // Stripe spells it with one l
            "cancelled" | "canceled" => Ok(SubscriptionStatus::Cancelled),
            "unpaid" => Ok(SubscriptionStatus::Unpaid),
            "incomplete" => Ok(SubscriptionStatus::Incomplete),
            _ => Err(format!("unknown subscription status: {}", s)),
        }
    }
}

/// Subscription record (1:1 with organization; `organization_id` is unique).
#[derive(Clone, Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub organization_id: OrganizationId,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub status: SubscriptionStatus,
    pub price_paid_cents: i64,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Default trial length applied when provisioning omits a period end.
pub const DEFAULT_TRIAL_DAYS: i64 = 14;

/// Initial subscription terms supplied at provisioning time.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionTerms {
    pub status: Option<SubscriptionStatus>,
    pub price_paid_cents: i64,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl SubscriptionTerms {
    /// Fill unset fields: status Trialing, period starting at `now` and
    /// ending `now` + [`DEFAULT_TRIAL_DAYS`].
    pub fn resolve(&self, now: DateTime<Utc>) -> (SubscriptionStatus, DateTime<Utc>, DateTime<Utc>) {
        let status = self.status.unwrap_or(SubscriptionStatus::Trialing);
        let start = self.current_period_start.unwrap_or(now);
        let end = self
            .current_period_end
            .unwrap_or(now + chrono::Duration::days(DEFAULT_TRIAL_DAYS));
        (status, start, end)
    }
}
