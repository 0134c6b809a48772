//! Organization plan reference data.
//!
//! Plans are immutable, shared across tenants, and never tenant-scoped.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PlanId;

/// Billing interval for a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BillingInterval {
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        }
    }
}

impl FromStr for BillingInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "month" => Ok(BillingInterval::Month),
            "year" => Ok(BillingInterval::Year),
            _ => Err(format!("unknown billing interval: {}", s)),
        }
    }
}

/// Per-plan limits document (stored as JSON).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Maximum number of active members, None = unlimited.
    pub max_members: Option<i32>,
    /// Maximum number of staff users, None = unlimited.
    pub max_staff: Option<i32>,
}

/// Plan record.
#[derive(Clone, Debug)]
pub struct OrganizationPlan {
    pub id: PlanId,
    pub slug: String,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub limits: PlanLimits,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a plan (seed/reference data).
#[derive(Clone, Debug)]
pub struct CreatePlanParams {
    pub slug: String,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub limits: PlanLimits,
}
