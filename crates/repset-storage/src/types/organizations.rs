//! Organization (tenant root) types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OrganizationId, OwnerParams, PlanId, Subscription, SubscriptionTerms, User};

/// Organization record (tenant root).
#[derive(Clone, Debug)]
pub struct Organization {
    pub id: OrganizationId,
    /// Globally unique, URL-safe.
    pub slug: String,
    pub name: String,
    pub image: Option<String>,
    pub is_active: bool,
    /// Cached copy of the current plan's name; `plan_id` is the source of
    /// truth and every write path re-derives this from it.
    pub plan_name: String,
    pub plan_id: PlanId,
    /// Mirrored from `config` onto top-level columns for query convenience.
    pub locale: String,
    pub timezone: String,
    pub currency: String,
    pub config: OrgConfig,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Embedded per-organization configuration document (stored as JSON).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrgConfig {
    pub locale: String,
    pub timezone: String,
    pub currency: String,
    pub billing_enabled: bool,
    pub booking_enabled: bool,
    pub access_control_enabled: bool,
    pub notifications_enabled: bool,
    /// Feature flags enabled for this tenant.
    pub features: Vec<String>,
}

impl Default for OrgConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            timezone: "UTC".to_string(),
            currency: "USD".to_string(),
            billing_enabled: true,
            booking_enabled: true,
            access_control_enabled: false,
            notifications_enabled: true,
            features: Vec::new(),
        }
    }
}

/// Parameters for the organization row created during provisioning.
#[derive(Clone, Debug)]
pub struct CreateOrganizationParams {
    pub name: String,
    pub slug: String,
    /// Resolved to a plan row inside the provisioning transaction.
    pub plan_slug: String,
    pub config: Option<OrgConfig>,
}

/// Partial update of organization identity and configuration.
///
/// `None` fields are left untouched. When `config` is set, its
/// locale/timezone/currency are mirrored onto the top-level columns.
#[derive(Clone, Debug, Default)]
pub struct UpdateOrganizationSettingsParams {
    pub name: Option<String>,
    pub image: Option<String>,
    pub config: Option<OrgConfig>,
}

/// Atomic provisioning bundle: organization + subscription + owner user.
#[derive(Clone, Debug)]
pub struct ProvisionOrganizationParams {
    pub organization: CreateOrganizationParams,
    pub subscription: SubscriptionTerms,
    pub owner: OwnerParams,
}

/// Fully hydrated result of provisioning.
#[derive(Clone, Debug)]
pub struct ProvisionedOrganization {
    pub organization: Organization,
    pub subscription: Subscription,
    pub owner: User,
}
