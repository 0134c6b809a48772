//! The Store trait that backends implement.

use crate::types::*;
use crate::StoreError;

/// The storage trait `repset-core` depends on.
///
/// All methods that act on tenant data are **scoped by organization**: the
/// backend appends the given [`OrganizationId`] as a mandatory predicate and
/// excludes soft-deleted rows from default reads. Plans are shared reference
/// data and are the only unscoped reads.
///
/// Methods that touch more than one entity are atomic: the backend either
/// applies every step or none of them.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Plans ──────────────────────────────────────────

    /// Create a plan (seed/reference data, returns generated ID).
    async fn create_plan(&self, params: &CreatePlanParams) -> Result<PlanId, StoreError>;

    /// Get plan by ID.
    async fn get_plan(&self, plan_id: &PlanId) -> Result<OrganizationPlan, StoreError>;

    /// Get plan by slug.
    async fn get_plan_by_slug(&self, slug: &str) -> Result<OrganizationPlan, StoreError>;

    /// List all plans.
    async fn list_plans(&self) -> Result<Vec<OrganizationPlan>, StoreError>;

    // ───────────────────────────────── Organizations ──────────────────────────────────────

    /// Atomically create an organization, its subscription, and its owner
    /// user (created or re-homed), then re-read the hydrated result.
    ///
    /// A duplicate slug is a `Conflict`; an unknown plan slug is a
    /// `Validation` error. Nothing is committed on failure.
    async fn provision_organization(
        &self,
        params: &ProvisionOrganizationParams,
    ) -> Result<ProvisionedOrganization, StoreError>;

    /// Get organization by ID (hydrated with config).
    async fn get_organization(&self, org_id: &OrganizationId)
        -> Result<Organization, StoreError>;

    /// Get organization by slug.
    async fn get_organization_by_slug(&self, slug: &str) -> Result<Organization, StoreError>;

    /// Conditionally update base fields and/or the config document, mirroring
    /// config locale/timezone/currency onto top-level columns. Returns the
    /// refreshed organization.
    async fn update_organization_settings(
        &self,
        org_id: &OrganizationId,
        params: &UpdateOrganizationSettingsParams,
    ) -> Result<Organization, StoreError>;

    /// Atomically point the organization at a new plan, re-deriving the
    /// cached plan name and the subscription price from the plan row.
    async fn upgrade_organization_plan(
        &self,
        org_id: &OrganizationId,
        plan_id: &PlanId,
    ) -> Result<Organization, StoreError>;

    // ───────────────────────────────── Subscriptions ──────────────────────────────────────

    /// Get the organization's subscription.
    async fn get_subscription(&self, org_id: &OrganizationId)
        -> Result<Subscription, StoreError>;

    /// Idempotent upsert from a normalized billing event: update-or-create
    /// the subscription, mirror the referenced plan's name onto the
    /// organization, and stamp the owner's one-way trial flag when the new
    /// status is Trialing.
    async fn apply_subscription_event(
        &self,
        event: &SubscriptionEventParams,
    ) -> Result<Subscription, StoreError>;

    // ───────────────────────────────────── Users ──────────────────────────────────────────

    /// Get a user within an organization.
    async fn get_user(
        &self,
        org_id: &OrganizationId,
        user_id: &UserId,
    ) -> Result<User, StoreError>;

    /// Get user by email (emails are globally unique).
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Count staff users in an organization (entitlement checks).
    async fn count_staff_users(&self, org_id: &OrganizationId) -> Result<i64, StoreError>;

    // ──────────────────────────────────── Members ─────────────────────────────────────────

    /// Create a member (returns generated ID). New members are inactive
    /// until a membership activates them.
    async fn create_member(
        &self,
        org_id: &OrganizationId,
        params: &CreateMemberParams,
    ) -> Result<MemberId, StoreError>;

    /// Get a member within an organization.
    async fn get_member(
        &self,
        org_id: &OrganizationId,
        member_id: &MemberId,
    ) -> Result<Member, StoreError>;

    /// List non-deleted members of an organization.
    async fn list_members(&self, org_id: &OrganizationId) -> Result<Vec<Member>, StoreError>;

    /// Count active members in an organization (entitlement checks).
    async fn count_active_members(&self, org_id: &OrganizationId) -> Result<i64, StoreError>;

    // ─────────────────────────────────── Memberships ──────────────────────────────────────

    /// Atomically create a membership and recompute the owning member's
    /// `is_active` in the same transaction.
    async fn create_membership(
        &self,
        org_id: &OrganizationId,
        params: &CreateMembershipParams,
    ) -> Result<Membership, StoreError>;

    /// Get a non-deleted membership within an organization.
    async fn get_membership(
        &self,
        org_id: &OrganizationId,
        membership_id: &MembershipId,
    ) -> Result<Membership, StoreError>;

    /// List a member's memberships, optionally including soft-deleted rows.
    async fn list_memberships_for_member(
        &self,
        org_id: &OrganizationId,
        member_id: &MemberId,
        include_deleted: bool,
    ) -> Result<Vec<Membership>, StoreError>;

    /// Atomically set the membership to Cancelled and recompute the member's
    /// `is_active` from the remaining non-deleted Active memberships.
    /// Cancelling from a terminal status is a `Conflict`.
    async fn cancel_membership(
        &self,
        org_id: &OrganizationId,
        membership_id: &MembershipId,
    ) -> Result<Membership, StoreError>;

    /// Atomically soft-delete the membership and recompute the member's
    /// `is_active` from the remaining non-deleted Active memberships.
    async fn delete_membership(
        &self,
        org_id: &OrganizationId,
        membership_id: &MembershipId,
    ) -> Result<(), StoreError>;

    /// Atomically clear the membership's soft-delete and recompute the
    /// member's `is_active`. Restoring a membership that isn't soft-deleted
    /// is a `Conflict`.
    async fn restore_membership(
        &self,
        org_id: &OrganizationId,
        membership_id: &MembershipId,
    ) -> Result<Membership, StoreError>;
}
