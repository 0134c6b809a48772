//! Transactional orchestration core for repset.
//!
//! [`UnitOfWork`] exposes one method per multi-entity write. Each method
//! validates and defaults its command, then delegates to a single atomic
//! [`Store`] operation: either every effect commits or none do, and any
//! error propagates unchanged to the caller.
//!
//! The organization, subscription, membership, and member records form an
//! invariant-sharing cluster with no single aggregate root; the unit of work
//! is the only writer of the cross-entity facts (the member's derived
//! `is_active`, the organization's cached plan name). Nothing else mutates
//! them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use repset_storage::{
    CreateMembershipParams, MemberId, Membership, MembershipId, MembershipStatus, Organization,
    OrganizationId, PlanId, ProvisionOrganizationParams, ProvisionedOrganization, Store,
    StoreError, Subscription, SubscriptionEventParams, UpdateOrganizationSettingsParams, UserId,
};

pub mod entitlements;

pub use entitlements::{EntitlementService, LimitCheck, PlanLimitEntitlements, ResourceKind};

#[cfg(test)]
mod tests;

/// Authorization seam. Use cases call this *before* invoking [`UnitOfWork`];
/// the core assumes the check already passed and does not re-check it.
#[async_trait::async_trait]
pub trait PermissionService: Send + Sync {
    async fn can_perform(&self, actor: &UserId, action: &str, resource: &str) -> bool;
}

/// Caller-facing membership creation command.
///
/// Unset fields get defaults: status Active, start date now.
#[derive(Clone, Debug)]
pub struct CreateMembershipCommand {
    pub member_id: MemberId,
    pub plan_id: PlanId,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub price_paid_cents: i64,
    pub status: Option<MembershipStatus>,
}

/// Orchestrates multi-repository writes as atomic units.
pub struct UnitOfWork<S> {
    store: Arc<S>,
}

impl<S> UnitOfWork<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: Store> UnitOfWork<S> {
    /// Provision an organization with its subscription and owner user.
    ///
    /// Unset subscription terms default to a Trialing period ending 14 days
    /// from now. Either all rows are created or none are: a duplicate slug
    /// surfaces as `Conflict` with zero partial rows.
    pub async fn create_organization_with_owner(
        &self,
        params: ProvisionOrganizationParams,
    ) -> Result<ProvisionedOrganization, StoreError> {
        validate_slug(&params.organization.slug)?;
        if params.organization.name.trim().is_empty() {
            return Err(StoreError::Validation(
                "organization name must not be empty".to_string(),
            ));
        }
        validate_price(params.subscription.price_paid_cents)?;
        if let (Some(start), Some(end)) = (
            params.subscription.current_period_start,
            params.subscription.current_period_end,
        ) {
            validate_period(start, end)?;
        }

        let provisioned = self.store.provision_organization(&params).await?;
        info!(
            org_id = %provisioned.organization.id.0,
            slug = %provisioned.organization.slug,
            status = %provisioned.subscription.status,
            "organization provisioned"
        );
        Ok(provisioned)
    }

    /// Point the organization at a new plan.
    ///
    /// The cached plan name and the subscription's price are re-derived from
    /// the plan row inside the transaction; callers cannot supply them.
    pub async fn upgrade_organization_plan(
        &self,
        organization_id: &OrganizationId,
        plan_id: &PlanId,
    ) -> Result<Organization, StoreError> {
        let org = self
            .store
            .upgrade_organization_plan(organization_id, plan_id)
            .await?;
        info!(
            org_id = %org.id.0,
            plan = %org.plan_name,
            "organization plan upgraded"
        );
        Ok(org)
    }

    /// Conditionally update organization identity fields and/or its config
    /// document. Locale, timezone, and currency inside the config are
    /// mirrored onto the top-level columns.
    pub async fn update_organization_settings(
        &self,
        organization_id: &OrganizationId,
        params: UpdateOrganizationSettingsParams,
    ) -> Result<Organization, StoreError> {
        if let Some(name) = &params.name {
            if name.trim().is_empty() {
                return Err(StoreError::Validation(
                    "organization name must not be empty".to_string(),
                ));
            }
        }
        let org = self
            .store
            .update_organization_settings(organization_id, &params)
            .await?;
        info!(org_id = %org.id.0, "organization settings updated");
        Ok(org)
    }

    /// Create a membership and activate the owning member in the same
    /// transaction. Only Pending and Active are valid initial statuses.
    pub async fn create_membership_and_activate(
        &self,
        organization_id: &OrganizationId,
        command: CreateMembershipCommand,
    ) -> Result<Membership, StoreError> {
        let status = command.status.unwrap_or(MembershipStatus::Active);
        if status.is_terminal() {
            return Err(StoreError::Validation(format!(
                "initial membership status must be pending or active, got {}",
                status
            )));
        }
        validate_price(command.price_paid_cents)?;
        let start_date = command.start_date.unwrap_or_else(Utc::now);
        if let Some(end) = command.end_date {
            validate_period(start_date, end)?;
        }

        let membership = self
            .store
            .create_membership(
                organization_id,
                &CreateMembershipParams {
                    member_id: command.member_id,
                    plan_id: command.plan_id,
                    start_date,
                    end_date: command.end_date,
                    price_paid_cents: command.price_paid_cents,
                    status,
                },
            )
            .await?;
        info!(
            org_id = %organization_id.0,
            membership_id = %membership.id.0,
            member_id = %membership.member_id.0,
            status = %membership.status,
            "membership created"
        );
        Ok(membership)
    }

    /// Cancel a membership and recompute the member's `is_active` from the
    /// remaining Active memberships, all in one transaction.
    pub async fn cancel_membership_and_deactivate(
        &self,
        membership_id: &MembershipId,
        organization_id: &OrganizationId,
    ) -> Result<Membership, StoreError> {
        let membership = self
            .store
            .cancel_membership(organization_id, membership_id)
            .await?;
        info!(
            org_id = %organization_id.0,
            membership_id = %membership.id.0,
            "membership cancelled"
        );
        Ok(membership)
    }

    /// Soft-delete a membership and recompute the member's `is_active`.
    pub async fn delete_membership_and_deactivate(
        &self,
        membership_id: &MembershipId,
        organization_id: &OrganizationId,
    ) -> Result<(), StoreError> {
        self.store
            .delete_membership(organization_id, membership_id)
            .await?;
        info!(
            org_id = %organization_id.0,
            membership_id = %membership_id.0,
            "membership soft-deleted"
        );
        Ok(())
    }

    /// Clear a membership's soft-delete and recompute the member's
    /// `is_active` (an Active restored membership reactivates the member).
    pub async fn restore_membership_and_activate(
        &self,
        membership_id: &MembershipId,
        organization_id: &OrganizationId,
    ) -> Result<Membership, StoreError> {
        let membership = self
            .store
            .restore_membership(organization_id, membership_id)
            .await?;
        info!(
            org_id = %organization_id.0,
            membership_id = %membership.id.0,
            status = %membership.status,
            "membership restored"
        );
        Ok(membership)
    }

    /// Apply a normalized billing-provider event: upsert the subscription,
    /// mirror the referenced plan's name onto the organization, and stamp
    /// the owner's one-way trial flag on a Trialing status. Idempotent under
    /// redelivery.
    pub async fn sync_stripe_subscription_event(
        &self,
        event: &SubscriptionEventParams,
    ) -> Result<Subscription, StoreError> {
        validate_price(event.price_paid_cents)?;
        validate_period(event.current_period_start, event.current_period_end)?;

        let subscription = self.store.apply_subscription_event(event).await?;
        info!(
            org_id = %event.organization_id.0,
            subscription_id = %event.stripe_subscription_id,
            status = %subscription.status,
            "subscription event applied"
        );
        Ok(subscription)
    }
}

/// Slugs are lowercase URL-safe: `[a-z0-9-]`, no leading/trailing dash.
fn validate_slug(slug: &str) -> Result<(), StoreError> {
    let well_formed = !slug.is_empty()
        && slug.len() <= 64
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if well_formed {
        Ok(())
    } else {
        Err(StoreError::Validation(format!("invalid slug: {:?}", slug)))
    }
}

fn validate_price(price_cents: i64) -> Result<(), StoreError> {
    if price_cents < 0 {
        return Err(StoreError::Validation(format!(
            "price must not be negative, got {}",
            price_cents
        )));
    }
    Ok(())
}

fn validate_period(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), StoreError> {
    if end < start {
        return Err(StoreError::Validation(
            "period end precedes period start".to_string(),
        ));
    }
    Ok(())
}
