//! In-memory [`Store`] implementation.
//!
//! Suitable for development, tests, and single-process demos. Each trait
//! method holds the state lock for its whole duration and performs every
//! fallible check before the first write, so an operation either applies all
//! of its effects or none of them, matching the transactional backends.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use repset_storage::{
    CreateMemberParams, CreateMembershipParams, CreatePlanParams, Member, MemberId, Membership,
    MembershipId, MembershipStatus, Organization, OrganizationId, OrganizationPlan, OwnerParams,
    PlanId, ProvisionOrganizationParams, ProvisionedOrganization, Store, StoreError, Subscription,
    SubscriptionEventParams, SubscriptionId, SubscriptionStatus, UpdateOrganizationSettingsParams,
    User, UserId, UserRole,
};

#[derive(Clone, Default)]
struct State {
    plans: HashMap<Uuid, OrganizationPlan>,
    organizations: HashMap<Uuid, Organization>,
    /// Keyed by organization id (1:1).
    subscriptions: HashMap<Uuid, Subscription>,
    users: HashMap<Uuid, User>,
    members: HashMap<Uuid, Member>,
    memberships: HashMap<Uuid, Membership>,
}

pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Recompute the derived `Member.is_active` flag from the member's
/// non-deleted Active memberships.
fn recompute_member_active(
    state: &mut State,
    org_id: &OrganizationId,
    member_id: &MemberId,
    now: DateTime<Utc>,
) {
    let active = state.memberships.values().any(|ms| {
        ms.member_id == *member_id
            && ms.organization_id == *org_id
            && ms.deleted_at.is_none()
            && ms.status.grants_access()
    });
    if let Some(member) = state.members.get_mut(&member_id.0) {
        if member.is_active != active {
            member.is_active = active;
            member.updated_at = now;
        }
    }
}

fn live_org<'a>(state: &'a State, org_id: &OrganizationId) -> Result<&'a Organization, StoreError> {
    state
        .organizations
        .get(&org_id.0)
        .filter(|o| o.deleted_at.is_none())
        .ok_or(StoreError::NotFound)
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    // ───────────────────────────── Plans ─────────────────────────────

    async fn create_plan(&self, params: &CreatePlanParams) -> Result<PlanId, StoreError> {
        let mut state = self.state();
        if state.plans.values().any(|p| p.slug == params.slug) {
            return Err(StoreError::Conflict(format!(
                "plan slug already exists: {}",
                params.slug
            )));
        }
        let id = Uuid::now_v7();
        state.plans.insert(
            id,
            OrganizationPlan {
                id: PlanId(id),
                slug: params.slug.clone(),
                name: params.name.clone(),
                price_cents: params.price_cents,
                currency: params.currency.clone(),
                interval: params.interval,
                limits: params.limits.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(PlanId(id))
    }

    async fn get_plan(&self, plan_id: &PlanId) -> Result<OrganizationPlan, StoreError> {
        self.state()
            .plans
            .get(&plan_id.0)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_plan_by_slug(&self, slug: &str) -> Result<OrganizationPlan, StoreError> {
        self.state()
            .plans
            .values()
            .find(|p| p.slug == slug)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_plans(&self) -> Result<Vec<OrganizationPlan>, StoreError> {
        let mut plans: Vec<_> = self.state().plans.values().cloned().collect();
        plans.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(plans)
    }

    // ───────────────────────────── Organizations ─────────────────────────────

    async fn provision_organization(
        &self,
        params: &ProvisionOrganizationParams,
    ) -> Result<ProvisionedOrganization, StoreError> {
        let mut state = self.state();
        let now = Utc::now();

        // All checks happen before the first write so a failure leaves no
        // partial rows behind.
        if state
            .organizations
            .values()
            .any(|o| o.slug == params.organization.slug)
        {
            return Err(StoreError::Conflict(format!(
                "organization slug already exists: {}",
                params.organization.slug
            )));
        }
        let plan = state
            .plans
            .values()
            .find(|p| p.slug == params.organization.plan_slug)
            .cloned()
            .ok_or_else(|| {
                StoreError::Validation(format!(
                    "unknown plan slug: {}",
                    params.organization.plan_slug
                ))
            })?;
        match &params.owner {
            OwnerParams::New { email, .. } => {
                if state.users.values().any(|u| u.email == *email) {
                    return Err(StoreError::Conflict(format!(
                        "user email already exists: {}",
                        email
                    )));
                }
            }
            OwnerParams::Existing(user_id) => {
                if !state.users.contains_key(&user_id.0) {
                    return Err(StoreError::NotFound);
                }
            }
        }

        let org_id = OrganizationId(Uuid::now_v7());
        let config = params.organization.config.clone().unwrap_or_default();
        let organization = Organization {
            id: org_id.clone(),
            slug: params.organization.slug.clone(),
            name: params.organization.name.clone(),
            image: None,
            is_active: true,
            plan_name: plan.name.clone(),
            plan_id: plan.id.clone(),
            locale: config.locale.clone(),
            timezone: config.timezone.clone(),
            currency: config.currency.clone(),
            config,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };

        let (status, period_start, period_end) = params.subscription.resolve(now);
        let subscription = Subscription {
            id: SubscriptionId(Uuid::now_v7()),
            organization_id: org_id.clone(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            status,
            price_paid_cents: params.subscription.price_paid_cents,
            current_period_start: period_start,
            current_period_end: period_end,
            cancel_at_period_end: false,
            created_at: now,
            updated_at: now,
        };

        let owner = match &params.owner {
            OwnerParams::New { email, name } => {
                let user = User {
                    id: UserId(Uuid::now_v7()),
                    organization_id: org_id.clone(),
                    email: email.clone(),
                    name: name.clone(),
                    role: UserRole::Owner,
                    has_used_trial: false,
                    created_at: now,
                    updated_at: now,
                };
                state.users.insert(user.id.0, user.clone());
                user
            }
            OwnerParams::Existing(user_id) => {
                // Checked above, the entry is present.
                let user = state
                    .users
                    .get_mut(&user_id.0)
                    .ok_or(StoreError::NotFound)?;
                user.organization_id = org_id.clone();
                user.role = UserRole::Owner;
                user.updated_at = now;
                user.clone()
            }
        };

        state
            .organizations
            .insert(org_id.0, organization.clone());
        state.subscriptions.insert(org_id.0, subscription.clone());

        Ok(ProvisionedOrganization {
            organization,
            subscription,
            owner,
        })
    }

    async fn get_organization(
        &self,
        org_id: &OrganizationId,
    ) -> Result<Organization, StoreError> {
        live_org(&self.state(), org_id).cloned()
    }

    async fn get_organization_by_slug(&self, slug: &str) -> Result<Organization, StoreError> {
        self.state()
            .organizations
            .values()
            .find(|o| o.slug == slug && o.deleted_at.is_none())
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_organization_settings(
        &self,
        org_id: &OrganizationId,
        params: &UpdateOrganizationSettingsParams,
    ) -> Result<Organization, StoreError> {
        let mut state = self.state();
        let now = Utc::now();
        let org = state
            .organizations
            .get_mut(&org_id.0)
            .filter(|o| o.deleted_at.is_none())
            .ok_or(StoreError::NotFound)?;

        if let Some(name) = &params.name {
            org.name = name.clone();
        }
        if let Some(image) = &params.image {
            org.image = Some(image.clone());
        }
        if let Some(config) = &params.config {
            org.locale = config.locale.clone();
            org.timezone = config.timezone.clone();
            org.currency = config.currency.clone();
            org.config = config.clone();
        }
        org.updated_at = now;
        Ok(org.clone())
    }

    async fn upgrade_organization_plan(
        &self,
        org_id: &OrganizationId,
        plan_id: &PlanId,
    ) -> Result<Organization, StoreError> {
        let mut state = self.state();
        let now = Utc::now();
        let plan = state
            .plans
            .get(&plan_id.0)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        live_org(&state, org_id)?;
        if !state.subscriptions.contains_key(&org_id.0) {
            return Err(StoreError::NotFound);
        }

        let org = state
            .organizations
            .get_mut(&org_id.0)
            .ok_or(StoreError::NotFound)?;
        org.plan_id = plan.id.clone();
        org.plan_name = plan.name.clone();
        org.updated_at = now;
        let refreshed = org.clone();

        let sub = state
            .subscriptions
            .get_mut(&org_id.0)
            .ok_or(StoreError::NotFound)?;
        sub.price_paid_cents = plan.price_cents;
        sub.updated_at = now;

        Ok(refreshed)
    }

    // ───────────────────────────── Subscriptions ─────────────────────────────

    async fn get_subscription(
        &self,
        org_id: &OrganizationId,
    ) -> Result<Subscription, StoreError> {
        self.state()
            .subscriptions
            .get(&org_id.0)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn apply_subscription_event(
        &self,
        event: &SubscriptionEventParams,
    ) -> Result<Subscription, StoreError> {
        let mut state = self.state();
        let now = Utc::now();

        live_org(&state, &event.organization_id)?;
        let plan = state
            .plans
            .get(&event.organization_plan_id.0)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        if let Some(user_id) = &event.user_id {
            state
                .users
                .get(&user_id.0)
                .filter(|u| u.organization_id == event.organization_id)
                .ok_or(StoreError::NotFound)?;
        }

        let org_key = event.organization_id.0;
        let subscription = match state.subscriptions.get_mut(&org_key) {
            Some(sub) => {
                sub.stripe_customer_id = Some(event.stripe_customer_id.clone());
                sub.stripe_subscription_id = Some(event.stripe_subscription_id.clone());
                sub.status = event.status;
                sub.price_paid_cents = event.price_paid_cents;
                sub.current_period_start = event.current_period_start;
                sub.current_period_end = event.current_period_end;
                sub.cancel_at_period_end = event.cancel_at_period_end;
                sub.updated_at = now;
                sub.clone()
            }
            None => {
                let sub = Subscription {
                    id: SubscriptionId(Uuid::now_v7()),
                    organization_id: event.organization_id.clone(),
                    stripe_customer_id: Some(event.stripe_customer_id.clone()),
                    stripe_subscription_id: Some(event.stripe_subscription_id.clone()),
                    status: event.status,
                    price_paid_cents: event.price_paid_cents,
                    current_period_start: event.current_period_start,
                    current_period_end: event.current_period_end,
                    cancel_at_period_end: event.cancel_at_period_end,
                    created_at: now,
                    updated_at: now,
                };
                state.subscriptions.insert(org_key, sub.clone());
                sub
            }
        };

        // Keep the cached plan name consistent with the foreign key.
        if let Some(org) = state.organizations.get_mut(&org_key) {
            org.plan_id = plan.id.clone();
            org.plan_name = plan.name.clone();
            org.updated_at = now;
        }

        // One-way trial flag.
        if event.status == SubscriptionStatus::Trialing {
            if let Some(user_id) = &event.user_id {
                if let Some(user) = state.users.get_mut(&user_id.0) {
                    if !user.has_used_trial {
                        user.has_used_trial = true;
                        user.updated_at = now;
                    }
                }
            }
        }

        Ok(subscription)
    }

    // ───────────────────────────── Users ─────────────────────────────

    async fn get_user(
        &self,
        org_id: &OrganizationId,
        user_id: &UserId,
    ) -> Result<User, StoreError> {
        self.state()
            .users
            .get(&user_id.0)
            .filter(|u| u.organization_id == *org_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.state()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn count_staff_users(&self, org_id: &OrganizationId) -> Result<i64, StoreError> {
        Ok(self
            .state()
            .users
            .values()
            .filter(|u| u.organization_id == *org_id)
            .count() as i64)
    }

    // ───────────────────────────── Members ─────────────────────────────

    async fn create_member(
        &self,
        org_id: &OrganizationId,
        params: &CreateMemberParams,
    ) -> Result<MemberId, StoreError> {
        let mut state = self.state();
        let now = Utc::now();
        live_org(&state, org_id)?;

        let id = MemberId(Uuid::now_v7());
        state.members.insert(
            id.0,
            Member {
                id: id.clone(),
                organization_id: org_id.clone(),
                name: params.name.clone(),
                email: params.email.clone(),
                is_active: false,
                deleted_at: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn get_member(
        &self,
        org_id: &OrganizationId,
        member_id: &MemberId,
    ) -> Result<Member, StoreError> {
        self.state()
            .members
            .get(&member_id.0)
            .filter(|m| m.organization_id == *org_id && m.deleted_at.is_none())
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_members(&self, org_id: &OrganizationId) -> Result<Vec<Member>, StoreError> {
        let mut members: Vec<_> = self
            .state()
            .members
            .values()
            .filter(|m| m.organization_id == *org_id && m.deleted_at.is_none())
            .cloned()
            .collect();
        members.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(members)
    }

    async fn count_active_members(&self, org_id: &OrganizationId) -> Result<i64, StoreError> {
        Ok(self
            .state()
            .members
            .values()
            .filter(|m| m.organization_id == *org_id && m.deleted_at.is_none() && m.is_active)
            .count() as i64)
    }

    // ───────────────────────────── Memberships ─────────────────────────────

    async fn create_membership(
        &self,
        org_id: &OrganizationId,
        params: &CreateMembershipParams,
    ) -> Result<Membership, StoreError> {
        let mut state = self.state();
        let now = Utc::now();

        state
            .members
            .get(&params.member_id.0)
            .filter(|m| m.organization_id == *org_id && m.deleted_at.is_none())
            .ok_or(StoreError::NotFound)?;
        if !state.plans.contains_key(&params.plan_id.0) {
            return Err(StoreError::NotFound);
        }

        let membership = Membership {
            id: MembershipId(Uuid::now_v7()),
            organization_id: org_id.clone(),
            member_id: params.member_id.clone(),
            plan_id: params.plan_id.clone(),
            start_date: params.start_date,
            end_date: params.end_date,
            price_paid_cents: params.price_paid_cents,
            status: params.status,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        state.memberships.insert(membership.id.0, membership.clone());
        recompute_member_active(&mut state, org_id, &params.member_id, now);
        Ok(membership)
    }

    async fn get_membership(
        &self,
        org_id: &OrganizationId,
        membership_id: &MembershipId,
    ) -> Result<Membership, StoreError> {
        self.state()
            .memberships
            .get(&membership_id.0)
            .filter(|ms| ms.organization_id == *org_id && ms.deleted_at.is_none())
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_memberships_for_member(
        &self,
        org_id: &OrganizationId,
        member_id: &MemberId,
        include_deleted: bool,
    ) -> Result<Vec<Membership>, StoreError> {
        let mut memberships: Vec<_> = self
            .state()
            .memberships
            .values()
            .filter(|ms| {
                ms.organization_id == *org_id
                    && ms.member_id == *member_id
                    && (include_deleted || ms.deleted_at.is_none())
            })
            .cloned()
            .collect();
        memberships.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(memberships)
    }

    async fn cancel_membership(
        &self,
        org_id: &OrganizationId,
        membership_id: &MembershipId,
    ) -> Result<Membership, StoreError> {
        let mut state = self.state();
        let now = Utc::now();

        let membership = state
            .memberships
            .get_mut(&membership_id.0)
            .filter(|ms| ms.organization_id == *org_id && ms.deleted_at.is_none())
            .ok_or(StoreError::NotFound)?;
        if !membership
            .status
            .can_transition_to(MembershipStatus::Cancelled)
        {
            return Err(StoreError::Conflict(format!(
                "cannot cancel {} membership",
                membership.status
            )));
        }
        membership.status = MembershipStatus::Cancelled;
        membership.updated_at = now;
        let member_id = membership.member_id.clone();
        let cancelled = membership.clone();

        recompute_member_active(&mut state, org_id, &member_id, now);
        Ok(cancelled)
    }

    async fn delete_membership(
        &self,
        org_id: &OrganizationId,
        membership_id: &MembershipId,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let now = Utc::now();

        let membership = state
            .memberships
            .get_mut(&membership_id.0)
            .filter(|ms| ms.organization_id == *org_id && ms.deleted_at.is_none())
            .ok_or(StoreError::NotFound)?;
        membership.deleted_at = Some(now);
        membership.updated_at = now;
        let member_id = membership.member_id.clone();

        recompute_member_active(&mut state, org_id, &member_id, now);
        Ok(())
    }

    async fn restore_membership(
        &self,
        org_id: &OrganizationId,
        membership_id: &MembershipId,
    ) -> Result<Membership, StoreError> {
        let mut state = self.state();
        let now = Utc::now();

        let membership = state
            .memberships
            .get_mut(&membership_id.0)
            .filter(|ms| ms.organization_id == *org_id)
            .ok_or(StoreError::NotFound)?;
        if membership.deleted_at.is_none() {
            return Err(StoreError::Conflict(
                "membership is not deleted".to_string(),
            ));
        }
        membership.deleted_at = None;
        membership.updated_at = now;
        let member_id = membership.member_id.clone();
        let restored = membership.clone();

        recompute_member_active(&mut state, org_id, &member_id, now);
        Ok(restored)
    }
}
