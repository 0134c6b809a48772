//! Plan-limit entitlement checks.

use std::sync::Arc;

use repset_storage::{OrganizationId, Store, StoreError};

/// Resource kinds a plan limit can apply to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Members,
    Staff,
}

/// Outcome of a limit check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitCheck {
    Allowed,
    Denied { limit: i32, current: i64 },
}

impl LimitCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LimitCheck::Allowed)
    }
}

/// Plan-quota seam. Use cases consult this *before* invoking
/// [`crate::UnitOfWork`], outside any transaction; a denial must prevent the
/// unit-of-work call entirely.
#[async_trait::async_trait]
pub trait EntitlementService: Send + Sync {
    async fn check_limit(
        &self,
        organization_id: &OrganizationId,
        resource: ResourceKind,
    ) -> Result<LimitCheck, StoreError>;
}

/// Default implementation backed by the organization plan's limits document.
/// A missing limit means unlimited.
pub struct PlanLimitEntitlements<S> {
    store: Arc<S>,
}

impl<S> PlanLimitEntitlements<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl<S: Store> EntitlementService for PlanLimitEntitlements<S> {
    async fn check_limit(
        &self,
        organization_id: &OrganizationId,
        resource: ResourceKind,
    ) -> Result<LimitCheck, StoreError> {
        let org = self.store.get_organization(organization_id).await?;
        let plan = self.store.get_plan(&org.plan_id).await?;

        let (limit, current) = match resource {
            ResourceKind::Members => (
                plan.limits.max_members,
                self.store.count_active_members(organization_id).await?,
            ),
            ResourceKind::Staff => (
                plan.limits.max_staff,
                self.store.count_staff_users(organization_id).await?,
            ),
        };

        Ok(match limit {
            Some(limit) if current >= i64::from(limit) => LimitCheck::Denied { limit, current },
            _ => LimitCheck::Allowed,
        })
    }
}
