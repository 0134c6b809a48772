use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use repset_storage::{
    BillingInterval, CreateMemberParams, CreateOrganizationParams, CreatePlanParams, MemberId,
    MembershipStatus, OrganizationId, OwnerParams, PlanId, PlanLimits,
    ProvisionOrganizationParams, ProvisionedOrganization, Store, StoreError,
    SubscriptionEventParams, SubscriptionStatus, SubscriptionTerms,
    UpdateOrganizationSettingsParams, UserId, DEFAULT_TRIAL_DAYS,
};
use repset_store_memory::MemoryStore;

use crate::{
    CreateMembershipCommand, EntitlementService, LimitCheck, PlanLimitEntitlements, ResourceKind,
    UnitOfWork,
};

async fn seed_plan(
    store: &MemoryStore,
    slug: &str,
    name: &str,
    price_cents: i64,
    max_members: Option<i32>,
) -> PlanId {
    store
        .create_plan(&CreatePlanParams {
            slug: slug.to_string(),
            name: name.to_string(),
            price_cents,
            currency: "USD".to_string(),
            interval: BillingInterval::Month,
            limits: PlanLimits {
                max_members,
                max_staff: None,
            },
        })
        .await
        .unwrap()
}

fn provision_params(slug: &str, plan_slug: &str, owner_email: &str) -> ProvisionOrganizationParams {
    ProvisionOrganizationParams {
        organization: CreateOrganizationParams {
            name: slug.to_string(),
            slug: slug.to_string(),
            plan_slug: plan_slug.to_string(),
            config: None,
        },
        subscription: SubscriptionTerms::default(),
        owner: OwnerParams::New {
            email: owner_email.to_string(),
            name: "Owner".to_string(),
        },
    }
}

/// Fresh store + unit of work with a `free-trial` plan seeded.
async fn setup() -> (Arc<MemoryStore>, UnitOfWork<MemoryStore>, PlanId) {
    let store = Arc::new(MemoryStore::new());
    let plan_id = seed_plan(&store, "free-trial", "Free Trial", 0, None).await;
    let uow = UnitOfWork::new(store.clone());
    (store, uow, plan_id)
}

async fn provision_org(uow: &UnitOfWork<MemoryStore>, slug: &str) -> ProvisionedOrganization {
    uow.create_organization_with_owner(provision_params(
        slug,
        "free-trial",
        &format!("owner@{}.test", slug),
    ))
    .await
    .unwrap()
}

async fn member_with_active_membership(
    uow: &UnitOfWork<MemoryStore>,
    org_id: &OrganizationId,
    plan_id: &PlanId,
) -> (MemberId, repset_storage::Membership) {
    let member_id = uow
        .store()
        .create_member(
            org_id,
            &CreateMemberParams {
                name: "Jo Lifts".to_string(),
                email: None,
            },
        )
        .await
        .unwrap();
    let membership = uow
        .create_membership_and_activate(
            org_id,
            CreateMembershipCommand {
                member_id: member_id.clone(),
                plan_id: plan_id.clone(),
                start_date: None,
                end_date: None,
                price_paid_cents: 4900,
                status: Some(MembershipStatus::Active),
            },
        )
        .await
        .unwrap();
    (member_id, membership)
}

fn sub_event(
    org_id: &OrganizationId,
    plan_id: &PlanId,
    status: SubscriptionStatus,
    user_id: Option<UserId>,
) -> SubscriptionEventParams {
    let now = Utc::now();
    SubscriptionEventParams {
        organization_id: org_id.clone(),
        organization_plan_id: plan_id.clone(),
        stripe_customer_id: "cus_123".to_string(),
        stripe_subscription_id: "sub_123".to_string(),
        status,
        price_paid_cents: 9900,
        current_period_start: now,
        current_period_end: now + Duration::days(30),
        cancel_at_period_end: false,
        user_id,
    }
}

// ───────────────────────────── Provisioning ─────────────────────────────

#[tokio::test]
async fn test_provision_creates_org_subscription_and_owner() {
    let (_, uow, _) = setup().await;

    let provisioned = uow
        .create_organization_with_owner(provision_params(
            "acme-gym",
            "free-trial",
            "owner@acme.test",
        ))
        .await
        .unwrap();

    assert!(provisioned.organization.is_active);
    assert_eq!(provisioned.organization.slug, "acme-gym");
    assert_eq!(provisioned.organization.plan_name, "Free Trial");
    assert_eq!(
        provisioned.subscription.status,
        SubscriptionStatus::Trialing
    );
    assert_eq!(
        provisioned.subscription.current_period_end,
        provisioned.subscription.current_period_start + Duration::days(DEFAULT_TRIAL_DAYS)
    );
    assert_eq!(provisioned.owner.role, repset_storage::UserRole::Owner);
    assert_eq!(
        provisioned.owner.organization_id,
        provisioned.organization.id
    );
}

#[tokio::test]
async fn test_provision_duplicate_slug_conflict_leaves_no_orphans() {
    let (store, uow, _) = setup().await;

    uow.create_organization_with_owner(provision_params(
        "acme-gym",
        "free-trial",
        "first@acme.test",
    ))
    .await
    .unwrap();

    let err = uow
        .create_organization_with_owner(provision_params(
            "acme-gym",
            "free-trial",
            "second@acme.test",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    // Exactly one committed organization, and no orphaned owner user.
    assert!(store.get_organization_by_slug("acme-gym").await.is_ok());
    assert!(matches!(
        store.get_user_by_email("second@acme.test").await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn test_provision_rejects_malformed_slug() {
    let (_, uow, _) = setup().await;
    let err = uow
        .create_organization_with_owner(provision_params(
            "Acme Gym",
            "free-trial",
            "owner@acme.test",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn test_provision_unknown_plan_slug_is_validation_error() {
    let (_, uow, _) = setup().await;
    let err = uow
        .create_organization_with_owner(provision_params(
            "acme-gym",
            "no-such-plan",
            "owner@acme.test",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn test_provision_attaches_existing_owner() {
    let (store, uow, _) = setup().await;

    let first = provision_org(&uow, "first-gym").await;
    let owner_id = first.owner.id.clone();

    let second = uow
        .create_organization_with_owner(ProvisionOrganizationParams {
            owner: OwnerParams::Existing(owner_id.clone()),
            ..provision_params("second-gym", "free-trial", "ignored@x.test")
        })
        .await
        .unwrap();

    assert_eq!(second.owner.id, owner_id);
    assert_eq!(second.owner.organization_id, second.organization.id);
    // The user is now scoped to the new organization.
    assert!(store
        .get_user(&second.organization.id, &owner_id)
        .await
        .is_ok());
    assert!(matches!(
        store.get_user(&first.organization.id, &owner_id).await,
        Err(StoreError::NotFound)
    ));
}

// ─────────────────────────── Membership cascades ───────────────────────────

#[tokio::test]
async fn test_create_membership_activates_member() {
    let (store, uow, plan_id) = setup().await;
    let org_id = provision_org(&uow, "acme-gym").await.organization.id;

    let (member_id, _) = member_with_active_membership(&uow, &org_id, &plan_id).await;

    let member = store.get_member(&org_id, &member_id).await.unwrap();
    assert!(member.is_active);
    let memberships = store
        .list_memberships_for_member(&org_id, &member_id, false)
        .await
        .unwrap();
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].status, MembershipStatus::Active);
}

#[tokio::test]
async fn test_pending_membership_does_not_activate_member() {
    let (store, uow, plan_id) = setup().await;
    let org_id = provision_org(&uow, "acme-gym").await.organization.id;

    let member_id = store
        .create_member(
            &org_id,
            &CreateMemberParams {
                name: "Jo".to_string(),
                email: None,
            },
        )
        .await
        .unwrap();
    uow.create_membership_and_activate(
        &org_id,
        CreateMembershipCommand {
            member_id: member_id.clone(),
            plan_id,
            start_date: Some(Utc::now() + Duration::days(7)),
            end_date: None,
            price_paid_cents: 0,
            status: Some(MembershipStatus::Pending),
        },
    )
    .await
    .unwrap();

    // is_active mirrors "has an Active membership", not "has any membership".
    assert!(!store.get_member(&org_id, &member_id).await.unwrap().is_active);
}

#[tokio::test]
async fn test_terminal_initial_status_rejected() {
    let (_, uow, plan_id) = setup().await;
    let org_id = provision_org(&uow, "acme-gym").await.organization.id;

    let err = uow
        .create_membership_and_activate(
            &org_id,
            CreateMembershipCommand {
                member_id: MemberId(Uuid::now_v7()),
                plan_id,
                start_date: None,
                end_date: None,
                price_paid_cents: 0,
                status: Some(MembershipStatus::Expired),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn test_cancel_only_active_membership_deactivates_member() {
    let (store, uow, plan_id) = setup().await;
    let org_id = provision_org(&uow, "acme-gym").await.organization.id;
    let (member_id, membership) = member_with_active_membership(&uow, &org_id, &plan_id).await;

    let cancelled = uow
        .cancel_membership_and_deactivate(&membership.id, &org_id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, MembershipStatus::Cancelled);
    assert!(!store.get_member(&org_id, &member_id).await.unwrap().is_active);
}

#[tokio::test]
async fn test_cancel_with_overlapping_membership_keeps_member_active() {
    let (store, uow, plan_id) = setup().await;
    let org_id = provision_org(&uow, "acme-gym").await.organization.id;
    let second_plan = seed_plan(uow.store(), "premium", "Premium", 9900, None).await;

    let (member_id, first) = member_with_active_membership(&uow, &org_id, &plan_id).await;
    let second = uow
        .create_membership_and_activate(
            &org_id,
            CreateMembershipCommand {
                member_id: member_id.clone(),
                plan_id: second_plan,
                start_date: None,
                end_date: None,
                price_paid_cents: 9900,
                status: Some(MembershipStatus::Active),
            },
        )
        .await
        .unwrap();

    uow.cancel_membership_and_deactivate(&first.id, &org_id)
        .await
        .unwrap();
    assert!(store.get_member(&org_id, &member_id).await.unwrap().is_active);

    uow.cancel_membership_and_deactivate(&second.id, &org_id)
        .await
        .unwrap();
    assert!(!store.get_member(&org_id, &member_id).await.unwrap().is_active);
}

#[tokio::test]
async fn test_cancel_twice_is_conflict() {
    let (_, uow, plan_id) = setup().await;
    let org_id = provision_org(&uow, "acme-gym").await.organization.id;
    let (_, membership) = member_with_active_membership(&uow, &org_id, &plan_id).await;

    uow.cancel_membership_and_deactivate(&membership.id, &org_id)
        .await
        .unwrap();
    let err = uow
        .cancel_membership_and_deactivate(&membership.id, &org_id)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn test_delete_then_restore_round_trips_member_state() {
    let (store, uow, plan_id) = setup().await;
    let org_id = provision_org(&uow, "acme-gym").await.organization.id;
    let (member_id, membership) = member_with_active_membership(&uow, &org_id, &plan_id).await;
    assert!(store.get_member(&org_id, &member_id).await.unwrap().is_active);

    uow.delete_membership_and_deactivate(&membership.id, &org_id)
        .await
        .unwrap();
    assert!(!store.get_member(&org_id, &member_id).await.unwrap().is_active);
    // Soft-deleted: gone from default reads, visible with include_deleted.
    assert!(matches!(
        store.get_membership(&org_id, &membership.id).await,
        Err(StoreError::NotFound)
    ));
    assert_eq!(
        store
            .list_memberships_for_member(&org_id, &member_id, true)
            .await
            .unwrap()
            .len(),
        1
    );

    let restored = uow
        .restore_membership_and_activate(&membership.id, &org_id)
        .await
        .unwrap();
    assert_eq!(restored.status, MembershipStatus::Active);
    assert!(store.get_member(&org_id, &member_id).await.unwrap().is_active);
}

#[tokio::test]
async fn test_restore_of_live_membership_is_conflict() {
    let (_, uow, plan_id) = setup().await;
    let org_id = provision_org(&uow, "acme-gym").await.organization.id;
    let (_, membership) = member_with_active_membership(&uow, &org_id, &plan_id).await;

    let err = uow
        .restore_membership_and_activate(&membership.id, &org_id)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

// ───────────────────────────── Plan upgrades ─────────────────────────────

#[tokio::test]
async fn test_upgrade_rederives_cached_name_and_price() {
    let (store, uow, _) = setup().await;
    let org_id = provision_org(&uow, "acme-gym").await.organization.id;
    let pro_id = seed_plan(uow.store(), "pro", "Pro", 14900, Some(500)).await;

    let org = uow
        .upgrade_organization_plan(&org_id, &pro_id)
        .await
        .unwrap();
    assert_eq!(org.plan_id, pro_id);
    assert_eq!(org.plan_name, "Pro");

    let sub = store.get_subscription(&org_id).await.unwrap();
    assert_eq!(sub.price_paid_cents, 14900);
}

#[tokio::test]
async fn test_upgrade_to_missing_plan_is_not_found() {
    let (_, uow, _) = setup().await;
    let org_id = provision_org(&uow, "acme-gym").await.organization.id;
    let err = uow
        .upgrade_organization_plan(&org_id, &PlanId(Uuid::now_v7()))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound));
}

// ───────────────────────────── Settings updates ─────────────────────────────

#[tokio::test]
async fn test_settings_update_mirrors_config_identity_fields() {
    let (_, uow, _) = setup().await;
    let org_id = provision_org(&uow, "acme-gym").await.organization.id;

    let config = repset_storage::OrgConfig {
        locale: "de-DE".to_string(),
        timezone: "Europe/Berlin".to_string(),
        currency: "EUR".to_string(),
        ..repset_storage::OrgConfig::default()
    };
    let org = uow
        .update_organization_settings(
            &org_id,
            UpdateOrganizationSettingsParams {
                name: Some("Acme Gym GmbH".to_string()),
                image: Some("https://img.test/acme.png".to_string()),
                config: Some(config.clone()),
            },
        )
        .await
        .unwrap();

    assert_eq!(org.name, "Acme Gym GmbH");
    assert_eq!(org.image.as_deref(), Some("https://img.test/acme.png"));
    assert_eq!(org.locale, "de-DE");
    assert_eq!(org.timezone, "Europe/Berlin");
    assert_eq!(org.currency, "EUR");
    assert_eq!(org.config, config);
}

#[tokio::test]
async fn test_settings_update_of_missing_org_is_not_found() {
    let (_, uow, _) = setup().await;
    let err = uow
        .update_organization_settings(
            &OrganizationId(Uuid::now_v7()),
            UpdateOrganizationSettingsParams {
                name: Some("Ghost".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound));
}

// ───────────────────────────── Billing sync ─────────────────────────────

#[tokio::test]
async fn test_sync_event_is_idempotent() {
    let (store, uow, _) = setup().await;
    let provisioned = provision_org(&uow, "acme-gym").await;
    let org_id = provisioned.organization.id;
    let pro_id = seed_plan(uow.store(), "pro", "Pro", 14900, None).await;

    let event = sub_event(&org_id, &pro_id, SubscriptionStatus::Active, None);
    let first = uow.sync_stripe_subscription_event(&event).await.unwrap();
    let second = uow.sync_stripe_subscription_event(&event).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.status, second.status);
    assert_eq!(first.price_paid_cents, second.price_paid_cents);
    assert_eq!(first.current_period_end, second.current_period_end);
    assert_eq!(
        first.stripe_subscription_id,
        second.stripe_subscription_id
    );
    assert_eq!(
        store.get_organization(&org_id).await.unwrap().plan_name,
        "Pro"
    );
}

#[tokio::test]
async fn test_sync_event_mirrors_plan_name_from_foreign_key() {
    let (store, uow, _) = setup().await;
    let org_id = provision_org(&uow, "acme-gym").await.organization.id;
    let pro_id = seed_plan(uow.store(), "pro", "Pro", 14900, None).await;
    assert_eq!(
        store.get_organization(&org_id).await.unwrap().plan_name,
        "Free Trial"
    );

    uow.sync_stripe_subscription_event(&sub_event(
        &org_id,
        &pro_id,
        SubscriptionStatus::Active,
        None,
    ))
    .await
    .unwrap();

    let org = store.get_organization(&org_id).await.unwrap();
    assert_eq!(org.plan_id, pro_id);
    assert_eq!(org.plan_name, "Pro");
}

#[tokio::test]
async fn test_has_used_trial_is_one_way() {
    let (store, uow, plan_id) = setup().await;
    let provisioned = provision_org(&uow, "acme-gym").await;
    let org_id = provisioned.organization.id;
    let owner_id = provisioned.owner.id;

    uow.sync_stripe_subscription_event(&sub_event(
        &org_id,
        &plan_id,
        SubscriptionStatus::Trialing,
        Some(owner_id.clone()),
    ))
    .await
    .unwrap();
    assert!(store.get_user(&org_id, &owner_id).await.unwrap().has_used_trial);

    // A later non-trial event must not unset the flag.
    uow.sync_stripe_subscription_event(&sub_event(
        &org_id,
        &plan_id,
        SubscriptionStatus::Active,
        Some(owner_id.clone()),
    ))
    .await
    .unwrap();
    assert!(store.get_user(&org_id, &owner_id).await.unwrap().has_used_trial);
}

// ───────────────────────────── Entitlements ─────────────────────────────

#[tokio::test]
async fn test_member_limit_denied_when_reached() {
    let store = Arc::new(MemoryStore::new());
    seed_plan(&store, "solo", "Solo", 900, Some(1)).await;
    let uow = UnitOfWork::new(store.clone());
    let org_id = uow
        .create_organization_with_owner(provision_params("tiny-gym", "solo", "o@tiny.test"))
        .await
        .unwrap()
        .organization
        .id;
    let plan_id = store.get_plan_by_slug("solo").await.unwrap().id;
    let entitlements = PlanLimitEntitlements::new(store.clone());

    assert!(entitlements
        .check_limit(&org_id, ResourceKind::Members)
        .await
        .unwrap()
        .is_allowed());

    member_with_active_membership(&uow, &org_id, &plan_id).await;

    let check = entitlements
        .check_limit(&org_id, ResourceKind::Members)
        .await
        .unwrap();
    assert_eq!(
        check,
        LimitCheck::Denied {
            limit: 1,
            current: 1
        }
    );
}
