//! PostgreSQL [`Store`] implementation.
//!
//! Multi-entity operations run inside one database transaction and lock the
//! rows they derive from (`SELECT ... FOR UPDATE`), so the member's derived
//! `is_active` flag and the organization's cached plan name can never drift
//! from the rows they summarize.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use repset_storage::{
    CreateMemberParams, CreateMembershipParams, CreatePlanParams, Member, MemberId, Membership,
    MembershipId, MembershipStatus, OrgConfig, Organization, OrganizationId, OrganizationPlan,
    OwnerParams, PlanId, ProvisionOrganizationParams, ProvisionedOrganization, Store, StoreError,
    Subscription, SubscriptionEventParams, SubscriptionId, UpdateOrganizationSettingsParams, User,
    UserId, UserRole,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(backend)?;

        MIGRATOR.run(&pool).await.map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }
}

type Tx<'a> = sqlx::Transaction<'a, Postgres>;

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Map a unique-index violation to `Conflict`, everything else to `Backend`.
fn unique_violation(e: sqlx::Error, conflict: String) -> StoreError {
    let s = e.to_string();
    if s.contains("duplicate key") || s.contains("unique constraint") {
        StoreError::Conflict(conflict)
    } else {
        StoreError::Backend(s)
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Backend(e.to_string()))
}

fn plan_from_row(row: &PgRow) -> Result<OrganizationPlan, StoreError> {
    let interval: String = row.try_get("billing_interval").map_err(backend)?;
    Ok(OrganizationPlan {
        id: PlanId(row.try_get("id").map_err(backend)?),
        slug: row.try_get("slug").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
        price_cents: row.try_get("price_cents").map_err(backend)?,
        currency: row.try_get("currency").map_err(backend)?,
        interval: interval.parse().map_err(StoreError::Backend)?,
        limits: decode_json(row.try_get("limits").map_err(backend)?)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

fn org_from_row(row: &PgRow) -> Result<Organization, StoreError> {
    let config: OrgConfig = decode_json(row.try_get("config").map_err(backend)?)?;
    Ok(Organization {
        id: OrganizationId(row.try_get("id").map_err(backend)?),
        slug: row.try_get("slug").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
        image: row.try_get("image").map_err(backend)?,
        is_active: row.try_get("is_active").map_err(backend)?,
        plan_name: row.try_get("plan_name").map_err(backend)?,
        plan_id: PlanId(row.try_get("plan_id").map_err(backend)?),
        locale: row.try_get("locale").map_err(backend)?,
        timezone: row.try_get("timezone").map_err(backend)?,
        currency: row.try_get("currency").map_err(backend)?,
        config,
        deleted_at: row.try_get("deleted_at").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription, StoreError> {
    let status: String = row.try_get("status").map_err(backend)?;
    Ok(Subscription {
        id: SubscriptionId(row.try_get("id").map_err(backend)?),
        organization_id: OrganizationId(row.try_get("organization_id").map_err(backend)?),
        stripe_customer_id: row.try_get("stripe_customer_id").map_err(backend)?,
        stripe_subscription_id: row.try_get("stripe_subscription_id").map_err(backend)?,
        status: status.parse().map_err(StoreError::Backend)?,
        price_paid_cents: row.try_get("price_paid_cents").map_err(backend)?,
        current_period_start: row.try_get("current_period_start").map_err(backend)?,
        current_period_end: row.try_get("current_period_end").map_err(backend)?,
        cancel_at_period_end: row.try_get("cancel_at_period_end").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let role: String = row.try_get("role").map_err(backend)?;
    Ok(User {
        id: UserId(row.try_get("id").map_err(backend)?),
        organization_id: OrganizationId(row.try_get("organization_id").map_err(backend)?),
        email: row.try_get("email").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
        role: role.parse().map_err(StoreError::Backend)?,
        has_used_trial: row.try_get("has_used_trial").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn member_from_row(row: &PgRow) -> Result<Member, StoreError> {
    Ok(Member {
        id: MemberId(row.try_get("id").map_err(backend)?),
        organization_id: OrganizationId(row.try_get("organization_id").map_err(backend)?),
        name: row.try_get("name").map_err(backend)?,
        email: row.try_get("email").map_err(backend)?,
        is_active: row.try_get("is_active").map_err(backend)?,
        deleted_at: row.try_get("deleted_at").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn membership_from_row(row: &PgRow) -> Result<Membership, StoreError> {
    let status: String = row.try_get("status").map_err(backend)?;
    Ok(Membership {
        id: MembershipId(row.try_get("id").map_err(backend)?),
        organization_id: OrganizationId(row.try_get("organization_id").map_err(backend)?),
        member_id: MemberId(row.try_get("member_id").map_err(backend)?),
        plan_id: PlanId(row.try_get("plan_id").map_err(backend)?),
        start_date: row.try_get("start_date").map_err(backend)?,
        end_date: row.try_get("end_date").map_err(backend)?,
        price_paid_cents: row.try_get("price_paid_cents").map_err(backend)?,
        status: status.parse().map_err(StoreError::Backend)?,
        deleted_at: row.try_get("deleted_at").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

/// Recompute the derived `members.is_active` flag inside the caller's
/// transaction, set-based over the non-deleted Active memberships.
async fn recompute_member_active(
    tx: &mut Tx<'_>,
    org_id: &OrganizationId,
    member_id: &MemberId,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE members SET is_active = EXISTS(
             SELECT 1 FROM memberships
             WHERE member_id = $1 AND organization_id = $2
               AND deleted_at IS NULL AND status = 'active'
         ), updated_at = $3
         WHERE id = $1",
    )
    .bind(member_id.0)
    .bind(org_id.0)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(backend)?;
    Ok(())
}

/// Lock a membership row for the rest of the transaction.
async fn lock_membership(
    tx: &mut Tx<'_>,
    org_id: &OrganizationId,
    membership_id: &MembershipId,
    include_deleted: bool,
) -> Result<Membership, StoreError> {
    let sql = if include_deleted {
        "SELECT * FROM memberships WHERE id = $1 AND organization_id = $2 FOR UPDATE"
    } else {
        "SELECT * FROM memberships
         WHERE id = $1 AND organization_id = $2 AND deleted_at IS NULL FOR UPDATE"
    };
    let row = sqlx::query(sql)
        .bind(membership_id.0)
        .bind(org_id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound)?;
    membership_from_row(&row)
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    // ───────────────────────────── Plans ─────────────────────────────

    async fn create_plan(&self, params: &CreatePlanParams) -> Result<PlanId, StoreError> {
        let id = Uuid::now_v7();
        let limits =
            serde_json::to_value(&params.limits).map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            "INSERT INTO organization_plans
                 (id, slug, name, price_cents, currency, billing_interval, limits, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(id)
        .bind(&params.slug)
        .bind(&params.name)
        .bind(params.price_cents)
        .bind(&params.currency)
        .bind(params.interval.as_str())
        .bind(limits)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, format!("plan slug already exists: {}", params.slug)))?;
        Ok(PlanId(id))
    }

    async fn get_plan(&self, plan_id: &PlanId) -> Result<OrganizationPlan, StoreError> {
        let row = sqlx::query("SELECT * FROM organization_plans WHERE id = $1")
            .bind(plan_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;
        plan_from_row(&row)
    }

    async fn get_plan_by_slug(&self, slug: &str) -> Result<OrganizationPlan, StoreError> {
        let row = sqlx::query("SELECT * FROM organization_plans WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;
        plan_from_row(&row)
    }

    async fn list_plans(&self) -> Result<Vec<OrganizationPlan>, StoreError> {
        let rows = sqlx::query("SELECT * FROM organization_plans ORDER BY slug")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(plan_from_row).collect()
    }

    // ───────────────────────────── Organizations ─────────────────────────────

    async fn provision_organization(
        &self,
        params: &ProvisionOrganizationParams,
    ) -> Result<ProvisionedOrganization, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let now = Utc::now();

        let plan_row = sqlx::query("SELECT * FROM organization_plans WHERE slug = $1")
            .bind(&params.organization.plan_slug)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?
            .ok_or_else(|| {
                StoreError::Validation(format!(
                    "unknown plan slug: {}",
                    params.organization.plan_slug
                ))
            })?;
        let plan = plan_from_row(&plan_row)?;

        let org_id = OrganizationId(Uuid::now_v7());
        let config = params.organization.config.clone().unwrap_or_default();
        let config_json =
            serde_json::to_value(&config).map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            "INSERT INTO organizations
                 (id, slug, name, image, is_active, plan_name, plan_id,
                  locale, timezone, currency, config, deleted_at, created_at, updated_at)
             VALUES ($1, $2, $3, NULL, TRUE, $4, $5, $6, $7, $8, $9, NULL, $10, $10)",
        )
        .bind(org_id.0)
        .bind(&params.organization.slug)
        .bind(&params.organization.name)
        .bind(&plan.name)
        .bind(plan.id.0)
        .bind(&config.locale)
        .bind(&config.timezone)
        .bind(&config.currency)
        .bind(config_json)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            unique_violation(
                e,
                format!(
                    "organization slug already exists: {}",
                    params.organization.slug
                ),
            )
        })?;

        let (status, period_start, period_end) = params.subscription.resolve(now);
        sqlx::query(
            "INSERT INTO subscriptions
                 (id, organization_id, stripe_customer_id, stripe_subscription_id, status,
                  price_paid_cents, current_period_start, current_period_end,
                  cancel_at_period_end, created_at, updated_at)
             VALUES ($1, $2, NULL, NULL, $3, $4, $5, $6, FALSE, $7, $7)",
        )
        .bind(Uuid::now_v7())
        .bind(org_id.0)
        .bind(status.as_str())
        .bind(params.subscription.price_paid_cents)
        .bind(period_start)
        .bind(period_end)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        let owner = match &params.owner {
            OwnerParams::New { email, name } => {
                let row = sqlx::query(
                    "INSERT INTO users
                         (id, organization_id, email, name, role, has_used_trial,
                          created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, FALSE, $6, $6)
                     RETURNING *",
                )
                .bind(Uuid::now_v7())
                .bind(org_id.0)
                .bind(email)
                .bind(name)
                .bind(UserRole::Owner.as_str())
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    unique_violation(e, format!("user email already exists: {}", email))
                })?;
                user_from_row(&row)?
            }
            OwnerParams::Existing(user_id) => {
                // Re-home the existing user into the new organization.
                let row = sqlx::query(
                    "UPDATE users SET organization_id = $1, role = $2, updated_at = $3
                     WHERE id = $4
                     RETURNING *",
                )
                .bind(org_id.0)
                .bind(UserRole::Owner.as_str())
                .bind(now)
                .bind(user_id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?
                .ok_or(StoreError::NotFound)?;
                user_from_row(&row)?
            }
        };

        // Re-read the hydrated rows inside the transaction so the caller
        // sees exactly what was committed, database defaults included.
        let org_row = sqlx::query("SELECT * FROM organizations WHERE id = $1")
            .bind(org_id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
        let organization = org_from_row(&org_row)?;
        let sub_row = sqlx::query("SELECT * FROM subscriptions WHERE organization_id = $1")
            .bind(org_id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
        let subscription = subscription_from_row(&sub_row)?;

        tx.commit().await.map_err(backend)?;

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
        let row =
            sqlx::query("SELECT * FROM organizations WHERE id = $1 AND deleted_at IS NULL")
                .bind(org_id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?
                .ok_or(StoreError::NotFound)?;
        org_from_row(&row)
    }

    async fn get_organization_by_slug(&self, slug: &str) -> Result<Organization, StoreError> {
        let row =
            sqlx::query("SELECT * FROM organizations WHERE slug = $1 AND deleted_at IS NULL")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?
                .ok_or(StoreError::NotFound)?;
        org_from_row(&row)
    }

    async fn update_organization_settings(
        &self,
        org_id: &OrganizationId,
        params: &UpdateOrganizationSettingsParams,
    ) -> Result<Organization, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let now = Utc::now();

        let row = sqlx::query(
            "SELECT * FROM organizations WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(org_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound)?;
        let mut org = org_from_row(&row)?;

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

        let config_json =
            serde_json::to_value(&org.config).map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            "UPDATE organizations
             SET name = $1, image = $2, locale = $3, timezone = $4, currency = $5,
                 config = $6, updated_at = $7
             WHERE id = $8",
        )
        .bind(&org.name)
        .bind(&org.image)
        .bind(&org.locale)
        .bind(&org.timezone)
        .bind(&org.currency)
        .bind(config_json)
        .bind(now)
        .bind(org_id.0)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(org)
    }

    async fn upgrade_organization_plan(
        &self,
        org_id: &OrganizationId,
        plan_id: &PlanId,
    ) -> Result<Organization, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let now = Utc::now();

        let plan_row = sqlx::query("SELECT * FROM organization_plans WHERE id = $1")
            .bind(plan_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;
        let plan = plan_from_row(&plan_row)?;

        let row = sqlx::query(
            "UPDATE organizations SET plan_id = $1, plan_name = $2, updated_at = $3
             WHERE id = $4 AND deleted_at IS NULL
             RETURNING *",
        )
        .bind(plan.id.0)
        .bind(&plan.name)
        .bind(now)
        .bind(org_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound)?;
        let org = org_from_row(&row)?;

        let updated = sqlx::query(
            "UPDATE subscriptions SET price_paid_cents = $1, updated_at = $2
             WHERE organization_id = $3",
        )
        .bind(plan.price_cents)
        .bind(now)
        .bind(org_id.0)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        tx.commit().await.map_err(backend)?;
        Ok(org)
    }

    // ───────────────────────────── Subscriptions ─────────────────────────────

    async fn get_subscription(
        &self,
        org_id: &OrganizationId,
    ) -> Result<Subscription, StoreError> {
        let row = sqlx::query("SELECT * FROM subscriptions WHERE organization_id = $1")
            .bind(org_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;
        subscription_from_row(&row)
    }

    async fn apply_subscription_event(
        &self,
        event: &SubscriptionEventParams,
    ) -> Result<Subscription, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let now = Utc::now();

        let org = sqlx::query(
            "SELECT id FROM organizations WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(event.organization_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;
        if org.is_none() {
            return Err(StoreError::NotFound);
        }

        let plan_row = sqlx::query("SELECT * FROM organization_plans WHERE id = $1")
            .bind(event.organization_plan_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;
        let plan = plan_from_row(&plan_row)?;

        if let Some(user_id) = &event.user_id {
            let user = sqlx::query("SELECT id FROM users WHERE id = $1 AND organization_id = $2")
                .bind(user_id.0)
                .bind(event.organization_id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;
            if user.is_none() {
                return Err(StoreError::NotFound);
            }
        }

        // Upsert keyed on the 1:1 organization_id; redelivery lands on the
        // update arm and converges on the same row.
        let row = sqlx::query(
            "INSERT INTO subscriptions
                 (id, organization_id, stripe_customer_id, stripe_subscription_id, status,
                  price_paid_cents, current_period_start, current_period_end,
                  cancel_at_period_end, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
             ON CONFLICT (organization_id) DO UPDATE SET
                 stripe_customer_id = EXCLUDED.stripe_customer_id,
                 stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                 status = EXCLUDED.status,
                 price_paid_cents = EXCLUDED.price_paid_cents,
                 current_period_start = EXCLUDED.current_period_start,
                 current_period_end = EXCLUDED.current_period_end,
                 cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                 updated_at = EXCLUDED.updated_at
             RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(event.organization_id.0)
        .bind(&event.stripe_customer_id)
        .bind(&event.stripe_subscription_id)
        .bind(event.status.as_str())
        .bind(event.price_paid_cents)
        .bind(event.current_period_start)
        .bind(event.current_period_end)
        .bind(event.cancel_at_period_end)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;
        let subscription = subscription_from_row(&row)?;

        // Keep the cached plan name consistent with the foreign key.
        sqlx::query(
            "UPDATE organizations SET plan_id = $1, plan_name = $2, updated_at = $3
             WHERE id = $4",
        )
        .bind(plan.id.0)
        .bind(&plan.name)
        .bind(now)
        .bind(event.organization_id.0)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        // One-way trial flag.
        if event.status == repset_storage::SubscriptionStatus::Trialing {
            if let Some(user_id) = &event.user_id {
                sqlx::query(
                    "UPDATE users SET has_used_trial = TRUE, updated_at = $1
                     WHERE id = $2 AND NOT has_used_trial",
                )
                .bind(now)
                .bind(user_id.0)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            }
        }

        tx.commit().await.map_err(backend)?;
        Ok(subscription)
    }

    // ───────────────────────────── Users ─────────────────────────────

    async fn get_user(
        &self,
        org_id: &OrganizationId,
        user_id: &UserId,
    ) -> Result<User, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1 AND organization_id = $2")
            .bind(user_id.0)
            .bind(org_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;
        user_from_row(&row)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;
        user_from_row(&row)
    }

    async fn count_staff_users(&self, org_id: &OrganizationId) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM users WHERE organization_id = $1")
            .bind(org_id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        row.try_get("n").map_err(backend)
    }

    // ───────────────────────────── Members ─────────────────────────────

    async fn create_member(
        &self,
        org_id: &OrganizationId,
        params: &CreateMemberParams,
    ) -> Result<MemberId, StoreError> {
        let org = sqlx::query("SELECT id FROM organizations WHERE id = $1 AND deleted_at IS NULL")
            .bind(org_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        if org.is_none() {
            return Err(StoreError::NotFound);
        }

        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO members
                 (id, organization_id, name, email, is_active, deleted_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, FALSE, NULL, $5, $5)",
        )
        .bind(id)
        .bind(org_id.0)
        .bind(&params.name)
        .bind(&params.email)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(MemberId(id))
    }

    async fn get_member(
        &self,
        org_id: &OrganizationId,
        member_id: &MemberId,
    ) -> Result<Member, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM members
             WHERE id = $1 AND organization_id = $2 AND deleted_at IS NULL",
        )
        .bind(member_id.0)
        .bind(org_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound)?;
        member_from_row(&row)
    }

    async fn list_members(&self, org_id: &OrganizationId) -> Result<Vec<Member>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM members
             WHERE organization_id = $1 AND deleted_at IS NULL
             ORDER BY created_at",
        )
        .bind(org_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(member_from_row).collect()
    }

    async fn count_active_members(&self, org_id: &OrganizationId) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM members
             WHERE organization_id = $1 AND deleted_at IS NULL AND is_active",
        )
        .bind(org_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        row.try_get("n").map_err(backend)
    }

    // ───────────────────────────── Memberships ─────────────────────────────

    async fn create_membership(
        &self,
        org_id: &OrganizationId,
        params: &CreateMembershipParams,
    ) -> Result<Membership, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let now = Utc::now();

        // Lock the member row so concurrent membership writes serialize on it.
        let member = sqlx::query(
            "SELECT id FROM members
             WHERE id = $1 AND organization_id = $2 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(params.member_id.0)
        .bind(org_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;
        if member.is_none() {
            return Err(StoreError::NotFound);
        }
        let plan = sqlx::query("SELECT id FROM organization_plans WHERE id = $1")
            .bind(params.plan_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;
        if plan.is_none() {
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
        sqlx::query(
            "INSERT INTO memberships
                 (id, organization_id, member_id, plan_id, start_date, end_date,
                  price_paid_cents, status, deleted_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL, $9, $9)",
        )
        .bind(membership.id.0)
        .bind(org_id.0)
        .bind(params.member_id.0)
        .bind(params.plan_id.0)
        .bind(params.start_date)
        .bind(params.end_date)
        .bind(params.price_paid_cents)
        .bind(params.status.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        recompute_member_active(&mut tx, org_id, &params.member_id, now).await?;
        tx.commit().await.map_err(backend)?;
        Ok(membership)
    }

    async fn get_membership(
        &self,
        org_id: &OrganizationId,
        membership_id: &MembershipId,
    ) -> Result<Membership, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM memberships
             WHERE id = $1 AND organization_id = $2 AND deleted_at IS NULL",
        )
        .bind(membership_id.0)
        .bind(org_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound)?;
        membership_from_row(&row)
    }

    async fn list_memberships_for_member(
        &self,
        org_id: &OrganizationId,
        member_id: &MemberId,
        include_deleted: bool,
    ) -> Result<Vec<Membership>, StoreError> {
        let sql = if include_deleted {
            "SELECT * FROM memberships
             WHERE member_id = $1 AND organization_id = $2
             ORDER BY created_at"
        } else {
            "SELECT * FROM memberships
             WHERE member_id = $1 AND organization_id = $2 AND deleted_at IS NULL
             ORDER BY created_at"
        };
        let rows = sqlx::query(sql)
            .bind(member_id.0)
            .bind(org_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(membership_from_row).collect()
    }

    async fn cancel_membership(
        &self,
        org_id: &OrganizationId,
        membership_id: &MembershipId,
    ) -> Result<Membership, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let now = Utc::now();

        let mut membership = lock_membership(&mut tx, org_id, membership_id, false).await?;
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

        sqlx::query("UPDATE memberships SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(MembershipStatus::Cancelled.as_str())
            .bind(now)
            .bind(membership_id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        recompute_member_active(&mut tx, org_id, &membership.member_id, now).await?;
        tx.commit().await.map_err(backend)?;
        Ok(membership)
    }

    async fn delete_membership(
        &self,
        org_id: &OrganizationId,
        membership_id: &MembershipId,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let now = Utc::now();

        let membership = lock_membership(&mut tx, org_id, membership_id, false).await?;
        sqlx::query("UPDATE memberships SET deleted_at = $1, updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(membership_id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        recompute_member_active(&mut tx, org_id, &membership.member_id, now).await?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn restore_membership(
        &self,
        org_id: &OrganizationId,
        membership_id: &MembershipId,
    ) -> Result<Membership, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let now = Utc::now();

        let mut membership = lock_membership(&mut tx, org_id, membership_id, true).await?;
        if membership.deleted_at.is_none() {
            return Err(StoreError::Conflict("membership is not deleted".to_string()));
        }
        membership.deleted_at = None;
        membership.updated_at = now;

        sqlx::query("UPDATE memberships SET deleted_at = NULL, updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(membership_id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        recompute_member_active(&mut tx, org_id, &membership.member_id, now).await?;
        tx.commit().await.map_err(backend)?;
        Ok(membership)
    }
}
