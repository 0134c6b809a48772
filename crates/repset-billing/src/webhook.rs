//! Billing webhook parsing
//!
//! Normalizes raw billing provider payloads into [`BillingWebhookEvent`]
//! values the reconciler can apply.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use repset_storage::{
    OrganizationId, PlanId, SubscriptionEventParams, SubscriptionStatus, UserId,
};

use crate::BillingError;

/// Parsed billing webhook event
#[derive(Debug, Clone)]
pub enum BillingWebhookEvent {
    /// Subscription was created, updated, or deleted. The normalized payload
    /// carries everything needed to upsert the local subscription row.
    SubscriptionChanged(SubscriptionEventParams),

    /// Invoice was paid successfully
    InvoicePaid {
        invoice_id: String,
        customer_id: String,
        amount_paid: i64,
    },

    /// Invoice payment failed
    InvoicePaymentFailed {
        invoice_id: String,
        customer_id: String,
        attempt_count: i32,
    },

    /// Unknown or unhandled event
    Unknown { event_type: String },
}

/// Parse a raw webhook payload into an event
///
/// # Arguments
/// * `payload` - Raw webhook body
/// * `signature` - Webhook signature header value (e.g., Stripe-Signature header)
/// * `webhook_secret` - Your webhook endpoint secret (empty string to disable verification)
///
/// # Security
/// When `webhook_secret` is configured, this function REQUIRES a valid signature.
/// Signature verification is not yet implemented, so providing a webhook_secret
/// will cause all requests to fail (fail-closed behavior for security).
///
/// For development/testing, pass an empty `webhook_secret` to skip verification.
pub fn parse_webhook_event(
    payload: &str,
    signature: &str,
    webhook_secret: &str,
) -> Result<BillingWebhookEvent, BillingError> {
    // SECURITY: When webhook_secret is configured, we MUST verify signatures.
    // This prevents attackers from forging billing events.
    if !webhook_secret.is_empty() {
        if signature.is_empty() {
            // An attacker could bypass verification by omitting the header.
            return Err(BillingError::Provider(
                "Missing webhook signature. Signature verification is required when \
                 webhook_secret is configured."
                    .into(),
            ));
        }

        // TODO: Implement HMAC-SHA256 verification of the Stripe-Signature
        // header. Fail closed until then: a configured secret indicates
        // production use.
        return Err(BillingError::Provider(
            "Webhook signature verification not implemented. \
             Remove webhook_secret for development, \
             or implement HMAC verification for production."
                .into(),
        ));
    }

    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| BillingError::Provider(e.to_string()))?;

    let event_type = value["type"]
        .as_str()
        .ok_or_else(|| BillingError::Provider("Missing event type".into()))?;

    match event_type {
        "customer.subscription.created" | "customer.subscription.updated" => {
            let sub = &value["data"]["object"];
            let status = parse_subscription_status(sub["status"].as_str().unwrap_or("active"));
            Ok(BillingWebhookEvent::SubscriptionChanged(
                parse_subscription_object(sub, status)?,
            ))
        }

        "customer.subscription.deleted" => {
            // The provider reports the final payload with its own status;
            // locally a deleted subscription is always Cancelled.
            let sub = &value["data"]["object"];
            Ok(BillingWebhookEvent::SubscriptionChanged(
                parse_subscription_object(sub, SubscriptionStatus::Cancelled)?,
            ))
        }

        "invoice.paid" => {
            let invoice = &value["data"]["object"];
            Ok(BillingWebhookEvent::InvoicePaid {
                invoice_id: invoice["id"].as_str().unwrap_or("").to_string(),
                customer_id: invoice["customer"].as_str().unwrap_or("").to_string(),
                amount_paid: invoice["amount_paid"].as_i64().unwrap_or(0),
            })
        }

        "invoice.payment_failed" => {
            let invoice = &value["data"]["object"];
            Ok(BillingWebhookEvent::InvoicePaymentFailed {
                invoice_id: invoice["id"].as_str().unwrap_or("").to_string(),
                customer_id: invoice["customer"].as_str().unwrap_or("").to_string(),
                attempt_count: invoice["attempt_count"].as_i64().unwrap_or(0) as i32,
            })
        }

        _ => Ok(BillingWebhookEvent::Unknown {
            event_type: event_type.to_string(),
        }),
    }
}

/// Normalize a provider subscription object.
///
/// The checkout flow stamps `organization_id` and `organization_plan_id`
/// (and optionally `user_id`) into the subscription's metadata; payloads
/// without them cannot be attributed to a tenant and are rejected.
fn parse_subscription_object(
    sub: &serde_json::Value,
    status: SubscriptionStatus,
) -> Result<SubscriptionEventParams, BillingError> {
    let metadata = &sub["metadata"];
    let organization_id = OrganizationId(parse_metadata_uuid(metadata, "organization_id")?);
    let organization_plan_id = PlanId(parse_metadata_uuid(metadata, "organization_plan_id")?);
    let user_id = match metadata["user_id"].as_str() {
        Some(raw) => Some(UserId(Uuid::parse_str(raw).map_err(|_| {
            BillingError::Provider(format!("Malformed user_id in metadata: {}", raw))
        })?)),
        None => None,
    };

    Ok(SubscriptionEventParams {
        organization_id,
        organization_plan_id,
        stripe_customer_id: sub["customer"].as_str().unwrap_or("").to_string(),
        stripe_subscription_id: sub["id"].as_str().unwrap_or("").to_string(),
        status,
        price_paid_cents: sub["items"]["data"][0]["price"]["unit_amount"]
            .as_i64()
            .unwrap_or(0),
        current_period_start: parse_timestamp(sub, "current_period_start")?,
        current_period_end: parse_timestamp(sub, "current_period_end")?,
        cancel_at_period_end: sub["cancel_at_period_end"].as_bool().unwrap_or(false),
        user_id,
    })
}

fn parse_metadata_uuid(metadata: &serde_json::Value, key: &str) -> Result<Uuid, BillingError> {
    let raw = metadata[key]
        .as_str()
        .ok_or_else(|| BillingError::Provider(format!("Missing {} in metadata", key)))?;
    Uuid::parse_str(raw)
        .map_err(|_| BillingError::Provider(format!("Malformed {} in metadata: {}", key, raw)))
}

fn parse_timestamp(sub: &serde_json::Value, key: &str) -> Result<DateTime<Utc>, BillingError> {
    sub[key]
        .as_i64()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .ok_or_else(|| BillingError::Provider(format!("Missing or invalid {}", key)))
}

fn parse_subscription_status(status: &str) -> SubscriptionStatus {
    status.parse().unwrap_or_else(|_| {
        // Unknown statuses must not grant access.
        warn!(unknown = %status, "Unknown subscription status, defaulting to Incomplete");
        SubscriptionStatus::Incomplete
    })
}
