//! repset-billing - billing provider integration for repset
//!
//! This crate keeps organization subscriptions in sync with the billing
//! provider:
//! - Webhook payload parsing and signature policy ([`parse_webhook_event`])
//! - Reconciliation of parsed events into the store ([`BillingSyncReconciler`])
//!
//! # Architecture
//!
//! The provider is the source of truth for subscription state. Raw webhook
//! payloads are normalized into [`BillingWebhookEvent`] values, and the
//! reconciler applies each one through the transactional core so the
//! subscription row, the organization's cached plan name, and the owner's
//! trial flag all move together. Events are idempotent under redelivery.

use thiserror::Error;

use repset_storage::StoreError;

mod reconciler;
mod webhook;

pub use reconciler::{BillingSyncReconciler, WebhookHandler};
pub use webhook::{parse_webhook_event, BillingWebhookEvent};

/// Billing service errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Billing provider error: {0}")]
    Provider(String),

    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Configuration for the billing webhook endpoint
#[derive(Clone)]
pub struct BillingConfig {
    /// Webhook secret for signature verification
    pub webhook_secret: String,
}

impl BillingConfig {
    /// Create a new billing configuration from environment variables
    pub fn from_env() -> Result<Self, BillingError> {
        Ok(Self {
            webhook_secret: std::env::var("BILLING_WEBHOOK_SECRET")
                .or_else(|_| std::env::var("STRIPE_WEBHOOK_SECRET"))
                .map_err(|_| {
                    BillingError::Config(
                        "BILLING_WEBHOOK_SECRET or STRIPE_WEBHOOK_SECRET not set".into(),
                    )
                })?,
        })
    }

    /// Create a test configuration (for development/testing)
    pub fn test() -> Self {
        Self {
            webhook_secret: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_config_test_skips_verification() {
        let config = BillingConfig::test();
        assert!(config.webhook_secret.is_empty());
    }

    #[test]
    fn test_billing_config_from_env_requires_secret() {
        // Neither variable is set in the test environment.
        std::env::remove_var("BILLING_WEBHOOK_SECRET");
        std::env::remove_var("STRIPE_WEBHOOK_SECRET");
        assert!(matches!(
            BillingConfig::from_env(),
            Err(BillingError::Config(_))
        ));
    }
}
