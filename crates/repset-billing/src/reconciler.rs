//! Subscription event reconciliation
//!
//! Applies parsed webhook events to local state through the transactional
//! core, so that redelivered events converge on the same final state.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use repset_core::UnitOfWork;
use repset_storage::Store;

use crate::{BillingError, BillingWebhookEvent};

/// Handler for billing webhook events
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    /// Handle an incoming webhook event
    async fn handle_event(&self, event: BillingWebhookEvent) -> Result<(), BillingError>;
}

/// Default handler: applies billing provider events to local subscription
/// state through the transactional core.
pub struct BillingSyncReconciler<S> {
    uow: UnitOfWork<S>,
}

impl<S: Store> BillingSyncReconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            uow: UnitOfWork::new(store),
        }
    }
}

#[async_trait]
impl<S: Store + 'static> WebhookHandler for BillingSyncReconciler<S> {
    /// Subscription changes are written through the core; invoice events are
    /// recorded in the logs only, and unknown events are acknowledged so the
    /// provider stops retrying them.
    async fn handle_event(&self, event: BillingWebhookEvent) -> Result<(), BillingError> {
        match event {
            BillingWebhookEvent::SubscriptionChanged(params) => {
                let subscription = self.uow.sync_stripe_subscription_event(&params).await?;
                info!(
                    org_id = %params.organization_id.0,
                    subscription_id = %params.stripe_subscription_id,
                    status = %subscription.status,
                    "Subscription reconciled"
                );
                Ok(())
            }

            BillingWebhookEvent::InvoicePaid {
                invoice_id,
                customer_id,
                amount_paid,
            } => {
                info!(%invoice_id, %customer_id, amount_paid, "Invoice paid");
                Ok(())
            }

            BillingWebhookEvent::InvoicePaymentFailed {
                invoice_id,
                customer_id,
                attempt_count,
            } => {
                warn!(%invoice_id, %customer_id, attempt_count, "Invoice payment failed");
                Ok(())
            }

            BillingWebhookEvent::Unknown { event_type } => {
                info!(%event_type, "Unhandled webhook event type");
                Ok(())
            }
        }
    }
}
