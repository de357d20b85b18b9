//! Stripe webhook handling — the billing state machine
//!
//! All billing-status writes to the `clients` table happen here and only
//! here. Checkout creation and cancellation never touch `status` or
//! `stripe_subscription_id`; they wait for the corresponding verified
//! event to arrive.
//!
//! Delivery is at-least-once and may be out of order. Every transition is
//! derived solely from its own event payload and applied as one atomic
//! UPDATE (last-write-wins), so redelivery of the same event is a no-op in
//! effect. Redelivery of an *older* event after a newer one can still
//! regress status transiently; there is no event-timestamp guard.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use stripe::{Event, EventObject, EventType, SubscriptionStatus, Webhook};
use uuid::Uuid;

use apexops_shared::ClientStatus;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

type HmacSha256 = Hmac<Sha256>;

/// Timestamp tolerance for manual signature verification (seconds)
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// The closed set of event kinds the processor acts on.
///
/// Everything else is observational: logged and acknowledged so Stripe
/// does not redeliver events we will never act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    CheckoutCompleted,
    SubscriptionUpdated,
    SubscriptionDeleted,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    Unhandled,
}

impl WebhookEventKind {
    pub fn classify(event_type: &EventType) -> Self {
        match event_type {
            EventType::CheckoutSessionCompleted => WebhookEventKind::CheckoutCompleted,
            EventType::CustomerSubscriptionUpdated => WebhookEventKind::SubscriptionUpdated,
            EventType::CustomerSubscriptionDeleted => WebhookEventKind::SubscriptionDeleted,
            EventType::InvoicePaymentSucceeded => WebhookEventKind::InvoicePaymentSucceeded,
            EventType::InvoicePaymentFailed => WebhookEventKind::InvoicePaymentFailed,
            _ => WebhookEventKind::Unhandled,
        }
    }
}

/// One client-row transition, derived entirely from a single event payload.
///
/// Each variant applies as a single atomic UPDATE so concurrent deliveries
/// for the same client never interleave partial field writes. Building the
/// same transition from the same event twice yields an identical value,
/// which is what makes at-least-once delivery safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientTransition {
    /// checkout.session.completed: the initial (or renewed) activation
    Activated {
        client_id: Uuid,
        tier: String,
        stripe_customer_id: String,
        stripe_subscription_id: String,
    },
    /// customer.subscription.updated: recompute status from provider state
    StatusSynced {
        client_id: Uuid,
        stripe_subscription_id: String,
        status: ClientStatus,
    },
    /// customer.subscription.deleted: the subscription is gone
    Deactivated { client_id: Uuid },
}

impl ClientTransition {
    pub fn client_id(&self) -> Uuid {
        match self {
            ClientTransition::Activated { client_id, .. } => *client_id,
            ClientTransition::StatusSynced { client_id, .. } => *client_id,
            ClientTransition::Deactivated { client_id } => *client_id,
        }
    }

    /// Apply this transition as one atomic UPDATE.
    ///
    /// Returns whether a client row was matched. A missing row is not an
    /// error here; the caller decides whether that is worth a retry.
    pub async fn apply(&self, pool: &PgPool) -> BillingResult<bool> {
        let result = match self {
            ClientTransition::Activated {
                client_id,
                tier,
                stripe_customer_id,
                stripe_subscription_id,
            } => {
                sqlx::query(
                    r#"
                    UPDATE clients SET
                        status = 'active',
                        tier = $2,
                        stripe_customer_id = $3,
                        stripe_subscription_id = $4,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(client_id)
                .bind(tier)
                .bind(stripe_customer_id)
                .bind(stripe_subscription_id)
                .execute(pool)
                .await?
            }
            ClientTransition::StatusSynced {
                client_id,
                stripe_subscription_id,
                status,
            } => {
                sqlx::query(
                    r#"
                    UPDATE clients SET
                        status = $2,
                        stripe_subscription_id = $3,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(client_id)
                .bind(status.as_str())
                .bind(stripe_subscription_id)
                .execute(pool)
                .await?
            }
            ClientTransition::Deactivated { client_id } => {
                sqlx::query(
                    r#"
                    UPDATE clients SET
                        status = 'inactive',
                        stripe_subscription_id = NULL,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(client_id)
                .execute(pool)
                .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }
}

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    stripe: StripeClient,
    pool: PgPool,
}

impl WebhookHandler {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Verify and parse a Stripe webhook event.
    ///
    /// Uses manual signature verification as a fallback to work around
    /// async-stripe version incompatibility with newer Stripe API
    /// versions. Any verification failure is fail-closed: no state change,
    /// `WebhookSignatureInvalid` to the caller.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        let webhook_secret = &self.stripe.config().webhook_secret;

        match Webhook::construct_event(payload, signature, webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::warn!(
                    stripe_error = %e,
                    "Standard webhook parsing failed, trying manual verification"
                );
            }
        }

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| {
                tracing::error!("System time error: {}", e);
                BillingError::WebhookSignatureInvalid
            })?
            .as_secs() as i64;

        verify_signature(payload, signature, webhook_secret, now)?;

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::WebhookSignatureInvalid
        })?;

        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "Manual webhook verification succeeded"
        );

        Ok(event)
    }

    /// Handle a verified Stripe event.
    ///
    /// Store failures on state-changing transitions propagate so Stripe
    /// redelivers; observational events and unmappable events always
    /// acknowledge.
    pub async fn handle_event(&self, event: Event) -> BillingResult<()> {
        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "Processing Stripe webhook event"
        );

        match WebhookEventKind::classify(&event.type_) {
            WebhookEventKind::CheckoutCompleted => self.handle_checkout_completed(event).await,
            WebhookEventKind::SubscriptionUpdated => self.handle_subscription_updated(event).await,
            WebhookEventKind::SubscriptionDeleted => self.handle_subscription_deleted(event).await,
            WebhookEventKind::InvoicePaymentSucceeded => {
                tracing::info!(event_id = %event.id, "Invoice payment succeeded");
                Ok(())
            }
            WebhookEventKind::InvoicePaymentFailed => {
                tracing::warn!(event_id = %event.id, "Invoice payment failed");
                Ok(())
            }
            WebhookEventKind::Unhandled => {
                // Track which events arrive without a handler; helps spot
                // new event types worth acting on
                tracing::info!(
                    event_type = %event.type_,
                    event_id = %event.id,
                    "Received unhandled Stripe event type"
                );
                Ok(())
            }
        }
    }

    async fn handle_checkout_completed(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let session = match event.data.object {
            EventObject::CheckoutSession(session) => session,
            _ => {
                return Err(BillingError::WebhookEventNotSupported(
                    "Expected CheckoutSession".to_string(),
                ))
            }
        };

        let metadata = session.metadata.clone().unwrap_or_default();

        let Some(client_id) = client_id_from_metadata(&metadata) else {
            // Untracked checkout (or metadata lost). Acknowledge so Stripe
            // does not redeliver an event we can never map.
            tracing::warn!(
                event_id = %event_id,
                session_id = %session.id,
                "checkout.session.completed without client_id metadata, acknowledging"
            );
            return Ok(());
        };

        let Some(tier) = metadata.get("tier").cloned() else {
            tracing::warn!(
                event_id = %event_id,
                client_id = %client_id,
                "checkout.session.completed without tier metadata, acknowledging"
            );
            return Ok(());
        };

        let customer_id = session.customer.as_ref().map(|c| c.id().to_string());
        let subscription_id = session.subscription.as_ref().map(|s| s.id().to_string());

        let (Some(customer_id), Some(subscription_id)) = (customer_id, subscription_id) else {
            tracing::warn!(
                event_id = %event_id,
                client_id = %client_id,
                "checkout.session.completed without customer/subscription ids, acknowledging"
            );
            return Ok(());
        };

        let transition = ClientTransition::Activated {
            client_id,
            tier,
            stripe_customer_id: customer_id,
            stripe_subscription_id: subscription_id,
        };

        // A store failure here must NOT acknowledge: losing this
        // transition leaves a paying customer marked inactive, so we let
        // Stripe retry delivery.
        let matched = transition.apply(&self.pool).await?;
        if !matched {
            tracing::warn!(
                event_id = %event_id,
                client_id = %client_id,
                "No client row matched checkout.session.completed, acknowledging"
            );
            return Ok(());
        }

        tracing::info!(
            event_id = %event_id,
            client_id = %client_id,
            "Checkout completed, client activated"
        );
        Ok(())
    }

    async fn handle_subscription_updated(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let subscription = extract_subscription(event)?;

        let Some(client_id) = client_id_from_metadata(&subscription.metadata) else {
            tracing::warn!(
                event_id = %event_id,
                subscription_id = %subscription.id,
                "customer.subscription.updated without client_id metadata, acknowledging"
            );
            return Ok(());
        };

        let transition = ClientTransition::StatusSynced {
            client_id,
            stripe_subscription_id: subscription.id.to_string(),
            status: status_from_subscription(subscription.status),
        };

        let matched = transition.apply(&self.pool).await?;
        if !matched {
            tracing::warn!(
                event_id = %event_id,
                client_id = %client_id,
                "No client row matched customer.subscription.updated, acknowledging"
            );
            return Ok(());
        }

        tracing::info!(
            event_id = %event_id,
            client_id = %client_id,
            subscription_id = %subscription.id,
            status = ?subscription.status,
            "Subscription updated, status synced"
        );
        Ok(())
    }

    async fn handle_subscription_deleted(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let subscription = extract_subscription(event)?;

        let Some(client_id) = client_id_from_metadata(&subscription.metadata) else {
            tracing::warn!(
                event_id = %event_id,
                subscription_id = %subscription.id,
                "customer.subscription.deleted without client_id metadata, acknowledging"
            );
            return Ok(());
        };

        let transition = ClientTransition::Deactivated { client_id };

        let matched = transition.apply(&self.pool).await?;
        if !matched {
            tracing::warn!(
                event_id = %event_id,
                client_id = %client_id,
                "No client row matched customer.subscription.deleted, acknowledging"
            );
            return Ok(());
        }

        tracing::info!(
            event_id = %event_id,
            client_id = %client_id,
            "Subscription deleted, client deactivated"
        );
        Ok(())
    }
}

/// Map a Stripe subscription status onto the two-state client status.
///
/// Only `active` counts; trialing, past_due, unpaid, and the rest all read
/// as inactive until Stripe reports the subscription active.
pub fn status_from_subscription(status: SubscriptionStatus) -> ClientStatus {
    if status == SubscriptionStatus::Active {
        ClientStatus::Active
    } else {
        ClientStatus::Inactive
    }
}

/// Resolve the target client from event metadata.
///
/// Transitions look up the client by the `client_id` embedded at checkout
/// time, never by Stripe customer id: metadata is the only identifier
/// guaranteed present from checkout through the subscription lifecycle.
fn client_id_from_metadata(metadata: &std::collections::HashMap<String, String>) -> Option<Uuid> {
    metadata
        .get("client_id")
        .and_then(|id| Uuid::parse_str(id).ok())
}

fn extract_subscription(event: Event) -> BillingResult<stripe::Subscription> {
    match event.data.object {
        EventObject::Subscription(subscription) => Ok(subscription),
        _ => Err(BillingError::WebhookEventNotSupported(
            "Expected Subscription".to_string(),
        )),
    }
}

/// Manually verify a Stripe signature header against the payload.
///
/// Header format: `t=<timestamp>,v1=<signature>[,v0=...]`. The signed
/// payload is `"{timestamp}.{payload}"` and the signature is HMAC-SHA256
/// under the webhook secret (with its `whsec_` prefix stripped).
fn verify_signature(
    payload: &str,
    signature: &str,
    webhook_secret: &str,
    now_epoch: i64,
) -> BillingResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in signature.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0] {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        tracing::error!("Missing timestamp in signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    let v1_signature = v1_signature.ok_or_else(|| {
        tracing::error!("Missing v1 signature in signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    if (now_epoch - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        tracing::error!(
            timestamp = timestamp,
            now = now_epoch,
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let secret_key = webhook_secret
        .strip_prefix("whsec_")
        .unwrap_or(webhook_secret);
    let signed_payload = format!("{}.{}", timestamp, payload);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|_| {
        tracing::error!("Invalid webhook secret key");
        BillingError::WebhookSignatureInvalid
    })?;
    mac.update(signed_payload.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed != v1_signature {
        tracing::error!("Webhook signature mismatch");
        return Err(BillingError::WebhookSignatureInvalid);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &str, secret: &str, timestamp: i64) -> String {
        let key = secret.strip_prefix("whsec_").unwrap_or(secret);
        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        format!(
            "t={},v1={}",
            timestamp,
            hex::encode(mac.finalize().into_bytes())
        )
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = r#"{"id":"evt_1","type":"invoice.payment_succeeded"}"#;
        let secret = "whsec_test_secret";
        let now = 1_700_000_000;

        let header = sign(payload, secret, now);
        assert!(verify_signature(payload, &header, secret, now).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = r#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;

        let header = sign(payload, "whsec_other_secret", now);
        let result = verify_signature(payload, &header, "whsec_test_secret", now);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let secret = "whsec_test_secret";
        let now = 1_700_000_000;

        let header = sign(r#"{"amount":100}"#, secret, now);
        let result = verify_signature(r#"{"amount":999}"#, &header, secret, now);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = r#"{"id":"evt_1"}"#;
        let secret = "whsec_test_secret";
        let signed_at = 1_700_000_000;

        let header = sign(payload, secret, signed_at);
        // Delivered six minutes later
        let result = verify_signature(payload, &header, secret, signed_at + 360);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let payload = r#"{"id":"evt_1"}"#;
        let secret = "whsec_test_secret";
        let now = 1_700_000_000;

        for header in ["", "garbage", "t=notanumber,v1=abc", "v1=abc", "t=1700000000"] {
            let result = verify_signature(payload, header, secret, now);
            assert!(
                matches!(result, Err(BillingError::WebhookSignatureInvalid)),
                "header {:?} should be rejected",
                header
            );
        }
    }
}
