//! Subscription status reads and cancellation
//!
//! Read-through and mutate-through wrappers over the Stripe API. Nothing
//! in this module writes `status` or `stripe_subscription_id`: the stored
//! record is only ever changed by the webhook processor, so the store can
//! be transiently stale between a provider-side change and the webhook
//! that reports it.

use sqlx::PgPool;
use stripe::{Subscription, SubscriptionId, SubscriptionStatus, UpdateSubscription};
use time::OffsetDateTime;
use uuid::Uuid;

use apexops_shared::ClientRecord;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Live projection of a Stripe subscription, fetched on demand.
///
/// Never persisted; the client record caches only `status` and the
/// subscription id.
#[derive(Debug, Clone)]
pub struct SubscriptionProjection {
    pub status: String,
    pub current_period_end: OffsetDateTime,
    pub cancel_at_period_end: bool,
    pub trial_end: Option<OffsetDateTime>,
}

/// Store-derived billing state plus the best-effort live projection
#[derive(Debug, Clone)]
pub struct ClientBillingStatus {
    pub client_id: Uuid,
    pub tier: String,
    pub status: String,
    pub subscription: Option<SubscriptionProjection>,
}

/// Outcome of a deferred cancellation
#[derive(Debug, Clone)]
pub struct CancellationOutcome {
    /// When the subscription actually ends (current period end)
    pub cancel_at: OffsetDateTime,
}

/// Subscription service: status reads and cancellation
pub struct SubscriptionService {
    stripe: StripeClient,
    pool: PgPool,
}

impl SubscriptionService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Look up the client record for an authenticated user.
    pub async fn client_for_user(&self, user_id: Uuid) -> BillingResult<Option<ClientRecord>> {
        let client: Option<ClientRecord> = sqlx::query_as(
            r#"
            SELECT id, user_id, company_name, tier, status,
                   stripe_customer_id, stripe_subscription_id
            FROM clients
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    /// Current billing status for a client.
    ///
    /// Store fields are authoritative for `status`/`tier`. When a
    /// subscription id is on file the live Stripe projection is attached;
    /// a failed live fetch degrades to `subscription: None` instead of
    /// failing the request.
    pub async fn subscription_status(
        &self,
        client: &ClientRecord,
    ) -> BillingResult<ClientBillingStatus> {
        let subscription = match &client.stripe_subscription_id {
            Some(sub_id) => match self.retrieve_projection(sub_id).await {
                Ok(projection) => Some(projection),
                Err(e) => {
                    tracing::warn!(
                        client_id = %client.id,
                        subscription_id = %sub_id,
                        error = %e,
                        "Live subscription fetch failed, returning store state only"
                    );
                    None
                }
            },
            None => None,
        };

        Ok(ClientBillingStatus {
            client_id: client.id,
            tier: client.tier.clone(),
            status: client.status.clone(),
            subscription,
        })
    }

    /// Schedule cancellation at the end of the paid period.
    ///
    /// The customer retains access until `cancel_at`; the local record is
    /// flipped later by the `customer.subscription.deleted` (or updated)
    /// webhook when the period actually ends.
    pub async fn cancel_at_period_end(
        &self,
        client: &ClientRecord,
    ) -> BillingResult<CancellationOutcome> {
        let sub_id = client
            .stripe_subscription_id
            .as_deref()
            .ok_or(BillingError::NoActiveSubscription)?;

        let sub_id = sub_id
            .parse::<SubscriptionId>()
            .map_err(|e| BillingError::Internal(format!("Invalid subscription ID: {}", e)))?;

        let subscription =
            Subscription::update(self.stripe.inner(), &sub_id, cancel_update_params()).await?;

        let cancel_at = OffsetDateTime::from_unix_timestamp(subscription.current_period_end)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());

        tracing::info!(
            client_id = %client.id,
            subscription_id = %subscription.id,
            cancel_at = %cancel_at,
            "Subscription set to cancel at period end"
        );

        Ok(CancellationOutcome { cancel_at })
    }

    async fn retrieve_projection(&self, sub_id: &str) -> BillingResult<SubscriptionProjection> {
        let sub_id = sub_id
            .parse::<SubscriptionId>()
            .map_err(|e| BillingError::Internal(format!("Invalid subscription ID: {}", e)))?;

        let subscription = Subscription::retrieve(self.stripe.inner(), &sub_id, &[]).await?;

        Ok(SubscriptionProjection {
            status: stripe_status_str(subscription.status).to_string(),
            current_period_end: OffsetDateTime::from_unix_timestamp(
                subscription.current_period_end,
            )
            .unwrap_or_else(|_| OffsetDateTime::now_utc()),
            cancel_at_period_end: subscription.cancel_at_period_end,
            trial_end: subscription
                .trial_end
                .and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok()),
        })
    }
}

/// Update params for deferred cancellation.
///
/// Sets `cancel_at_period_end` and nothing else; in particular there is no
/// local status write anywhere on this path.
fn cancel_update_params() -> UpdateSubscription<'static> {
    let mut params = UpdateSubscription::new();
    params.cancel_at_period_end = Some(true);
    params
}

fn stripe_status_str(status: SubscriptionStatus) -> &'static str {
    match status {
        SubscriptionStatus::Active => "active",
        SubscriptionStatus::PastDue => "past_due",
        SubscriptionStatus::Canceled => "canceled",
        SubscriptionStatus::Unpaid => "unpaid",
        SubscriptionStatus::Trialing => "trialing",
        SubscriptionStatus::Incomplete => "incomplete",
        SubscriptionStatus::IncompleteExpired => "incomplete_expired",
        SubscriptionStatus::Paused => "paused",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_deferred_not_immediate() {
        let params = cancel_update_params();
        assert_eq!(params.cancel_at_period_end, Some(true));
        // No proration, item, or metadata changes ride along
        assert!(params.items.is_none());
        assert!(params.metadata.is_none());
        assert!(params.proration_behavior.is_none());
    }

    #[test]
    fn test_stripe_status_mapping() {
        assert_eq!(stripe_status_str(SubscriptionStatus::Active), "active");
        assert_eq!(stripe_status_str(SubscriptionStatus::Trialing), "trialing");
        assert_eq!(stripe_status_str(SubscriptionStatus::PastDue), "past_due");
    }
}
