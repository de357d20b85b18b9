//! Checkout session creation
//!
//! Builds subscription-mode Stripe checkout sessions for a service tier.
//! The local store is never written here: the client record only changes
//! when the corresponding webhook event arrives, keeping the webhook
//! processor the single writer of billing status.

use std::collections::HashMap;

use apexops_shared::{ClientRecord, ServiceTier};
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData, CreateCheckoutSessionLineItemsPriceDataProductData,
    CreateCheckoutSessionLineItemsPriceDataRecurring,
    CreateCheckoutSessionLineItemsPriceDataRecurringInterval,
    CreateCheckoutSessionSubscriptionData, Currency,
};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Trial period granted on every new subscription
const TRIAL_PERIOD_DAYS: u32 = 30;

/// Response from creating a checkout session
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

/// Checkout service for starting subscriptions
pub struct CheckoutService {
    stripe: StripeClient,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Create a subscription-mode checkout session for `tier`.
    ///
    /// Metadata identifying the client is attached to BOTH the session and
    /// the subscription-to-be. The duplication is deliberate: session
    /// metadata is not reliably present on subsequent subscription
    /// lifecycle events, so the subscription's own metadata is what the
    /// webhook processor depends on end-to-end.
    pub async fn create_subscription_checkout(
        &self,
        client: &ClientRecord,
        email: &str,
        tier: &str,
        success_url: Option<String>,
        cancel_url: Option<String>,
    ) -> BillingResult<CheckoutResponse> {
        // Validate before touching the Stripe API
        let tier = ServiceTier::from_str(tier)
            .ok_or_else(|| BillingError::InvalidTier(tier.to_string()))?;

        let frontend = &self.stripe.config().frontend_url;
        let success_url =
            success_url.unwrap_or_else(|| format!("{}/portal/billing?checkout=success", frontend));
        let cancel_url =
            cancel_url.unwrap_or_else(|| format!("{}/portal/billing?checkout=cancelled", frontend));

        let metadata = checkout_metadata(client, tier);

        let line_items = vec![CreateCheckoutSessionLineItems {
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: Currency::USD,
                unit_amount: Some(tier.monthly_price_cents()),
                recurring: Some(CreateCheckoutSessionLineItemsPriceDataRecurring {
                    interval: CreateCheckoutSessionLineItemsPriceDataRecurringInterval::Month,
                    interval_count: None,
                }),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: format!("Apex Operations — {}", tier.display_name()),
                    description: Some(tier.description().to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            quantity: Some(1),
            ..Default::default()
        }];

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.customer_email = Some(email);
        params.line_items = Some(line_items);
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&cancel_url);
        params.metadata = Some(metadata.clone());
        params.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
            trial_period_days: Some(TRIAL_PERIOD_DAYS),
            metadata: Some(metadata),
            ..Default::default()
        });

        tracing::info!(
            client_id = %client.id,
            tier = %tier,
            "Creating Stripe checkout session"
        );

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        Ok(CheckoutResponse {
            session_id: session.id.to_string(),
            url: session.url,
        })
    }
}

/// Metadata binding a checkout (and its subscription) to a client record.
///
/// `client_id` is the key every webhook transition resolves the target row
/// by; the rest is for the Stripe dashboard.
fn checkout_metadata(client: &ClientRecord, tier: ServiceTier) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert("client_id".to_string(), client.id.to_string());
    metadata.insert("user_id".to_string(), client.user_id.to_string());
    metadata.insert("tier".to_string(), tier.as_str().to_string());
    metadata.insert("company_name".to_string(), client.company_name.clone());
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_client() -> ClientRecord {
        ClientRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            company_name: "Road Hawk Logistics".to_string(),
            tier: "wingman".to_string(),
            status: "inactive".to_string(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
        }
    }

    #[test]
    fn test_metadata_binds_client_and_tier() {
        let client = test_client();
        let metadata = checkout_metadata(&client, ServiceTier::Guardian);

        assert_eq!(metadata["client_id"], client.id.to_string());
        assert_eq!(metadata["user_id"], client.user_id.to_string());
        assert_eq!(metadata["tier"], "guardian");
        assert_eq!(metadata["company_name"], "Road Hawk Logistics");
    }
}
