// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Billing Core
//!
//! Tests critical boundary conditions in:
//! - Tier validation (no Stripe call for unknown tiers)
//! - Webhook transition derivation (idempotency, scenario tables)
//! - Event kind classification (closed dispatch)

#[cfg(test)]
mod tier_validation_tests {
    use crate::checkout::CheckoutService;
    use crate::client::{StripeClient, StripeConfig};
    use crate::error::BillingError;
    use apexops_shared::{ClientRecord, ServiceTier};
    use uuid::Uuid;

    fn offline_checkout_service() -> CheckoutService {
        // Dummy credentials: a request with these would fail, which is the
        // point - validation must reject before any request is made.
        CheckoutService::new(StripeClient::new(StripeConfig {
            secret_key: "sk_test_offline".to_string(),
            webhook_secret: "whsec_offline".to_string(),
            frontend_url: "https://apexops.example.com".to_string(),
        }))
    }

    fn inactive_client() -> ClientRecord {
        ClientRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            company_name: "Longhaul Freight Co".to_string(),
            tier: "wingman".to_string(),
            status: "inactive".to_string(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
        }
    }

    // =========================================================================
    // Unknown tier strings are rejected before any provider call
    // =========================================================================
    #[tokio::test]
    async fn test_unknown_tier_rejected_without_stripe_call() {
        let service = offline_checkout_service();
        let client = inactive_client();

        for tier in ["platinum", "free", "WINGMAN", "apex-command", ""] {
            let result = service
                .create_subscription_checkout(&client, "ops@longhaul.example", tier, None, None)
                .await;
            match result {
                Err(BillingError::InvalidTier(t)) => assert_eq!(t, tier),
                other => panic!("tier {:?} should be InvalidTier, got {:?}", tier, other.err()),
            }
        }
    }

    #[test]
    fn test_every_tier_in_table_is_valid() {
        for tier in ServiceTier::all() {
            assert_eq!(ServiceTier::from_str(tier.as_str()), Some(*tier));
            assert!(tier.monthly_price_cents() > 0);
            assert!(!tier.display_name().is_empty());
            assert!(!tier.description().is_empty());
        }
    }
}

#[cfg(test)]
mod transition_tests {
    use crate::webhooks::{status_from_subscription, ClientTransition};
    use apexops_shared::ClientStatus;
    use stripe::SubscriptionStatus;
    use uuid::Uuid;

    // =========================================================================
    // checkout.session.completed: inactive client becomes active with ids
    // =========================================================================
    #[test]
    fn test_checkout_completed_transition_fields() {
        let client_id = Uuid::new_v4();
        let transition = ClientTransition::Activated {
            client_id,
            tier: "wingman".to_string(),
            stripe_customer_id: "cus_1".to_string(),
            stripe_subscription_id: "sub_1".to_string(),
        };

        assert_eq!(transition.client_id(), client_id);
        match transition {
            ClientTransition::Activated {
                tier,
                stripe_customer_id,
                stripe_subscription_id,
                ..
            } => {
                assert_eq!(tier, "wingman");
                assert_eq!(stripe_customer_id, "cus_1");
                assert_eq!(stripe_subscription_id, "sub_1");
            }
            other => panic!("expected Activated, got {:?}", other),
        }
    }

    // =========================================================================
    // At-least-once delivery: deriving the same event twice yields the
    // same transition value (last-write-wins makes the second apply a no-op)
    // =========================================================================
    #[test]
    fn test_same_event_derives_identical_transition() {
        let client_id = Uuid::new_v4();
        let build = || ClientTransition::Activated {
            client_id,
            tier: "guardian".to_string(),
            stripe_customer_id: "cus_1".to_string(),
            stripe_subscription_id: "sub_1".to_string(),
        };

        assert_eq!(build(), build());
    }

    // =========================================================================
    // customer.subscription.deleted: active client becomes inactive and the
    // subscription id is cleared
    // =========================================================================
    #[test]
    fn test_subscription_deleted_transition() {
        let client_id = Uuid::new_v4();
        let transition = ClientTransition::Deactivated { client_id };
        assert_eq!(transition.client_id(), client_id);
        assert_eq!(transition, ClientTransition::Deactivated { client_id });
    }

    // =========================================================================
    // customer.subscription.updated: status recomputed from provider state;
    // only "active" reads as active
    // =========================================================================
    #[test]
    fn test_only_active_provider_status_is_active() {
        assert_eq!(
            status_from_subscription(SubscriptionStatus::Active),
            ClientStatus::Active
        );

        for status in [
            SubscriptionStatus::Trialing,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Unpaid,
            SubscriptionStatus::Incomplete,
            SubscriptionStatus::IncompleteExpired,
            SubscriptionStatus::Paused,
        ] {
            assert_eq!(
                status_from_subscription(status),
                ClientStatus::Inactive,
                "{:?} should read as inactive",
                status
            );
        }
    }

    #[test]
    fn test_status_synced_transition_carries_event_subscription_id() {
        let client_id = Uuid::new_v4();
        let transition = ClientTransition::StatusSynced {
            client_id,
            stripe_subscription_id: "sub_2".to_string(),
            status: ClientStatus::Inactive,
        };

        match transition {
            ClientTransition::StatusSynced {
                stripe_subscription_id,
                status,
                ..
            } => {
                assert_eq!(stripe_subscription_id, "sub_2");
                assert_eq!(status, ClientStatus::Inactive);
            }
            other => panic!("expected StatusSynced, got {:?}", other),
        }
    }
}

#[cfg(test)]
mod event_kind_tests {
    use crate::webhooks::WebhookEventKind;
    use stripe::EventType;

    #[test]
    fn test_handled_event_kinds() {
        assert_eq!(
            WebhookEventKind::classify(&EventType::CheckoutSessionCompleted),
            WebhookEventKind::CheckoutCompleted
        );
        assert_eq!(
            WebhookEventKind::classify(&EventType::CustomerSubscriptionUpdated),
            WebhookEventKind::SubscriptionUpdated
        );
        assert_eq!(
            WebhookEventKind::classify(&EventType::CustomerSubscriptionDeleted),
            WebhookEventKind::SubscriptionDeleted
        );
        assert_eq!(
            WebhookEventKind::classify(&EventType::InvoicePaymentSucceeded),
            WebhookEventKind::InvoicePaymentSucceeded
        );
        assert_eq!(
            WebhookEventKind::classify(&EventType::InvoicePaymentFailed),
            WebhookEventKind::InvoicePaymentFailed
        );
    }

    #[test]
    fn test_everything_else_is_unhandled() {
        for event_type in [
            EventType::CustomerCreated,
            EventType::CustomerSubscriptionCreated,
            EventType::InvoicePaid,
            EventType::ChargeRefunded,
            EventType::PaymentIntentCreated,
        ] {
            assert_eq!(
                WebhookEventKind::classify(&event_type),
                WebhookEventKind::Unhandled,
                "{:?} should be observational only",
                event_type
            );
        }
    }
}
