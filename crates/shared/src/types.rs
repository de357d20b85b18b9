//! Core domain types
//!
//! The service tier table is the single source of truth for tier names,
//! display copy, and monthly pricing. Checkout line items and tier
//! validation both read from it.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Service tiers offered by Apex Operations.
///
/// Each tier maps to a fixed monthly recurring price. There is no free
/// tier: a client with no completed checkout has `status = inactive` and
/// whatever tier they last selected (or were seeded with).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceTier {
    /// Entry level: compliance monitoring and quarterly audit prep
    Wingman,
    /// Mid level: adds driver file management and CSA score tracking
    Guardian,
    /// Full service: dedicated compliance officer and audit representation
    ApexCommand,
}

impl ServiceTier {
    /// All tiers, in ascending price order
    pub fn all() -> &'static [ServiceTier] {
        &[
            ServiceTier::Wingman,
            ServiceTier::Guardian,
            ServiceTier::ApexCommand,
        ]
    }

    /// Parse a tier from its wire name. Returns None for unknown tiers.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "wingman" => Some(ServiceTier::Wingman),
            "guardian" => Some(ServiceTier::Guardian),
            "apex_command" => Some(ServiceTier::ApexCommand),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceTier::Wingman => "wingman",
            ServiceTier::Guardian => "guardian",
            ServiceTier::ApexCommand => "apex_command",
        }
    }

    /// Human-readable name used on checkout line items
    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceTier::Wingman => "Wingman",
            ServiceTier::Guardian => "Guardian",
            ServiceTier::ApexCommand => "Apex Command",
        }
    }

    /// Line-item description shown on the hosted checkout page
    pub fn description(&self) -> &'static str {
        match self {
            ServiceTier::Wingman => {
                "DOT compliance monitoring, quarterly audit prep, and on-call guidance"
            }
            ServiceTier::Guardian => {
                "Everything in Wingman plus driver qualification file management and CSA score tracking"
            }
            ServiceTier::ApexCommand => {
                "Full-service compliance: dedicated compliance officer, audit representation, and priority response"
            }
        }
    }

    /// Monthly recurring price in cents
    pub fn monthly_price_cents(&self) -> i64 {
        match self {
            ServiceTier::Wingman => 19_700,
            ServiceTier::Guardian => 39_700,
            ServiceTier::ApexCommand => 79_700,
        }
    }
}

impl std::fmt::Display for ServiceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing status of a client record.
///
/// Derived from the subscription lifecycle; only the webhook processor
/// writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    Active,
    Inactive,
}

impl ClientStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ClientStatus::Active),
            "inactive" => Some(ClientStatus::Inactive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStatus::Active => "active",
            ClientStatus::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One paying customer, as stored in the `clients` table.
///
/// `tier` and `status` are kept as text columns; the enums above validate
/// them at the edges. `stripe_customer_id` and `stripe_subscription_id`
/// are set when checkout completes and the subscription id is cleared
/// when a deletion event is processed.
#[derive(Debug, Clone, FromRow)]
pub struct ClientRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_name: String,
    pub tier: String,
    pub status: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_round_trip() {
        for tier in ServiceTier::all() {
            assert_eq!(ServiceTier::from_str(tier.as_str()), Some(*tier));
        }
    }

    #[test]
    fn test_tier_rejects_unknown() {
        assert_eq!(ServiceTier::from_str("enterprise"), None);
        assert_eq!(ServiceTier::from_str("Wingman"), None); // case-sensitive
        assert_eq!(ServiceTier::from_str(""), None);
        assert_eq!(ServiceTier::from_str("apex-command"), None);
    }

    #[test]
    fn test_tier_prices_ascend() {
        let prices: Vec<i64> = ServiceTier::all()
            .iter()
            .map(|t| t.monthly_price_cents())
            .collect();
        assert!(prices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(ClientStatus::from_str("active"), Some(ClientStatus::Active));
        assert_eq!(
            ClientStatus::from_str("inactive"),
            Some(ClientStatus::Inactive)
        );
        assert_eq!(ClientStatus::from_str("canceled"), None);
    }
}
