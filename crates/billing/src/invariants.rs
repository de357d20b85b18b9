//! Billing invariants
//!
//! Runnable consistency checks over the `clients` table, useful after a
//! webhook replay or when reconciling against the Stripe dashboard.
//!
//! ## Design Principles
//!
//! 1. **Executable**: each invariant is a real SQL query
//! 2. **Explanatory**: violations carry enough context to debug
//! 3. **Non-destructive**: checks only read, never write
//!
//! Note the eventual-consistency caveat: a client can legitimately be
//! `inactive` while still holding a subscription id (past_due, trialing),
//! so that combination is NOT checked here. An `active` client without a
//! subscription id, however, is always wrong.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use apexops_shared::ServiceTier;

use crate::error::BillingResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Client(s) affected
    pub client_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - billing state is inconsistent with provider state
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct ClientIdRow {
    id: Uuid,
}

#[derive(Debug, sqlx::FromRow)]
struct UnknownTierRow {
    id: Uuid,
    tier: String,
}

#[derive(Debug, sqlx::FromRow)]
struct DuplicateSubRow {
    stripe_subscription_id: String,
    client_count: i64,
}

/// Service for running billing invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return a summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_active_has_subscription_id().await?);
        violations.extend(self.check_known_tier().await?);
        violations.extend(self.check_unique_subscription_id().await?);
        violations.extend(self.check_subscription_has_customer().await?);

        let checks_run = 4;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: an active client always has a subscription id.
    ///
    /// Activation only happens on checkout completion, which writes the
    /// subscription id in the same UPDATE.
    async fn check_active_has_subscription_id(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<ClientIdRow> = sqlx::query_as(
            r#"
            SELECT id FROM clients
            WHERE status = 'active' AND stripe_subscription_id IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![InvariantViolation {
            invariant: "active_has_subscription_id".to_string(),
            client_ids: rows.iter().map(|r| r.id).collect(),
            description: format!(
                "{} active client(s) have no Stripe subscription id",
                rows.len()
            ),
            severity: ViolationSeverity::Critical,
        }])
    }

    /// Invariant 2: every stored tier is in the fixed tier table.
    async fn check_known_tier(&self) -> BillingResult<Vec<InvariantViolation>> {
        let known: Vec<String> = ServiceTier::all()
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();

        let rows: Vec<UnknownTierRow> =
            sqlx::query_as("SELECT id, tier FROM clients WHERE tier <> ALL($1)")
                .bind(&known)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "known_tier".to_string(),
                client_ids: vec![row.id],
                description: format!("Client has unknown tier '{}'", row.tier),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 3: no two clients share a Stripe subscription id.
    async fn check_unique_subscription_id(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<DuplicateSubRow> = sqlx::query_as(
            r#"
            SELECT stripe_subscription_id, COUNT(*) as client_count
            FROM clients
            WHERE stripe_subscription_id IS NOT NULL
            GROUP BY stripe_subscription_id
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "unique_subscription_id".to_string(),
                client_ids: vec![],
                description: format!(
                    "Subscription {} is attached to {} clients",
                    row.stripe_subscription_id, row.client_count
                ),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 4: a subscription id never exists without a customer id.
    ///
    /// Both are written together on checkout completion; only the
    /// subscription id is cleared on deletion.
    async fn check_subscription_has_customer(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<ClientIdRow> = sqlx::query_as(
            r#"
            SELECT id FROM clients
            WHERE stripe_subscription_id IS NOT NULL AND stripe_customer_id IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![InvariantViolation {
            invariant: "subscription_has_customer".to_string(),
            client_ids: rows.iter().map(|r| r.id).collect(),
            description: format!(
                "{} client(s) hold a subscription id without a customer id",
                rows.len()
            ),
            severity: ViolationSeverity::Medium,
        }])
    }
}
