//! Persistence contract for the ledger core.
//!
//! Every method is one atomic operation: implementations must make the
//! whole read-modify-write commit or roll back as a unit, and serialize
//! conflicting operations on the same row. `PgStore` does this with
//! database transactions and row-level locks; `MemStore` holds a single
//! async mutex across each call, which is the serializable limit of the
//! same model and is what the test suite runs against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    Investment, Payout, Plan, Referral, ReviewAction, Transaction, TxKind,
};
use crate::error::CoreResult;

mod memory;
mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

/// Bounded retries for ledger-reference collisions on insert.
pub(crate) const REFERENCE_RETRIES: usize = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct NewPlan {
    pub name: String,
    pub min_deposit: Decimal,
    pub max_deposit: Decimal,
    pub profit_rate: Decimal,
    pub duration_days: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanUpdate {
    pub name: Option<String>,
    pub min_deposit: Option<Decimal>,
    pub max_deposit: Option<Decimal>,
    pub profit_rate: Option<Decimal>,
    pub duration_days: Option<i32>,
    pub is_active: Option<bool>,
}

/// Investment row to insert, with terms already computed by the engine.
#[derive(Debug, Clone)]
pub struct NewInvestment {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub amount_invested: Decimal,
    pub profit_expected: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReferral {
    pub referrer_id: Uuid,
    pub referred_id: Uuid,
    pub bonus_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralStats {
    pub total_invited: i64,
    pub confirmed: i64,
    pub pending: i64,
    pub cancelled: i64,
    pub total_bonus_earned: Decimal,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // --- ledger transactions ---

    /// Insert a pending deposit with a freshly generated reference.
    async fn insert_deposit(&self, user_id: Uuid, amount: Decimal) -> CoreResult<Transaction>;

    /// Insert a pending withdrawal, re-validating the available balance
    /// inside the same transactional boundary under a per-user lock.
    /// Fails with `InsufficientBalance` rather than overdrawing.
    async fn insert_withdrawal_guarded(
        &self,
        user_id: Uuid,
        amount: Decimal,
    ) -> CoreResult<Transaction>;

    /// Row-locked review: pending -> approved | rejected, one caller wins.
    async fn review_transaction(
        &self,
        id: Uuid,
        expected_kind: TxKind,
        action: &ReviewAction,
    ) -> CoreResult<Transaction>;

    async fn transactions_for_user(
        &self,
        user_id: Uuid,
        kind: TxKind,
    ) -> CoreResult<Vec<Transaction>>;

    async fn pending_transactions(&self, kind: TxKind) -> CoreResult<Vec<Transaction>>;

    /// The wallet balance: approved deposits - approved withdrawals -
    /// approved payouts. Always recomputed from ledger rows.
    async fn balance(&self, user_id: Uuid) -> CoreResult<Decimal>;

    /// Balance minus pending withdrawals and pending payouts; this is the
    /// figure the overdraw guards check against.
    async fn available_balance(&self, user_id: Uuid) -> CoreResult<Decimal>;

    // --- payouts ---

    async fn insert_payout_guarded(
        &self,
        user_id: Uuid,
        amount: Decimal,
        method: String,
        notes: Option<String>,
    ) -> CoreResult<Payout>;

    /// On approval `transaction_reference` is persisted; on rejection the
    /// reason lands in `notes`.
    async fn review_payout(
        &self,
        id: Uuid,
        action: &ReviewAction,
        transaction_reference: Option<String>,
    ) -> CoreResult<Payout>;

    async fn payouts_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Payout>>;

    async fn pending_payouts(&self) -> CoreResult<Vec<Payout>>;

    // --- plans ---

    async fn insert_plan(&self, new: NewPlan) -> CoreResult<Plan>;

    async fn update_plan(&self, id: Uuid, update: PlanUpdate) -> CoreResult<Plan>;

    async fn plan(&self, id: Uuid) -> CoreResult<Plan>;

    async fn active_plans(&self) -> CoreResult<Vec<Plan>>;

    // --- investments ---

    /// Insert the investment and its linked pending deposit atomically:
    /// both rows commit or neither does.
    async fn insert_investment_with_deposit(
        &self,
        new: NewInvestment,
    ) -> CoreResult<(Investment, Transaction)>;

    /// Investments joined eagerly with their plans (no lazy traversal).
    async fn investments_with_plans(&self, user_id: Uuid)
        -> CoreResult<Vec<(Investment, Plan)>>;

    // --- referrals ---

    /// Insert a pending referral; the (referrer, referred) pair is unique.
    async fn insert_referral(&self, new: NewReferral) -> CoreResult<Referral>;

    /// Settlement: atomically set confirmed + notes and insert exactly one
    /// completed referral-bonus transaction for the referrer.
    async fn confirm_referral(
        &self,
        id: Uuid,
        notes: Option<String>,
    ) -> CoreResult<(Referral, Transaction)>;

    /// Pending -> cancelled; no ledger mutation.
    async fn cancel_referral(&self, id: Uuid, notes: Option<String>) -> CoreResult<Referral>;

    async fn referrals_for_referrer(&self, referrer_id: Uuid) -> CoreResult<Vec<Referral>>;

    async fn pending_referrals(&self) -> CoreResult<Vec<Referral>>;

    async fn referral_stats(&self, referrer_id: Uuid) -> CoreResult<ReferralStats>;
}
