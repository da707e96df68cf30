//! In-memory [`LedgerStore`] used by the test suite.
//!
//! One async mutex guards all tables and is held across each whole
//! operation, so every call is atomic and fully serialized with respect
//! to every other call. Semantics mirror `PgStore` row for row.

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use async_trait::async_trait;

use crate::domain::{
    generate_reference, Investment, InvestmentStatus, Payout, PayoutStatus, Plan, Referral,
    ReferralStatus, ReviewAction, Transaction, TxKind, TxStatus,
};
use crate::error::{CoreError, CoreResult};

use super::{
    LedgerStore, NewInvestment, NewPlan, NewReferral, PlanUpdate, ReferralStats,
};

#[derive(Default)]
struct Tables {
    transactions: Vec<Transaction>,
    payouts: Vec<Payout>,
    plans: Vec<Plan>,
    investments: Vec<Investment>,
    referrals: Vec<Referral>,
}

#[derive(Default)]
pub struct MemStore {
    tables: Mutex<Tables>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn unique_reference(&self) -> String {
        // Same bounded-retry contract as the UNIQUE column in Postgres.
        for _ in 0..super::REFERENCE_RETRIES {
            let reference = generate_reference(Utc::now());
            if !self.transactions.iter().any(|t| t.reference == reference) {
                return reference;
            }
        }
        // 36^12 suffixes; three straight collisions means a broken RNG.
        unreachable!("exhausted reference generation retries")
    }

    fn push_transaction(
        &mut self,
        user_id: Uuid,
        kind: TxKind,
        amount: Decimal,
        status: TxStatus,
    ) -> Transaction {
        let now = Utc::now();
        let tx = Transaction {
            id: Uuid::new_v4(),
            user_id,
            kind,
            amount,
            status,
            transaction_date: now,
            reference: self.unique_reference(),
            created_at: now,
            updated_at: now,
        };
        self.transactions.push(tx.clone());
        tx
    }

    fn balance(&self, user_id: Uuid) -> Decimal {
        let sum = |kind: TxKind| -> Decimal {
            self.transactions
                .iter()
                .filter(|t| t.user_id == user_id && t.kind == kind && t.status == TxStatus::Approved)
                .map(|t| t.amount)
                .sum()
        };
        let approved_payouts: Decimal = self
            .payouts
            .iter()
            .filter(|p| p.user_id == user_id && p.status == PayoutStatus::Approved)
            .map(|p| p.amount)
            .sum();
        sum(TxKind::Deposit) - sum(TxKind::Withdrawal) - approved_payouts
    }

    fn available_balance(&self, user_id: Uuid) -> Decimal {
        let pending_withdrawals: Decimal = self
            .transactions
            .iter()
            .filter(|t| {
                t.user_id == user_id
                    && t.kind == TxKind::Withdrawal
                    && t.status == TxStatus::Pending
            })
            .map(|t| t.amount)
            .sum();
        let pending_payouts: Decimal = self
            .payouts
            .iter()
            .filter(|p| p.user_id == user_id && p.status == PayoutStatus::Pending)
            .map(|p| p.amount)
            .sum();
        self.balance(user_id) - pending_withdrawals - pending_payouts
    }
}

#[async_trait]
impl LedgerStore for MemStore {
    async fn insert_deposit(&self, user_id: Uuid, amount: Decimal) -> CoreResult<Transaction> {
        let mut tables = self.tables.lock().await;
        Ok(tables.push_transaction(user_id, TxKind::Deposit, amount, TxStatus::Pending))
    }

    async fn insert_withdrawal_guarded(
        &self,
        user_id: Uuid,
        amount: Decimal,
    ) -> CoreResult<Transaction> {
        let mut tables = self.tables.lock().await;
        let available = tables.available_balance(user_id);
        if amount > available {
            return Err(CoreError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        Ok(tables.push_transaction(user_id, TxKind::Withdrawal, amount, TxStatus::Pending))
    }

    async fn review_transaction(
        &self,
        id: Uuid,
        expected_kind: TxKind,
        action: &ReviewAction,
    ) -> CoreResult<Transaction> {
        let mut tables = self.tables.lock().await;
        let tx = tables
            .transactions
            .iter_mut()
            .find(|t| t.id == id && t.kind == expected_kind)
            .ok_or_else(|| CoreError::not_found("transaction", id))?;
        let next = tx
            .status
            .reviewed(action)
            .ok_or_else(|| CoreError::invalid_state("transaction", id, format!("status is {}", tx.status)))?;
        tx.status = next;
        tx.updated_at = Utc::now();
        Ok(tx.clone())
    }

    async fn transactions_for_user(
        &self,
        user_id: Uuid,
        kind: TxKind,
    ) -> CoreResult<Vec<Transaction>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<_> = tables
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id && t.kind == kind)
            .cloned()
            .collect();
        rows.reverse(); // newest first, as the SQL ORDER BY created_at DESC
        Ok(rows)
    }

    async fn pending_transactions(&self, kind: TxKind) -> CoreResult<Vec<Transaction>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<_> = tables
            .transactions
            .iter()
            .filter(|t| t.kind == kind && t.status == TxStatus::Pending)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }

    async fn balance(&self, user_id: Uuid) -> CoreResult<Decimal> {
        Ok(self.tables.lock().await.balance(user_id))
    }

    async fn available_balance(&self, user_id: Uuid) -> CoreResult<Decimal> {
        Ok(self.tables.lock().await.available_balance(user_id))
    }

    async fn insert_payout_guarded(
        &self,
        user_id: Uuid,
        amount: Decimal,
        method: String,
        notes: Option<String>,
    ) -> CoreResult<Payout> {
        let mut tables = self.tables.lock().await;
        let available = tables.available_balance(user_id);
        if amount > available {
            return Err(CoreError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        let now = Utc::now();
        let payout = Payout {
            id: Uuid::new_v4(),
            user_id,
            amount,
            method,
            status: PayoutStatus::Pending,
            transaction_reference: None,
            notes,
            created_at: now,
            updated_at: now,
        };
        tables.payouts.push(payout.clone());
        Ok(payout)
    }

    async fn review_payout(
        &self,
        id: Uuid,
        action: &ReviewAction,
        transaction_reference: Option<String>,
    ) -> CoreResult<Payout> {
        let mut tables = self.tables.lock().await;
        let payout = tables
            .payouts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| CoreError::not_found("payout", id))?;
        let next = payout.status.reviewed(action).ok_or_else(|| {
            CoreError::invalid_state("payout", id, format!("status is {:?}", payout.status))
        })?;
        payout.status = next;
        match action {
            ReviewAction::Approve => payout.transaction_reference = transaction_reference,
            ReviewAction::Reject { reason } => payout.notes = reason.clone(),
        }
        payout.updated_at = Utc::now();
        Ok(payout.clone())
    }

    async fn payouts_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Payout>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<_> = tables
            .payouts
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }

    async fn pending_payouts(&self) -> CoreResult<Vec<Payout>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<_> = tables
            .payouts
            .iter()
            .filter(|p| p.status == PayoutStatus::Pending)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }

    async fn insert_plan(&self, new: NewPlan) -> CoreResult<Plan> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let plan = Plan {
            id: Uuid::new_v4(),
            name: new.name,
            min_deposit: new.min_deposit,
            max_deposit: new.max_deposit,
            profit_rate: new.profit_rate,
            duration_days: new.duration_days,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.plans.push(plan.clone());
        Ok(plan)
    }

    async fn update_plan(&self, id: Uuid, update: PlanUpdate) -> CoreResult<Plan> {
        let mut tables = self.tables.lock().await;
        let plan = tables
            .plans
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| CoreError::not_found("plan", id))?;
        if let Some(name) = update.name {
            plan.name = name;
        }
        if let Some(min_deposit) = update.min_deposit {
            plan.min_deposit = min_deposit;
        }
        if let Some(max_deposit) = update.max_deposit {
            plan.max_deposit = max_deposit;
        }
        if let Some(profit_rate) = update.profit_rate {
            plan.profit_rate = profit_rate;
        }
        if let Some(duration_days) = update.duration_days {
            plan.duration_days = duration_days;
        }
        if let Some(is_active) = update.is_active {
            plan.is_active = is_active;
        }
        plan.updated_at = Utc::now();
        Ok(plan.clone())
    }

    async fn plan(&self, id: Uuid) -> CoreResult<Plan> {
        let tables = self.tables.lock().await;
        tables
            .plans
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("plan", id))
    }

    async fn active_plans(&self) -> CoreResult<Vec<Plan>> {
        let tables = self.tables.lock().await;
        Ok(tables.plans.iter().filter(|p| p.is_active).cloned().collect())
    }

    async fn insert_investment_with_deposit(
        &self,
        new: NewInvestment,
    ) -> CoreResult<(Investment, Transaction)> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let investment = Investment {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            plan_id: new.plan_id,
            amount_invested: new.amount_invested,
            profit_expected: new.profit_expected,
            start_date: new.start_date,
            end_date: new.end_date,
            status: InvestmentStatus::Active,
            created_at: now,
            updated_at: now,
        };
        tables.investments.push(investment.clone());
        let deposit = tables.push_transaction(
            new.user_id,
            TxKind::Deposit,
            new.amount_invested,
            TxStatus::Pending,
        );
        Ok((investment, deposit))
    }

    async fn investments_with_plans(
        &self,
        user_id: Uuid,
    ) -> CoreResult<Vec<(Investment, Plan)>> {
        let tables = self.tables.lock().await;
        let mut rows = Vec::new();
        for investment in tables.investments.iter().rev() {
            if investment.user_id != user_id {
                continue;
            }
            let plan = tables
                .plans
                .iter()
                .find(|p| p.id == investment.plan_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found("plan", investment.plan_id))?;
            rows.push((investment.clone(), plan));
        }
        Ok(rows)
    }

    async fn insert_referral(&self, new: NewReferral) -> CoreResult<Referral> {
        let mut tables = self.tables.lock().await;
        let duplicate = tables
            .referrals
            .iter()
            .any(|r| r.referrer_id == new.referrer_id && r.referred_id == new.referred_id);
        if duplicate {
            return Err(CoreError::validation(
                "referred_id",
                "user already referred by this referrer",
            ));
        }
        let now = Utc::now();
        let referral = Referral {
            id: Uuid::new_v4(),
            referrer_id: new.referrer_id,
            referred_id: new.referred_id,
            bonus_amount: new.bonus_amount,
            status: ReferralStatus::Pending,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        tables.referrals.push(referral.clone());
        Ok(referral)
    }

    async fn confirm_referral(
        &self,
        id: Uuid,
        notes: Option<String>,
    ) -> CoreResult<(Referral, Transaction)> {
        let mut tables = self.tables.lock().await;
        let referral = tables
            .referrals
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| CoreError::not_found("referral", id))?;
        let next = referral.status.confirmed().ok_or_else(|| {
            CoreError::invalid_state("referral", id, format!("status is {:?}", referral.status))
        })?;
        referral.status = next;
        referral.notes = notes;
        referral.updated_at = Utc::now();
        let referral = referral.clone();
        // Same mutex guard: the status flip and the bonus credit land together.
        let bonus = tables.push_transaction(
            referral.referrer_id,
            TxKind::ReferralBonus,
            referral.bonus_amount,
            TxStatus::Completed,
        );
        Ok((referral, bonus))
    }

    async fn cancel_referral(&self, id: Uuid, notes: Option<String>) -> CoreResult<Referral> {
        let mut tables = self.tables.lock().await;
        let referral = tables
            .referrals
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| CoreError::not_found("referral", id))?;
        let next = referral.status.cancelled().ok_or_else(|| {
            CoreError::invalid_state("referral", id, format!("status is {:?}", referral.status))
        })?;
        referral.status = next;
        referral.notes = notes;
        referral.updated_at = Utc::now();
        Ok(referral.clone())
    }

    async fn referrals_for_referrer(&self, referrer_id: Uuid) -> CoreResult<Vec<Referral>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<_> = tables
            .referrals
            .iter()
            .filter(|r| r.referrer_id == referrer_id)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }

    async fn pending_referrals(&self) -> CoreResult<Vec<Referral>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<_> = tables
            .referrals
            .iter()
            .filter(|r| r.status == ReferralStatus::Pending)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }

    async fn referral_stats(&self, referrer_id: Uuid) -> CoreResult<ReferralStats> {
        let tables = self.tables.lock().await;
        let mine = || tables.referrals.iter().filter(|r| r.referrer_id == referrer_id);
        let count = |status: ReferralStatus| mine().filter(|r| r.status == status).count() as i64;
        Ok(ReferralStats {
            total_invited: mine().count() as i64,
            confirmed: count(ReferralStatus::Confirmed),
            pending: count(ReferralStatus::Pending),
            cancelled: count(ReferralStatus::Cancelled),
            total_bonus_earned: mine()
                .filter(|r| r.status == ReferralStatus::Confirmed)
                .map(|r| r.bonus_amount)
                .sum(),
        })
    }
}
