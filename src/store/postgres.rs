//! PostgreSQL [`LedgerStore`].
//!
//! Every multi-step mutation runs inside one `begin`/`commit` pair.
//! Read-modify-write sequences take `SELECT ... FOR UPDATE` on the row
//! they transition; the withdrawal/payout check-then-insert holds a
//! per-user advisory lock so concurrent requests from the same user
//! serialize and cannot overdraw.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::domain::{
    generate_reference, Investment, Payout, Plan, Referral, ReviewAction, Transaction, TxKind,
    TxStatus,
};
use crate::error::{CoreError, CoreResult};

use super::{
    LedgerStore, NewInvestment, NewPlan, NewReferral, PlanUpdate, ReferralStats,
    REFERENCE_RETRIES,
};

const TX_COLUMNS: &str =
    "id, user_id, kind, amount, status, transaction_date, reference, created_at, updated_at";
const PAYOUT_COLUMNS: &str =
    "id, user_id, amount, method, status, transaction_reference, notes, created_at, updated_at";
const PLAN_COLUMNS: &str =
    "id, name, min_deposit, max_deposit, profit_rate, duration_days, is_active, created_at, updated_at";
const REFERRAL_COLUMNS: &str =
    "id, referrer_id, referred_id, bonus_amount, status, notes, created_at, updated_at";
const INVESTMENT_COLUMNS: &str =
    "id, user_id, plan_id, amount_invested, profit_expected, start_date, end_date, status, created_at, updated_at";

/// Wallet balance: approved deposits - approved withdrawals - approved payouts.
const BALANCE_SQL: &str = r#"
SELECT
  COALESCE((SELECT SUM(amount) FROM transactions
            WHERE user_id = $1 AND kind = 'deposit' AND status = 'approved'), 0)
- COALESCE((SELECT SUM(amount) FROM transactions
            WHERE user_id = $1 AND kind = 'withdrawal' AND status = 'approved'), 0)
- COALESCE((SELECT SUM(amount) FROM payouts
            WHERE user_id = $1 AND status = 'approved'), 0)
"#;

/// Balance with pending withdrawals and payouts already reserved.
const AVAILABLE_SQL: &str = r#"
SELECT
  COALESCE((SELECT SUM(amount) FROM transactions
            WHERE user_id = $1 AND kind = 'deposit' AND status = 'approved'), 0)
- COALESCE((SELECT SUM(amount) FROM transactions
            WHERE user_id = $1 AND kind = 'withdrawal' AND status IN ('approved', 'pending')), 0)
- COALESCE((SELECT SUM(amount) FROM payouts
            WHERE user_id = $1 AND status IN ('approved', 'pending')), 0)
"#;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Advisory-lock key for a user: first 8 bytes of the UUID.
    fn user_lock_key(user_id: Uuid) -> i64 {
        let bytes = user_id.as_bytes();
        i64::from_be_bytes(bytes[..8].try_into().unwrap_or([0u8; 8]))
    }

    /// Insert a ledger row with a fresh reference. `ON CONFLICT DO NOTHING`
    /// keeps the enclosing transaction alive on a reference collision so
    /// the bounded retry can run inside it.
    async fn insert_transaction_on(
        conn: &mut PgConnection,
        user_id: Uuid,
        kind: TxKind,
        amount: Decimal,
        status: TxStatus,
    ) -> CoreResult<Transaction> {
        for _ in 0..REFERENCE_RETRIES {
            let reference = generate_reference(chrono::Utc::now());
            let inserted = sqlx::query_as::<_, Transaction>(&format!(
                r#"
                INSERT INTO transactions (user_id, kind, amount, status, transaction_date, reference)
                VALUES ($1, $2, $3, $4, CURRENT_TIMESTAMP, $5)
                ON CONFLICT (reference) DO NOTHING
                RETURNING {TX_COLUMNS}
                "#
            ))
            .bind(user_id)
            .bind(kind)
            .bind(amount)
            .bind(status)
            .bind(&reference)
            .fetch_optional(&mut *conn)
            .await?;

            if let Some(tx) = inserted {
                return Ok(tx);
            }
            tracing::warn!(reference, "ledger reference collided, regenerating");
        }
        Err(CoreError::Persistence(sqlx::Error::Protocol(
            "exhausted ledger reference retries".into(),
        )))
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn insert_deposit(&self, user_id: Uuid, amount: Decimal) -> CoreResult<Transaction> {
        let mut tx = self.pool.begin().await?;
        let deposit =
            Self::insert_transaction_on(&mut tx, user_id, TxKind::Deposit, amount, TxStatus::Pending)
                .await?;
        tx.commit().await?;
        Ok(deposit)
    }

    async fn insert_withdrawal_guarded(
        &self,
        user_id: Uuid,
        amount: Decimal,
    ) -> CoreResult<Transaction> {
        let mut tx = self.pool.begin().await?;

        // Serialize check-then-insert per user for the rest of this transaction.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(Self::user_lock_key(user_id))
            .execute(&mut *tx)
            .await?;

        let available: Decimal = sqlx::query_scalar(AVAILABLE_SQL)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        if amount > available {
            return Err(CoreError::InsufficientBalance {
                available,
                requested: amount,
            });
        }

        let withdrawal = Self::insert_transaction_on(
            &mut tx,
            user_id,
            TxKind::Withdrawal,
            amount,
            TxStatus::Pending,
        )
        .await?;
        tx.commit().await?;
        Ok(withdrawal)
    }

    async fn review_transaction(
        &self,
        id: Uuid,
        expected_kind: TxKind,
        action: &ReviewAction,
    ) -> CoreResult<Transaction> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TX_COLUMNS} FROM transactions WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let current = match row {
            Some(t) if t.kind == expected_kind => t,
            _ => return Err(CoreError::not_found("transaction", id)),
        };
        let next = current
            .status
            .reviewed(action)
            .ok_or_else(|| {
                CoreError::invalid_state("transaction", id, format!("status is {}", current.status))
            })?;

        let updated = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            UPDATE transactions SET status = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING {TX_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(next)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn transactions_for_user(
        &self,
        user_id: Uuid,
        kind: TxKind,
    ) -> CoreResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TX_COLUMNS} FROM transactions
            WHERE user_id = $1 AND kind = $2
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn pending_transactions(&self, kind: TxKind) -> CoreResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TX_COLUMNS} FROM transactions
            WHERE kind = $1 AND status = 'pending'
            ORDER BY created_at DESC
            "#
        ))
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn balance(&self, user_id: Uuid) -> CoreResult<Decimal> {
        let balance: Decimal = sqlx::query_scalar(BALANCE_SQL)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(balance)
    }

    async fn available_balance(&self, user_id: Uuid) -> CoreResult<Decimal> {
        let available: Decimal = sqlx::query_scalar(AVAILABLE_SQL)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(available)
    }

    async fn insert_payout_guarded(
        &self,
        user_id: Uuid,
        amount: Decimal,
        method: String,
        notes: Option<String>,
    ) -> CoreResult<Payout> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(Self::user_lock_key(user_id))
            .execute(&mut *tx)
            .await?;

        let available: Decimal = sqlx::query_scalar(AVAILABLE_SQL)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        if amount > available {
            return Err(CoreError::InsufficientBalance {
                available,
                requested: amount,
            });
        }

        let payout = sqlx::query_as::<_, Payout>(&format!(
            r#"
            INSERT INTO payouts (user_id, amount, method, status, notes)
            VALUES ($1, $2, $3, 'pending', $4)
            RETURNING {PAYOUT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(amount)
        .bind(&method)
        .bind(&notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(payout)
    }

    async fn review_payout(
        &self,
        id: Uuid,
        action: &ReviewAction,
        transaction_reference: Option<String>,
    ) -> CoreResult<Payout> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Payout>(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payouts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::not_found("payout", id))?;

        let next = current.status.reviewed(action).ok_or_else(|| {
            CoreError::invalid_state("payout", id, format!("status is {:?}", current.status))
        })?;

        let (reference, notes) = match action {
            ReviewAction::Approve => (transaction_reference, current.notes.clone()),
            ReviewAction::Reject { reason } => (current.transaction_reference.clone(), reason.clone()),
        };

        let updated = sqlx::query_as::<_, Payout>(&format!(
            r#"
            UPDATE payouts
            SET status = $2, transaction_reference = $3, notes = $4, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING {PAYOUT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(next)
        .bind(&reference)
        .bind(&notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn payouts_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Payout>> {
        let rows = sqlx::query_as::<_, Payout>(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payouts WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn pending_payouts(&self) -> CoreResult<Vec<Payout>> {
        let rows = sqlx::query_as::<_, Payout>(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payouts WHERE status = 'pending' ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_plan(&self, new: NewPlan) -> CoreResult<Plan> {
        let plan = sqlx::query_as::<_, Plan>(&format!(
            r#"
            INSERT INTO plans (name, min_deposit, max_deposit, profit_rate, duration_days)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(&new.name)
        .bind(new.min_deposit)
        .bind(new.max_deposit)
        .bind(new.profit_rate)
        .bind(new.duration_days)
        .fetch_one(&self.pool)
        .await?;
        Ok(plan)
    }

    async fn update_plan(&self, id: Uuid, update: PlanUpdate) -> CoreResult<Plan> {
        let plan = sqlx::query_as::<_, Plan>(&format!(
            r#"
            UPDATE plans SET
                name = COALESCE($2, name),
                min_deposit = COALESCE($3, min_deposit),
                max_deposit = COALESCE($4, max_deposit),
                profit_rate = COALESCE($5, profit_rate),
                duration_days = COALESCE($6, duration_days),
                is_active = COALESCE($7, is_active),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&update.name)
        .bind(update.min_deposit)
        .bind(update.max_deposit)
        .bind(update.profit_rate)
        .bind(update.duration_days)
        .bind(update.is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::not_found("plan", id))?;
        Ok(plan)
    }

    async fn plan(&self, id: Uuid) -> CoreResult<Plan> {
        sqlx::query_as::<_, Plan>(&format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found("plan", id))
    }

    async fn active_plans(&self) -> CoreResult<Vec<Plan>> {
        let rows = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE is_active ORDER BY min_deposit ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_investment_with_deposit(
        &self,
        new: NewInvestment,
    ) -> CoreResult<(Investment, Transaction)> {
        let mut tx = self.pool.begin().await?;

        let investment = sqlx::query_as::<_, Investment>(&format!(
            r#"
            INSERT INTO investments
                (user_id, plan_id, amount_invested, profit_expected, start_date, end_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {INVESTMENT_COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(new.plan_id)
        .bind(new.amount_invested)
        .bind(new.profit_expected)
        .bind(new.start_date)
        .bind(new.end_date)
        .fetch_one(&mut *tx)
        .await?;

        let deposit = Self::insert_transaction_on(
            &mut tx,
            new.user_id,
            TxKind::Deposit,
            new.amount_invested,
            TxStatus::Pending,
        )
        .await?;

        tx.commit().await?;
        Ok((investment, deposit))
    }

    async fn investments_with_plans(
        &self,
        user_id: Uuid,
    ) -> CoreResult<Vec<(Investment, Plan)>> {
        // Eager two-step fetch; plan traversal is never lazy per row.
        let investments = sqlx::query_as::<_, Investment>(&format!(
            r#"
            SELECT {INVESTMENT_COLUMNS} FROM investments
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut plan_ids: Vec<Uuid> = investments.iter().map(|i| i.plan_id).collect();
        plan_ids.sort_unstable();
        plan_ids.dedup();

        let plans = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE id = ANY($1)"
        ))
        .bind(&plan_ids)
        .fetch_all(&self.pool)
        .await?;

        investments
            .into_iter()
            .map(|investment| {
                let plan = plans
                    .iter()
                    .find(|p| p.id == investment.plan_id)
                    .cloned()
                    .ok_or_else(|| CoreError::not_found("plan", investment.plan_id))?;
                Ok((investment, plan))
            })
            .collect()
    }

    async fn insert_referral(&self, new: NewReferral) -> CoreResult<Referral> {
        let result = sqlx::query_as::<_, Referral>(&format!(
            r#"
            INSERT INTO referrals (referrer_id, referred_id, bonus_amount)
            VALUES ($1, $2, $3)
            RETURNING {REFERRAL_COLUMNS}
            "#
        ))
        .bind(new.referrer_id)
        .bind(new.referred_id)
        .bind(new.bonus_amount)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(referral) => Ok(referral),
            Err(err) if is_unique_violation(&err) => Err(CoreError::validation(
                "referred_id",
                "user already referred by this referrer",
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn confirm_referral(
        &self,
        id: Uuid,
        notes: Option<String>,
    ) -> CoreResult<(Referral, Transaction)> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Referral>(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::not_found("referral", id))?;

        let next = current.status.confirmed().ok_or_else(|| {
            CoreError::invalid_state("referral", id, format!("status is {:?}", current.status))
        })?;

        let referral = sqlx::query_as::<_, Referral>(&format!(
            r#"
            UPDATE referrals SET status = $2, notes = $3, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING {REFERRAL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(next)
        .bind(&notes)
        .fetch_one(&mut *tx)
        .await?;

        // Same transaction: the confirmed status and the bonus credit
        // commit together or not at all.
        let bonus = Self::insert_transaction_on(
            &mut tx,
            referral.referrer_id,
            TxKind::ReferralBonus,
            referral.bonus_amount,
            TxStatus::Completed,
        )
        .await?;

        tx.commit().await?;
        Ok((referral, bonus))
    }

    async fn cancel_referral(&self, id: Uuid, notes: Option<String>) -> CoreResult<Referral> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Referral>(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::not_found("referral", id))?;

        let next = current.status.cancelled().ok_or_else(|| {
            CoreError::invalid_state("referral", id, format!("status is {:?}", current.status))
        })?;

        let referral = sqlx::query_as::<_, Referral>(&format!(
            r#"
            UPDATE referrals SET status = $2, notes = $3, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            RETURNING {REFERRAL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(next)
        .bind(&notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(referral)
    }

    async fn referrals_for_referrer(&self, referrer_id: Uuid) -> CoreResult<Vec<Referral>> {
        let rows = sqlx::query_as::<_, Referral>(&format!(
            r#"
            SELECT {REFERRAL_COLUMNS} FROM referrals
            WHERE referrer_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn pending_referrals(&self) -> CoreResult<Vec<Referral>> {
        let rows = sqlx::query_as::<_, Referral>(&format!(
            r#"
            SELECT {REFERRAL_COLUMNS} FROM referrals
            WHERE status = 'pending'
            ORDER BY created_at DESC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn referral_stats(&self, referrer_id: Uuid) -> CoreResult<ReferralStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_invited,
                COUNT(*) FILTER (WHERE status = 'confirmed') AS confirmed,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled,
                COALESCE(SUM(bonus_amount) FILTER (WHERE status = 'confirmed'), 0) AS total_bonus_earned
            FROM referrals
            WHERE referrer_id = $1
            "#,
        )
        .bind(referrer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ReferralStats {
            total_invited: row.try_get("total_invited")?,
            confirmed: row.try_get("confirmed")?,
            pending: row.try_get("pending")?,
            cancelled: row.try_get("cancelled")?,
            total_bonus_earned: row.try_get("total_bonus_earned")?,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}
