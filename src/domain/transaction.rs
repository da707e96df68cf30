use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single ledger entry. The wallet balance is always derived from these
/// rows (plus payouts), never stored.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TxKind,
    pub amount: Decimal,
    pub status: TxStatus,
    pub transaction_date: DateTime<Utc>,
    /// Assigned exactly once at insert, immutable afterwards.
    pub reference: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TxKind {
    Deposit,
    Withdrawal,
    ReferralBonus,
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxKind::Deposit => write!(f, "deposit"),
            TxKind::Withdrawal => write!(f, "withdrawal"),
            TxKind::ReferralBonus => write!(f, "referral_bonus"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Approved,
    Rejected,
    /// Terminal status assigned at creation to referral-bonus credits;
    /// never the result of a review.
    Completed,
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxStatus::Pending => write!(f, "pending"),
            TxStatus::Approved => write!(f, "approved"),
            TxStatus::Rejected => write!(f, "rejected"),
            TxStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Admin decision on a pending entity.
#[derive(Debug, Clone)]
pub enum ReviewAction {
    Approve,
    Reject { reason: Option<String> },
}

impl TxStatus {
    /// Apply an admin review. Transitions are one-way: only a pending
    /// entity may move, and only to approved or rejected.
    pub fn reviewed(self, action: &ReviewAction) -> Option<TxStatus> {
        match self {
            TxStatus::Pending => Some(match action {
                ReviewAction::Approve => TxStatus::Approved,
                ReviewAction::Reject { .. } => TxStatus::Rejected,
            }),
            _ => None,
        }
    }
}
