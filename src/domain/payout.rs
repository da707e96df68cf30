use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ReviewAction;

/// A payout request. Follows the same one-way review machine as ledger
/// transactions; approved payouts debit the derived wallet balance.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payout {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub method: String,
    pub status: PayoutStatus,
    /// External settlement reference, supplied by the admin on approval.
    pub transaction_reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Rejected,
}

impl PayoutStatus {
    pub fn reviewed(self, action: &ReviewAction) -> Option<PayoutStatus> {
        match self {
            PayoutStatus::Pending => Some(match action {
                ReviewAction::Approve => PayoutStatus::Approved,
                ReviewAction::Reject { .. } => PayoutStatus::Rejected,
            }),
            _ => None,
        }
    }
}
