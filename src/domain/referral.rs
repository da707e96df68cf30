use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A referral between two users. The (referrer, referred) pair is unique;
/// confirmation is irreversible and credits the bonus through the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_id: Uuid,
    pub bonus_amount: Decimal,
    pub status: ReferralStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReferralStatus {
    /// Settlement transition: pending -> confirmed only.
    pub fn confirmed(self) -> Option<ReferralStatus> {
        match self {
            ReferralStatus::Pending => Some(ReferralStatus::Confirmed),
            _ => None,
        }
    }

    /// Rejection transition: pending -> cancelled only.
    pub fn cancelled(self) -> Option<ReferralStatus> {
        match self {
            ReferralStatus::Pending => Some(ReferralStatus::Cancelled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settlement_is_irreversible() {
        assert_eq!(
            ReferralStatus::Pending.confirmed(),
            Some(ReferralStatus::Confirmed)
        );
        assert_eq!(ReferralStatus::Confirmed.confirmed(), None);
        assert_eq!(ReferralStatus::Confirmed.cancelled(), None);
        assert_eq!(ReferralStatus::Cancelled.confirmed(), None);
    }
}
