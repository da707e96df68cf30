use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An investment plan. Editing a plan never recomputes investments that
/// already reference it; their terms are frozen at creation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub min_deposit: Decimal,
    pub max_deposit: Decimal,
    /// Annualized profit rate in percent.
    pub profit_rate: Decimal,
    pub duration_days: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn accepts_amount(&self, amount: Decimal) -> bool {
        amount >= self.min_deposit && amount <= self.max_deposit
    }
}
