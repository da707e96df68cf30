use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Investment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub amount_invested: Decimal,
    /// Computed once at creation from the plan terms, never recomputed.
    pub profit_expected: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: InvestmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum InvestmentStatus {
    Active,
    Matured,
    Closed,
}

/// Point-in-time view of how far an investment has run.
#[derive(Debug, Clone, Serialize)]
pub struct MaturitySnapshot {
    /// Percentage of the plan duration elapsed, clamped to [0, 100], 2dp.
    pub progress_percent: Decimal,
    /// Profit accrued so far; monotonically non-decreasing and frozen at
    /// `profit_expected` once the end date is reached.
    pub profit_earned: Decimal,
}

/// Expected profit for `amount` under a plan:
/// `amount x rate/100 x days/365`, rounded to 4dp midpoint-away-from-zero.
pub fn expected_profit(amount: Decimal, profit_rate: Decimal, duration_days: i32) -> Decimal {
    (amount * profit_rate * Decimal::from(duration_days) / Decimal::from(36_500))
        .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

impl Investment {
    pub fn maturity_progress(&self, now: DateTime<Utc>) -> MaturitySnapshot {
        let total_days = (self.end_date - self.start_date).num_days();
        if total_days <= 0 {
            // Degenerate zero-length term: instantly mature.
            return MaturitySnapshot {
                progress_percent: Decimal::from(100),
                profit_earned: self.profit_expected,
            };
        }

        let elapsed = (now - self.start_date).num_days().clamp(0, total_days);
        let elapsed = Decimal::from(elapsed);
        let total = Decimal::from(total_days);

        let progress_percent = (elapsed / total * Decimal::from(100))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let accrued = (self.profit_expected * elapsed / total)
            .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);

        MaturitySnapshot {
            progress_percent,
            profit_earned: accrued.min(self.profit_expected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn investment(amount: i64, rate: &str, days: i64) -> Investment {
        let start = Utc::now();
        let amount = Decimal::from(amount);
        let rate: Decimal = rate.parse().unwrap();
        Investment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            amount_invested: amount,
            profit_expected: expected_profit(amount, rate, days as i32),
            start_date: start,
            end_date: start + Duration::days(days),
            status: InvestmentStatus::Active,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn expected_profit_matches_plan_terms() {
        // 500 x 5% x 30/365 = 2.054794... -> 2.0548
        let profit = expected_profit(Decimal::from(500), Decimal::from(5), 30);
        assert_eq!(profit, "2.0548".parse::<Decimal>().unwrap());
    }

    #[test]
    fn halfway_through_accrues_half_the_profit() {
        let inv = investment(500, "5", 30);
        let snap = inv.maturity_progress(inv.start_date + Duration::days(15));
        assert_eq!(snap.progress_percent, Decimal::from(50));
        assert_eq!(snap.profit_earned, "1.0274".parse::<Decimal>().unwrap());
    }

    #[test]
    fn before_start_nothing_is_earned() {
        let inv = investment(500, "5", 30);
        let snap = inv.maturity_progress(inv.start_date - Duration::days(1));
        assert_eq!(snap.progress_percent, Decimal::ZERO);
        assert_eq!(snap.profit_earned, Decimal::ZERO);
    }

    #[test]
    fn at_maturity_profit_equals_expected_exactly() {
        let inv = investment(500, "5", 30);
        let snap = inv.maturity_progress(inv.end_date);
        assert_eq!(snap.progress_percent, Decimal::from(100));
        assert_eq!(snap.profit_earned, inv.profit_expected);
    }

    #[test]
    fn profit_is_frozen_after_maturity() {
        let inv = investment(500, "5", 30);
        let snap = inv.maturity_progress(inv.end_date + Duration::days(90));
        assert_eq!(snap.progress_percent, Decimal::from(100));
        assert_eq!(snap.profit_earned, inv.profit_expected);
    }

    #[test]
    fn profit_earned_is_monotone_over_the_term() {
        let inv = investment(777, "12.5", 90);
        let mut last = Decimal::MIN;
        for day in 0..=120 {
            let snap = inv.maturity_progress(inv.start_date + Duration::days(day));
            assert!(
                snap.profit_earned >= last,
                "profit regressed on day {day}: {} < {last}",
                snap.profit_earned
            );
            last = snap.profit_earned;
        }
        assert_eq!(last, inv.profit_expected);
    }
}
