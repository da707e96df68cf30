//! Investment engine: plan terms, expected profit and maturity progress.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::{expected_profit, Investment, InvestmentStatus, Plan, Transaction};
use crate::error::{CoreError, CoreResult};
use crate::notify::{Notifier, NotifyTarget};
use crate::store::{LedgerStore, NewInvestment, NewPlan, PlanUpdate};

/// One row of the investments dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct InvestmentSummary {
    pub id: Uuid,
    pub plan_name: String,
    pub amount_invested: Decimal,
    pub profit_expected: Decimal,
    pub profit_earned: Decimal,
    pub maturity_progress: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: InvestmentStatus,
}

pub struct InvestmentService {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
}

impl InvestmentService {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Create an investment and its linked pending deposit atomically.
    /// The deposit still goes through the ordinary review queue.
    pub async fn create_investment(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        amount: Decimal,
    ) -> CoreResult<(Investment, Transaction)> {
        let plan = self.store.plan(plan_id).await?;
        if !plan.is_active {
            return Err(CoreError::validation("plan_id", "plan is not active"));
        }
        if !plan.accepts_amount(amount) {
            return Err(CoreError::validation(
                "amount",
                format!(
                    "must be between {} and {}",
                    plan.min_deposit, plan.max_deposit
                ),
            ));
        }

        let start_date = Utc::now();
        let new = NewInvestment {
            user_id,
            plan_id,
            amount_invested: amount,
            profit_expected: expected_profit(amount, plan.profit_rate, plan.duration_days),
            start_date,
            end_date: start_date + Duration::days(plan.duration_days as i64),
        };
        let (investment, deposit) = self.store.insert_investment_with_deposit(new).await?;
        tracing::info!(
            user = %user_id,
            plan = %plan.name,
            amount = %amount,
            profit_expected = %investment.profit_expected,
            "investment created"
        );
        self.notifier.notify(
            NotifyTarget::Admins,
            "investment_created",
            json!({
                "user_id": user_id,
                "investment_id": investment.id,
                "amount": amount,
                "transaction_id": deposit.id,
            }),
        );
        Ok((investment, deposit))
    }

    /// Per-investment maturity progress, with plans joined eagerly.
    pub async fn investments_summary(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<InvestmentSummary>> {
        let rows = self.store.investments_with_plans(user_id).await?;
        Ok(rows
            .into_iter()
            .map(|(investment, plan)| {
                let snapshot = investment.maturity_progress(now);
                InvestmentSummary {
                    id: investment.id,
                    plan_name: plan.name,
                    amount_invested: investment.amount_invested,
                    profit_expected: investment.profit_expected,
                    profit_earned: snapshot.profit_earned,
                    maturity_progress: snapshot.progress_percent,
                    start_date: investment.start_date,
                    end_date: investment.end_date,
                    status: investment.status,
                }
            })
            .collect())
    }

    pub async fn active_plans(&self) -> CoreResult<Vec<Plan>> {
        self.store.active_plans().await
    }

    pub async fn plan(&self, id: Uuid) -> CoreResult<Plan> {
        self.store.plan(id).await
    }

    pub async fn create_plan(&self, new: NewPlan) -> CoreResult<Plan> {
        Self::validate_terms(new.min_deposit, new.max_deposit, new.profit_rate, new.duration_days)?;
        let plan = self.store.insert_plan(new).await?;
        tracing::info!(plan = %plan.name, "plan created");
        Ok(plan)
    }

    /// Edit plan terms. Existing investments keep the terms they were
    /// created with; nothing is recomputed.
    pub async fn update_plan(&self, id: Uuid, update: PlanUpdate) -> CoreResult<Plan> {
        let current = self.store.plan(id).await?;
        Self::validate_terms(
            update.min_deposit.unwrap_or(current.min_deposit),
            update.max_deposit.unwrap_or(current.max_deposit),
            update.profit_rate.unwrap_or(current.profit_rate),
            update.duration_days.unwrap_or(current.duration_days),
        )?;
        let plan = self.store.update_plan(id, update).await?;
        tracing::info!(plan = %plan.name, "plan updated");
        Ok(plan)
    }

    fn validate_terms(
        min_deposit: Decimal,
        max_deposit: Decimal,
        profit_rate: Decimal,
        duration_days: i32,
    ) -> CoreResult<()> {
        if min_deposit <= Decimal::ZERO {
            return Err(CoreError::validation("min_deposit", "must be greater than zero"));
        }
        if max_deposit < min_deposit {
            return Err(CoreError::validation(
                "max_deposit",
                "must be greater than or equal to min_deposit",
            ));
        }
        if profit_rate <= Decimal::ZERO {
            return Err(CoreError::validation("profit_rate", "must be greater than zero"));
        }
        if duration_days < 1 {
            return Err(CoreError::validation("duration_days", "must be at least one day"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use crate::store::MemStore;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn new_plan() -> NewPlan {
        NewPlan {
            name: "Starter".into(),
            min_deposit: dec("100"),
            max_deposit: dec("1000"),
            profit_rate: dec("5"),
            duration_days: 30,
        }
    }

    fn service() -> InvestmentService {
        InvestmentService::new(Arc::new(MemStore::new()), Arc::new(RecordingNotifier::default()))
    }

    #[tokio::test]
    async fn investment_computes_profit_and_end_date_from_plan_terms() {
        let svc = service();
        let plan = svc.create_plan(new_plan()).await.unwrap();
        let user = Uuid::new_v4();

        let (investment, deposit) = svc.create_investment(user, plan.id, dec("500")).await.unwrap();
        assert_eq!(investment.profit_expected, dec("2.0548"));
        assert_eq!(
            (investment.end_date - investment.start_date).num_days(),
            30
        );
        // Linked deposit mirrors the invested amount and awaits review.
        assert_eq!(deposit.amount, dec("500"));
        assert_eq!(deposit.user_id, user);
    }

    #[tokio::test]
    async fn amount_outside_plan_bounds_is_rejected() {
        let svc = service();
        let plan = svc.create_plan(new_plan()).await.unwrap();
        let user = Uuid::new_v4();

        for amount in ["99.99", "1000.01"] {
            let err = svc.create_investment(user, plan.id, dec(amount)).await.unwrap_err();
            assert!(matches!(err, CoreError::Validation { field: "amount", .. }));
        }
        // Boundary values are accepted.
        svc.create_investment(user, plan.id, dec("100")).await.unwrap();
        svc.create_investment(user, plan.id, dec("1000")).await.unwrap();
    }

    #[tokio::test]
    async fn inactive_plans_cannot_be_invested_in() {
        let svc = service();
        let plan = svc.create_plan(new_plan()).await.unwrap();
        svc.update_plan(
            plan.id,
            PlanUpdate { is_active: Some(false), ..Default::default() },
        )
        .await
        .unwrap();

        let err = svc
            .create_investment(Uuid::new_v4(), plan.id, dec("500"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { field: "plan_id", .. }));
    }

    #[tokio::test]
    async fn unknown_plan_is_not_found() {
        let svc = service();
        let err = svc
            .create_investment(Uuid::new_v4(), Uuid::new_v4(), dec("500"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { entity: "plan", .. }));
    }

    #[tokio::test]
    async fn plan_edits_do_not_recompute_existing_investments() {
        let svc = service();
        let plan = svc.create_plan(new_plan()).await.unwrap();
        let user = Uuid::new_v4();
        let (investment, _) = svc.create_investment(user, plan.id, dec("500")).await.unwrap();

        svc.update_plan(
            plan.id,
            PlanUpdate { profit_rate: Some(dec("50")), ..Default::default() },
        )
        .await
        .unwrap();

        let summary = svc.investments_summary(user, Utc::now()).await.unwrap();
        assert_eq!(summary[0].id, investment.id);
        // Terms stay frozen at creation.
        assert_eq!(summary[0].profit_expected, dec("2.0548"));
    }

    #[tokio::test]
    async fn summary_reports_midterm_progress() {
        let svc = service();
        let plan = svc.create_plan(new_plan()).await.unwrap();
        let user = Uuid::new_v4();
        let (investment, _) = svc.create_investment(user, plan.id, dec("500")).await.unwrap();

        let midterm = investment.start_date + Duration::days(15);
        let summary = svc.investments_summary(user, midterm).await.unwrap();
        assert_eq!(summary[0].maturity_progress, dec("50"));
        assert_eq!(summary[0].profit_earned, dec("1.0274"));
    }

    #[tokio::test]
    async fn plan_terms_are_validated() {
        let svc = service();
        let mut bad = new_plan();
        bad.max_deposit = dec("50");
        let err = svc.create_plan(bad).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { field: "max_deposit", .. }));

        let mut bad = new_plan();
        bad.duration_days = 0;
        let err = svc.create_plan(bad).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { field: "duration_days", .. }));
    }
}
