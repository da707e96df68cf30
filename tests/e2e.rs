//! End-to-end flows over the in-memory store: the same service objects the
//! HTTP handlers hold, exercised without a database.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use invest_platform::domain::{ReviewAction, TxKind, TxStatus};
use invest_platform::error::CoreError;
use invest_platform::notify::TracingNotifier;
use invest_platform::service::{InvestmentService, LedgerService, ReferralService};
use invest_platform::store::{MemStore, NewPlan};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

struct Services {
    ledger: Arc<LedgerService>,
    investments: Arc<InvestmentService>,
    referrals: Arc<ReferralService>,
}

fn services() -> Services {
    let store = Arc::new(MemStore::new());
    let notifier = Arc::new(TracingNotifier);
    Services {
        ledger: Arc::new(LedgerService::new(store.clone(), notifier.clone())),
        investments: Arc::new(InvestmentService::new(store.clone(), notifier.clone())),
        referrals: Arc::new(ReferralService::new(store, notifier, dec("50"))),
    }
}

async fn fund(ledger: &LedgerService, user: Uuid, amount: &str) {
    let deposit = ledger.request_deposit(user, dec(amount)).await.unwrap();
    ledger
        .review_deposit(deposit.id, ReviewAction::Approve)
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_withdrawals_never_overdraw() {
    let svc = services();
    let user = Uuid::new_v4();
    fund(&svc.ledger, user, "1000").await;

    // 20 racing requests for 300 each against a balance of 1000: exactly
    // three may be accepted, no matter the interleaving.
    let mut handles = Vec::new();
    for _ in 0..20 {
        let ledger = svc.ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger.request_withdrawal(user, dec("300")).await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(CoreError::InsufficientBalance { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(accepted, 3);

    // The reserved total never exceeds the wallet.
    assert_eq!(svc.ledger.available_balance(user).await.unwrap(), dec("100"));
    assert_eq!(svc.ledger.wallet_balance(user).await.unwrap(), dec("1000"));
}

#[tokio::test]
async fn deposit_review_queue_drives_the_balance() {
    let svc = services();
    let user = Uuid::new_v4();

    let d1 = svc.ledger.request_deposit(user, dec("750.25")).await.unwrap();
    let d2 = svc.ledger.request_deposit(user, dec("100")).await.unwrap();
    assert_eq!(svc.ledger.wallet_balance(user).await.unwrap(), Decimal::ZERO);

    svc.ledger.review_deposit(d1.id, ReviewAction::Approve).await.unwrap();
    svc.ledger
        .review_deposit(d2.id, ReviewAction::Reject { reason: Some("chargeback".into()) })
        .await
        .unwrap();

    assert_eq!(svc.ledger.wallet_balance(user).await.unwrap(), dec("750.25"));

    let history = svc.ledger.history(user, TxKind::Deposit).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().any(|t| t.status == TxStatus::Rejected));
}

#[tokio::test]
async fn investment_lifecycle_from_plan_to_funded_wallet() {
    let svc = services();
    let user = Uuid::new_v4();

    let plan = svc
        .investments
        .create_plan(NewPlan {
            name: "Growth".into(),
            min_deposit: dec("100"),
            max_deposit: dec("10000"),
            profit_rate: dec("12"),
            duration_days: 90,
        })
        .await
        .unwrap();

    let (investment, deposit) = svc
        .investments
        .create_investment(user, plan.id, dec("2000"))
        .await
        .unwrap();
    // 2000 * 12% * 90/365
    assert_eq!(investment.profit_expected, dec("59.1781"));

    // The linked deposit waits in the ordinary review queue.
    assert_eq!(svc.ledger.wallet_balance(user).await.unwrap(), Decimal::ZERO);
    svc.ledger
        .review_deposit(deposit.id, ReviewAction::Approve)
        .await
        .unwrap();
    assert_eq!(svc.ledger.wallet_balance(user).await.unwrap(), dec("2000"));

    let summary = svc
        .investments
        .investments_summary(user, investment.start_date)
        .await
        .unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].plan_name, "Growth");
    assert_eq!(summary[0].maturity_progress, Decimal::ZERO);

    let matured = svc
        .investments
        .investments_summary(user, investment.end_date)
        .await
        .unwrap();
    assert_eq!(matured[0].maturity_progress, dec("100"));
    assert_eq!(matured[0].profit_earned, dec("59.1781"));
}

#[tokio::test]
async fn referral_bonus_lands_in_stats_not_the_wallet() {
    let svc = services();
    let referrer = Uuid::new_v4();
    let referred = Uuid::new_v4();
    fund(&svc.ledger, referrer, "100").await;

    let referral = svc.referrals.record_referral(referrer, referred).await.unwrap();
    svc.referrals
        .approve_referral(referral.id, Some("first deposit confirmed".into()))
        .await
        .unwrap();

    // Bonus transactions are reported through stats, never in the balance.
    assert_eq!(svc.ledger.wallet_balance(referrer).await.unwrap(), dec("100"));
    let stats = svc.referrals.stats(referrer).await.unwrap();
    assert_eq!(stats.total_invited, 1);
    assert_eq!(stats.confirmed, 1);
    assert_eq!(stats.total_bonus_earned, dec("50"));
}

#[tokio::test]
async fn payout_settles_with_an_external_reference() {
    let svc = services();
    let user = Uuid::new_v4();
    fund(&svc.ledger, user, "800").await;

    let payout = svc
        .ledger
        .request_payout(user, dec("500"), "bank_transfer".into(), Some("IBAN DE89".into()))
        .await
        .unwrap();
    assert_eq!(svc.ledger.available_balance(user).await.unwrap(), dec("300"));

    let settled = svc
        .ledger
        .review_payout(payout.id, ReviewAction::Approve, Some("SEPA-83921".into()))
        .await
        .unwrap();
    assert_eq!(settled.transaction_reference.as_deref(), Some("SEPA-83921"));
    assert_eq!(svc.ledger.wallet_balance(user).await.unwrap(), dec("300"));
}
