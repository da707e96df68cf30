//! Deposit, withdrawal and payout flows over the ledger store.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::domain::{Payout, ReviewAction, Transaction, TxKind};
use crate::error::{CoreError, CoreResult};
use crate::notify::{Notifier, NotifyTarget};
use crate::store::LedgerStore;

pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    fn require_positive(amount: Decimal) -> CoreResult<()> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::validation("amount", "must be greater than zero"));
        }
        Ok(())
    }

    /// The derived wallet balance; recomputed from ledger rows on every call.
    pub async fn wallet_balance(&self, user_id: Uuid) -> CoreResult<Decimal> {
        self.store.balance(user_id).await
    }

    /// Balance minus pending withdrawals and payouts.
    pub async fn available_balance(&self, user_id: Uuid) -> CoreResult<Decimal> {
        self.store.available_balance(user_id).await
    }

    pub async fn request_deposit(&self, user_id: Uuid, amount: Decimal) -> CoreResult<Transaction> {
        Self::require_positive(amount)?;
        let deposit = self.store.insert_deposit(user_id, amount).await?;
        tracing::info!(user = %user_id, amount = %amount, reference = %deposit.reference, "deposit requested");
        self.notifier.notify(
            NotifyTarget::Admins,
            "deposit_requested",
            json!({ "user_id": user_id, "amount": amount, "transaction_id": deposit.id }),
        );
        Ok(deposit)
    }

    pub async fn request_withdrawal(
        &self,
        user_id: Uuid,
        amount: Decimal,
    ) -> CoreResult<Transaction> {
        Self::require_positive(amount)?;
        let withdrawal = self.store.insert_withdrawal_guarded(user_id, amount).await?;
        tracing::info!(user = %user_id, amount = %amount, reference = %withdrawal.reference, "withdrawal requested");
        self.notifier.notify(
            NotifyTarget::Admins,
            "withdrawal_requested",
            json!({ "user_id": user_id, "amount": amount, "transaction_id": withdrawal.id }),
        );
        Ok(withdrawal)
    }

    pub async fn review_deposit(&self, id: Uuid, action: ReviewAction) -> CoreResult<Transaction> {
        self.review(id, TxKind::Deposit, action).await
    }

    pub async fn review_withdrawal(
        &self,
        id: Uuid,
        action: ReviewAction,
    ) -> CoreResult<Transaction> {
        self.review(id, TxKind::Withdrawal, action).await
    }

    async fn review(
        &self,
        id: Uuid,
        kind: TxKind,
        action: ReviewAction,
    ) -> CoreResult<Transaction> {
        let reviewed = self.store.review_transaction(id, kind, &action).await?;
        tracing::info!(transaction = %id, kind = %kind, status = %reviewed.status, "transaction reviewed");

        let mut payload = json!({ "amount": reviewed.amount, "transaction_id": reviewed.id });
        if let ReviewAction::Reject { reason: Some(reason) } = &action {
            payload["reason"] = json!(reason);
        }
        self.notifier.notify(
            NotifyTarget::User(reviewed.user_id),
            match (kind, &action) {
                (TxKind::Deposit, ReviewAction::Approve) => "deposit_approved",
                (TxKind::Deposit, ReviewAction::Reject { .. }) => "deposit_rejected",
                (_, ReviewAction::Approve) => "withdrawal_approved",
                (_, ReviewAction::Reject { .. }) => "withdrawal_rejected",
            },
            payload,
        );
        Ok(reviewed)
    }

    /// Newest-first transaction history of one kind.
    pub async fn history(&self, user_id: Uuid, kind: TxKind) -> CoreResult<Vec<Transaction>> {
        self.store.transactions_for_user(user_id, kind).await
    }

    pub async fn pending_deposits(&self) -> CoreResult<Vec<Transaction>> {
        self.store.pending_transactions(TxKind::Deposit).await
    }

    pub async fn pending_withdrawals(&self) -> CoreResult<Vec<Transaction>> {
        self.store.pending_transactions(TxKind::Withdrawal).await
    }

    // --- payouts ---

    pub async fn request_payout(
        &self,
        user_id: Uuid,
        amount: Decimal,
        method: String,
        notes: Option<String>,
    ) -> CoreResult<Payout> {
        Self::require_positive(amount)?;
        if method.trim().is_empty() {
            return Err(CoreError::validation("method", "must not be empty"));
        }
        let payout = self
            .store
            .insert_payout_guarded(user_id, amount, method, notes)
            .await?;
        tracing::info!(user = %user_id, amount = %amount, payout = %payout.id, "payout requested");
        self.notifier.notify(
            NotifyTarget::Admins,
            "payout_requested",
            json!({ "user_id": user_id, "amount": amount, "payout_id": payout.id }),
        );
        Ok(payout)
    }

    pub async fn review_payout(
        &self,
        id: Uuid,
        action: ReviewAction,
        transaction_reference: Option<String>,
    ) -> CoreResult<Payout> {
        let reviewed = self
            .store
            .review_payout(id, &action, transaction_reference)
            .await?;
        tracing::info!(payout = %id, status = ?reviewed.status, "payout reviewed");

        let event = match action {
            ReviewAction::Approve => "payout_approved",
            ReviewAction::Reject { .. } => "payout_rejected",
        };
        self.notifier.notify(
            NotifyTarget::User(reviewed.user_id),
            event,
            json!({
                "amount": reviewed.amount,
                "payout_id": reviewed.id,
                "transaction_reference": reviewed.transaction_reference,
            }),
        );
        Ok(reviewed)
    }

    pub async fn payout_history(&self, user_id: Uuid) -> CoreResult<Vec<Payout>> {
        self.store.payouts_for_user(user_id).await
    }

    pub async fn pending_payouts(&self) -> CoreResult<Vec<Payout>> {
        self.store.pending_payouts().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use crate::store::MemStore;

    fn service() -> LedgerService {
        LedgerService::new(Arc::new(MemStore::new()), Arc::new(RecordingNotifier::default()))
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn balance_is_sum_of_approved_entries_only() {
        let svc = service();
        let user = Uuid::new_v4();

        let d1 = svc.request_deposit(user, dec("1000")).await.unwrap();
        let d2 = svc.request_deposit(user, dec("500")).await.unwrap();
        let d3 = svc.request_deposit(user, dec("250")).await.unwrap();

        // Nothing approved yet.
        assert_eq!(svc.wallet_balance(user).await.unwrap(), Decimal::ZERO);

        svc.review_deposit(d1.id, ReviewAction::Approve).await.unwrap();
        svc.review_deposit(d2.id, ReviewAction::Approve).await.unwrap();
        svc.review_deposit(d3.id, ReviewAction::Reject { reason: None })
            .await
            .unwrap();

        assert_eq!(svc.wallet_balance(user).await.unwrap(), dec("1500"));

        let w = svc.request_withdrawal(user, dec("300")).await.unwrap();
        svc.review_withdrawal(w.id, ReviewAction::Approve).await.unwrap();
        assert_eq!(svc.wallet_balance(user).await.unwrap(), dec("1200"));
    }

    #[tokio::test]
    async fn balance_sums_exactly_under_two_decimal_amounts() {
        // 0.10 + 0.20 + 0.30 has no exact binary representation; decimal
        // arithmetic must still produce exactly 0.60.
        let svc = service();
        let user = Uuid::new_v4();
        for amount in ["0.10", "0.20", "0.30"] {
            let d = svc.request_deposit(user, dec(amount)).await.unwrap();
            svc.review_deposit(d.id, ReviewAction::Approve).await.unwrap();
        }
        assert_eq!(svc.wallet_balance(user).await.unwrap(), dec("0.60"));
    }

    #[tokio::test]
    async fn withdrawal_rejects_non_positive_amounts() {
        let svc = service();
        let user = Uuid::new_v4();
        let err = svc.request_withdrawal(user, Decimal::ZERO).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { field: "amount", .. }));
    }

    #[tokio::test]
    async fn pending_withdrawal_reserves_the_balance() {
        let svc = service();
        let user = Uuid::new_v4();

        for amount in ["1000", "500"] {
            let d = svc.request_deposit(user, dec(amount)).await.unwrap();
            svc.review_deposit(d.id, ReviewAction::Approve).await.unwrap();
        }
        let w = svc.request_withdrawal(user, dec("300")).await.unwrap();
        svc.review_withdrawal(w.id, ReviewAction::Approve).await.unwrap();
        assert_eq!(svc.wallet_balance(user).await.unwrap(), dec("1200"));

        // A request for the full remaining balance succeeds...
        svc.request_withdrawal(user, dec("1200")).await.unwrap();
        // ...and while it is pending, even 1 more is refused.
        let err = svc.request_withdrawal(user, dec("1")).await.unwrap_err();
        assert!(matches!(err, CoreError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn rejected_withdrawal_releases_reserved_funds() {
        let svc = service();
        let user = Uuid::new_v4();
        let d = svc.request_deposit(user, dec("100")).await.unwrap();
        svc.review_deposit(d.id, ReviewAction::Approve).await.unwrap();

        let w = svc.request_withdrawal(user, dec("100")).await.unwrap();
        assert_eq!(svc.available_balance(user).await.unwrap(), Decimal::ZERO);

        svc.review_withdrawal(w.id, ReviewAction::Reject { reason: Some("bad account".into()) })
            .await
            .unwrap();
        assert_eq!(svc.available_balance(user).await.unwrap(), dec("100"));
        assert_eq!(svc.wallet_balance(user).await.unwrap(), dec("100"));
    }

    #[tokio::test]
    async fn review_is_one_way() {
        let svc = service();
        let user = Uuid::new_v4();
        let d = svc.request_deposit(user, dec("10")).await.unwrap();
        svc.review_deposit(d.id, ReviewAction::Approve).await.unwrap();

        let again = svc.review_deposit(d.id, ReviewAction::Approve).await.unwrap_err();
        assert!(matches!(again, CoreError::InvalidState { .. }));

        let flip = svc
            .review_deposit(d.id, ReviewAction::Reject { reason: None })
            .await
            .unwrap_err();
        assert!(matches!(flip, CoreError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn review_checks_the_transaction_kind() {
        let svc = service();
        let user = Uuid::new_v4();
        let d = svc.request_deposit(user, dec("10")).await.unwrap();

        // Reviewing a deposit through the withdrawal queue is a NotFound.
        let err = svc.review_withdrawal(d.id, ReviewAction::Approve).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn payouts_debit_the_wallet_once_approved() {
        let svc = service();
        let user = Uuid::new_v4();
        let d = svc.request_deposit(user, dec("500")).await.unwrap();
        svc.review_deposit(d.id, ReviewAction::Approve).await.unwrap();

        let payout = svc
            .request_payout(user, dec("200"), "bank_transfer".into(), None)
            .await
            .unwrap();
        // Pending payout reserves funds but does not change the wallet figure.
        assert_eq!(svc.wallet_balance(user).await.unwrap(), dec("500"));
        assert_eq!(svc.available_balance(user).await.unwrap(), dec("300"));

        svc.review_payout(payout.id, ReviewAction::Approve, Some("BANKREF-1".into()))
            .await
            .unwrap();
        assert_eq!(svc.wallet_balance(user).await.unwrap(), dec("300"));
    }

    #[tokio::test]
    async fn payout_exceeding_available_balance_is_refused() {
        let svc = service();
        let user = Uuid::new_v4();
        let d = svc.request_deposit(user, dec("100")).await.unwrap();
        svc.review_deposit(d.id, ReviewAction::Approve).await.unwrap();

        let err = svc
            .request_payout(user, dec("100.01"), "bank_transfer".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn payout_review_is_one_way() {
        let svc = service();
        let user = Uuid::new_v4();
        let d = svc.request_deposit(user, dec("100")).await.unwrap();
        svc.review_deposit(d.id, ReviewAction::Approve).await.unwrap();

        let payout = svc
            .request_payout(user, dec("50"), "paypal".into(), None)
            .await
            .unwrap();
        svc.review_payout(payout.id, ReviewAction::Reject { reason: Some("no KYC".into()) }, None)
            .await
            .unwrap();

        let err = svc
            .review_payout(payout.id, ReviewAction::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn references_are_unique_and_well_formed() {
        let svc = service();
        let user = Uuid::new_v4();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            let d = svc.request_deposit(user, dec("1")).await.unwrap();
            assert!(d.reference.starts_with("TXN"));
            assert!(seen.insert(d.reference), "duplicate reference issued");
        }
    }
}
