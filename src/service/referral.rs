//! Referral settlement: recording referrals and crediting bonuses.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::domain::{Referral, Transaction};
use crate::error::{CoreError, CoreResult};
use crate::notify::{Notifier, NotifyTarget};
use crate::store::{LedgerStore, NewReferral, ReferralStats};

pub struct ReferralService {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
    /// Bonus credited per confirmed referral (`REFERRAL_BONUS` env).
    default_bonus: Decimal,
}

impl ReferralService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn Notifier>,
        default_bonus: Decimal,
    ) -> Self {
        Self {
            store,
            notifier,
            default_bonus,
        }
    }

    /// Record a pending referral at the configured bonus amount.
    pub async fn record_referral(
        &self,
        referrer_id: Uuid,
        referred_id: Uuid,
    ) -> CoreResult<Referral> {
        if referrer_id == referred_id {
            return Err(CoreError::validation(
                "referred_id",
                "a user cannot refer themselves",
            ));
        }
        let referral = self
            .store
            .insert_referral(NewReferral {
                referrer_id,
                referred_id,
                bonus_amount: self.default_bonus,
            })
            .await?;
        tracing::info!(referrer = %referrer_id, referred = %referred_id, "referral recorded");
        Ok(referral)
    }

    /// Settlement: irreversibly confirm the referral and credit its bonus
    /// in one transactional boundary.
    pub async fn approve_referral(
        &self,
        id: Uuid,
        notes: Option<String>,
    ) -> CoreResult<(Referral, Transaction)> {
        let (referral, bonus) = self.store.confirm_referral(id, notes).await?;
        tracing::info!(
            referral = %referral.id,
            referrer = %referral.referrer_id,
            bonus = %bonus.amount,
            reference = %bonus.reference,
            "referral confirmed, bonus credited"
        );
        self.notifier.notify(
            NotifyTarget::User(referral.referrer_id),
            "referral_bonus_approved",
            json!({
                "referral_id": referral.id,
                "amount": referral.bonus_amount,
                "transaction_id": bonus.id,
            }),
        );
        Ok((referral, bonus))
    }

    /// Pending -> cancelled; the ledger is untouched.
    pub async fn reject_referral(&self, id: Uuid, notes: Option<String>) -> CoreResult<Referral> {
        let referral = self.store.cancel_referral(id, notes).await?;
        tracing::info!(referral = %referral.id, "referral cancelled");
        self.notifier.notify(
            NotifyTarget::User(referral.referrer_id),
            "referral_rejected",
            json!({ "referral_id": referral.id }),
        );
        Ok(referral)
    }

    pub async fn referrals_of(&self, referrer_id: Uuid) -> CoreResult<Vec<Referral>> {
        self.store.referrals_for_referrer(referrer_id).await
    }

    pub async fn pending_referrals(&self) -> CoreResult<Vec<Referral>> {
        self.store.pending_referrals().await
    }

    pub async fn stats(&self, referrer_id: Uuid) -> CoreResult<ReferralStats> {
        self.store.referral_stats(referrer_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ReferralStatus, TxKind, TxStatus};
    use crate::notify::testing::RecordingNotifier;
    use crate::store::MemStore;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn service() -> (ReferralService, Arc<MemStore>) {
        let store = Arc::new(MemStore::new());
        let svc = ReferralService::new(
            store.clone(),
            Arc::new(RecordingNotifier::default()),
            dec("50"),
        );
        (svc, store)
    }

    #[tokio::test]
    async fn settlement_confirms_and_credits_exactly_one_bonus() {
        let (svc, store) = service();
        let referrer = Uuid::new_v4();
        let referral = svc.record_referral(referrer, Uuid::new_v4()).await.unwrap();

        let (confirmed, bonus) = svc
            .approve_referral(referral.id, Some("verified".into()))
            .await
            .unwrap();
        assert_eq!(confirmed.status, ReferralStatus::Confirmed);
        assert_eq!(confirmed.notes.as_deref(), Some("verified"));
        assert_eq!(bonus.user_id, referrer);
        assert_eq!(bonus.amount, dec("50"));
        assert_eq!(bonus.kind, TxKind::ReferralBonus);
        assert_eq!(bonus.status, TxStatus::Completed);

        let credits = store
            .transactions_for_user(referrer, TxKind::ReferralBonus)
            .await
            .unwrap();
        assert_eq!(credits.len(), 1);
    }

    #[tokio::test]
    async fn failed_settlement_credits_nothing() {
        let (svc, store) = service();
        let referrer = Uuid::new_v4();
        let referral = svc.record_referral(referrer, Uuid::new_v4()).await.unwrap();
        svc.reject_referral(referral.id, Some("fraud".into())).await.unwrap();

        // Approval of a cancelled referral fails and must leave the ledger alone.
        let err = svc.approve_referral(referral.id, None).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
        let credits = store
            .transactions_for_user(referrer, TxKind::ReferralBonus)
            .await
            .unwrap();
        assert!(credits.is_empty());
    }

    #[tokio::test]
    async fn double_settlement_credits_only_once() {
        let (svc, store) = service();
        let referrer = Uuid::new_v4();
        let referral = svc.record_referral(referrer, Uuid::new_v4()).await.unwrap();

        svc.approve_referral(referral.id, None).await.unwrap();
        let err = svc.approve_referral(referral.id, None).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));

        let credits = store
            .transactions_for_user(referrer, TxKind::ReferralBonus)
            .await
            .unwrap();
        assert_eq!(credits.len(), 1);
    }

    #[tokio::test]
    async fn rejection_does_not_touch_the_ledger() {
        let (svc, store) = service();
        let referrer = Uuid::new_v4();
        let referral = svc.record_referral(referrer, Uuid::new_v4()).await.unwrap();

        let cancelled = svc
            .reject_referral(referral.id, Some("duplicate account".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, ReferralStatus::Cancelled);
        let credits = store
            .transactions_for_user(referrer, TxKind::ReferralBonus)
            .await
            .unwrap();
        assert!(credits.is_empty());
    }

    #[tokio::test]
    async fn duplicate_referral_pair_is_rejected() {
        let (svc, _) = service();
        let referrer = Uuid::new_v4();
        let referred = Uuid::new_v4();
        svc.record_referral(referrer, referred).await.unwrap();

        let err = svc.record_referral(referrer, referred).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { field: "referred_id", .. }));
    }

    #[tokio::test]
    async fn self_referral_is_rejected() {
        let (svc, _) = service();
        let user = Uuid::new_v4();
        let err = svc.record_referral(user, user).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn stats_count_by_status_and_sum_confirmed_bonuses() {
        let (svc, _) = service();
        let referrer = Uuid::new_v4();

        let a = svc.record_referral(referrer, Uuid::new_v4()).await.unwrap();
        let b = svc.record_referral(referrer, Uuid::new_v4()).await.unwrap();
        let _c = svc.record_referral(referrer, Uuid::new_v4()).await.unwrap();
        svc.approve_referral(a.id, None).await.unwrap();
        svc.reject_referral(b.id, None).await.unwrap();

        let stats = svc.stats(referrer).await.unwrap();
        assert_eq!(stats.total_invited, 3);
        assert_eq!(stats.confirmed, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.total_bonus_earned, dec("50"));
    }
}
