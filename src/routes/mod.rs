use std::sync::Arc;

use crate::service::{InvestmentService, LedgerService, ReferralService};

pub mod admin;
pub mod auth;
pub mod invest;
pub mod referral;
pub mod utils;
pub mod wallet;

/// Shared handler state: the auth service plus the core service objects.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<auth::AuthService>,
    pub ledger: Arc<LedgerService>,
    pub investments: Arc<InvestmentService>,
    pub referrals: Arc<ReferralService>,
}
