//! Service objects orchestrating the core operations: validate input,
//! run the store's atomic operation, then dispatch notifications.
//!
//! Each service is constructed with an injected store handle and a
//! notifier; there is no process-wide state.

mod investment;
mod ledger;
mod referral;

pub use investment::{InvestmentService, InvestmentSummary};
pub use ledger::LedgerService;
pub use referral::ReferralService;
