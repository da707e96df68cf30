//! Domain entities and the pure business rules that govern them:
//! status machines, profit arithmetic and reference generation.
//!
//! Nothing in this module touches the store; services call into it from
//! inside their transactional boundaries.

mod investment;
mod payout;
mod plan;
mod reference;
mod referral;
mod transaction;

pub use investment::{expected_profit, Investment, InvestmentStatus, MaturitySnapshot};
pub use payout::{Payout, PayoutStatus};
pub use plan::Plan;
pub use reference::generate_reference;
pub use referral::{Referral, ReferralStatus};
pub use transaction::{ReviewAction, Transaction, TxKind, TxStatus};
