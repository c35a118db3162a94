//! Core domain: fills, trades, the position ledger, and payload
//! normalization. No IO and no external collaborators.

pub mod fill;
pub mod ledger;
pub mod normalize;
pub mod trade;

pub use fill::{Fill, Side, Symbol};
pub use ledger::{LedgerRow, build_ledger, round2};
pub use normalize::{RawLeg, RawTransaction, normalize};
pub use trade::{Account, Execution, ExecutionAction, Trade, TradeStatus, recompute_actions};
