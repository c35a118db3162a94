//! Trade and execution records.
//!
//! A [`Trade`] is one open-to-flat lifecycle in a single symbol. It
//! exclusively owns its [`Execution`]s; once its running position returns to
//! exactly zero the trade is closed permanently and any later fill in the
//! same symbol starts a brand-new trade (the re-entry rule).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::fill::{Side, Symbol};

/// Lifecycle state of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    /// Position is (or may be) non-zero; fills still attach to this trade.
    Open,
    /// Position returned to zero; the trade is immutable.
    Closed,
}

/// Derived label for an execution's role within its trade.
///
/// Computed from the execution's position in the trade's chronological
/// replay. Never authoritative for reconciliation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionAction {
    /// First buy of the trade.
    Entry,
    /// Buy while already holding.
    Add,
    /// Sell that leaves the position non-zero.
    #[serde(rename = "Partial Exit")]
    PartialExit,
    /// Sell that returns the position to zero.
    #[serde(rename = "Final Exit")]
    FinalExit,
}

impl fmt::Display for ExecutionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => write!(f, "Entry"),
            Self::Add => write!(f, "Add"),
            Self::PartialExit => write!(f, "Partial Exit"),
            Self::FinalExit => write!(f, "Final Exit"),
        }
    }
}

/// A user-facing brokerage account known to the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// User-facing account id (storage key, distinct from the routing handle).
    pub id: String,
    /// Owning user.
    pub user_id: String,
}

/// One directional round-trip in a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Storage id.
    pub id: Uuid,
    /// Owning user.
    pub user_id: String,
    /// Owning account.
    pub account_id: String,
    /// Monotonic trade number, per user.
    pub trade_no: i64,
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Lifecycle state.
    pub status: TradeStatus,
    /// Date of the opening fill.
    pub opened_at: NaiveDate,
    /// Date of the closing fill, once closed.
    pub closed_at: Option<NaiveDate>,
    /// Realized profit/loss, set at close.
    pub pnl: Option<Decimal>,
}

impl Trade {
    /// Open a new trade for a symbol.
    #[must_use]
    pub fn open(
        user_id: impl Into<String>,
        account_id: impl Into<String>,
        trade_no: i64,
        symbol: Symbol,
        opened_at: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            account_id: account_id.into(),
            trade_no,
            symbol,
            status: TradeStatus::Open,
            opened_at,
            closed_at: None,
            pnl: None,
        }
    }
}

/// A persisted fill, attached to exactly one trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Storage id.
    pub id: Uuid,
    /// Owning trade.
    pub trade_id: Uuid,
    /// Owning account.
    pub account_id: String,
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Fill direction.
    pub side: Side,
    /// Filled quantity (positive).
    pub quantity: Decimal,
    /// Fill price (positive).
    pub price: Decimal,
    /// Execution time (UTC).
    pub executed_at: DateTime<Utc>,
    /// Broker's execution id, when known. Unique per account when present.
    pub broker_exec_id: Option<String>,
    /// Broker's order id, when known.
    pub broker_order_id: Option<String>,
    /// Derived role label.
    pub action: ExecutionAction,
}

/// Re-derive every action label for a trade's chronologically ordered
/// executions.
///
/// Used after manual edits: the first BUY is the Entry, later BUYs are Adds,
/// and a SELL is a Final Exit exactly when the replayed position hits zero.
/// Returns `(execution_id, action)` pairs for the store to apply.
#[must_use]
pub fn recompute_actions(execs: &[Execution]) -> Vec<(Uuid, ExecutionAction)> {
    let mut position = Decimal::ZERO;
    let mut seen_entry = false;
    let mut labels = Vec::with_capacity(execs.len());

    for ex in execs {
        let action = match ex.side {
            Side::Buy => {
                let action = if seen_entry {
                    ExecutionAction::Add
                } else {
                    ExecutionAction::Entry
                };
                seen_entry = true;
                position += ex.quantity;
                action
            }
            Side::Sell => {
                position -= ex.quantity;
                if position.is_zero() {
                    ExecutionAction::FinalExit
                } else {
                    ExecutionAction::PartialExit
                }
            }
        };
        labels.push((ex.id, action));
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn exec(side: Side, qty: Decimal, at: &str) -> Execution {
        Execution {
            id: Uuid::new_v4(),
            trade_id: Uuid::new_v4(),
            account_id: "acct-1".to_string(),
            symbol: Symbol::new("AAPL"),
            side,
            quantity: qty,
            price: dec!(100),
            executed_at: at.parse().unwrap(),
            broker_exec_id: None,
            broker_order_id: None,
            action: ExecutionAction::Entry,
        }
    }

    #[test]
    fn recompute_labels_entry_add_partial_final() {
        let execs = vec![
            exec(Side::Buy, dec!(10), "2024-01-02T10:00:00Z"),
            exec(Side::Buy, dec!(5), "2024-01-02T11:00:00Z"),
            exec(Side::Sell, dec!(5), "2024-01-03T10:00:00Z"),
            exec(Side::Sell, dec!(10), "2024-01-04T10:00:00Z"),
        ];

        let labels = recompute_actions(&execs);
        let actions: Vec<_> = labels.iter().map(|(_, a)| *a).collect();
        assert_eq!(
            actions,
            vec![
                ExecutionAction::Entry,
                ExecutionAction::Add,
                ExecutionAction::PartialExit,
                ExecutionAction::FinalExit,
            ]
        );
    }

    #[test]
    fn recompute_on_empty_is_empty() {
        assert!(recompute_actions(&[]).is_empty());
    }

    #[test]
    fn trade_and_execution_round_trip_through_serde() {
        let trade = Trade::open(
            "user-1",
            "acct-1",
            1,
            Symbol::new("AAPL"),
            "2024-01-02".parse().unwrap(),
        );
        let json = serde_json::to_string(&trade).unwrap();
        let back: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(back, trade);

        let ex = exec(Side::Buy, dec!(10), "2024-01-02T10:00:00Z");
        let json = serde_json::to_string(&ex).unwrap();
        let back: Execution = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ex);
    }

    #[test]
    fn action_labels_serialize_with_spaces() {
        let json = serde_json::to_string(&ExecutionAction::PartialExit).unwrap();
        assert_eq!(json, "\"Partial Exit\"");
        let json = serde_json::to_string(&ExecutionAction::FinalExit).unwrap();
        assert_eq!(json, "\"Final Exit\"");
    }
}
