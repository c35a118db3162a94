//! Canonical fill value types produced by normalization.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A trading symbol (ticker).
///
/// Normalized to uppercase on construction so lookups against the open-trade
/// index never depend on broker casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a new Symbol, normalized to uppercase.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().to_uppercase())
    }

    /// Get the symbol string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the symbol is empty (unresolvable).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy (opens or adds to a position).
    Buy,
    /// Sell (reduces or closes a position).
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// A single normalized buy/sell execution extracted from brokerage
/// transaction data.
///
/// Ephemeral: fills exist between normalization and reconciliation and are
/// never persisted directly. Invariant: `quantity > 0` and `price > 0`
/// (fills that cannot satisfy this are discarded by the normalizer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Broker's execution id, when the payload carries one.
    pub broker_exec_id: Option<String>,
    /// Broker's order id, when the payload carries one.
    pub broker_order_id: Option<String>,
    /// Instrument symbol.
    pub symbol: Symbol,
    /// Fill direction.
    pub side: Side,
    /// Filled quantity (always positive).
    pub quantity: Decimal,
    /// Fill price (always positive).
    pub price: Decimal,
    /// Execution time (UTC).
    pub executed_at: DateTime<Utc>,
}

impl Fill {
    /// Deduplication key for collapsing identical fills fetched from
    /// overlapping windows.
    ///
    /// Deliberately coarser than `broker_exec_id` alone because some payload
    /// shapes omit a stable id.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.broker_exec_id.as_deref().unwrap_or("na"),
            self.executed_at.to_rfc3339(),
            self.symbol,
            self.side,
            self.quantity,
            self.price,
        )
    }
}
