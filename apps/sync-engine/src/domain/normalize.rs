//! Fill Normalizer: brokerage transaction payloads to canonical fills.
//!
//! Brokerage transaction history is heterogeneous: the same endpoint returns
//! several record shapes, legs live under different keys, and numeric ids
//! arrive as strings or numbers. The models here are deliberately permissive
//! (every field optional, unknown keys ignored) so one serde pass absorbs all
//! known shapes; the resolution order for each canonical field is then a
//! small, explicit fallback chain.
//!
//! Records that cannot be resolved into a priced, sized, dated fill are
//! dropped silently: partial loss is preferable to aborting a whole sync
//! over one malformed record.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::fill::{Fill, Side, Symbol};

/// An id that may arrive as a JSON string or number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    /// String-shaped id.
    Text(String),
    /// Integer-shaped id.
    Int(i64),
    /// Float-shaped id (seen on some legacy payloads).
    Float(f64),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
        }
    }
}

/// Instrument description attached to a transaction or leg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInstrument {
    /// Instrument symbol.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Underlying symbol (options and other derivatives).
    #[serde(default)]
    pub underlying_symbol: Option<String>,
}

/// A sub-item of a transaction describing one instrument fill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLeg {
    /// Instrument details.
    #[serde(default)]
    pub instrument: Option<RawInstrument>,
    /// Leg-level symbol (older shapes).
    #[serde(default)]
    pub symbol: Option<String>,
    /// Signed amount; the sign drives side inference when no instruction is
    /// present.
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Quantity (alternate key).
    #[serde(default)]
    pub quantity: Option<Decimal>,
    /// Quantity (another alternate key).
    #[serde(default)]
    pub qty: Option<Decimal>,
    /// Leg fill price.
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Explicit instruction, e.g. `BUY`, `SELL_SHORT`.
    #[serde(default)]
    pub instruction: Option<String>,
    /// Explicit action (alternate key for instruction).
    #[serde(default)]
    pub action: Option<String>,
}

/// One raw transaction record from the brokerage history endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    /// Transaction type tag; only absent or `TRADE` records are kept.
    #[serde(rename = "type", alias = "transactionType", default)]
    pub transaction_type: Option<String>,
    /// Trade timestamp (preferred).
    #[serde(default)]
    pub trade_date: Option<String>,
    /// Transaction timestamp.
    #[serde(default)]
    pub transaction_date: Option<String>,
    /// Timestamp (older shapes).
    #[serde(default)]
    pub time: Option<String>,
    /// Settlement date (last resort).
    #[serde(default)]
    pub settlement_date: Option<String>,
    /// Broker execution id.
    #[serde(default)]
    pub transaction_id: Option<RawId>,
    /// Broker execution id (alternate key).
    #[serde(default)]
    pub id: Option<RawId>,
    /// Broker order id.
    #[serde(default)]
    pub order_id: Option<RawId>,
    /// Record-level symbol.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Record-level instrument.
    #[serde(default)]
    pub instrument: Option<RawInstrument>,
    /// Record-level signed amount.
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Record-level quantity.
    #[serde(default)]
    pub quantity: Option<Decimal>,
    /// Record-level price.
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Net cash amount; used to derive a price when none is given.
    #[serde(default)]
    pub net_amount: Option<Decimal>,
    /// Legs, current shape.
    #[serde(default)]
    pub transfer_items: Option<Vec<RawLeg>>,
    /// Single-leg shape.
    #[serde(default)]
    pub transaction_item: Option<RawLeg>,
    /// Legs, older shape.
    #[serde(default)]
    pub items: Option<Vec<RawLeg>>,
    /// Legs, order-style shape.
    #[serde(default)]
    pub order_leg_collection: Option<Vec<RawLeg>>,
}

impl RawTransaction {
    /// Execution timestamp, first parseable of the known date fields.
    fn executed_at(&self) -> Option<DateTime<Utc>> {
        [
            &self.trade_date,
            &self.transaction_date,
            &self.time,
            &self.settlement_date,
        ]
        .into_iter()
        .flatten()
        .find_map(|s| parse_timestamp(s))
    }

    /// Legs of this transaction, trying each known shape in order.
    fn legs(&self) -> Vec<&RawLeg> {
        if let Some(items) = &self.transfer_items {
            return items.iter().collect();
        }
        if let Some(item) = &self.transaction_item {
            return vec![item];
        }
        if let Some(items) = &self.items {
            return items.iter().collect();
        }
        if let Some(items) = &self.order_leg_collection {
            return items.iter().collect();
        }
        Vec::new()
    }

    /// Broker execution id, stringified.
    fn broker_exec_id(&self) -> Option<String> {
        self.transaction_id
            .as_ref()
            .or(self.id.as_ref())
            .map(ToString::to_string)
    }

    /// Broker order id, stringified.
    fn broker_order_id(&self) -> Option<String> {
        self.order_id.as_ref().map(ToString::to_string)
    }
}

/// Parse a brokerage timestamp.
///
/// Accepts RFC 3339, the broker's `+0000`-style offset variant, and bare
/// dates (midnight UTC).
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
    }
    None
}

/// First non-zero value among the candidates.
fn first_nonzero(candidates: &[Option<Decimal>]) -> Option<Decimal> {
    candidates
        .iter()
        .flatten()
        .find(|v| !v.is_zero())
        .copied()
}

/// Side from an explicit instruction token, matched case-insensitively.
///
/// `SELL` is checked last so compound tokens like `SELL_SHORT` resolve to
/// Sell even when they also contain `BUY`-adjacent text.
fn side_from_instruction(leg: &RawLeg) -> Option<Side> {
    let instr = leg
        .instruction
        .as_deref()
        .or(leg.action.as_deref())
        .unwrap_or("")
        .to_uppercase();
    let mut side = None;
    if instr.contains("BUY") {
        side = Some(Side::Buy);
    }
    if instr.contains("SELL") {
        side = Some(Side::Sell);
    }
    side
}

/// Convert raw transaction records into canonical fills, sorted ascending by
/// execution time.
///
/// Non-trade transaction types are dropped. A record with legs emits one fill
/// per resolvable leg; a record without legs falls back to its top-level
/// fields. Records with no parseable timestamp are stamped with the current
/// time rather than dropped, mirroring upstream behavior for payloads that
/// omit every date field.
#[must_use]
pub fn normalize(transactions: &[RawTransaction]) -> Vec<Fill> {
    let mut out = Vec::new();

    for tx in transactions {
        let type_tag = tx
            .transaction_type
            .as_deref()
            .unwrap_or("")
            .to_uppercase();
        if !type_tag.is_empty() && type_tag != "TRADE" {
            continue;
        }

        let executed_at = tx.executed_at().unwrap_or_else(Utc::now);
        let legs = tx.legs();

        if legs.is_empty() {
            if let Some(fill) = fill_from_record(tx, executed_at) {
                out.push(fill);
            }
            continue;
        }

        for leg in legs {
            if let Some(fill) = fill_from_leg(tx, leg, executed_at) {
                out.push(fill);
            }
        }
    }

    out.sort_by_key(|f| f.executed_at);
    out
}

/// Top-level fallback for records without legs.
fn fill_from_record(tx: &RawTransaction, executed_at: DateTime<Utc>) -> Option<Fill> {
    let symbol = tx
        .symbol
        .as_deref()
        .or_else(|| tx.instrument.as_ref().and_then(|i| i.symbol.as_deref()))
        .map(Symbol::new)
        .filter(|s| !s.is_empty())?;

    let qty_raw = first_nonzero(&[tx.amount, tx.quantity])?;
    let quantity = qty_raw.abs();

    let px = tx
        .price
        .unwrap_or_else(|| tx.net_amount.or(tx.amount).unwrap_or_default() / qty_raw);
    let price = px.abs();
    if price.is_zero() {
        return None;
    }

    Some(Fill {
        broker_exec_id: tx.broker_exec_id(),
        broker_order_id: tx.broker_order_id(),
        symbol,
        side: if qty_raw > Decimal::ZERO {
            Side::Buy
        } else {
            Side::Sell
        },
        quantity,
        price,
        executed_at,
    })
}

/// One fill per resolvable leg.
fn fill_from_leg(tx: &RawTransaction, leg: &RawLeg, executed_at: DateTime<Utc>) -> Option<Fill> {
    let symbol = leg
        .instrument
        .as_ref()
        .and_then(|i| i.symbol.as_deref())
        .or_else(|| {
            leg.instrument
                .as_ref()
                .and_then(|i| i.underlying_symbol.as_deref())
        })
        .or(leg.symbol.as_deref())
        .or(tx.symbol.as_deref())
        .map(Symbol::new)
        .filter(|s| !s.is_empty())?;

    let qty_raw = first_nonzero(&[leg.amount, leg.quantity, leg.qty])?;
    let quantity = qty_raw.abs();

    let px = leg.price.or(tx.price).unwrap_or_default();
    let price = if px.is_zero() {
        tx.net_amount.unwrap_or_default().abs() / quantity
    } else {
        px.abs()
    };
    if price.is_zero() {
        return None;
    }

    // Side inference: explicit instruction wins; otherwise the sign of the
    // raw quantity decides (non-negative = BUY). Known approximation when
    // upstream sign conventions differ by payload shape.
    let side = side_from_instruction(leg).unwrap_or(if qty_raw >= Decimal::ZERO {
        Side::Buy
    } else {
        Side::Sell
    });

    Some(Fill {
        broker_exec_id: tx.broker_exec_id(),
        broker_order_id: tx.broker_order_id(),
        symbol,
        side,
        quantity,
        price,
        executed_at,
    })
}
