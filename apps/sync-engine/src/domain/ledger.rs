//! Average-cost position ledger.
//!
//! [`build_ledger`] is the single source of truth for running position,
//! average cost, and realized P/L. It is pure and deterministic: no IO, no
//! time, no randomness. Two replays of the same execution sequence always
//! produce identical rows, and a prefix of the input produces a prefix of
//! the output.

use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use super::fill::Side;
use super::trade::Execution;

/// Derived per-execution snapshot of the running position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    /// Execution this row was derived from.
    pub execution_id: Uuid,
    /// Signed running quantity after this execution.
    pub position: Decimal,
    /// Average cost of the open lot, `None` when flat.
    pub avg_price: Option<Decimal>,
    /// `position * avg_price`, `None` when flat.
    pub position_size: Option<Decimal>,
    /// Cumulative realized P/L, surfaced only on the SELL row that returns
    /// the position to exactly zero.
    pub realized_pnl: Option<Decimal>,
}

/// Round a monetary value to 2 decimal places for emission.
///
/// Midpoint-away-from-zero, so `2.005` rounds to `2.01`. Accumulators are
/// never rounded; only the row's public fields are.
#[must_use]
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Replay a chronologically ordered execution sequence into ledger rows,
/// one row per execution.
///
/// - BUY adds quantity at price to the open lot.
/// - SELL realizes `(price - avg) * qty` against the current average cost
///   and reduces the basis proportionally.
/// - A SELL with no open position is ignored (bad import / missing BUY);
///   realizing against a phantom lot would fabricate large P/L numbers.
/// - Rows with non-positive quantity or price pass through with the prior
///   position unchanged and never touch the accumulators.
#[must_use]
pub fn build_ledger(execs: &[Execution]) -> Vec<LedgerRow> {
    let mut rows = Vec::with_capacity(execs.len());
    let mut position = Decimal::ZERO;
    // Total $ cost of the current open lot.
    let mut cost_basis = Decimal::ZERO;
    let mut realized = Decimal::ZERO;

    for ex in execs {
        let qty = ex.quantity;
        let px = ex.price;

        if qty <= Decimal::ZERO || px <= Decimal::ZERO {
            rows.push(row_for(ex.id, position, cost_basis, None));
            continue;
        }

        match ex.side {
            Side::Buy => {
                position += qty;
                cost_basis += qty * px;
            }
            Side::Sell => {
                if position > Decimal::ZERO {
                    let avg = cost_basis / position;
                    realized += (px - avg) * qty;
                    position -= qty;
                    cost_basis -= avg * qty;
                }
            }
        }

        // Only surface realized P/L on the final exit row.
        let realized_pnl = if ex.side == Side::Sell && position.is_zero() {
            Some(round2(realized))
        } else {
            None
        };
        rows.push(row_for(ex.id, position, cost_basis, realized_pnl));
    }

    rows
}

fn row_for(
    execution_id: Uuid,
    position: Decimal,
    cost_basis: Decimal,
    realized_pnl: Option<Decimal>,
) -> LedgerRow {
    let avg_price = (position > Decimal::ZERO).then(|| cost_basis / position);
    LedgerRow {
        execution_id,
        position,
        avg_price: avg_price.map(round2),
        position_size: avg_price.map(|avg| round2(position * avg)),
        realized_pnl,
    }
}
