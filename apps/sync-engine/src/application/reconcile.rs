//! Reconciliation Engine: maps an ordered stream of fills onto trade
//! lifecycles.
//!
//! The engine consumes a deduplicated, chronologically ordered fill sequence
//! together with the account's currently OPEN trades and produces trade
//! creations, execution insertions, and trade closures. The open-trade index
//! and per-symbol running positions are explicit state built at the start of
//! the call and threaded through it, so the engine is a function of
//! (stored open trades, fills) rather than of ambient state.
//!
//! Ordering matters: lifecycle transitions depend on the running position per
//! symbol, so fills must arrive strictly in execution order. Callers hold the
//! account-scoped lock for the duration of a run.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::ports::{JournalStore, StoreError};
use crate::domain::fill::{Fill, Side, Symbol};
use crate::domain::ledger::build_ledger;
use crate::domain::trade::{Account, Execution, ExecutionAction, Trade};
use crate::error::SyncError;

/// Summary counters for one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// Fills presented to the engine (post-dedup).
    pub fills_seen: u64,
    /// Trades created during the run.
    pub trades_created: u64,
    /// Executions inserted during the run.
    pub executions_inserted: u64,
    /// Trades closed during the run.
    pub trades_closed: u64,
}

/// Per-symbol state for the currently active trade.
struct ActiveTrade {
    trade_id: Uuid,
    position: Decimal,
    executions: Vec<Execution>,
}

/// Reconciliation engine over a journal store.
pub struct ReconcileEngine<S> {
    store: Arc<S>,
}

impl<S: JournalStore> ReconcileEngine<S> {
    /// Create a new engine.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Run reconciliation for one account.
    pub async fn run(
        &self,
        account: &Account,
        fills: &[Fill],
    ) -> Result<ReconcileSummary, SyncError> {
        let mut summary = ReconcileSummary {
            fills_seen: fills.len() as u64,
            ..ReconcileSummary::default()
        };

        // Open-trade index with cached executions and replayed positions.
        let mut active: HashMap<Symbol, ActiveTrade> = HashMap::new();
        for trade in self
            .store
            .open_trades(&account.user_id, &account.id)
            .await?
        {
            let executions = self.store.executions_for_trade(trade.id).await?;
            let position = build_ledger(&executions)
                .last()
                .map_or(Decimal::ZERO, |row| row.position);
            active.insert(
                trade.symbol.clone(),
                ActiveTrade {
                    trade_id: trade.id,
                    position,
                    executions,
                },
            );
        }

        let mut next_trade_no = self.store.next_trade_no(&account.user_id).await?;

        for fill in fills {
            // Idempotency: a fill whose broker exec id is already stored for
            // this account has been synced before.
            if let Some(exec_id) = &fill.broker_exec_id {
                if self.store.execution_exists(&account.id, exec_id).await? {
                    continue;
                }
            }

            if !active.contains_key(&fill.symbol) {
                // A sell with no open trade cannot open one: realizing
                // against a position we never held would start a trade with
                // negative quantity.
                if fill.side == Side::Sell {
                    debug!(
                        account_id = %account.id,
                        symbol = %fill.symbol,
                        "Dropping sell with no open trade"
                    );
                    continue;
                }

                let trade = Trade::open(
                    &account.user_id,
                    &account.id,
                    next_trade_no,
                    fill.symbol.clone(),
                    fill.executed_at.date_naive(),
                );
                next_trade_no += 1;
                self.store.insert_trade(&trade).await?;
                summary.trades_created += 1;
                debug!(
                    account_id = %account.id,
                    symbol = %fill.symbol,
                    trade_no = trade.trade_no,
                    "Opened trade"
                );
                active.insert(
                    fill.symbol.clone(),
                    ActiveTrade {
                        trade_id: trade.id,
                        position: Decimal::ZERO,
                        executions: Vec::new(),
                    },
                );
            }

            // Index entry exists from here on.
            let Some(state) = active.get_mut(&fill.symbol) else {
                continue;
            };

            let next_position = match fill.side {
                Side::Buy => state.position + fill.quantity,
                Side::Sell => state.position - fill.quantity,
            };
            // Action from the position *before* this fill.
            let action = match fill.side {
                Side::Buy if state.position.is_zero() => ExecutionAction::Entry,
                Side::Buy => ExecutionAction::Add,
                Side::Sell if next_position.is_zero() => ExecutionAction::FinalExit,
                Side::Sell => ExecutionAction::PartialExit,
            };

            let execution = Execution {
                id: Uuid::new_v4(),
                trade_id: state.trade_id,
                account_id: account.id.clone(),
                symbol: fill.symbol.clone(),
                side: fill.side,
                quantity: fill.quantity,
                price: fill.price,
                executed_at: fill.executed_at,
                broker_exec_id: fill.broker_exec_id.clone(),
                broker_order_id: fill.broker_order_id.clone(),
                action,
            };

            match self.store.insert_execution(&execution).await {
                Ok(()) => {}
                // Concurrent-insert race on broker_exec_id uniqueness:
                // another run already synced this fill.
                Err(StoreError::Conflict { key }) => {
                    debug!(account_id = %account.id, key, "Execution already synced");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
            summary.executions_inserted += 1;

            state.position = next_position;
            state.executions.push(execution);
            state
                .executions
                .sort_by_key(|ex| ex.executed_at);

            if next_position.is_zero() {
                // Position returned to exactly zero: close the trade with the
                // ledger's realized P/L and clear the open index so the next
                // fill in this symbol starts a fresh trade.
                let pnl = build_ledger(&state.executions)
                    .last()
                    .and_then(|row| row.realized_pnl);
                self.store
                    .close_trade(state.trade_id, fill.executed_at.date_naive(), pnl)
                    .await?;
                summary.trades_closed += 1;
                debug!(
                    account_id = %account.id,
                    symbol = %fill.symbol,
                    pnl = ?pnl,
                    "Closed trade"
                );
                active.remove(&fill.symbol);
            }
        }

        info!(
            account_id = %account.id,
            fills_seen = summary.fills_seen,
            trades_created = summary.trades_created,
            executions_inserted = summary.executions_inserted,
            trades_closed = summary.trades_closed,
            "Reconciliation complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::TradeStatus;
    use crate::infrastructure::persistence::InMemoryJournalStore;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    fn account() -> Account {
        Account {
            id: "acct-1".to_string(),
            user_id: "user-1".to_string(),
        }
    }

    fn fill(
        exec_id: Option<&str>,
        symbol: &str,
        side: Side,
        qty: Decimal,
        px: Decimal,
        at: &str,
    ) -> Fill {
        Fill {
            broker_exec_id: exec_id.map(String::from),
            broker_order_id: None,
            symbol: Symbol::new(symbol),
            side,
            quantity: qty,
            price: px,
            executed_at: at.parse::<DateTime<Utc>>().unwrap(),
        }
    }

    async fn store_with_account() -> Arc<InMemoryJournalStore> {
        let store = Arc::new(InMemoryJournalStore::new());
        store.upsert_account(account()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn buy_then_close_sets_pnl_from_ledger() {
        let store = store_with_account().await;
        let engine = ReconcileEngine::new(store.clone());

        let fills = vec![
            fill(Some("e1"), "AAPL", Side::Buy, dec!(100), dec!(50), "2024-01-02T15:00:00Z"),
            fill(Some("e2"), "AAPL", Side::Sell, dec!(40), dec!(55), "2024-01-03T15:00:00Z"),
            fill(Some("e3"), "AAPL", Side::Sell, dec!(60), dec!(52), "2024-01-04T15:00:00Z"),
        ];
        let summary = engine.run(&account(), &fills).await.unwrap();

        assert_eq!(summary.trades_created, 1);
        assert_eq!(summary.executions_inserted, 3);
        assert_eq!(summary.trades_closed, 1);

        let trades = store.all_trades().await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, TradeStatus::Closed);
        assert_eq!(trades[0].pnl, Some(dec!(320.00)));
        assert_eq!(
            trades[0].closed_at,
            Some("2024-01-04".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn reentry_starts_a_new_trade_number() {
        let store = store_with_account().await;
        let engine = ReconcileEngine::new(store.clone());

        let fills = vec![
            fill(Some("e1"), "AAPL", Side::Buy, dec!(10), dec!(10), "2024-01-02T15:00:00Z"),
            fill(Some("e2"), "AAPL", Side::Sell, dec!(10), dec!(12), "2024-01-03T15:00:00Z"),
            fill(Some("e3"), "AAPL", Side::Buy, dec!(5), dec!(11), "2024-01-04T15:00:00Z"),
        ];
        let summary = engine.run(&account(), &fills).await.unwrap();

        assert_eq!(summary.trades_created, 2);
        assert_eq!(summary.trades_closed, 1);

        let mut trades = store.all_trades().await;
        trades.sort_by_key(|t| t.trade_no);
        assert_eq!(trades[0].trade_no, 1);
        assert_eq!(trades[0].status, TradeStatus::Closed);
        assert_eq!(trades[1].trade_no, 2);
        assert_eq!(trades[1].status, TradeStatus::Open);
        assert_ne!(trades[0].id, trades[1].id);
    }

    #[tokio::test]
    async fn sell_without_open_trade_is_dropped() {
        let store = store_with_account().await;
        let engine = ReconcileEngine::new(store.clone());

        let fills = vec![fill(
            Some("e1"),
            "AAPL",
            Side::Sell,
            dec!(10),
            dec!(50),
            "2024-01-02T15:00:00Z",
        )];
        let summary = engine.run(&account(), &fills).await.unwrap();

        assert_eq!(summary.trades_created, 0);
        assert_eq!(summary.executions_inserted, 0);
        assert!(store.all_trades().await.is_empty());
    }

    #[tokio::test]
    async fn rerun_with_same_fills_is_idempotent() {
        let store = store_with_account().await;
        let engine = ReconcileEngine::new(store.clone());

        let fills = vec![
            fill(Some("e1"), "AAPL", Side::Buy, dec!(10), dec!(10), "2024-01-02T15:00:00Z"),
            fill(Some("e2"), "AAPL", Side::Sell, dec!(10), dec!(12), "2024-01-03T15:00:00Z"),
        ];
        let first = engine.run(&account(), &fills).await.unwrap();
        assert_eq!(first.trades_created, 1);
        assert_eq!(first.executions_inserted, 2);

        let second = engine.run(&account(), &fills).await.unwrap();
        assert_eq!(second.trades_created, 0);
        assert_eq!(second.executions_inserted, 0);
        assert_eq!(second.trades_closed, 0);
    }

    #[tokio::test]
    async fn actions_follow_position_before_each_fill() {
        let store = store_with_account().await;
        let engine = ReconcileEngine::new(store.clone());

        let fills = vec![
            fill(Some("e1"), "AAPL", Side::Buy, dec!(10), dec!(10), "2024-01-02T15:00:00Z"),
            fill(Some("e2"), "AAPL", Side::Buy, dec!(5), dec!(11), "2024-01-02T16:00:00Z"),
            fill(Some("e3"), "AAPL", Side::Sell, dec!(5), dec!(12), "2024-01-03T15:00:00Z"),
            fill(Some("e4"), "AAPL", Side::Sell, dec!(10), dec!(12), "2024-01-04T15:00:00Z"),
        ];
        engine.run(&account(), &fills).await.unwrap();

        let trades = store.all_trades().await;
        let execs = store.executions_for_trade(trades[0].id).await.unwrap();
        let actions: Vec<_> = execs.iter().map(|ex| ex.action).collect();
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

    #[tokio::test]
    async fn resumes_open_trade_from_stored_executions() {
        let store = store_with_account().await;
        let engine = ReconcileEngine::new(store.clone());

        // First run opens the position.
        let opening = vec![fill(
            Some("e1"),
            "AAPL",
            Side::Buy,
            dec!(10),
            dec!(10),
            "2024-01-02T15:00:00Z",
        )];
        engine.run(&account(), &opening).await.unwrap();

        // Second run closes it; the engine must replay the stored executions
        // to recover the running position.
        let closing = vec![fill(
            Some("e2"),
            "AAPL",
            Side::Sell,
            dec!(10),
            dec!(12),
            "2024-01-03T15:00:00Z",
        )];
        let summary = engine.run(&account(), &closing).await.unwrap();

        assert_eq!(summary.trades_created, 0);
        assert_eq!(summary.trades_closed, 1);
        let trades = store.all_trades().await;
        assert_eq!(trades[0].pnl, Some(dec!(20.00)));
    }

    #[tokio::test]
    async fn independent_symbols_get_independent_trades() {
        let store = store_with_account().await;
        let engine = ReconcileEngine::new(store.clone());

        let fills = vec![
            fill(Some("e1"), "AAPL", Side::Buy, dec!(10), dec!(10), "2024-01-02T15:00:00Z"),
            fill(Some("e2"), "MSFT", Side::Buy, dec!(3), dec!(400), "2024-01-02T16:00:00Z"),
            fill(Some("e3"), "AAPL", Side::Sell, dec!(10), dec!(11), "2024-01-03T15:00:00Z"),
        ];
        let summary = engine.run(&account(), &fills).await.unwrap();

        assert_eq!(summary.trades_created, 2);
        assert_eq!(summary.trades_closed, 1);
        let open = store.open_trades("user-1", "acct-1").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].symbol.as_str(), "MSFT");
    }
}
