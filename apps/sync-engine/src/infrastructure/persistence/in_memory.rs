//! In-memory journal store.
//!
//! Reference implementation of [`JournalStore`] backing tests and local
//! development. Mirrors the uniqueness rules a relational store would
//! enforce: `(user, account, trade_no)` on trades and
//! `(account, broker_exec_id)` on executions when the id is present.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::application::ports::{BrokerCredential, JournalStore, StoreError};
use crate::domain::trade::{Account, Execution, ExecutionAction, Trade, TradeStatus};

/// In-memory implementation of [`JournalStore`].
#[derive(Default)]
pub struct InMemoryJournalStore {
    accounts: RwLock<HashMap<String, Account>>,
    credentials: RwLock<HashMap<(String, String), BrokerCredential>>,
    trades: RwLock<HashMap<Uuid, Trade>>,
    executions: RwLock<HashMap<Uuid, Execution>>,
    account_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl InMemoryJournalStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All trades, in no particular order (test support).
    pub async fn all_trades(&self) -> Vec<Trade> {
        self.trades.read().unwrap().values().cloned().collect()
    }

    /// All executions, in no particular order (test support).
    pub async fn all_executions(&self) -> Vec<Execution> {
        self.executions.read().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl JournalStore for InMemoryJournalStore {
    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().unwrap().get(account_id).cloned())
    }

    async fn upsert_account(&self, account: Account) -> Result<(), StoreError> {
        self.accounts
            .write()
            .unwrap()
            .insert(account.id.clone(), account);
        Ok(())
    }

    async fn get_credential(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<Option<BrokerCredential>, StoreError> {
        Ok(self
            .credentials
            .read()
            .unwrap()
            .get(&(user_id.to_string(), account_id.to_string()))
            .cloned())
    }

    async fn put_credential(&self, credential: BrokerCredential) -> Result<(), StoreError> {
        self.credentials.write().unwrap().insert(
            (credential.user_id.clone(), credential.account_id.clone()),
            credential,
        );
        Ok(())
    }

    async fn open_trades(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<Vec<Trade>, StoreError> {
        Ok(self
            .trades
            .read()
            .unwrap()
            .values()
            .filter(|t| {
                t.user_id == user_id
                    && t.account_id == account_id
                    && t.status == TradeStatus::Open
            })
            .cloned()
            .collect())
    }

    async fn next_trade_no(&self, user_id: &str) -> Result<i64, StoreError> {
        let max = self
            .trades
            .read()
            .unwrap()
            .values()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.trade_no)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let mut trades = self.trades.write().unwrap();
        let duplicate = trades.values().any(|t| {
            t.user_id == trade.user_id
                && t.account_id == trade.account_id
                && t.trade_no == trade.trade_no
        });
        if duplicate {
            return Err(StoreError::Conflict {
                key: format!("(user, account, trade_no={})", trade.trade_no),
            });
        }
        trades.insert(trade.id, trade.clone());
        Ok(())
    }

    async fn close_trade(
        &self,
        trade_id: Uuid,
        closed_at: NaiveDate,
        pnl: Option<Decimal>,
    ) -> Result<(), StoreError> {
        let mut trades = self.trades.write().unwrap();
        let trade = trades.get_mut(&trade_id).ok_or(StoreError::NotFound {
            what: format!("trade {trade_id}"),
        })?;
        trade.status = TradeStatus::Closed;
        trade.closed_at = Some(closed_at);
        trade.pnl = pnl;
        Ok(())
    }

    async fn delete_trade(&self, trade_id: Uuid) -> Result<(), StoreError> {
        self.trades.write().unwrap().remove(&trade_id);
        // Cascade: the trade exclusively owns its executions.
        self.executions
            .write()
            .unwrap()
            .retain(|_, ex| ex.trade_id != trade_id);
        Ok(())
    }

    async fn executions_for_trade(&self, trade_id: Uuid) -> Result<Vec<Execution>, StoreError> {
        let mut execs: Vec<Execution> = self
            .executions
            .read()
            .unwrap()
            .values()
            .filter(|ex| ex.trade_id == trade_id)
            .cloned()
            .collect();
        execs.sort_by_key(|ex| ex.executed_at);
        Ok(execs)
    }

    async fn execution_exists(
        &self,
        account_id: &str,
        broker_exec_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.executions.read().unwrap().values().any(|ex| {
            ex.account_id == account_id && ex.broker_exec_id.as_deref() == Some(broker_exec_id)
        }))
    }

    async fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        let mut executions = self.executions.write().unwrap();
        if let Some(exec_id) = &execution.broker_exec_id {
            let duplicate = executions.values().any(|ex| {
                ex.account_id == execution.account_id
                    && ex.broker_exec_id.as_deref() == Some(exec_id.as_str())
            });
            if duplicate {
                return Err(StoreError::Conflict {
                    key: format!("(account, broker_exec_id={exec_id})"),
                });
            }
        }
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn relabel_executions(
        &self,
        trade_id: Uuid,
        labels: &[(Uuid, ExecutionAction)],
    ) -> Result<(), StoreError> {
        let mut executions = self.executions.write().unwrap();
        for (id, action) in labels {
            if let Some(ex) = executions.get_mut(id) {
                if ex.trade_id == trade_id {
                    ex.action = *action;
                }
            }
        }
        Ok(())
    }

    async fn lock_account(&self, account_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.account_locks.lock().unwrap();
            locks
                .entry(account_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fill::{Side, Symbol};
    use rust_decimal_macros::dec;

    fn trade(user: &str, no: i64) -> Trade {
        Trade::open(user, "acct-1", no, Symbol::new("AAPL"), "2024-01-02".parse().unwrap())
    }

    fn execution(trade_id: Uuid, exec_id: Option<&str>, at: &str) -> Execution {
        Execution {
            id: Uuid::new_v4(),
            trade_id,
            account_id: "acct-1".to_string(),
            symbol: Symbol::new("AAPL"),
            side: Side::Buy,
            quantity: dec!(1),
            price: dec!(10),
            executed_at: at.parse().unwrap(),
            broker_exec_id: exec_id.map(String::from),
            broker_order_id: None,
            action: ExecutionAction::Entry,
        }
    }

    #[tokio::test]
    async fn next_trade_no_is_max_plus_one_per_user() {
        let store = InMemoryJournalStore::new();
        assert_eq!(store.next_trade_no("user-1").await.unwrap(), 1);

        store.insert_trade(&trade("user-1", 7)).await.unwrap();
        store.insert_trade(&trade("user-2", 99)).await.unwrap();

        assert_eq!(store.next_trade_no("user-1").await.unwrap(), 8);
        assert_eq!(store.next_trade_no("user-2").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn duplicate_trade_no_conflicts() {
        let store = InMemoryJournalStore::new();
        store.insert_trade(&trade("user-1", 1)).await.unwrap();

        let err = store.insert_trade(&trade("user-1", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn duplicate_broker_exec_id_conflicts() {
        let store = InMemoryJournalStore::new();
        let t = trade("user-1", 1);
        store.insert_trade(&t).await.unwrap();

        store
            .insert_execution(&execution(t.id, Some("e1"), "2024-01-02T15:00:00Z"))
            .await
            .unwrap();
        let err = store
            .insert_execution(&execution(t.id, Some("e1"), "2024-01-02T16:00:00Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        // Executions without a broker exec id never conflict.
        store
            .insert_execution(&execution(t.id, None, "2024-01-02T17:00:00Z"))
            .await
            .unwrap();
        store
            .insert_execution(&execution(t.id, None, "2024-01-02T17:00:00Z"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn executions_for_trade_are_ordered_by_time() {
        let store = InMemoryJournalStore::new();
        let t = trade("user-1", 1);
        store.insert_trade(&t).await.unwrap();

        store
            .insert_execution(&execution(t.id, Some("e2"), "2024-01-03T15:00:00Z"))
            .await
            .unwrap();
        store
            .insert_execution(&execution(t.id, Some("e1"), "2024-01-02T15:00:00Z"))
            .await
            .unwrap();

        let execs = store.executions_for_trade(t.id).await.unwrap();
        assert_eq!(execs[0].broker_exec_id.as_deref(), Some("e1"));
        assert_eq!(execs[1].broker_exec_id.as_deref(), Some("e2"));
    }

    #[tokio::test]
    async fn delete_trade_cascades_to_executions() {
        let store = InMemoryJournalStore::new();
        let t = trade("user-1", 1);
        store.insert_trade(&t).await.unwrap();
        store
            .insert_execution(&execution(t.id, Some("e1"), "2024-01-02T15:00:00Z"))
            .await
            .unwrap();

        store.delete_trade(t.id).await.unwrap();

        assert!(store.all_trades().await.is_empty());
        assert!(store.all_executions().await.is_empty());
        assert!(!store.execution_exists("acct-1", "e1").await.unwrap());
    }

    #[tokio::test]
    async fn relabel_rewrites_actions_for_owned_executions_only() {
        let store = InMemoryJournalStore::new();
        let t1 = trade("user-1", 1);
        let t2 = trade("user-1", 2);
        store.insert_trade(&t1).await.unwrap();
        store.insert_trade(&t2).await.unwrap();
        let ex1 = execution(t1.id, Some("e1"), "2024-01-02T15:00:00Z");
        let ex2 = execution(t2.id, Some("e2"), "2024-01-02T15:00:00Z");
        store.insert_execution(&ex1).await.unwrap();
        store.insert_execution(&ex2).await.unwrap();

        store
            .relabel_executions(
                t1.id,
                &[(ex1.id, ExecutionAction::Add), (ex2.id, ExecutionAction::Add)],
            )
            .await
            .unwrap();

        let t1_execs = store.executions_for_trade(t1.id).await.unwrap();
        assert_eq!(t1_execs[0].action, ExecutionAction::Add);
        // ex2 belongs to t2 and is untouched.
        let t2_execs = store.executions_for_trade(t2.id).await.unwrap();
        assert_eq!(t2_execs[0].action, ExecutionAction::Entry);
    }

    #[tokio::test]
    async fn account_lock_serializes_holders() {
        let store = Arc::new(InMemoryJournalStore::new());

        let guard = store.lock_account("acct-1").await;
        let store2 = store.clone();
        let contender = tokio::spawn(async move {
            let _guard = store2.lock_account("acct-1").await;
        });

        // The second holder cannot proceed until the first guard drops.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }
}
