//! Sync Orchestrator: windowed brokerage fetches feeding reconciliation.
//!
//! Drives the whole pull: resolve credentials (refreshing if the token is
//! near expiry), resolve the routing handle, fetch transaction windows,
//! normalize and deduplicate fills, then hand the chronological stream to
//! the [`ReconcileEngine`] under the account-scoped lock.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Days, Months, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::application::ports::{BrokeragePort, CredentialPort, JournalStore};
use crate::application::reconcile::ReconcileEngine;
use crate::domain::fill::Fill;
use crate::domain::normalize::normalize;
use crate::domain::trade::Account;
use crate::error::SyncError;

/// Transaction type filter sent to the history endpoint.
const TRADE_TYPE_FILTER: &str = "TRADE";

/// How far a sync reaches back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// One window covering the recent past (default 180 days).
    Recent,
    /// Fixed number of twelve-month windows walking backward.
    All,
}

/// A sync invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncRequest {
    /// User-facing account id.
    pub account_id: String,
    /// Reach-back mode.
    pub mode: SyncMode,
}

/// Counters returned to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Windows for which a fetch call was issued.
    pub windows_fetched: u64,
    /// Fills presented to reconciliation after dedup.
    pub fills_seen: u64,
    /// Trades created.
    pub trades_created: u64,
    /// Executions inserted.
    pub executions_inserted: u64,
    /// Trades closed.
    pub trades_closed: u64,
}

/// Window-planning knobs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Days covered by a RECENT sync.
    pub recent_window_days: u64,
    /// Number of windows issued by an ALL sync. A safety bound on API call
    /// volume, not derived from any account property.
    pub full_history_windows: u32,
    /// Months per ALL-mode window.
    pub window_months: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            recent_window_days: 180,
            full_history_windows: 10,
            window_months: 12,
        }
    }
}

/// One fetch window, inclusive start to exclusive end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Window start.
    pub start: DateTime<Utc>,
    /// Window end.
    pub end: DateTime<Utc>,
}

/// Plan the fetch windows for a mode, newest first.
///
/// ALL always plans exactly `full_history_windows` windows regardless of
/// data density.
#[must_use]
pub fn plan_windows(now: DateTime<Utc>, mode: SyncMode, config: &SyncConfig) -> Vec<Window> {
    match mode {
        SyncMode::Recent => {
            let start = now - Days::new(config.recent_window_days);
            vec![Window { start, end: now }]
        }
        SyncMode::All => {
            let mut windows = Vec::with_capacity(config.full_history_windows as usize);
            let mut end = now;
            for _ in 0..config.full_history_windows {
                let start = end - Months::new(config.window_months);
                windows.push(Window { start, end });
                end = start;
            }
            windows
        }
    }
}

/// Collapse exact duplicates across overlapping windows, preserving order.
fn dedup_fills(fills: Vec<Fill>) -> Vec<Fill> {
    let mut seen = HashSet::new();
    fills
        .into_iter()
        .filter(|fill| seen.insert(fill.dedup_key()))
        .collect()
}

/// The sync use case, wired over the three driven ports.
pub struct SyncService<B, C, S> {
    broker: Arc<B>,
    credentials: Arc<C>,
    store: Arc<S>,
    config: SyncConfig,
}

impl<B, C, S> SyncService<B, C, S>
where
    B: BrokeragePort,
    C: CredentialPort,
    S: JournalStore,
{
    /// Create a new sync service.
    pub fn new(broker: Arc<B>, credentials: Arc<C>, store: Arc<S>, config: SyncConfig) -> Self {
        Self {
            broker,
            credentials,
            store,
            config,
        }
    }

    /// Run one sync for an account.
    pub async fn sync(&self, request: &SyncRequest) -> Result<SyncSummary, SyncError> {
        if request.account_id.trim().is_empty() {
            return Err(SyncError::Validation("missing account_id".to_string()));
        }
        let account = self
            .store
            .get_account(&request.account_id)
            .await?
            .ok_or_else(|| {
                SyncError::Validation(format!("unknown account: {}", request.account_id))
            })?;

        let credential = self
            .credentials
            .get_valid_token(&account.user_id, &account.id)
            .await?;
        let routing_handle = self.resolve_routing_handle(&account, &credential).await?;

        let windows = plan_windows(Utc::now(), request.mode, &self.config);
        let mut raw_fills = Vec::new();
        let mut failed_windows = 0_usize;

        for window in &windows {
            match self
                .broker
                .list_transactions(
                    &credential.access_token,
                    &routing_handle,
                    window.start,
                    window.end,
                    TRADE_TYPE_FILTER,
                )
                .await
            {
                Ok(transactions) => raw_fills.extend(normalize(&transactions)),
                Err(err) => {
                    // A failed window contributes zero fills; the others
                    // still count.
                    failed_windows += 1;
                    warn!(
                        account_id = %account.id,
                        start = %window.start,
                        end = %window.end,
                        error = %err,
                        "Transaction window fetch failed"
                    );
                }
            }
        }

        if failed_windows == windows.len() {
            return Err(SyncError::Upstream(format!(
                "all {} transaction windows failed",
                windows.len()
            )));
        }

        // Windows overlap and arrive per-window sorted; merge, re-sort
        // globally, then collapse duplicates.
        raw_fills.sort_by_key(|fill| fill.executed_at);
        let fills = dedup_fills(raw_fills);

        info!(
            account_id = %account.id,
            windows = windows.len(),
            failed_windows,
            fills = fills.len(),
            "Fetched and normalized fills"
        );

        // Reconciliation requires exclusive ownership of the account's
        // open-trade set.
        let _guard = self.store.lock_account(&account.id).await;
        let outcome = ReconcileEngine::new(self.store.clone())
            .run(&account, &fills)
            .await?;

        Ok(SyncSummary {
            windows_fetched: windows.len() as u64,
            fills_seen: outcome.fills_seen,
            trades_created: outcome.trades_created,
            executions_inserted: outcome.executions_inserted,
            trades_closed: outcome.trades_closed,
        })
    }

    /// Resolve the brokerage routing handle, fetching and persisting it the
    /// first time.
    async fn resolve_routing_handle(
        &self,
        account: &Account,
        credential: &crate::application::ports::BrokerCredential,
    ) -> Result<String, SyncError> {
        if let Some(handle) = &credential.routing_handle {
            return Ok(handle.clone());
        }

        let pairs = self
            .broker
            .list_account_numbers(&credential.access_token)
            .await?;
        let first = pairs.first().ok_or_else(|| {
            SyncError::Auth("no brokerage accounts visible to this token; reconnect".to_string())
        })?;
        let handle = first.routing_handle.clone().ok_or_else(|| {
            SyncError::Auth("unable to resolve account routing handle; reconnect".to_string())
        })?;

        self.credentials
            .save_routing_handle(
                &account.user_id,
                &account.id,
                &handle,
                first.account_number.as_deref(),
            )
            .await?;
        info!(account_id = %account.id, "Resolved and cached routing handle");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fill::{Side, Symbol};
    use rust_decimal_macros::dec;

    #[test]
    fn recent_mode_plans_one_180_day_window() {
        let now: DateTime<Utc> = "2024-06-30T00:00:00Z".parse().unwrap();
        let windows = plan_windows(now, SyncMode::Recent, &SyncConfig::default());

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].end, now);
        assert_eq!(windows[0].start, "2024-01-02T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn all_mode_plans_exactly_the_configured_window_count() {
        let now: DateTime<Utc> = "2024-06-30T00:00:00Z".parse().unwrap();
        let windows = plan_windows(now, SyncMode::All, &SyncConfig::default());

        assert_eq!(windows.len(), 10);
        // Contiguous: each window ends where the newer one starts.
        for pair in windows.windows(2) {
            assert_eq!(pair[0].start, pair[1].end);
        }
        assert_eq!(windows[0].end, now);
        assert_eq!(
            windows[9].start,
            "2014-06-30T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn all_mode_honors_configured_cap() {
        let config = SyncConfig {
            full_history_windows: 3,
            ..SyncConfig::default()
        };
        let windows = plan_windows(Utc::now(), SyncMode::All, &config);
        assert_eq!(windows.len(), 3);
    }

    #[test]
    fn dedup_collapses_identical_fills_and_keeps_order() {
        let fill = |exec_id: Option<&str>, px| Fill {
            broker_exec_id: exec_id.map(String::from),
            broker_order_id: None,
            symbol: Symbol::new("AAPL"),
            side: Side::Buy,
            quantity: dec!(10),
            price: px,
            executed_at: "2024-03-01T14:30:00Z".parse().unwrap(),
        };

        let fills = vec![
            fill(Some("e1"), dec!(50)),
            fill(Some("e1"), dec!(50)),
            fill(Some("e1"), dec!(51)),
            fill(None, dec!(50)),
            fill(None, dec!(50)),
        ];
        let deduped = dedup_fills(fills);

        // Same key collapses; a differing price (or missing id) survives.
        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped[0].price, dec!(50));
        assert_eq!(deduped[1].price, dec!(51));
        assert_eq!(deduped[2].broker_exec_id, None);
    }

    #[test]
    fn sync_mode_deserializes_lowercase() {
        let mode: SyncMode = serde_json::from_str("\"recent\"").unwrap();
        assert_eq!(mode, SyncMode::Recent);
        let mode: SyncMode = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(mode, SyncMode::All);
    }
}
