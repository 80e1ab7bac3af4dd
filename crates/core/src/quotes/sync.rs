//! Last-known price synchronization.
//!
//! One run fetches a single quote per distinct ticker and propagates it to
//! every holding sharing that ticker, across all portfolios. Runs are
//! single-flight: a run starting while the previous one is still going does
//! nothing. Only the price fields of a holding are written, so a sync never
//! conflicts with ingestion's snapshot replace.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::constants::DOMESTIC_MARKET;
use crate::holdings::{Holding, HoldingRepositoryTrait};
use crate::quotes::quotes_traits::QuoteProviderTrait;
use crate::securities::{
    debt_percent_to_price, CatalogEntry, SecurityCatalogTrait, SecurityKind,
};
use crate::Result;

/// Outcome of one sync run. A run skipped for single-flight reasons reports
/// all zeroes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSyncSummary {
    pub tickers_fetched: u32,
    pub fetch_failures: u32,
    pub holdings_updated: u32,
    /// Holdings left alone: unchanged price, unknown ticker, or a debt
    /// instrument with no nominal to convert with.
    pub holdings_skipped: u32,
}

pub struct PriceSyncService {
    holdings: Arc<dyn HoldingRepositoryTrait>,
    debt_catalog: Arc<dyn SecurityCatalogTrait>,
    equity_catalog: Arc<dyn SecurityCatalogTrait>,
    quotes: Arc<dyn QuoteProviderTrait>,
    run_lock: Mutex<()>,
}

impl PriceSyncService {
    pub fn new(
        holdings: Arc<dyn HoldingRepositoryTrait>,
        debt_catalog: Arc<dyn SecurityCatalogTrait>,
        equity_catalog: Arc<dyn SecurityCatalogTrait>,
        quotes: Arc<dyn QuoteProviderTrait>,
    ) -> Self {
        Self {
            holdings,
            debt_catalog,
            equity_catalog,
            quotes,
            run_lock: Mutex::new(()),
        }
    }

    /// Refreshes the last-known price of every holding, one remote call per
    /// distinct ticker. A failed ticker skips only its own holdings.
    pub async fn sync_all(&self) -> Result<PriceSyncSummary> {
        let _guard = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Price sync already running, skipping this run");
                return Ok(PriceSyncSummary::default());
            }
        };

        let holdings = self.holdings.list_all()?;
        let mut summary = PriceSyncSummary::default();

        let mut by_ticker: HashMap<String, Vec<&Holding>> = HashMap::new();
        let mut entries: HashMap<String, CatalogEntry> = HashMap::new();
        for holding in &holdings {
            let entry = match self.catalog_entry(holding)? {
                Some(entry) => entry,
                None => {
                    warn!("ISIN {} not in any catalog, price not synced", holding.isin);
                    summary.holdings_skipped += 1;
                    continue;
                }
            };
            match entry.ticker.clone() {
                Some(ticker) => {
                    entries.insert(ticker.clone(), entry);
                    by_ticker.entry(ticker).or_default().push(holding);
                }
                None => {
                    warn!("ISIN {} has no ticker, price not synced", holding.isin);
                    summary.holdings_skipped += 1;
                }
            }
        }

        for (ticker, group) in by_ticker {
            let quote = match self.quotes.get_quote(DOMESTIC_MARKET, &ticker).await {
                Ok(Some(quote)) => quote,
                Ok(None) => {
                    debug!("No quote for ticker {}", ticker);
                    summary.fetch_failures += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Quote fetch for ticker {} failed: {}", ticker, e);
                    summary.fetch_failures += 1;
                    continue;
                }
            };
            summary.tickers_fetched += 1;

            let entry = &entries[&ticker];
            for holding in group {
                let price = if holding.kind == SecurityKind::Debt {
                    match entry.nominal {
                        Some(nominal) => debt_percent_to_price(quote, nominal),
                        None => {
                            warn!(
                                "No nominal for debt ticker {}, cannot convert quote",
                                ticker
                            );
                            summary.holdings_skipped += 1;
                            continue;
                        }
                    }
                } else {
                    quote
                };

                if holding.last_known_price == Some(price) {
                    summary.holdings_skipped += 1;
                    continue;
                }
                self.holdings
                    .update_last_price(&holding.id, price, Utc::now())
                    .await?;
                summary.holdings_updated += 1;
            }
        }

        info!(
            "Price sync done: {} tickers fetched, {} failures, {} holdings updated, {} skipped",
            summary.tickers_fetched,
            summary.fetch_failures,
            summary.holdings_updated,
            summary.holdings_skipped
        );
        Ok(summary)
    }

    fn catalog_entry(&self, holding: &Holding) -> Result<Option<CatalogEntry>> {
        match holding.kind {
            SecurityKind::Debt => self.debt_catalog.find_by_isin(&holding.isin),
            SecurityKind::Equity => self.equity_catalog.find_by_isin(&holding.isin),
        }
    }
}
