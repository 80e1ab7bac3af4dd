//! Position reconciliation.
//!
//! Two idempotent entry points keep holdings consistent with ingested data:
//! a wholesale snapshot replace from a statement's end-of-period positions,
//! and a full cost-basis recompute over every recorded purchase. A third,
//! incremental path serves single manual trade entry outside bulk ingestion.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::constants::PRICE_SCALE;
use crate::errors::{DatabaseError, ValidationError};
use crate::holdings::holdings_model::Holding;
use crate::holdings::holdings_traits::HoldingRepositoryTrait;
use crate::ingest::ingest_model::Transaction;
use crate::ingest::ingest_traits::TransactionRepositoryTrait;
use crate::statements::statements_model::{ClosingHolding, TradeSide};
use crate::Result;

fn round_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Weighted-average purchase price per ISIN over every BUY in `transactions`.
pub(crate) fn buy_averages(transactions: &[Transaction]) -> HashMap<String, Decimal> {
    let mut sums: HashMap<String, (Decimal, Decimal)> = HashMap::new();
    for tx in transactions {
        if tx.side != TradeSide::Buy {
            continue;
        }
        let entry = sums.entry(tx.isin.clone()).or_default();
        entry.0 += tx.price * tx.quantity;
        entry.1 += tx.quantity;
    }
    sums.into_iter()
        .filter(|(_, (_, quantity))| *quantity > Decimal::ZERO)
        .map(|(isin, (cost, quantity))| (isin, round_price(cost / quantity)))
        .collect()
}

pub struct PositionReconciler {
    holdings: Arc<dyn HoldingRepositoryTrait>,
    transactions: Arc<dyn TransactionRepositoryTrait>,
}

impl PositionReconciler {
    pub fn new(
        holdings: Arc<dyn HoldingRepositoryTrait>,
        transactions: Arc<dyn TransactionRepositoryTrait>,
    ) -> Self {
        Self {
            holdings,
            transactions,
        }
    }

    pub fn current_holdings(&self, portfolio_id: &str) -> Result<Vec<Holding>> {
        self.holdings.list_by_portfolio(portfolio_id)
    }

    /// Replaces the portfolio's holdings wholesale from an end-of-period
    /// snapshot. Each ISIN's previously known average purchase price is
    /// carried forward; everything else comes from the snapshot.
    pub async fn snapshot_replace(
        &self,
        portfolio_id: &str,
        snapshot: &[ClosingHolding],
    ) -> Result<()> {
        let previous_averages: HashMap<String, Decimal> = self
            .holdings
            .list_by_portfolio(portfolio_id)?
            .into_iter()
            .filter_map(|h| h.average_price.map(|avg| (h.isin, avg)))
            .collect();

        let removed = self.holdings.delete_by_portfolio(portfolio_id).await?;
        debug!(
            "Snapshot replace for portfolio {}: {} holdings removed, {} incoming",
            portfolio_id,
            removed,
            snapshot.len()
        );

        for position in snapshot {
            let last_known_price = if position.price_is_percent {
                // An unconverted percent-of-nominal quote must never be
                // stored as an absolute price.
                warn!(
                    "Dropping unconverted percent quote for ISIN {} from snapshot",
                    position.isin
                );
                None
            } else {
                position.last_known_price
            };
            let holding = Holding::new(
                portfolio_id,
                &position.isin,
                position.kind,
                &position.name,
                &position.currency,
                position.quantity,
                previous_averages.get(&position.isin).copied(),
                last_known_price,
            );
            self.holdings.save(holding).await?;
        }
        Ok(())
    }

    /// Recomputes the weighted-average purchase price of every holding from
    /// all BUY transactions ever recorded for the portfolio. Holdings whose
    /// ISIN has no recorded purchase keep whatever average they carry.
    pub async fn recompute_cost_basis(&self, portfolio_id: &str) -> Result<()> {
        let transactions = self.transactions.list_by_portfolio(portfolio_id)?;
        let averages = buy_averages(&transactions);

        for holding in self.holdings.list_by_portfolio(portfolio_id)? {
            if let Some(avg) = averages.get(&holding.isin) {
                self.holdings
                    .update_average_price(&holding.id, Some(*avg))
                    .await?;
            }
        }
        Ok(())
    }

    /// Blends one manually entered trade into the holding's average price.
    /// A SELL never changes the average.
    pub async fn apply_trade(
        &self,
        portfolio_id: &str,
        isin: &str,
        side: TradeSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<()> {
        if quantity <= Decimal::ZERO {
            return Err(ValidationError::InvalidInput(format!(
                "Trade quantity must be positive, got {quantity}"
            ))
            .into());
        }
        if side == TradeSide::Sell {
            return Ok(());
        }

        match self
            .holdings
            .find_by_portfolio_and_isin(portfolio_id, isin)?
        {
            Some(holding) => {
                let new_average = match holding
                    .average_price
                    .filter(|_| holding.quantity > Decimal::ZERO)
                {
                    Some(avg) => round_price(
                        (avg * holding.quantity + price * quantity)
                            / (holding.quantity + quantity),
                    ),
                    None => round_price(price),
                };
                self.holdings
                    .update_average_price(&holding.id, Some(new_average))
                    .await
            }
            None => {
                debug!(
                    "No holding for ISIN {} in portfolio {}, nothing to blend",
                    isin, portfolio_id
                );
                Ok(())
            }
        }
    }

    /// Rebuilds holdings purely from recorded transactions: signed sum of
    /// BUY(+)/SELL(-) quantities per ISIN, dropping anything at or below
    /// zero. Name, last price and average-price history survive for ISINs
    /// that persist.
    pub async fn rebuild_from_transactions(&self, portfolio_id: &str) -> Result<()> {
        let transactions = self.transactions.list_by_portfolio(portfolio_id)?;
        let averages = buy_averages(&transactions);

        let mut net: HashMap<String, Decimal> = HashMap::new();
        let mut latest: HashMap<String, &Transaction> = HashMap::new();
        for tx in &transactions {
            let signed = match tx.side {
                TradeSide::Buy => tx.quantity,
                TradeSide::Sell => -tx.quantity,
            };
            *net.entry(tx.isin.clone()).or_default() += signed;
            latest.insert(tx.isin.clone(), tx);
        }

        let existing: HashMap<String, Holding> = self
            .holdings
            .list_by_portfolio(portfolio_id)?
            .into_iter()
            .map(|h| (h.isin.clone(), h))
            .collect();

        self.holdings.delete_by_portfolio(portfolio_id).await?;

        for (isin, quantity) in net {
            if quantity <= Decimal::ZERO {
                debug!("ISIN {} nets to {}, not recreated", isin, quantity);
                continue;
            }
            // `net` has an entry only for ISINs seen in `transactions`.
            let tx = latest[&isin];
            let prior = existing.get(&isin);
            let mut holding = Holding::new(
                portfolio_id,
                &isin,
                tx.kind,
                prior.map(|h| h.name.as_str()).unwrap_or(&isin),
                &tx.currency,
                quantity,
                averages
                    .get(&isin)
                    .copied()
                    .or_else(|| prior.and_then(|h| h.average_price)),
                prior.and_then(|h| h.last_known_price),
            );
            if let Some(prior) = prior {
                holding.price_updated_at = prior.price_updated_at;
            }
            self.holdings.save(holding).await?;
        }
        Ok(())
    }

    /// Manual average-price entry for holdings with no recorded purchases.
    pub async fn set_average_price(
        &self,
        portfolio_id: &str,
        isin: &str,
        average_price: Decimal,
    ) -> Result<()> {
        let holding = self
            .holdings
            .find_by_portfolio_and_isin(portfolio_id, isin)?
            .ok_or_else(|| {
                DatabaseError::NotFound(format!(
                    "No holding for ISIN {isin} in portfolio {portfolio_id}"
                ))
            })?;
        self.holdings
            .update_average_price(&holding.id, Some(round_price(average_price)))
            .await
    }
}
