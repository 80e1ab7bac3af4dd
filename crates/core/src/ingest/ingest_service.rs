//! Statement ingestion orchestration.
//!
//! One `ingest` call covers the whole upload: parse, duplicate/overlap
//! validation, persistence of the statement record, trades and cash
//! movements, then holdings reconciliation. Uploads for the same portfolio
//! are serialized on a per-portfolio lock; different portfolios ingest in
//! parallel. Validation happens before the first write, so a rejected
//! upload leaves no trace.

use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::errors::IngestError;
use crate::holdings::{Holding, PositionReconciler};
use crate::ingest::ingest_model::{
    CashMovement, IngestionSummary, StatementRecord, Transaction,
};
use crate::ingest::ingest_traits::{
    CashMovementRepositoryTrait, StatementRepositoryTrait, TransactionRepositoryTrait,
};
use crate::statements::statements_model::ParsedStatement;
use crate::statements::StatementParser;
use crate::Result;

pub struct IngestionService {
    parser: Arc<StatementParser>,
    statements: Arc<dyn StatementRepositoryTrait>,
    transactions: Arc<dyn TransactionRepositoryTrait>,
    cash_movements: Arc<dyn CashMovementRepositoryTrait>,
    reconciler: Arc<PositionReconciler>,
    portfolio_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IngestionService {
    pub fn new(
        parser: Arc<StatementParser>,
        statements: Arc<dyn StatementRepositoryTrait>,
        transactions: Arc<dyn TransactionRepositoryTrait>,
        cash_movements: Arc<dyn CashMovementRepositoryTrait>,
        reconciler: Arc<PositionReconciler>,
    ) -> Self {
        Self {
            parser,
            statements,
            transactions,
            cash_movements,
            reconciler,
            portfolio_locks: DashMap::new(),
        }
    }

    fn portfolio_lock(&self, portfolio_id: &str) -> Arc<Mutex<()>> {
        self.portfolio_locks
            .entry(portfolio_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Ingests one uploaded statement document.
    pub async fn ingest(
        &self,
        portfolio_id: &str,
        document: &str,
        source_filename: &str,
        uploaded_by: &str,
    ) -> Result<IngestionSummary> {
        let lock = self.portfolio_lock(portfolio_id);
        let _guard = lock.lock().await;

        info!(
            "Ingesting statement '{}' for portfolio {}",
            source_filename, portfolio_id
        );

        let parsed = self.parser.parse(document).await?;
        let overlaps = self.validate_period(portfolio_id, &parsed)?;

        // Captured before this statement's own record lands, so the
        // comparison in the snapshot decision is against prior state only.
        let max_end_before = self.statements.max_period_end(portfolio_id)?;

        let record = self
            .statements
            .save(StatementRecord::new(
                portfolio_id,
                &parsed,
                source_filename,
                uploaded_by,
            ))
            .await?;

        let mut trades_imported = 0u32;
        let mut trades_skipped = 0u32;
        for trade in &parsed.trades {
            if let Some(number) = trade.trade_number.as_deref() {
                if self.transactions.trade_number_exists(portfolio_id, number)? {
                    debug!("Trade number {} already on file, skipping", number);
                    trades_skipped += 1;
                    continue;
                }
            }
            self.transactions
                .save(Transaction::from_parsed(portfolio_id, &record.id, trade))
                .await?;
            trades_imported += 1;
        }

        // Cash movements of statements this upload fully covers are
        // replaced by the new statement's own movements.
        let mut cash_movements_superseded = 0u32;
        for existing in overlaps
            .iter()
            .filter(|s| record.contains_period(s.period_start, s.period_end))
        {
            let deleted = self.cash_movements.delete_by_statement(&existing.id).await?;
            debug!(
                "Superseded {} cash movements of statement {} ({} - {})",
                deleted, existing.id, existing.period_start, existing.period_end
            );
            cash_movements_superseded += deleted as u32;
        }
        let movements: Vec<CashMovement> = parsed
            .cash_movements
            .iter()
            .map(|m| CashMovement::from_parsed(portfolio_id, &record.id, m))
            .collect();
        let cash_movements_imported = self.cash_movements.save_all(movements).await? as u32;

        // Only a statement reaching at least as far as everything already on
        // file may replace holdings; an older one must not regress state.
        let holdings_replaced =
            max_end_before.map_or(true, |max_end| parsed.period_end >= max_end);
        if holdings_replaced {
            self.reconciler
                .snapshot_replace(portfolio_id, &parsed.closing_holdings)
                .await?;
            self.reconciler.recompute_cost_basis(portfolio_id).await?;
        } else {
            debug!(
                "Statement ends {} before current maximum, holdings untouched",
                parsed.period_end
            );
        }

        info!(
            "Statement {} ingested: {} trades ({} skipped), {} cash movements, holdings replaced: {}",
            record.id, trades_imported, trades_skipped, cash_movements_imported, holdings_replaced
        );

        Ok(IngestionSummary {
            statement_id: record.id,
            period_start: parsed.period_start,
            period_end: parsed.period_end,
            trades_imported,
            trades_skipped,
            cash_movements_imported,
            cash_movements_superseded,
            holdings_replaced,
        })
    }

    /// Duplicate and overlap checks. Returns the overlapping records so the
    /// supersede step does not query twice.
    fn validate_period(
        &self,
        portfolio_id: &str,
        parsed: &ParsedStatement,
    ) -> Result<Vec<StatementRecord>> {
        let (start, end) = (parsed.period_start, parsed.period_end);

        if self
            .statements
            .find_by_period(portfolio_id, start, end)?
            .is_some()
        {
            return Err(IngestError::DuplicateStatement { start, end }.into());
        }

        let overlaps = self.statements.find_overlapping(portfolio_id, start, end)?;
        for existing in &overlaps {
            let strictly_narrower = existing.contains_period(start, end)
                && (existing.period_start, existing.period_end) != (start, end);
            if strictly_narrower {
                // A narrower statement can never supersede a wider one
                // already on file.
                return Err(IngestError::OverlappingStatement {
                    start,
                    end,
                    existing_start: existing.period_start,
                    existing_end: existing.period_end,
                }
                .into());
            }
        }
        Ok(overlaps)
    }

    pub fn statements(&self, portfolio_id: &str) -> Result<Vec<StatementRecord>> {
        self.statements.list_by_portfolio(portfolio_id)
    }

    pub fn transactions(&self, portfolio_id: &str) -> Result<Vec<Transaction>> {
        self.transactions.list_by_portfolio(portfolio_id)
    }

    pub fn cash_movements(&self, portfolio_id: &str) -> Result<Vec<CashMovement>> {
        self.cash_movements.list_by_portfolio(portfolio_id)
    }

    pub fn current_holdings(&self, portfolio_id: &str) -> Result<Vec<Holding>> {
        self.reconciler.current_holdings(portfolio_id)
    }

    /// Holdings with no recorded purchase, awaiting a manually entered
    /// average price.
    pub fn holdings_requiring_price_input(&self, portfolio_id: &str) -> Result<Vec<Holding>> {
        Ok(self
            .reconciler
            .current_holdings(portfolio_id)?
            .into_iter()
            .filter(|h| h.quantity > Decimal::ZERO && h.average_price.is_none())
            .collect())
    }

    /// Re-derives every holding's average purchase price from recorded
    /// transactions, under the portfolio's ingestion lock.
    pub async fn recompute_cost_basis(&self, portfolio_id: &str) -> Result<()> {
        let lock = self.portfolio_lock(portfolio_id);
        let _guard = lock.lock().await;
        self.reconciler.recompute_cost_basis(portfolio_id).await
    }
}
