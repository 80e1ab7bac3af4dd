//! Persisted ingestion entities and the per-upload summary.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::securities::SecurityKind;
use crate::statements::statements_model::{
    ParsedCashMovement, ParsedStatement, ParsedTrade, TradeSide,
};

/// Metadata of one successfully ingested statement. Unique per
/// (portfolio, period start, period end); the basis for duplicate and
/// overlap detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementRecord {
    pub id: String,
    pub portfolio_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub created_date: Option<NaiveDate>,
    pub counterparty: Option<String>,
    pub contract_number: Option<String>,
    pub source_filename: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

impl StatementRecord {
    pub fn new(
        portfolio_id: &str,
        parsed: &ParsedStatement,
        source_filename: &str,
        uploaded_by: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            portfolio_id: portfolio_id.to_string(),
            period_start: parsed.period_start,
            period_end: parsed.period_end,
            created_date: parsed.created_date,
            counterparty: parsed.counterparty.clone(),
            contract_number: parsed.contract_number.clone(),
            source_filename: source_filename.to_string(),
            uploaded_by: uploaded_by.to_string(),
            uploaded_at: Utc::now(),
        }
    }

    /// Whether `other`'s period lies entirely within this record's period.
    pub fn contains_period(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.period_start <= start && end <= self.period_end
    }
}

/// One persisted trade. The external trade number, when present, is the
/// idempotency key across repeated and overlapping uploads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub portfolio_id: String,
    pub statement_id: String,
    pub isin: String,
    pub kind: SecurityKind,
    pub side: TradeSide,
    pub trade_date: NaiveDate,
    pub settlement_date: Option<NaiveDate>,
    pub trade_time: Option<NaiveTime>,
    pub currency: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub amount: Decimal,
    pub accrued_interest: Decimal,
    pub broker_commission: Decimal,
    pub exchange_commission: Decimal,
    pub trade_number: Option<String>,
}

impl Transaction {
    pub fn from_parsed(portfolio_id: &str, statement_id: &str, trade: &ParsedTrade) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            portfolio_id: portfolio_id.to_string(),
            statement_id: statement_id.to_string(),
            isin: trade.isin.clone(),
            kind: trade.kind,
            side: trade.side,
            trade_date: trade.trade_date,
            settlement_date: trade.settlement_date,
            trade_time: trade.trade_time,
            currency: trade.currency.clone(),
            quantity: trade.quantity,
            price: trade.price,
            amount: trade.amount,
            accrued_interest: trade.accrued_interest,
            broker_commission: trade.broker_commission,
            exchange_commission: trade.exchange_commission,
            trade_number: trade.trade_number.clone(),
        }
    }
}

/// One persisted cash movement. The statement back-reference is required so
/// a superseding upload can cascade-delete the movements of the statements
/// it covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashMovement {
    pub id: String,
    pub portfolio_id: String,
    pub statement_id: String,
    pub date: Option<NaiveDate>,
    pub venue: String,
    pub description: String,
    pub currency: String,
    pub credit: Decimal,
    pub debit: Decimal,
}

impl CashMovement {
    pub fn from_parsed(
        portfolio_id: &str,
        statement_id: &str,
        movement: &ParsedCashMovement,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            portfolio_id: portfolio_id.to_string(),
            statement_id: statement_id.to_string(),
            date: movement.date,
            venue: movement.venue.clone(),
            description: movement.description.clone(),
            currency: movement.currency.clone(),
            credit: movement.credit,
            debit: movement.debit,
        }
    }
}

/// Outcome of one statement upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionSummary {
    pub statement_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub trades_imported: u32,
    /// Trades skipped because their trade number was already on file.
    pub trades_skipped: u32,
    pub cash_movements_imported: u32,
    /// Cash movements deleted from statements this upload fully covers.
    pub cash_movements_superseded: u32,
    pub holdings_replaced: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_serializes_camel_case() {
        let summary = IngestionSummary {
            statement_id: "stmt-1".to_string(),
            period_start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            trades_imported: 6,
            trades_skipped: 4,
            cash_movements_imported: 1,
            cash_movements_superseded: 1,
            holdings_replaced: true,
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["tradesImported"], 6);
        assert_eq!(json["holdingsReplaced"], true);
        assert_eq!(json["periodStart"], "2024-03-01");
    }
}
