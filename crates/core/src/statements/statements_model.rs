//! Parsed statement domain models.
//!
//! A [`ParsedStatement`] is the transient intermediate form of one broker
//! statement document; it lives only for the duration of one ingestion call.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::securities::SecurityKind;

/// Trade direction as stated in the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub const fn as_db_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

/// One executed trade, as parsed from the trades table. Source row order is
/// preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTrade {
    pub isin: String,
    pub kind: SecurityKind,
    pub trade_date: NaiveDate,
    pub settlement_date: Option<NaiveDate>,
    pub trade_time: Option<NaiveTime>,
    pub currency: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    /// Currency per unit for equity; percent of nominal for debt, as stated
    /// in the source.
    pub price: Decimal,
    pub amount: Decimal,
    /// Accrued coupon interest; zero for equity trades.
    pub accrued_interest: Decimal,
    pub broker_commission: Decimal,
    pub exchange_commission: Decimal,
    /// External trade number - the natural idempotency key across uploads.
    pub trade_number: Option<String>,
}

/// One cash movement row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCashMovement {
    pub date: Option<NaiveDate>,
    pub venue: String,
    pub description: String,
    pub currency: String,
    pub credit: Decimal,
    pub debit: Decimal,
}

/// A security position as of the statement's closing date.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosingHolding {
    pub isin: String,
    pub kind: SecurityKind,
    pub currency: String,
    pub quantity: Decimal,
    pub name: String,
    /// Closing price. For debt this is the converted absolute price, unless
    /// `price_is_percent` is set.
    pub last_known_price: Option<Decimal>,
    /// Set when a debt price is still percent-of-nominal because no nominal
    /// was available for conversion. Flagged prices must never be treated as
    /// absolute currency values.
    pub price_is_percent: bool,
}

/// Structured intermediate form of one statement document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedStatement {
    /// Reporting period, inclusive on both ends. A single-day statement has
    /// `period_start == period_end`.
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub created_date: Option<NaiveDate>,
    pub counterparty: Option<String>,
    pub contract_number: Option<String>,
    pub trades: Vec<ParsedTrade>,
    pub cash_movements: Vec<ParsedCashMovement>,
    pub closing_holdings: Vec<ClosingHolding>,
    /// ISIN -> kind hints parsed from the statement's own reference table.
    pub kind_hints: HashMap<String, SecurityKind>,
}
