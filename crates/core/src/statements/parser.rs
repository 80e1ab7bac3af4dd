//! Broker statement parser.
//!
//! Converts one raw HTML statement document (daily or monthly variant) into
//! a [`ParsedStatement`]: period bounds, counterparty metadata, kind hints
//! from the embedded reference table, end-of-period holdings, executed
//! trades, and cash movements. Security identities are resolved during
//! parsing; an unresolvable instrument aborts the whole parse.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use chrono::{NaiveDate, NaiveTime};
use log::{debug, warn};
use rust_decimal::Decimal;
use scraper::{Html, Selector};

use crate::constants::{STATEMENT_DATE_FORMAT, STATEMENT_TIME_FORMAT};
use crate::errors::StatementError;
use crate::securities::{
    debt_percent_to_price, is_isin_shaped, IdentityResolver, SecurityIdentity, SecurityKind,
};
use crate::statements::statements_model::{
    ClosingHolding, ParsedCashMovement, ParsedStatement, ParsedTrade, TradeSide,
};
use crate::statements::tables::{discover, extract_tables, RawRow, RawTable, TableKind};
use crate::Result;

static H3_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h3").expect("static selector"));
static P_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").expect("static selector"));

// Holdings table column layout: name, ISIN, currency, five opening-period
// columns, then the closing-period block.
const HOLDINGS_MIN_CELLS: usize = 9;
const HOLDINGS_ISIN: usize = 1;
const HOLDINGS_CURRENCY: usize = 2;
const HOLDINGS_CLOSING_QTY: usize = 8;
const HOLDINGS_CLOSING_NOMINAL: usize = 9;
const HOLDINGS_CLOSING_PRICE: usize = 10;

// Trades table column layout.
const TRADES_MIN_CELLS: usize = 10;

/// Parses statement documents, resolving each row's security identity as it
/// goes.
pub struct StatementParser {
    resolver: Arc<IdentityResolver>,
}

impl StatementParser {
    pub fn new(resolver: Arc<IdentityResolver>) -> Self {
        Self { resolver }
    }

    /// Parses one statement document.
    pub async fn parse(&self, html: &str) -> Result<ParsedStatement> {
        let (metadata, tables) = {
            let document = Html::parse_document(html);
            (parse_metadata(&document), extract_tables(&document))
        };
        let found = discover(&tables);

        let (period_start, period_end) = match (metadata.period_start, metadata.period_end) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(StatementError::Malformed {
                    reason: "statement period bounds not found".to_string(),
                }
                .into())
            }
        };

        let holdings_table = found
            .get(&TableKind::Holdings)
            .map(|&i| &tables[i])
            .ok_or_else(|| StatementError::Malformed {
                reason: "no end-of-period holdings table found".to_string(),
            })?;
        let reference_table = found.get(&TableKind::Reference).map(|&i| &tables[i]);
        let trades_table = found.get(&TableKind::Trades).map(|&i| &tables[i]);
        let cash_table = found.get(&TableKind::CashMovements).map(|&i| &tables[i]);

        let kind_hints = reference_table
            .map(parse_reference_hints)
            .unwrap_or_default();
        debug!(
            "Statement {} - {}: {} kind hints from reference table",
            period_start,
            period_end,
            kind_hints.len()
        );

        // Identities are immutable per ISIN within one parse; cache them so
        // the remote-refresh fallback fires at most once per instrument.
        let mut identities: HashMap<String, SecurityIdentity> = HashMap::new();

        let closing_holdings = self
            .parse_holdings(holdings_table, &kind_hints, &mut identities)
            .await?;
        let trades = match trades_table {
            Some(table) => {
                self.parse_trades(
                    table,
                    holdings_table,
                    reference_table,
                    &kind_hints,
                    &mut identities,
                )
                .await?
            }
            None => Vec::new(),
        };
        let cash_movements = cash_table.map(parse_cash_movements).unwrap_or_default();

        Ok(ParsedStatement {
            period_start,
            period_end,
            created_date: metadata.created_date,
            counterparty: metadata.counterparty,
            contract_number: metadata.contract_number,
            trades,
            cash_movements,
            closing_holdings,
            kind_hints,
        })
    }

    async fn resolve_cached(
        &self,
        isin: &str,
        name: &str,
        hints: &HashMap<String, SecurityKind>,
        identities: &mut HashMap<String, SecurityIdentity>,
    ) -> Result<SecurityIdentity> {
        if let Some(identity) = identities.get(isin) {
            return Ok(identity.clone());
        }
        let identity = self
            .resolver
            .resolve(isin, Some(name).filter(|n| !n.is_empty()), hints)
            .await?;
        identities.insert(isin.to_string(), identity.clone());
        Ok(identity)
    }

    async fn parse_holdings(
        &self,
        table: &RawTable,
        hints: &HashMap<String, SecurityKind>,
        identities: &mut HashMap<String, SecurityIdentity>,
    ) -> Result<Vec<ClosingHolding>> {
        let mut holdings = Vec::new();

        for row in table.rows.iter().skip(TableKind::Holdings.header_rows()) {
            if skip_row(row) {
                continue;
            }
            if row.cells.len() < HOLDINGS_MIN_CELLS {
                debug!("Skipping short holdings row ({} cells)", row.cells.len());
                continue;
            }

            let name = row.cell(0).to_string();
            let isin = row.cell(HOLDINGS_ISIN);
            let quantity_str = row.cell(HOLDINGS_CLOSING_QTY);
            if !is_isin_shaped(isin) || quantity_str.is_empty() {
                debug!("Skipping holdings row: isin='{}' qty='{}'", isin, quantity_str);
                continue;
            }

            let quantity = parse_decimal_cell(quantity_str);
            if quantity <= Decimal::ZERO {
                // Closed positions are not carried forward.
                debug!("Dropping zero-quantity closing position for ISIN {}", isin);
                continue;
            }

            let identity = self.resolve_cached(isin, &name, hints, identities).await?;

            let mut last_known_price = None;
            let mut price_is_percent = false;
            let price_str = row.cell(HOLDINGS_CLOSING_PRICE);
            if !price_str.is_empty() && price_str != "-" {
                let price = parse_decimal_cell(price_str);
                if identity.kind == SecurityKind::Debt {
                    // Debt prices are quoted in percent of nominal; take the
                    // nominal from the resolved identity, falling back to the
                    // statement's own closing-nominal column.
                    let nominal = identity.nominal.or_else(|| {
                        let cell = row.cell(HOLDINGS_CLOSING_NOMINAL);
                        (!cell.is_empty() && cell != "-")
                            .then(|| parse_decimal_cell(cell))
                            .filter(|n| *n > Decimal::ZERO)
                    });
                    match nominal {
                        Some(nominal) => {
                            last_known_price = Some(debt_percent_to_price(price, nominal));
                        }
                        None => {
                            warn!(
                                "No nominal for debt ISIN {}; keeping percent quote {} flagged",
                                isin, price
                            );
                            last_known_price = Some(price);
                            price_is_percent = true;
                        }
                    }
                } else {
                    last_known_price = Some(price);
                }
            }

            holdings.push(ClosingHolding {
                isin: isin.to_string(),
                kind: identity.kind,
                currency: row.cell(HOLDINGS_CURRENCY).to_string(),
                quantity,
                name,
                last_known_price,
                price_is_percent,
            });
        }

        Ok(holdings)
    }

    async fn parse_trades(
        &self,
        table: &RawTable,
        holdings_table: &RawTable,
        reference_table: Option<&RawTable>,
        hints: &HashMap<String, SecurityKind>,
        identities: &mut HashMap<String, SecurityIdentity>,
    ) -> Result<Vec<ParsedTrade>> {
        let mut trades = Vec::new();

        for row in table.rows.iter().skip(TableKind::Trades.header_rows()) {
            if skip_row(row) || row.cells.len() < TRADES_MIN_CELLS {
                continue;
            }

            let name = row.cell(3).to_string();
            let code = row.cell(4).to_string();

            let isin = if is_isin_shaped(&code) {
                code.clone()
            } else {
                debug!("Trade code '{}' is not ISIN-shaped, falling back to name lookup", code);
                find_isin_by_name(&name, &code, holdings_table, reference_table)?
            };

            let trade_date = parse_date_cell(row.cell(0)).ok_or_else(|| {
                StatementError::Malformed {
                    reason: format!("unparsable trade date '{}' for {}", row.cell(0), isin),
                }
            })?;
            let side = match row.cell(6) {
                "Покупка" => TradeSide::Buy,
                "Продажа" => TradeSide::Sell,
                other => {
                    return Err(StatementError::Malformed {
                        reason: format!("unknown trade side '{}' for {}", other, isin),
                    }
                    .into())
                }
            };
            let quantity = parse_decimal_cell(row.cell(7));
            if quantity <= Decimal::ZERO {
                return Err(StatementError::Malformed {
                    reason: format!("non-positive quantity '{}' for {}", row.cell(7), isin),
                }
                .into());
            }

            let identity = self.resolve_cached(&isin, &name, hints, identities).await?;

            trades.push(ParsedTrade {
                isin,
                kind: identity.kind,
                trade_date,
                settlement_date: parse_date_cell(row.cell(1)),
                trade_time: parse_time_cell(row.cell(2)),
                currency: row.cell(5).to_string(),
                side,
                quantity,
                price: parse_decimal_cell(row.cell(8)),
                amount: parse_decimal_cell(row.cell(9)),
                accrued_interest: parse_decimal_cell(row.cell(10)),
                broker_commission: parse_decimal_cell(row.cell(11)),
                exchange_commission: parse_decimal_cell(row.cell(12)),
                trade_number: Some(row.cell(13))
                    .filter(|n| !n.is_empty())
                    .map(String::from),
            });
        }

        Ok(trades)
    }
}

struct StatementMetadata {
    period_start: Option<NaiveDate>,
    period_end: Option<NaiveDate>,
    created_date: Option<NaiveDate>,
    counterparty: Option<String>,
    contract_number: Option<String>,
}

fn parse_metadata(document: &Html) -> StatementMetadata {
    let mut metadata = StatementMetadata {
        period_start: None,
        period_end: None,
        created_date: None,
        counterparty: None,
        contract_number: None,
    };

    for h3 in document.select(&H3_SEL) {
        let text = element_text(&h3);
        if let Some((_, rest)) = text.split_once("за период с") {
            let period_part = rest.split(',').next().unwrap_or("").trim();
            if let Some((start, end)) = period_part.split_once(" по ") {
                metadata.period_start = parse_date_cell(start.trim());
                metadata.period_end = parse_date_cell(end.trim());
            }
            if let Some((_, created)) = text.split_once("дата создания") {
                let created = created.trim();
                metadata.created_date = parse_date_cell(created)
                    .or_else(|| parse_date_cell(created.split_whitespace().next().unwrap_or("")));
            }
        }
    }

    for p in document.select(&P_SEL) {
        let text = element_text(&p);
        if let Some((_, rest)) = text.split_once("Инвестор:") {
            let investor = rest.split("Договор").next().unwrap_or("").trim();
            if !investor.is_empty() {
                metadata.counterparty = Some(investor.to_string());
            }
        }
        if text.contains("Договор") {
            if let Some(number) = extract_contract_number(&text) {
                metadata.contract_number = Some(number);
            }
        }
    }

    metadata
}

/// Pulls the contract identifier out of a paragraph like
/// "Договор на ведение индивидуального инвестиционного счета S2UUY от 30.12.2019".
fn extract_contract_number(text: &str) -> Option<String> {
    if let Some((_, after)) = text.split_once("счета ") {
        let number = after.split(" от ").next().unwrap_or("").trim();
        if !number.is_empty() {
            return Some(number.split_whitespace().collect::<Vec<_>>().join(" "));
        }
    }
    // Fallback: last word before " от " after "Договор".
    let (_, after) = text.split_once("Договор")?;
    let before_ot = after.split(" от ").next()?.trim();
    before_ot.split_whitespace().last().map(String::from)
}

fn element_text(el: &scraper::ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Maps the reference table's free-text instrument type to a kind hint.
fn parse_reference_hints(table: &RawTable) -> HashMap<String, SecurityKind> {
    let mut hints = HashMap::new();
    for row in table.rows.iter().skip(TableKind::Reference.header_rows()) {
        if row.cells.len() < 5 {
            continue;
        }
        let isin = row.cell(2);
        if !is_isin_shaped(isin) {
            continue;
        }
        let type_text = row.cell(4).to_lowercase();
        let kind = if type_text.contains("облигаци") {
            SecurityKind::Debt
        } else {
            // Shares, units, ETFs and depositary receipts all behave as
            // equity for ledger purposes.
            SecurityKind::Equity
        };
        hints.insert(isin.to_string(), kind);
    }
    hints
}

fn parse_cash_movements(table: &RawTable) -> Vec<ParsedCashMovement> {
    let mut movements = Vec::new();
    for row in table.rows.iter().skip(TableKind::CashMovements.header_rows()) {
        if row.cells.len() < 6 || row.cell(0).contains("Итого") {
            continue;
        }
        movements.push(ParsedCashMovement {
            date: parse_date_cell(row.cell(0)),
            venue: row.cell(1).to_string(),
            description: row.cell(2).to_string(),
            currency: row.cell(3).to_string(),
            credit: parse_decimal_cell(row.cell(4)),
            debit: parse_decimal_cell(row.cell(5)),
        });
    }
    movements
}

/// Venue separators (first cell spanning columns or labelled "Площадка") and
/// total rows carry no position data.
fn skip_row(row: &RawRow) -> bool {
    let first = row.cell(0);
    row.first_cell_spans || first.contains("Площадка") || first.contains("Итого")
}

/// Finds an ISIN for a trade row whose security code is not ISIN-shaped.
///
/// Searches the holdings table, then the reference table. Within each table,
/// exact name match wins over substring match in either direction, which
/// wins over whitespace/case-normalized exact match; the first row of the
/// best tier wins. No match is a hard failure.
fn find_isin_by_name(
    name: &str,
    code: &str,
    holdings_table: &RawTable,
    reference_table: Option<&RawTable>,
) -> Result<String> {
    let holdings_rows = candidate_rows(holdings_table, TableKind::Holdings.header_rows(), 0, 1);
    if let Some(isin) = best_name_match(name, None, &holdings_rows) {
        return Ok(isin);
    }

    if let Some(reference) = reference_table {
        // Reference rows also carry the exchange code in the second column.
        let reference_rows: Vec<(String, String, Option<String>)> = reference
            .rows
            .iter()
            .skip(TableKind::Reference.header_rows())
            .filter(|r| !skip_row(r) && r.cells.len() >= 3)
            .map(|r| {
                (
                    r.cell(0).to_string(),
                    r.cell(2).to_string(),
                    Some(r.cell(1).to_string()),
                )
            })
            .collect();
        if let Some(isin) = best_name_match(name, Some(code), &reference_rows) {
            return Ok(isin);
        }
    }

    Err(StatementError::UnresolvedIsin {
        name: name.to_string(),
        code: code.to_string(),
    }
    .into())
}

fn candidate_rows(
    table: &RawTable,
    header_rows: usize,
    name_idx: usize,
    isin_idx: usize,
) -> Vec<(String, String, Option<String>)> {
    table
        .rows
        .iter()
        .skip(header_rows)
        .filter(|r| !skip_row(r) && r.cells.len() > isin_idx)
        .map(|r| (r.cell(name_idx).to_string(), r.cell(isin_idx).to_string(), None))
        .collect()
}

/// Tiered name matching over `(name, isin, code)` candidate rows.
fn best_name_match(
    name: &str,
    code: Option<&str>,
    rows: &[(String, String, Option<String>)],
) -> Option<String> {
    let target = name.to_lowercase();
    let target_normalized: String = target.split_whitespace().collect();

    let tiers: [&dyn Fn(&str, Option<&str>) -> bool; 3] = [
        &|candidate: &str, row_code: Option<&str>| {
            candidate.to_lowercase() == target
                || matches!((code, row_code), (Some(c), Some(rc)) if !c.is_empty()
                    && rc.to_lowercase() == c.to_lowercase())
        },
        &|candidate: &str, _| {
            let lower = candidate.to_lowercase();
            !lower.is_empty() && (lower.contains(&target) || target.contains(&lower))
        },
        &|candidate: &str, _| {
            candidate
                .to_lowercase()
                .split_whitespace()
                .collect::<String>()
                == target_normalized
        },
    ];

    for tier in tiers {
        for (candidate, isin, row_code) in rows {
            if is_isin_shaped(isin) && tier(candidate, row_code.as_deref()) {
                return Some(isin.clone());
            }
        }
    }
    None
}

/// Lenient decimal parsing for statement cells: empty cells and "-" mean
/// zero, spaces are thousands separators, comma is the decimal separator.
pub fn parse_decimal_cell(value: &str) -> Decimal {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return Decimal::ZERO;
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    match Decimal::from_str(&cleaned) {
        Ok(d) => d,
        Err(e) => {
            warn!("Failed to parse number '{}': {}. Falling back to zero.", value, e);
            Decimal::ZERO
        }
    }
}

fn parse_date_cell(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    match NaiveDate::parse_from_str(trimmed, STATEMENT_DATE_FORMAT) {
        Ok(d) => Some(d),
        Err(_) => {
            warn!("Failed to parse date '{}'", value);
            None
        }
    }
}

fn parse_time_cell(value: &str) -> Option<NaiveTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    match NaiveTime::parse_from_str(trimmed, STATEMENT_TIME_FORMAT) {
        Ok(t) => Some(t),
        Err(_) => {
            warn!("Failed to parse time '{}'", value);
            None
        }
    }
}
