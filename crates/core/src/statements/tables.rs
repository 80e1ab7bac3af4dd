//! Header-driven table discovery.
//!
//! The statement variants move their tables around, so tables are located by
//! content, not position: every logical table kind owns a predicate over the
//! header cell texts of the first two rows, and the first matching `<table>`
//! per kind wins. A table whose discriminator phrases are absent is rejected
//! for that kind even if it superficially resembles it - the reference table
//! and the holdings table share a name/ISIN prefix and are told apart only by
//! their unique columns.

use std::collections::HashMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

static TABLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("static selector"));
static ROW_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("static selector"));
static CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td, th").expect("static selector"));

/// One extracted table row: trimmed cell texts plus whether the first cell
/// spans multiple columns (venue separators and sub-headings do).
#[derive(Debug, Clone)]
pub struct RawRow {
    pub cells: Vec<String>,
    pub first_cell_spans: bool,
}

impl RawRow {
    pub fn cell(&self, idx: usize) -> &str {
        self.cells.get(idx).map(String::as_str).unwrap_or("")
    }
}

/// One extracted `<table>`, in document order.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub rows: Vec<RawRow>,
}

/// The logical table kinds a statement is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Security reference table: name, code, ISIN, issuer, type, issue.
    Reference,
    /// End-of-period holdings: name, ISIN, currency, opening and closing
    /// quantity/nominal/price columns.
    Holdings,
    /// Executed trades.
    Trades,
    /// Cash movements for the period.
    CashMovements,
}

impl TableKind {
    /// Number of header rows this table kind carries; data rows start after.
    pub const fn header_rows(&self) -> usize {
        match self {
            TableKind::Reference | TableKind::CashMovements => 1,
            TableKind::Holdings | TableKind::Trades => 2,
        }
    }

    /// Whether the header texts of the first two rows identify this kind.
    fn matches(&self, table: &RawTable) -> bool {
        let headers: Vec<&str> = table
            .rows
            .iter()
            .take(2)
            .flat_map(|r| r.cells.iter().map(String::as_str))
            .collect();
        let first_row_joined: String = table
            .rows
            .first()
            .map(|r| r.cells.join(" "))
            .unwrap_or_default();

        match self {
            TableKind::Reference => headers.iter().any(|h| {
                h.contains("Вид, Категория, Тип") || (h.contains("Эмитент") && h.contains("ISIN"))
            }),
            TableKind::Holdings => headers.iter().any(|h| {
                h.contains("Количество, шт")
                    || (h.contains("НКД") && h.contains("****"))
                    || (h.contains("Рыночная стоимость") && h.contains("НКД"))
            }),
            TableKind::Trades => headers.iter().any(|h| {
                h.contains("Номер сделки")
                    || (h.contains("Вид") && h.contains("Время заключения"))
                    || (h.contains("Дата заключения") && h.contains("Номер сделки"))
            }),
            TableKind::CashMovements => {
                first_row_joined.contains("Сумма зачисления")
                    && first_row_joined.contains("Сумма списания")
            }
        }
    }
}

/// Extracts every `<table>` of the document into its raw form.
pub fn extract_tables(document: &Html) -> Vec<RawTable> {
    document
        .select(&TABLE_SEL)
        .map(|table| RawTable {
            rows: table.select(&ROW_SEL).map(extract_row).collect(),
        })
        .collect()
}

fn extract_row(row: ElementRef<'_>) -> RawRow {
    let mut cells = Vec::new();
    let mut first_cell_spans = false;
    for (i, cell) in row.select(&CELL_SEL).enumerate() {
        if i == 0 {
            first_cell_spans = cell
                .value()
                .attr("colspan")
                .is_some_and(|v| !v.trim().is_empty());
        }
        cells.push(normalize_text(cell));
    }
    RawRow {
        cells,
        first_cell_spans,
    }
}

/// Collapses an element's text the way a rendered cell reads: whitespace
/// runs become single spaces, surrounding whitespace is trimmed.
fn normalize_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Applies every kind's predicate to every table and returns the first match
/// per kind, keyed into `tables`. Each table is claimed by at most one kind;
/// kinds with more specific headers claim first, so the trades table (whose
/// header also carries a quantity column) is never mistaken for holdings.
pub fn discover(tables: &[RawTable]) -> HashMap<TableKind, usize> {
    const CLAIM_ORDER: [TableKind; 4] = [
        TableKind::Trades,
        TableKind::CashMovements,
        TableKind::Reference,
        TableKind::Holdings,
    ];

    let mut found = HashMap::new();
    let mut claimed = vec![false; tables.len()];
    for kind in CLAIM_ORDER {
        let hit = tables
            .iter()
            .enumerate()
            .find(|(i, t)| !claimed[*i] && kind.matches(t))
            .map(|(i, _)| i);
        if let Some(idx) = hit {
            claimed[idx] = true;
            found.insert(kind, idx);
        }
    }
    found
}
