//! Shared constants for statement parsing and price handling.

/// ISIN country prefix of the domestic market. Securities with this prefix
/// are eligible for on-demand reference-catalog refresh.
pub const DOMESTIC_ISIN_PREFIX: &str = "RU";

/// Market label used when requesting quotes for domestically listed
/// instruments.
pub const DOMESTIC_MARKET: &str = "MOEX";

/// Scale used for derived prices (average purchase price, converted
/// debt prices). Rounding is always half-up.
pub const PRICE_SCALE: u32 = 6;

/// Scale used when presenting prices to the caller.
pub const DISPLAY_SCALE: u32 = 2;

/// Date format used throughout the broker statements (`31.01.2020`).
pub const STATEMENT_DATE_FORMAT: &str = "%d.%m.%Y";

/// Time format used in the trades table (`12:34:56`).
pub const STATEMENT_TIME_FORMAT: &str = "%H:%M:%S";
