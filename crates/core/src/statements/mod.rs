pub mod parser;
pub mod statements_model;
pub mod tables;

pub use parser::StatementParser;
pub use statements_model::{
    ClosingHolding, ParsedCashMovement, ParsedStatement, ParsedTrade, TradeSide,
};
