//! Reconciler tests over in-memory repositories.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::errors::{DatabaseError, Error, Result};
use crate::holdings::holdings_model::Holding;
use crate::holdings::holdings_traits::HoldingRepositoryTrait;
use crate::holdings::reconciler::{buy_averages, PositionReconciler};
use crate::ingest::ingest_model::Transaction;
use crate::ingest::ingest_traits::TransactionRepositoryTrait;
use crate::securities::SecurityKind;
use crate::statements::statements_model::{ClosingHolding, TradeSide};

const PORTFOLIO: &str = "portfolio-1";
const EQUITY_ISIN: &str = "RU0009029540";
const DEBT_ISIN: &str = "RU000A0JXN21";

#[derive(Default)]
struct MockHoldingRepository {
    holdings: Mutex<Vec<Holding>>,
}

impl MockHoldingRepository {
    fn seed(&self, holding: Holding) {
        self.holdings.lock().unwrap().push(holding);
    }

    fn by_isin(&self, isin: &str) -> Option<Holding> {
        self.holdings
            .lock()
            .unwrap()
            .iter()
            .find(|h| h.isin == isin)
            .cloned()
    }
}

#[async_trait]
impl HoldingRepositoryTrait for MockHoldingRepository {
    fn list_by_portfolio(&self, portfolio_id: &str) -> Result<Vec<Holding>> {
        Ok(self
            .holdings
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.portfolio_id == portfolio_id)
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<Holding>> {
        Ok(self.holdings.lock().unwrap().clone())
    }

    fn find_by_portfolio_and_isin(
        &self,
        portfolio_id: &str,
        isin: &str,
    ) -> Result<Option<Holding>> {
        Ok(self
            .holdings
            .lock()
            .unwrap()
            .iter()
            .find(|h| h.portfolio_id == portfolio_id && h.isin == isin)
            .cloned())
    }

    async fn delete_by_portfolio(&self, portfolio_id: &str) -> Result<usize> {
        let mut holdings = self.holdings.lock().unwrap();
        let before = holdings.len();
        holdings.retain(|h| h.portfolio_id != portfolio_id);
        Ok(before - holdings.len())
    }

    async fn save(&self, holding: Holding) -> Result<Holding> {
        self.holdings.lock().unwrap().push(holding.clone());
        Ok(holding)
    }

    async fn update_average_price(&self, id: &str, average_price: Option<Decimal>) -> Result<()> {
        let mut holdings = self.holdings.lock().unwrap();
        let holding = holdings
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| DatabaseError::NotFound(id.to_string()))?;
        holding.average_price = average_price;
        Ok(())
    }

    async fn update_last_price(
        &self,
        id: &str,
        price: Decimal,
        as_of: DateTime<Utc>,
    ) -> Result<()> {
        let mut holdings = self.holdings.lock().unwrap();
        let holding = holdings
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| DatabaseError::NotFound(id.to_string()))?;
        holding.last_known_price = Some(price);
        holding.price_updated_at = Some(as_of);
        Ok(())
    }
}

#[derive(Default)]
struct MockTransactionRepository {
    transactions: Mutex<Vec<Transaction>>,
}

impl MockTransactionRepository {
    fn seed(&self, transaction: Transaction) {
        self.transactions.lock().unwrap().push(transaction);
    }
}

#[async_trait]
impl TransactionRepositoryTrait for MockTransactionRepository {
    fn list_by_portfolio(&self, portfolio_id: &str) -> Result<Vec<Transaction>> {
        let mut result: Vec<Transaction> = self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.portfolio_id == portfolio_id)
            .cloned()
            .collect();
        result.sort_by_key(|t| t.trade_date);
        Ok(result)
    }

    fn trade_number_exists(&self, portfolio_id: &str, trade_number: &str) -> Result<bool> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.portfolio_id == portfolio_id
                && t.trade_number.as_deref() == Some(trade_number)))
    }

    async fn save(&self, transaction: Transaction) -> Result<Transaction> {
        self.transactions.lock().unwrap().push(transaction.clone());
        Ok(transaction)
    }
}

fn trade(isin: &str, side: TradeSide, quantity: Decimal, price: Decimal, day: u32) -> Transaction {
    Transaction {
        id: Uuid::new_v4().to_string(),
        portfolio_id: PORTFOLIO.to_string(),
        statement_id: "stmt-1".to_string(),
        isin: isin.to_string(),
        kind: SecurityKind::Equity,
        side,
        trade_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
        settlement_date: None,
        trade_time: None,
        currency: "RUB".to_string(),
        quantity,
        price,
        amount: price * quantity,
        accrued_interest: Decimal::ZERO,
        broker_commission: Decimal::ZERO,
        exchange_commission: Decimal::ZERO,
        trade_number: None,
    }
}

fn holding(isin: &str, quantity: Decimal, average_price: Option<Decimal>) -> Holding {
    Holding::new(
        PORTFOLIO,
        isin,
        SecurityKind::Equity,
        "Test security",
        "RUB",
        quantity,
        average_price,
        None,
    )
}

fn closing(isin: &str, quantity: Decimal, price: Option<Decimal>, percent: bool) -> ClosingHolding {
    ClosingHolding {
        isin: isin.to_string(),
        kind: if percent {
            SecurityKind::Debt
        } else {
            SecurityKind::Equity
        },
        currency: "RUB".to_string(),
        quantity,
        name: "Test security".to_string(),
        last_known_price: price,
        price_is_percent: percent,
    }
}

fn reconciler(
    holdings: Arc<MockHoldingRepository>,
    transactions: Arc<MockTransactionRepository>,
) -> PositionReconciler {
    PositionReconciler::new(holdings, transactions)
}

#[tokio::test]
async fn test_recompute_weighted_average() {
    let holdings = Arc::new(MockHoldingRepository::default());
    let transactions = Arc::new(MockTransactionRepository::default());
    holdings.seed(holding(EQUITY_ISIN, dec!(40), None));
    transactions.seed(trade(EQUITY_ISIN, TradeSide::Buy, dec!(10), dec!(100), 1));
    transactions.seed(trade(EQUITY_ISIN, TradeSide::Buy, dec!(30), dec!(110), 2));
    // Sells never contribute to the average.
    transactions.seed(trade(EQUITY_ISIN, TradeSide::Sell, dec!(5), dec!(120), 3));

    reconciler(holdings.clone(), transactions)
        .recompute_cost_basis(PORTFOLIO)
        .await
        .unwrap();

    // (10*100 + 30*110) / 40 = 107.5
    assert_eq!(
        holdings.by_isin(EQUITY_ISIN).unwrap().average_price,
        Some(dec!(107.5))
    );
}

#[tokio::test]
async fn test_recompute_rounds_half_up_to_six_places() {
    let holdings = Arc::new(MockHoldingRepository::default());
    let transactions = Arc::new(MockTransactionRepository::default());
    holdings.seed(holding(EQUITY_ISIN, dec!(3), None));
    transactions.seed(trade(EQUITY_ISIN, TradeSide::Buy, dec!(1), dec!(100), 1));
    transactions.seed(trade(EQUITY_ISIN, TradeSide::Buy, dec!(2), dec!(100.50), 2));

    reconciler(holdings.clone(), transactions)
        .recompute_cost_basis(PORTFOLIO)
        .await
        .unwrap();

    // 301 / 3 = 100.33333... rounds to 6 places.
    assert_eq!(
        holdings.by_isin(EQUITY_ISIN).unwrap().average_price,
        Some(dec!(100.333333))
    );
}

#[tokio::test]
async fn test_recompute_leaves_unpurchased_holdings_alone() {
    let holdings = Arc::new(MockHoldingRepository::default());
    let transactions = Arc::new(MockTransactionRepository::default());
    holdings.seed(holding(EQUITY_ISIN, dec!(10), Some(dec!(99))));

    reconciler(holdings.clone(), transactions)
        .recompute_cost_basis(PORTFOLIO)
        .await
        .unwrap();

    assert_eq!(
        holdings.by_isin(EQUITY_ISIN).unwrap().average_price,
        Some(dec!(99))
    );
}

#[tokio::test]
async fn test_snapshot_replace_preserves_average_price() {
    let holdings = Arc::new(MockHoldingRepository::default());
    let transactions = Arc::new(MockTransactionRepository::default());
    holdings.seed(holding(EQUITY_ISIN, dec!(90), Some(dec!(250.10))));

    reconciler(holdings.clone(), transactions)
        .snapshot_replace(
            PORTFOLIO,
            &[closing(EQUITY_ISIN, dec!(100), Some(dec!(295.50)), false)],
        )
        .await
        .unwrap();

    let replaced = holdings.by_isin(EQUITY_ISIN).unwrap();
    assert_eq!(replaced.quantity, dec!(100));
    assert_eq!(replaced.average_price, Some(dec!(250.10)));
    assert_eq!(replaced.last_known_price, Some(dec!(295.50)));
    assert_eq!(holdings.list_all().unwrap().len(), 1);
}

#[tokio::test]
async fn test_snapshot_replace_drops_flagged_percent_price() {
    let holdings = Arc::new(MockHoldingRepository::default());
    let transactions = Arc::new(MockTransactionRepository::default());

    reconciler(holdings.clone(), transactions)
        .snapshot_replace(
            PORTFOLIO,
            &[closing(DEBT_ISIN, dec!(5), Some(dec!(99.50)), true)],
        )
        .await
        .unwrap();

    assert_eq!(holdings.by_isin(DEBT_ISIN).unwrap().last_known_price, None);
}

#[tokio::test]
async fn test_rebuild_drops_non_positive_positions() {
    let holdings = Arc::new(MockHoldingRepository::default());
    let transactions = Arc::new(MockTransactionRepository::default());
    transactions.seed(trade(EQUITY_ISIN, TradeSide::Buy, dec!(10), dec!(100), 1));
    transactions.seed(trade(EQUITY_ISIN, TradeSide::Sell, dec!(10), dec!(105), 2));
    transactions.seed(trade(DEBT_ISIN, TradeSide::Buy, dec!(5), dec!(1000), 1));
    transactions.seed(trade(DEBT_ISIN, TradeSide::Sell, dec!(2), dec!(1010), 2));

    reconciler(holdings.clone(), transactions)
        .rebuild_from_transactions(PORTFOLIO)
        .await
        .unwrap();

    assert!(holdings.by_isin(EQUITY_ISIN).is_none());
    assert_eq!(holdings.by_isin(DEBT_ISIN).unwrap().quantity, dec!(3));
}

#[tokio::test]
async fn test_apply_trade_blends_buy_into_average() {
    let holdings = Arc::new(MockHoldingRepository::default());
    let transactions = Arc::new(MockTransactionRepository::default());
    holdings.seed(holding(EQUITY_ISIN, dec!(10), Some(dec!(100))));

    let reconciler = reconciler(holdings.clone(), transactions);
    reconciler
        .apply_trade(PORTFOLIO, EQUITY_ISIN, TradeSide::Buy, dec!(10), dec!(110))
        .await
        .unwrap();
    assert_eq!(
        holdings.by_isin(EQUITY_ISIN).unwrap().average_price,
        Some(dec!(105))
    );

    // A sell never moves the average.
    reconciler
        .apply_trade(PORTFOLIO, EQUITY_ISIN, TradeSide::Sell, dec!(5), dec!(90))
        .await
        .unwrap();
    assert_eq!(
        holdings.by_isin(EQUITY_ISIN).unwrap().average_price,
        Some(dec!(105))
    );
}

#[tokio::test]
async fn test_apply_trade_without_prior_average_uses_trade_price() {
    let holdings = Arc::new(MockHoldingRepository::default());
    let transactions = Arc::new(MockTransactionRepository::default());
    holdings.seed(holding(EQUITY_ISIN, dec!(10), None));

    reconciler(holdings.clone(), transactions)
        .apply_trade(PORTFOLIO, EQUITY_ISIN, TradeSide::Buy, dec!(4), dec!(120))
        .await
        .unwrap();

    assert_eq!(
        holdings.by_isin(EQUITY_ISIN).unwrap().average_price,
        Some(dec!(120))
    );
}

#[tokio::test]
async fn test_set_average_price_requires_existing_holding() {
    let holdings = Arc::new(MockHoldingRepository::default());
    let transactions = Arc::new(MockTransactionRepository::default());

    let err = reconciler(holdings, transactions)
        .set_average_price(PORTFOLIO, EQUITY_ISIN, dec!(100))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Database(DatabaseError::NotFound(_))));
}

proptest! {
    /// The recomputed average equals the direct quotient and does not depend
    /// on the order transactions arrive in.
    #[test]
    fn prop_buy_average_is_order_independent(
        lots in proptest::collection::vec((1u32..500, 1u32..1_000_000), 1..16)
    ) {
        let trades: Vec<Transaction> = lots
            .iter()
            .map(|&(quantity, price_cents)| {
                trade(
                    EQUITY_ISIN,
                    TradeSide::Buy,
                    Decimal::from(quantity),
                    Decimal::from(price_cents) / dec!(100),
                    1,
                )
            })
            .collect();
        let mut reversed = trades.clone();
        reversed.reverse();

        let forward = buy_averages(&trades);
        let backward = buy_averages(&reversed);
        prop_assert_eq!(forward.get(EQUITY_ISIN), backward.get(EQUITY_ISIN));

        let cost: Decimal = trades.iter().map(|t| t.price * t.quantity).sum();
        let quantity: Decimal = trades.iter().map(|t| t.quantity).sum();
        let expected =
            (cost / quantity).round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero);
        prop_assert_eq!(forward.get(EQUITY_ISIN), Some(&expected));
    }
}
