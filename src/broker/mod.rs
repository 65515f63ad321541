// Order execution and account queries
pub mod paper;

pub use paper::PaperBroker;

use crate::models::{Account, Candle, Order, Side};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BrokerError {
    #[error("insufficient {asset}: need {needed}, have {available}")]
    InsufficientFunds {
        asset: String,
        needed: f64,
        available: f64,
    },

    #[error("unknown pair: {0}")]
    UnknownPair(String),

    #[error("order {0} not found")]
    OrderNotFound(i64),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(f64),

    #[error("no market price for {0}")]
    NoMarketPrice(String),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// Exchange-side capabilities used by strategies and the scheduler
///
/// Calls block until the exchange answers; timeouts and retries belong to the
/// implementation.
pub trait Broker: Send + Sync {
    fn account(&self) -> Result<Account, BrokerError>;

    /// Holdings for a pair as `(asset quantity, quote quantity)`
    fn position(&self, pair: &str) -> Result<(f64, f64), BrokerError>;

    fn order(&self, pair: &str, id: i64) -> Result<Order, BrokerError>;

    fn create_order_market(&self, side: Side, pair: &str, size: f64) -> Result<Order, BrokerError>;

    /// Market order sized by an amount of the quote asset
    fn create_order_market_quote(
        &self,
        side: Side,
        pair: &str,
        quote: f64,
    ) -> Result<Order, BrokerError>;

    fn create_order_limit(
        &self,
        side: Side,
        pair: &str,
        size: f64,
        limit: f64,
    ) -> Result<Order, BrokerError>;

    /// One-cancels-the-other: a limit leg at `price` and a stop leg
    /// triggered at `stop` with limit `stop_limit`
    fn create_order_oco(
        &self,
        side: Side,
        pair: &str,
        size: f64,
        price: f64,
        stop: f64,
        stop_limit: f64,
    ) -> Result<Vec<Order>, BrokerError>;

    fn create_order_stop(&self, pair: &str, size: f64, limit: f64) -> Result<Order, BrokerError>;

    fn cancel(&self, order: &Order) -> Result<(), BrokerError>;
}

/// Receives every candle of a feed before strategies see it
pub trait CandleSubscriber: Send + Sync {
    fn on_candle(&self, candle: &Candle);
}
