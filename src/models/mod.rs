use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Quote assets recognised when splitting a pair symbol, longest first
const QUOTE_ASSETS: &[&str] = &[
    "FDUSD", "USDT", "USDC", "BUSD", "TUSD", "USD", "EUR", "BTC", "ETH", "BNB",
];

/// Split a pair symbol like `BTCUSDT` into `("BTC", "USDT")`
///
/// Returns `None` when no known quote asset is a proper suffix of the pair.
pub fn split_pair(pair: &str) -> Option<(&str, &str)> {
    QUOTE_ASSETS.iter().find_map(|quote| {
        pair.strip_suffix(*quote)
            .filter(|asset| !asset.is_empty())
            .map(|asset| (asset, &pair[asset.len()..]))
    })
}

/// OHLCV candlestick for one time bucket
///
/// `complete` is false while the bucket is still open; such candles revise
/// the bucket and share its timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub pair: String,
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default = "default_complete")]
    pub complete: bool,
    /// Auxiliary values attached by the feed adapter
    #[serde(default)]
    pub metadata: HashMap<String, f64>,
}

fn default_complete() -> bool {
    true
}

impl Candle {
    /// Flat candle (open = high = low = close) with no metadata
    pub fn flat(pair: &str, time: DateTime<Utc>, price: f64, volume: f64, complete: bool) -> Self {
        Self {
            pair: pair.to_string(),
            time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            complete,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: f64) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
    LimitMaker,
    StopLoss,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    New,
    Filled,
    Canceled,
    Rejected,
}

/// Order as reported by the broker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub client_order_id: Uuid,
    pub pair: String,
    pub side: Side,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub price: f64,
    pub quantity: f64,
    pub stop: Option<f64>,
    /// Shared by the legs of an OCO order
    pub group_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Balance {
    pub asset: String,
    pub free: f64,
    pub locked: f64,
}

impl Balance {
    pub fn total(&self) -> f64 {
        self.free + self.locked
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub balances: Vec<Balance>,
}

impl Account {
    /// Balance for an asset, zero when the account never held it
    pub fn balance(&self, asset: &str) -> Balance {
        self.balances
            .iter()
            .find(|b| b.asset == asset)
            .cloned()
            .unwrap_or(Balance {
                asset: asset.to_string(),
                free: 0.0,
                locked: 0.0,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pair() {
        assert_eq!(split_pair("BTCUSDT"), Some(("BTC", "USDT")));
        assert_eq!(split_pair("ETHBTC"), Some(("ETH", "BTC")));
        assert_eq!(split_pair("SOLFDUSD"), Some(("SOL", "FDUSD")));
        assert_eq!(split_pair("USDT"), None);
        assert_eq!(split_pair("XYZ"), None);
    }

    #[test]
    fn test_candle_deserialize_defaults() {
        let json = r#"{"pair":"BTCUSDT","time":"2024-01-01T00:00:00Z","open":1.0,"high":2.0,"low":0.5,"close":1.5,"volume":10.0}"#;
        let candle: Candle = serde_json::from_str(json).unwrap();

        assert!(candle.complete);
        assert!(candle.metadata.is_empty());
        assert_eq!(candle.close, 1.5);
    }

    #[test]
    fn test_account_balance_missing_asset() {
        let account = Account {
            balances: vec![Balance {
                asset: "USDT".to_string(),
                free: 100.0,
                locked: 50.0,
            }],
        };

        assert_eq!(account.balance("USDT").total(), 150.0);
        assert_eq!(account.balance("BTC").total(), 0.0);
    }
}
