use thiserror::Error;

use crate::broker::BrokerError;
use crate::series::SeriesError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("series error: {0}")]
    Series(#[from] SeriesError),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid candle data at line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("strategy error: {0}")]
    Strategy(String),
}
