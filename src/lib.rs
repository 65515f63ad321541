// Core modules
pub mod broker;
pub mod config;
pub mod error;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod metrics;
pub mod models;
pub mod series;
pub mod strategy;

// Re-export commonly used types
pub use broker::{Broker, BrokerError};
pub use error::Error;
pub use models::*;
pub use series::{Dataframe, Series};
pub use strategy::{HighFrequencyStrategy, Strategy, StrategyHandle};

// Error handling
pub type Result<T> = std::result::Result<T, Error>;
