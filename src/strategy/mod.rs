// Trading strategy module
pub mod crossover;

pub use crossover::{CrossoverConfig, MovingAverage, CrossoverStrategy};

use crate::broker::Broker;
use crate::series::Dataframe;
use crate::Result;

/// Base trait for all trading strategies
pub trait Strategy: Send {
    /// Get strategy name
    fn name(&self) -> &str;

    /// Rows of history required before the strategy may run
    fn warmup_period(&self) -> usize;

    /// Enrich the dataframe with derived series (stored as metadata)
    fn indicators(&mut self, df: &mut Dataframe) -> Result<()>;

    /// Called with the trailing sample after each complete candle
    fn on_candle(&mut self, df: &Dataframe, broker: &dyn Broker) -> Result<()>;
}

/// Strategy that also reacts to in-progress candles
pub trait HighFrequencyStrategy: Strategy {
    /// Called with the full dataframe after the current bucket was revised
    fn on_partial_candle(&mut self, df: &Dataframe, broker: &dyn Broker) -> Result<()>;
}

/// A registered strategy, with its partial-candle capability resolved once
pub enum StrategyHandle {
    Standard(Box<dyn Strategy>),
    HighFrequency(Box<dyn HighFrequencyStrategy>),
}

impl StrategyHandle {
    pub fn standard(strategy: impl Strategy + 'static) -> Self {
        Self::Standard(Box::new(strategy))
    }

    pub fn high_frequency(strategy: impl HighFrequencyStrategy + 'static) -> Self {
        Self::HighFrequency(Box::new(strategy))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Standard(s) => s.name(),
            Self::HighFrequency(s) => s.name(),
        }
    }

    pub fn warmup_period(&self) -> usize {
        match self {
            Self::Standard(s) => s.warmup_period(),
            Self::HighFrequency(s) => s.warmup_period(),
        }
    }

    pub fn indicators(&mut self, df: &mut Dataframe) -> Result<()> {
        match self {
            Self::Standard(s) => s.indicators(df),
            Self::HighFrequency(s) => s.indicators(df),
        }
    }

    pub fn on_candle(&mut self, df: &Dataframe, broker: &dyn Broker) -> Result<()> {
        match self {
            Self::Standard(s) => s.on_candle(df, broker),
            Self::HighFrequency(s) => s.on_candle(df, broker),
        }
    }

    /// The partial-candle capability, if the strategy was registered with it
    pub fn high_frequency_mut(&mut self) -> Option<&mut dyn HighFrequencyStrategy> {
        match self {
            Self::Standard(_) => None,
            Self::HighFrequency(s) => Some(s.as_mut()),
        }
    }

    pub fn is_high_frequency(&self) -> bool {
        matches!(self, Self::HighFrequency(_))
    }
}
