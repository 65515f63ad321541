use serde::{Deserialize, Serialize};

use super::{HighFrequencyStrategy, Strategy};
use crate::broker::Broker;
use crate::indicators::{ema, sma};
use crate::models::Side;
use crate::series::{Dataframe, Series};
use crate::Result;

const FAST_KEY: &str = "ma_fast";
const SLOW_KEY: &str = "ma_slow";

/// Positions smaller than this are treated as flat
const DUST: f64 = 1e-9;

/// Averaging used for both crossover lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovingAverage {
    #[default]
    Sma,
    Ema,
}

impl MovingAverage {
    fn compute(self, values: &[f64], period: usize) -> Series {
        match self {
            MovingAverage::Sma => sma(values, period),
            MovingAverage::Ema => ema(values, period),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossoverConfig {
    pub average: MovingAverage,
    pub fast_period: usize,
    pub slow_period: usize,
    /// Fraction of the free quote balance spent on each entry
    pub allocation: f64,
    /// Intrabar exit when price falls this far below the slow average
    pub stop_pct: f64,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            average: MovingAverage::Sma,
            fast_period: 9,
            slow_period: 21,
            allocation: 0.95,
            stop_pct: 0.03,
        }
    }
}

/// Moving average crossover (SMA or EMA lines)
///
/// Buys when the fast average crosses above the slow one while flat, sells the
/// whole position on the opposite cross. On in-progress candles it exits
/// early if price drops more than `stop_pct` below the slow average.
#[derive(Debug, Clone)]
pub struct CrossoverStrategy {
    pair: String,
    config: CrossoverConfig,
}

impl CrossoverStrategy {
    pub fn new(pair: &str, config: CrossoverConfig) -> Self {
        Self {
            pair: pair.to_string(),
            config,
        }
    }

    fn exit(&self, broker: &dyn Broker, reason: &str) -> Result<()> {
        let (asset, _) = broker.position(&self.pair)?;
        if asset <= DUST {
            return Ok(());
        }

        let order = broker.create_order_market(Side::Sell, &self.pair, asset)?;
        tracing::info!(pair = %self.pair, size = asset, price = order.price, reason, "exit");
        Ok(())
    }
}

impl Strategy for CrossoverStrategy {
    fn name(&self) -> &str {
        "CrossoverStrategy"
    }

    fn warmup_period(&self) -> usize {
        // one extra row so the previous bar's averages exist for the cross check
        self.config.slow_period.max(self.config.fast_period) + 1
    }

    fn indicators(&mut self, df: &mut Dataframe) -> Result<()> {
        let fast = self.config.average.compute(&df.close, self.config.fast_period);
        let slow = self.config.average.compute(&df.close, self.config.slow_period);
        df.insert_indicator(FAST_KEY, fast)?;
        df.insert_indicator(SLOW_KEY, slow)?;
        Ok(())
    }

    fn on_candle(&mut self, df: &Dataframe, broker: &dyn Broker) -> Result<()> {
        let fast = df.metadata(FAST_KEY)?;
        let slow = df.metadata(SLOW_KEY)?;

        if fast.crossover(slow) {
            let (asset, quote) = broker.position(&self.pair)?;
            if asset > DUST {
                return Ok(());
            }

            let amount = quote * self.config.allocation;
            let order = broker.create_order_market_quote(Side::Buy, &self.pair, amount)?;
            tracing::info!(
                pair = %self.pair,
                size = order.quantity,
                price = order.price,
                "entry on fast/slow crossover"
            );
        } else if fast.crossunder(slow) {
            self.exit(broker, "fast/slow crossunder")?;
        }

        Ok(())
    }
}

impl HighFrequencyStrategy for CrossoverStrategy {
    fn on_partial_candle(&mut self, df: &Dataframe, broker: &dyn Broker) -> Result<()> {
        let (Some(close), Some(slow)) = (df.close.last(0), df.metadata(SLOW_KEY)?.last(0)) else {
            return Ok(());
        };

        if close < slow * (1.0 - self.config.stop_pct) {
            self.exit(broker, "intrabar stop below slow average")?;
        }

        Ok(())
    }
}
