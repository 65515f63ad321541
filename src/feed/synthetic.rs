use crate::models::Candle;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MarketScenario {
    /// Steady uptrend with noise (+2% daily average)
    Uptrend,
    /// Steady downtrend with noise (-2% daily average)
    Downtrend,
    /// Sideways/choppy market (±1% around mean)
    Sideways,
    /// High volatility (±5% large swings)
    Volatile,
}

/// Generates a seeded candle stream, including in-progress revisions
///
/// Each time bucket yields its complete candle followed by
/// `partials_per_candle` partial candles stamped with the same time. The
/// partials revise the stored row intrabar, walking its price toward the next
/// bucket's close.
pub struct SyntheticFeed {
    rng: StdRng,
    pair: String,
    base_price: f64,
    base_volume: f64,
    interval_minutes: i64,
    partials_per_candle: usize,
}

impl SyntheticFeed {
    /// Create a new generator with a seed for reproducibility
    pub fn new(pair: &str, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            pair: pair.to_string(),
            base_price: 150.0,
            base_volume: 1_000.0,
            interval_minutes: 5,
            partials_per_candle: 0,
        }
    }

    pub fn with_interval(mut self, interval_minutes: i64) -> Self {
        self.interval_minutes = interval_minutes.max(1);
        self
    }

    pub fn with_partials(mut self, partials_per_candle: usize) -> Self {
        self.partials_per_candle = partials_per_candle;
        self
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    /// Generate `num_candles` buckets starting at `start`
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_candles: usize,
        start: DateTime<Utc>,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(num_candles * (self.partials_per_candle + 1));
        let mut open = self.base_price;
        let mut close = self.next_price(scenario, open);

        for i in 0..num_candles {
            let time = start + Duration::minutes(i as i64 * self.interval_minutes);
            let next_close = self.next_price(scenario, close);

            let mut high = open.max(close);
            let mut low = open.min(close);
            let mut volume = self.base_volume * self.rng.gen_range(0.5..1.5);
            candles.push(self.candle(time, open, high, low, close, volume, true));

            for step in 1..=self.partials_per_candle {
                // walk toward the next close with some intrabar noise
                let progress = step as f64 / (self.partials_per_candle + 1) as f64;
                let noise = close * self.rng.gen_range(-0.002..0.002);
                let price = close + (next_close - close) * progress + noise;
                high = high.max(price);
                low = low.min(price);
                volume += self.base_volume * self.rng.gen_range(0.05..0.3);

                candles.push(self.candle(time, open, high, low, price, volume, false));
            }

            open = close;
            close = next_close;
        }

        candles
    }

    fn next_price(&mut self, scenario: MarketScenario, current: f64) -> f64 {
        let intervals_per_day = 24.0 * 60.0 / self.interval_minutes as f64;

        let next = match scenario {
            MarketScenario::Uptrend => {
                let drift = current * 0.02 / intervals_per_day;
                current + drift + current * self.rng.gen_range(-0.001..0.001)
            }
            MarketScenario::Downtrend => {
                let drift = -current * 0.02 / intervals_per_day;
                current + drift + current * self.rng.gen_range(-0.001..0.001)
            }
            MarketScenario::Sideways => {
                let reversion = (self.base_price - current) * 0.1; // 10% pull to mean
                current + reversion + current * self.rng.gen_range(-0.01..0.01)
            }
            MarketScenario::Volatile => current + current * self.rng.gen_range(-0.05..0.05),
        };

        // Prevent price from going too low
        next.max(self.base_price * 0.1)
    }

    #[allow(clippy::too_many_arguments)]
    fn candle(
        &self,
        time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        complete: bool,
    ) -> Candle {
        Candle {
            pair: self.pair.clone(),
            time,
            open,
            high,
            low,
            close,
            volume,
            complete,
            metadata: Default::default(),
        }
    }
}
