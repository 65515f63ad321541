use serde::Deserialize;
use std::path::Path;

use crate::execution::Scheduler;
use crate::feed::MarketScenario;
use crate::models::Side;
use crate::strategy::CrossoverConfig;

const ENV_PREFIX: &str = "BARBOT";

/// Runtime settings
///
/// Layered from an optional TOML file and then `BARBOT_*` environment
/// variables, with `__` separating nested keys (`BARBOT_FEED__SEED=7`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pair: String,
    pub log_filter: String,
    pub strategy: CrossoverConfig,
    pub paper: PaperConfig,
    pub feed: FeedConfig,
    pub rules: Vec<RuleConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pair: "BTCUSDT".to_string(),
            log_filter: "barbot=info".to_string(),
            strategy: CrossoverConfig::default(),
            paper: PaperConfig::default(),
            feed: FeedConfig::default(),
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// Starting balance of the pair's quote asset
    pub initial_balance: f64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub scenario: MarketScenario,
    pub candles: usize,
    pub interval_minutes: i64,
    pub partials_per_candle: usize,
    pub seed: u64,
    /// Candles sent before the strategy is started
    pub preload: usize,
    pub channel_buffer: usize,
}

impl FeedConfig {
    pub fn channel_buffer(&self) -> usize {
        self.channel_buffer.max(1)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            scenario: MarketScenario::Volatile,
            candles: 500,
            interval_minutes: 5,
            partials_per_candle: 2,
            seed: 42,
            preload: 50,
            channel_buffer: 256,
        }
    }
}

/// Threshold that fires a configured rule
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTrigger {
    CloseAbove(f64),
    CloseBelow(f64),
}

impl RuleTrigger {
    pub fn holds(&self, close: f64) -> bool {
        match *self {
            RuleTrigger::CloseAbove(level) => close > level,
            RuleTrigger::CloseBelow(level) => close < level,
        }
    }
}

/// Conditional market order declared in configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub side: Side,
    pub size: f64,
    pub trigger: RuleTrigger,
}

impl RuleConfig {
    pub fn register(&self, scheduler: &mut Scheduler) {
        let trigger = self.trigger;
        let predicate =
            move |df: &crate::series::Dataframe| df.close.last(0).is_some_and(|c| trigger.holds(c));

        match self.side {
            Side::Buy => scheduler.buy_when(self.size, predicate),
            Side::Sell => scheduler.sell_when(self.size, predicate),
        }
    }
}

impl Settings {
    /// Load from `path` (if given) and the environment
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(contents, ::config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }
}
