// Candle sources for driving an instrument worker
pub mod replay;
pub mod synthetic;

pub use replay::{load_candles, parse_candles};
pub use synthetic::{MarketScenario, SyntheticFeed};
