// Technical indicators computed over whole dataframe columns

pub mod moving_average;

pub use moving_average::{ema, sma};
