// Columnar time series store fed by candles
use crate::models::Candle;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("late candle for {pair}: {candle_time} is not after last stored {last_time}")]
    LateCandle {
        pair: String,
        candle_time: DateTime<Utc>,
        last_time: DateTime<Utc>,
    },

    #[error("candle for {actual} merged into the {expected} dataframe")]
    PairMismatch { expected: String, actual: String },

    #[error("cannot overwrite row at {last_time} with a candle at {candle_time}")]
    TimestampMismatch {
        candle_time: DateTime<Utc>,
        last_time: DateTime<Utc>,
    },

    #[error("cannot overwrite the last row of an empty dataframe")]
    Empty,

    #[error("series {name} has {actual} values, dataframe has {expected} rows")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("unknown series: {0}")]
    UnknownSeries(String),
}

/// A column of values, oldest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series(Vec<f64>);

impl Series {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub fn push(&mut self, value: f64) {
        self.0.push(value);
    }

    /// Value `n` positions back from the most recent one (`last(0)` is the newest)
    pub fn last(&self, n: usize) -> Option<f64> {
        self.0.len().checked_sub(n + 1).map(|i| self.0[i])
    }

    /// True when this series just crossed above `other`
    pub fn crossover(&self, other: &Series) -> bool {
        match (self.last(0), self.last(1), other.last(0), other.last(1)) {
            (Some(a0), Some(a1), Some(b0), Some(b1)) => a0 > b0 && a1 <= b1,
            _ => false,
        }
    }

    /// True when this series just crossed below `other`
    pub fn crossunder(&self, other: &Series) -> bool {
        match (self.last(0), self.last(1), other.last(0), other.last(1)) {
            (Some(a0), Some(a1), Some(b0), Some(b1)) => a0 < b0 && a1 >= b1,
            _ => false,
        }
    }

    /// Copy of the last `n` values
    fn tail(&self, n: usize) -> Series {
        let start = self.0.len().saturating_sub(n);
        Series(self.0[start..].to_vec())
    }

    fn set_last(&mut self, value: f64) {
        if let Some(slot) = self.0.last_mut() {
            *slot = value;
        }
    }
}

impl Deref for Series {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for Series {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// What a successful merge did to the dataframe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merged {
    /// The candle revised the last row in place
    Updated,
    /// The candle opened a new row
    Appended,
}

/// Time-ordered OHLCV columns plus named auxiliary series for one pair
///
/// Every column (including each metadata series) always has the same length
/// and timestamps never decrease.
///
/// Metadata policy: a key missing from an appended candle is carried forward
/// from the previous row, a key missing from an overwriting candle keeps the
/// row's existing value, and a key seen for the first time is back-filled
/// with NaN. Series stored with [`Dataframe::insert_indicator`] are derived
/// values and are never carried forward: a new row holds NaN until the
/// indicators are recomputed.
///
/// [`Dataframe::merge`] is the only way candles enter the dataframe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataframe {
    pub pair: String,
    pub open: Series,
    pub high: Series,
    pub low: Series,
    pub close: Series,
    pub volume: Series,
    pub time: Vec<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, Series>,
    indicators: HashSet<String>,
}

impl Dataframe {
    pub fn new(pair: &str) -> Self {
        Self::with_capacity(pair, 0)
    }

    /// Create an empty dataframe with room for `capacity` rows per column
    pub fn with_capacity(pair: &str, capacity: usize) -> Self {
        Self {
            pair: pair.to_string(),
            open: Series::with_capacity(capacity),
            high: Series::with_capacity(capacity),
            low: Series::with_capacity(capacity),
            close: Series::with_capacity(capacity),
            volume: Series::with_capacity(capacity),
            time: Vec::with_capacity(capacity),
            last_update: None,
            metadata: HashMap::new(),
            indicators: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.time.last().copied()
    }

    /// Merge a candle: same timestamp as the last row overwrites it, a newer
    /// timestamp appends, an older one (or another pair's candle) is rejected
    /// without touching the data
    pub fn merge(&mut self, candle: &Candle) -> Result<Merged, SeriesError> {
        if candle.pair != self.pair {
            return Err(SeriesError::PairMismatch {
                expected: self.pair.clone(),
                actual: candle.pair.clone(),
            });
        }

        match self.last_time() {
            Some(last) if candle.time == last => {
                self.overwrite_last(candle)?;
                Ok(Merged::Updated)
            }
            Some(last) if candle.time < last => Err(SeriesError::LateCandle {
                pair: self.pair.clone(),
                candle_time: candle.time,
                last_time: last,
            }),
            _ => {
                self.append(candle);
                Ok(Merged::Appended)
            }
        }
    }

    /// Push a new row built from `candle`; ordering is checked by `merge`
    fn append(&mut self, candle: &Candle) {
        let rows = self.len();

        self.open.push(candle.open);
        self.high.push(candle.high);
        self.low.push(candle.low);
        self.close.push(candle.close);
        self.volume.push(candle.volume);
        self.time.push(candle.time);
        self.last_update = Some(candle.time);

        for (key, series) in self.metadata.iter_mut() {
            let value = match candle.metadata.get(key) {
                Some(value) => *value,
                None if self.indicators.contains(key) => f64::NAN,
                None => series.last(0).unwrap_or(f64::NAN),
            };
            series.push(value);
        }

        for (key, value) in &candle.metadata {
            if !self.metadata.contains_key(key) {
                let mut series = Series::new(vec![f64::NAN; rows]);
                series.push(*value);
                self.metadata.insert(key.clone(), series);
            }
        }
    }

    /// Replace the last row with the values of `candle`, which must carry the
    /// same timestamp
    fn overwrite_last(&mut self, candle: &Candle) -> Result<(), SeriesError> {
        let last_time = self.last_time().ok_or(SeriesError::Empty)?;
        if candle.time != last_time {
            return Err(SeriesError::TimestampMismatch {
                candle_time: candle.time,
                last_time,
            });
        }

        self.open.set_last(candle.open);
        self.high.set_last(candle.high);
        self.low.set_last(candle.low);
        self.close.set_last(candle.close);
        self.volume.set_last(candle.volume);

        let rows = self.len();
        for (key, value) in &candle.metadata {
            match self.metadata.get_mut(key) {
                Some(series) => series.set_last(*value),
                None => {
                    let mut values = vec![f64::NAN; rows];
                    values[rows - 1] = *value;
                    self.metadata.insert(key.clone(), Series::new(values));
                }
            }
        }

        Ok(())
    }

    /// Copy of the most recent `size` rows (fewer if the dataframe is shorter)
    pub fn sample(&self, size: usize) -> Dataframe {
        let start = self.len().saturating_sub(size);

        Dataframe {
            pair: self.pair.clone(),
            open: self.open.tail(size),
            high: self.high.tail(size),
            low: self.low.tail(size),
            close: self.close.tail(size),
            volume: self.volume.tail(size),
            time: self.time[start..].to_vec(),
            last_update: self.last_update,
            metadata: self
                .metadata
                .iter()
                .map(|(key, series)| (key.clone(), series.tail(size)))
                .collect(),
            indicators: self.indicators.clone(),
        }
    }

    pub fn metadata(&self, name: &str) -> Result<&Series, SeriesError> {
        self.metadata
            .get(name)
            .ok_or_else(|| SeriesError::UnknownSeries(name.to_string()))
    }

    /// Store a derived series; it must have one value per row
    pub fn insert_indicator(&mut self, name: &str, series: Series) -> Result<(), SeriesError> {
        if series.len() != self.len() {
            return Err(SeriesError::LengthMismatch {
                name: name.to_string(),
                expected: self.len(),
                actual: series.len(),
            });
        }

        self.metadata.insert(name.to_string(), series);
        self.indicators.insert(name.to_string());
        Ok(())
    }

    /// Check that all columns are parallel and timestamps never decrease
    pub fn is_aligned(&self) -> bool {
        let rows = self.len();
        let columns = [&self.open, &self.high, &self.low, &self.close, &self.volume];

        columns.iter().all(|c| c.len() == rows)
            && self.metadata.values().all(|s| s.len() == rows)
            && self.time.windows(2).all(|w| w[0] <= w[1])
    }
}
