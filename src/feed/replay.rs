use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::Error;
use crate::models::Candle;

/// Read a JSON-lines candle file
///
/// One candle per line; blank lines are skipped. `complete` defaults to true
/// when absent.
pub fn load_candles(path: impl AsRef<Path>) -> crate::Result<Vec<Candle>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let candles = parse_candles(BufReader::new(file))?;

    tracing::info!(path = %path.display(), count = candles.len(), "loaded candles");
    Ok(candles)
}

pub fn parse_candles(reader: impl BufRead) -> crate::Result<Vec<Candle>> {
    let mut candles = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let candle = serde_json::from_str(&line).map_err(|source| Error::Json {
            line: index + 1,
            source,
        })?;
        candles.push(candle);
    }

    Ok(candles)
}
