use crate::series::Series;

/// Simple Moving Average over a full column
///
/// Output has one value per input value; the first `period - 1` entries are
/// NaN because the window is not full yet.
pub fn sma(values: &[f64], period: usize) -> Series {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return Series::new(out);
    }

    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = sum / period as f64;

    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = sum / period as f64;
    }

    Series::new(out)
}

/// Exponential Moving Average seeded with the SMA of the first window
pub fn ema(values: &[f64], period: usize) -> Series {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return Series::new(out);
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = ema;

    for i in period..values.len() {
        ema = (values[i] - ema) * multiplier + ema;
        out[i] = ema;
    }

    Series::new(out)
}
