// Summary statistics over per-trade P&L values
use serde::{Deserialize, Serialize};

/// Profit factor reported when there are no losses to divide by
pub const NO_LOSS_PROFIT_FACTOR: f64 = 10.0;

/// Arithmetic mean; NaN for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Split into (wins, losses); zero counts as a win
fn partition(values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    values.iter().copied().partition(|v| *v >= 0.0)
}

/// |average win / average loss|, or 0 when either side is empty or the
/// ratio is undefined
pub fn payoff(values: &[f64]) -> f64 {
    let (wins, losses) = partition(values);
    if wins.is_empty() || losses.is_empty() {
        return 0.0;
    }

    let avg_win = mean(&wins);
    let avg_loss = mean(&losses);
    if avg_win.is_nan() || avg_loss.is_nan() || avg_loss == 0.0 {
        return 0.0;
    }

    (avg_win / avg_loss).abs()
}

/// |sum of wins / sum of losses|, or [`NO_LOSS_PROFIT_FACTOR`] without losses
pub fn profit_factor(values: &[f64]) -> f64 {
    let (wins, losses) = partition(values);
    let total_wins: f64 = wins.iter().sum();
    let total_losses: f64 = losses.iter().sum();

    if total_losses == 0.0 {
        return NO_LOSS_PROFIT_FACTOR;
    }

    (total_wins / total_losses).abs()
}

/// Aggregate statistics for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSummary {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub mean_pnl: f64,
    pub payoff: f64,
    pub profit_factor: f64,
}

impl TradeSummary {
    pub fn from_pnls(pnls: &[f64]) -> Self {
        let (wins, losses) = partition(pnls);
        let win_rate = if pnls.is_empty() {
            0.0
        } else {
            (wins.len() as f64 / pnls.len() as f64) * 100.0
        };

        Self {
            total_trades: pnls.len(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate,
            total_pnl: pnls.iter().sum(),
            mean_pnl: mean(pnls),
            payoff: payoff(pnls),
            profit_factor: profit_factor(pnls),
        }
    }
}
