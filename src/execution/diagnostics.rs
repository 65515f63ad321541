use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};

use crate::models::Candle;

/// Which strategy callback failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Indicators,
    Candle,
    PartialCandle,
}

/// Receives the problems a controller skips over
///
/// Injected at construction so the controller has no global logging state.
pub trait DiagnosticsSink: Send + Sync {
    /// A complete candle arrived at or before the last stored timestamp
    fn late_candle(&self, candle: &Candle, last_time: DateTime<Utc>);

    /// A candle for another instrument reached the `pair` controller
    fn foreign_candle(&self, candle: &Candle, pair: &str);

    fn strategy_failed(&self, pair: &str, stage: Stage, error: &crate::Error);
}

/// Default sink: everything goes to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn late_candle(&self, candle: &Candle, last_time: DateTime<Utc>) {
        tracing::error!(
            pair = %candle.pair,
            candle_time = %candle.time,
            last_time = %last_time,
            "late candle received, dropping"
        );
    }

    fn foreign_candle(&self, candle: &Candle, pair: &str) {
        tracing::error!(
            expected = pair,
            got = %candle.pair,
            candle_time = %candle.time,
            "candle for another pair, dropping"
        );
    }

    fn strategy_failed(&self, pair: &str, stage: Stage, error: &crate::Error) {
        tracing::error!(pair, ?stage, error = %error, "strategy callback failed");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    LateCandle {
        candle_time: DateTime<Utc>,
        last_time: DateTime<Utc>,
    },
    ForeignCandle {
        pair: String,
    },
    StrategyFailed {
        stage: Stage,
        message: String,
    },
}

/// Sink that keeps events in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct RecordingDiagnostics {
    events: Arc<Mutex<Vec<DiagnosticEvent>>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DiagnosticEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DiagnosticsSink for RecordingDiagnostics {
    fn late_candle(&self, candle: &Candle, last_time: DateTime<Utc>) {
        self.lock().push(DiagnosticEvent::LateCandle {
            candle_time: candle.time,
            last_time,
        });
    }

    fn foreign_candle(&self, candle: &Candle, _pair: &str) {
        self.lock().push(DiagnosticEvent::ForeignCandle {
            pair: candle.pair.clone(),
        });
    }

    fn strategy_failed(&self, _pair: &str, stage: Stage, error: &crate::Error) {
        self.lock().push(DiagnosticEvent::StrategyFailed {
            stage,
            message: error.to_string(),
        });
    }
}
