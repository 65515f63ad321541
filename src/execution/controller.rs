use std::sync::Arc;

use super::diagnostics::{DiagnosticsSink, Stage};
use crate::broker::Broker;
use crate::models::Candle;
use crate::series::{Dataframe, SeriesError};
use crate::strategy::StrategyHandle;

/// Extra rows preallocated beyond the warm-up window
const CAPACITY_SLACK: usize = 100;

/// What `on_candle` did with a complete candle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleOutcome {
    /// Not newer than the last stored candle, dropped
    Rejected,
    /// Stored, but fewer rows than the warm-up period
    Accumulating,
    /// Sample built and indicators computed, controller not started
    Warm,
    /// Strategy `on_candle` ran
    Dispatched,
    /// A strategy callback returned an error (reported to diagnostics)
    Failed,
}

/// What `on_partial_candle` did with an in-progress candle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialOutcome {
    Ignored,
    Dispatched,
    Failed,
}

/// Feeds one pair's candles into its dataframe and drives the strategy
///
/// Complete candles append a row; once the dataframe holds the strategy's
/// warm-up period a trailing sample of exactly that many rows is built, its
/// indicators computed, and (after [`Controller::start`]) `on_candle` runs.
/// Partial candles refine the last row and only reach strategies registered
/// as high frequency, whether or not the controller was started.
pub struct Controller {
    dataframe: Dataframe,
    strategy: StrategyHandle,
    broker: Arc<dyn Broker>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    warmup_period: usize,
    started: bool,
}

impl Controller {
    pub fn new(
        pair: &str,
        strategy: StrategyHandle,
        broker: Arc<dyn Broker>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        let warmup_period = strategy.warmup_period().max(1);

        tracing::debug!(
            pair,
            strategy = strategy.name(),
            warmup_period,
            high_frequency = strategy.is_high_frequency(),
            "controller created"
        );

        Self {
            dataframe: Dataframe::with_capacity(pair, warmup_period + CAPACITY_SLACK),
            strategy,
            broker,
            diagnostics,
            warmup_period,
            started: false,
        }
    }

    /// Arm the strategy's `on_candle` callback
    pub fn start(&mut self) {
        if !self.started {
            tracing::info!(pair = %self.dataframe.pair, rows = self.dataframe.len(), "controller started");
            self.started = true;
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn warmup_period(&self) -> usize {
        self.warmup_period
    }

    pub fn pair(&self) -> &str {
        &self.dataframe.pair
    }

    pub fn dataframe(&self) -> &Dataframe {
        &self.dataframe
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Handle an in-progress candle for the current bucket
    ///
    /// Ignored while warming up, for complete candles, for strategies without
    /// the high-frequency capability, and for candles that do not share the
    /// last row's timestamp (this path never appends).
    pub fn on_partial_candle(&mut self, candle: &Candle) -> PartialOutcome {
        if candle.complete
            || !self.strategy.is_high_frequency()
            || self.dataframe.len() < self.warmup_period
            || self.dataframe.last_time() != Some(candle.time)
        {
            return PartialOutcome::Ignored;
        }

        if let Err(err) = self.dataframe.merge(candle) {
            self.reject(candle, err);
            return PartialOutcome::Ignored;
        }

        let Some(strategy) = self.strategy.high_frequency_mut() else {
            return PartialOutcome::Ignored;
        };

        if let Err(err) = strategy.indicators(&mut self.dataframe) {
            self.diagnostics
                .strategy_failed(&self.dataframe.pair, Stage::Indicators, &err);
            return PartialOutcome::Failed;
        }

        if let Err(err) = strategy.on_partial_candle(&self.dataframe, self.broker.as_ref()) {
            self.diagnostics
                .strategy_failed(&self.dataframe.pair, Stage::PartialCandle, &err);
            return PartialOutcome::Failed;
        }

        PartialOutcome::Dispatched
    }

    /// Handle a closed candle
    pub fn on_candle(&mut self, candle: &Candle) -> CandleOutcome {
        // a closed bucket is never revised by another complete candle
        if candle.pair == self.dataframe.pair && self.dataframe.last_time() == Some(candle.time) {
            self.diagnostics.late_candle(candle, candle.time);
            return CandleOutcome::Rejected;
        }

        if let Err(err) = self.dataframe.merge(candle) {
            self.reject(candle, err);
            return CandleOutcome::Rejected;
        }

        if self.dataframe.len() < self.warmup_period {
            tracing::debug!(
                pair = %self.dataframe.pair,
                rows = self.dataframe.len(),
                warmup_period = self.warmup_period,
                "accumulating"
            );
            return CandleOutcome::Accumulating;
        }

        let mut sample = self.dataframe.sample(self.warmup_period);
        if let Err(err) = self.strategy.indicators(&mut sample) {
            self.diagnostics
                .strategy_failed(&self.dataframe.pair, Stage::Indicators, &err);
            return CandleOutcome::Failed;
        }

        if !self.started {
            return CandleOutcome::Warm;
        }

        if let Err(err) = self.strategy.on_candle(&sample, self.broker.as_ref()) {
            self.diagnostics
                .strategy_failed(&self.dataframe.pair, Stage::Candle, &err);
            return CandleOutcome::Failed;
        }

        CandleOutcome::Dispatched
    }

    fn reject(&self, candle: &Candle, err: SeriesError) {
        match err {
            SeriesError::LateCandle { last_time, .. } => {
                self.diagnostics.late_candle(candle, last_time)
            }
            SeriesError::PairMismatch { expected, .. } => {
                self.diagnostics.foreign_candle(candle, &expected)
            }
            other => tracing::debug!(pair = %candle.pair, error = %other, "candle not merged"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PaperBroker;
    use crate::execution::diagnostics::{DiagnosticEvent, RecordingDiagnostics};
    use crate::series::Series;
    use crate::strategy::{HighFrequencyStrategy, Strategy};
    use crate::Error;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Mutex;

    const PAIR: &str = "BTCUSDT";

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Indicators(usize),
        Candle { rows: usize, closes: Vec<f64> },
        Partial { rows: usize, close: Option<f64> },
    }

    #[derive(Clone)]
    struct Recorder {
        warmup: usize,
        fail_on_candle: bool,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl Recorder {
        fn new(warmup: usize) -> Self {
            Self {
                warmup,
                fail_on_candle: false,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn candle_calls(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| matches!(c, Call::Candle { .. }))
                .collect()
        }

        fn partial_calls(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Partial { .. }))
                .count()
        }
    }

    impl Strategy for Recorder {
        fn name(&self) -> &str {
            "Recorder"
        }

        fn warmup_period(&self) -> usize {
            self.warmup
        }

        fn indicators(&mut self, df: &mut Dataframe) -> crate::Result<()> {
            self.calls.lock().unwrap().push(Call::Indicators(df.len()));
            df.insert_indicator("double", Series::new(df.close.iter().map(|c| c * 2.0).collect()))?;
            Ok(())
        }

        fn on_candle(&mut self, df: &Dataframe, _broker: &dyn Broker) -> crate::Result<()> {
            self.calls.lock().unwrap().push(Call::Candle {
                rows: df.len(),
                closes: df.close.to_vec(),
            });
            if self.fail_on_candle {
                return Err(Error::Strategy("boom".to_string()));
            }
            Ok(())
        }
    }

    impl HighFrequencyStrategy for Recorder {
        fn on_partial_candle(&mut self, df: &Dataframe, _broker: &dyn Broker) -> crate::Result<()> {
            self.calls.lock().unwrap().push(Call::Partial {
                rows: df.len(),
                close: df.close.last(0),
            });
            Ok(())
        }
    }

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn complete(minutes: i64, close: f64) -> Candle {
        Candle::flat(PAIR, t(minutes), close, 1.0, true)
    }

    fn partial(minutes: i64, close: f64) -> Candle {
        Candle::flat(PAIR, t(minutes), close, 1.0, false)
    }

    fn controller(handle: StrategyHandle) -> (Controller, RecordingDiagnostics) {
        let diagnostics = RecordingDiagnostics::new();
        let controller = Controller::new(
            PAIR,
            handle,
            Arc::new(PaperBroker::new()),
            Arc::new(diagnostics.clone()),
        );
        (controller, diagnostics)
    }

    #[test]
    fn test_accumulates_until_warm() {
        let recorder = Recorder::new(3);
        let (mut controller, _) = controller(StrategyHandle::standard(recorder.clone()));
        controller.start();

        assert_eq!(controller.on_candle(&complete(0, 1.0)), CandleOutcome::Accumulating);
        assert_eq!(controller.on_candle(&complete(1, 2.0)), CandleOutcome::Accumulating);
        assert!(recorder.calls().is_empty());

        assert_eq!(controller.on_candle(&complete(2, 3.0)), CandleOutcome::Dispatched);
        assert_eq!(controller.dataframe().len(), 3);
    }

    #[test]
    fn test_sample_is_trailing_window() {
        let recorder = Recorder::new(3);
        let (mut controller, _) = controller(StrategyHandle::standard(recorder.clone()));
        controller.start();

        for i in 0..6 {
            controller.on_candle(&complete(i, i as f64));
        }

        let calls = recorder.candle_calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(
            calls.last(),
            Some(&Call::Candle {
                rows: 3,
                closes: vec![3.0, 4.0, 5.0]
            })
        );
        // Indicators ran on the sample, not on the stored dataframe
        assert!(controller.dataframe().metadata("double").is_err());
        assert_eq!(controller.dataframe().len(), 6);
    }

    #[test]
    fn test_not_started_computes_indicators_only() {
        let recorder = Recorder::new(2);
        let (mut controller, _) = controller(StrategyHandle::standard(recorder.clone()));

        controller.on_candle(&complete(0, 1.0));
        assert_eq!(controller.on_candle(&complete(1, 2.0)), CandleOutcome::Warm);

        assert_eq!(recorder.calls(), vec![Call::Indicators(2)]);

        controller.start();
        assert_eq!(controller.on_candle(&complete(2, 3.0)), CandleOutcome::Dispatched);
        assert_eq!(recorder.candle_calls().len(), 1);
    }

    #[test]
    fn test_late_and_duplicate_candles_rejected() {
        let recorder = Recorder::new(1);
        let (mut controller, diagnostics) = controller(StrategyHandle::standard(recorder));
        controller.on_candle(&complete(5, 10.0));
        let before = controller.dataframe().clone();

        assert_eq!(controller.on_candle(&complete(4, 99.0)), CandleOutcome::Rejected);
        assert_eq!(controller.on_candle(&complete(5, 99.0)), CandleOutcome::Rejected);

        assert_eq!(controller.dataframe(), &before);
        assert_eq!(
            diagnostics.events(),
            vec![
                DiagnosticEvent::LateCandle {
                    candle_time: t(4),
                    last_time: t(5)
                },
                DiagnosticEvent::LateCandle {
                    candle_time: t(5),
                    last_time: t(5)
                },
            ]
        );
    }

    #[test]
    fn test_foreign_pair_rejected() {
        let recorder = Recorder::new(1);
        let (mut controller, diagnostics) = controller(StrategyHandle::high_frequency(recorder.clone()));
        controller.start();
        controller.on_candle(&complete(0, 1.0));
        let before = controller.dataframe().clone();

        let mut other = complete(1, 2_000.0);
        other.pair = "ETHUSDT".to_string();
        assert_eq!(controller.on_candle(&other), CandleOutcome::Rejected);

        let mut other_partial = partial(0, 2_000.0);
        other_partial.pair = "ETHUSDT".to_string();
        assert_eq!(controller.on_partial_candle(&other_partial), PartialOutcome::Ignored);

        assert_eq!(controller.dataframe(), &before);
        assert_eq!(recorder.candle_calls().len(), 1);
        assert_eq!(recorder.partial_calls(), 0);
        assert_eq!(
            diagnostics.events(),
            vec![
                DiagnosticEvent::ForeignCandle {
                    pair: "ETHUSDT".to_string()
                },
                DiagnosticEvent::ForeignCandle {
                    pair: "ETHUSDT".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_partial_candle_overwrites_without_start() {
        let recorder = Recorder::new(2);
        let (mut controller, _) = controller(StrategyHandle::high_frequency(recorder.clone()));
        controller.on_candle(&complete(0, 1.0));
        controller.on_candle(&complete(1, 2.0));

        assert_eq!(controller.on_partial_candle(&partial(1, 2.5)), PartialOutcome::Dispatched);

        assert_eq!(controller.dataframe().len(), 2);
        assert_eq!(controller.dataframe().close.last(0), Some(2.5));
        // Indicators ran over the full dataframe
        assert_eq!(
            controller.dataframe().metadata("double").unwrap().last(0),
            Some(5.0)
        );
        assert_eq!(
            recorder.calls().last(),
            Some(&Call::Partial {
                rows: 2,
                close: Some(2.5)
            })
        );
    }

    #[test]
    fn test_partial_candle_ignored_cases() {
        let recorder = Recorder::new(2);
        let (mut controller, _) = controller(StrategyHandle::high_frequency(recorder.clone()));

        controller.on_candle(&complete(0, 1.0));
        // still warming up
        assert_eq!(controller.on_partial_candle(&partial(0, 1.5)), PartialOutcome::Ignored);

        controller.on_candle(&complete(1, 2.0));
        // new bucket: partial path never appends
        assert_eq!(controller.on_partial_candle(&partial(2, 3.0)), PartialOutcome::Ignored);
        // complete candles do not take the partial path
        assert_eq!(controller.on_partial_candle(&complete(1, 3.0)), PartialOutcome::Ignored);

        assert_eq!(recorder.partial_calls(), 0);
        assert_eq!(controller.dataframe().len(), 2);
        assert_eq!(controller.dataframe().close.last(0), Some(2.0));
    }

    #[test]
    fn test_partial_candle_needs_high_frequency_capability() {
        let recorder = Recorder::new(1);
        let (mut controller, _) = controller(StrategyHandle::standard(recorder.clone()));
        controller.start();
        controller.on_candle(&complete(0, 1.0));

        assert_eq!(controller.on_partial_candle(&partial(0, 9.0)), PartialOutcome::Ignored);
        assert_eq!(controller.dataframe().close.last(0), Some(1.0));
        assert_eq!(recorder.partial_calls(), 0);
    }

    #[test]
    fn test_strategy_error_reported_and_processing_continues() {
        let mut recorder = Recorder::new(1);
        recorder.fail_on_candle = true;
        let (mut controller, diagnostics) = controller(StrategyHandle::standard(recorder.clone()));
        controller.start();

        assert_eq!(controller.on_candle(&complete(0, 1.0)), CandleOutcome::Failed);
        assert_eq!(controller.on_candle(&complete(1, 2.0)), CandleOutcome::Failed);

        assert_eq!(controller.dataframe().len(), 2);
        assert_eq!(diagnostics.events().len(), 2);
        assert!(matches!(
            &diagnostics.events()[0],
            DiagnosticEvent::StrategyFailed { stage: Stage::Candle, message } if message.contains("boom")
        ));
    }

    #[test]
    fn test_zero_warmup_clamped() {
        let recorder = Recorder::new(0);
        let (mut controller, _) = controller(StrategyHandle::standard(recorder.clone()));
        controller.start();

        assert_eq!(controller.warmup_period(), 1);
        assert_eq!(controller.on_candle(&complete(0, 1.0)), CandleOutcome::Dispatched);
        assert_eq!(
            recorder.candle_calls(),
            vec![Call::Candle {
                rows: 1,
                closes: vec![1.0]
            }]
        );
    }
}
