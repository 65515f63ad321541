use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::controller::{CandleOutcome, Controller, PartialOutcome};
use super::scheduler::Scheduler;
use crate::broker::{Broker, CandleSubscriber};
use crate::models::Candle;

/// Message consumed by an instrument worker
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Candle(Candle),
    /// Arm the strategy (typically sent after the history preload)
    Start,
}

/// Counters collected while a worker runs
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct WorkerReport {
    pub pair: String,
    pub candles: usize,
    pub partials: usize,
    pub rejected: usize,
    /// Complete candles that reached the strategy's `on_candle`
    pub dispatched: usize,
    /// Partial candles that reached the strategy's `on_partial_candle`
    pub partials_dispatched: usize,
    pub strategy_failures: usize,
    pub orders: usize,
    pub failed_orders: usize,
}

/// Single writer for one pair's controller and scheduler
///
/// Subscribers (e.g. a paper broker) see every candle of the pair before the
/// controller does, including candles the controller later drops.
pub struct InstrumentWorker {
    controller: Controller,
    scheduler: Scheduler,
    broker: Arc<dyn Broker>,
    subscribers: Vec<Arc<dyn CandleSubscriber>>,
    report: WorkerReport,
}

impl InstrumentWorker {
    pub fn new(controller: Controller, scheduler: Scheduler, broker: Arc<dyn Broker>) -> Self {
        let report = WorkerReport {
            pair: controller.pair().to_string(),
            ..Default::default()
        };

        Self {
            controller,
            scheduler,
            broker,
            subscribers: Vec::new(),
            report,
        }
    }

    pub fn subscribe(mut self, subscriber: Arc<dyn CandleSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn report(&self) -> &WorkerReport {
        &self.report
    }

    pub fn handle(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Start => self.controller.start(),
            FeedEvent::Candle(candle) => self.handle_candle(&candle),
        }
    }

    fn handle_candle(&mut self, candle: &Candle) {
        if candle.pair != self.controller.pair() {
            tracing::warn!(
                expected = %self.controller.pair(),
                got = %candle.pair,
                "candle for another pair ignored"
            );
            return;
        }

        for subscriber in &self.subscribers {
            subscriber.on_candle(candle);
        }

        if candle.complete {
            self.report.candles += 1;
            match self.controller.on_candle(candle) {
                CandleOutcome::Rejected => self.report.rejected += 1,
                CandleOutcome::Dispatched => self.report.dispatched += 1,
                CandleOutcome::Failed => self.report.strategy_failures += 1,
                CandleOutcome::Accumulating | CandleOutcome::Warm => {}
            }
        } else {
            self.report.partials += 1;
            match self.controller.on_partial_candle(candle) {
                PartialOutcome::Dispatched => self.report.partials_dispatched += 1,
                PartialOutcome::Failed => self.report.strategy_failures += 1,
                PartialOutcome::Ignored => {}
            }
        }

        let evaluation = self
            .scheduler
            .evaluate(self.controller.dataframe(), self.broker.as_ref());
        self.report.orders += evaluation.executed.len();
        self.report.failed_orders += evaluation.failed;
    }

    /// Run on its own task until every sender is dropped
    pub fn spawn(mut self, mut rx: mpsc::Receiver<FeedEvent>) -> JoinHandle<WorkerReport> {
        tokio::spawn(async move {
            tracing::info!(
                pair = %self.report.pair,
                strategy = self.controller.strategy_name(),
                warmup_period = self.controller.warmup_period(),
                "instrument worker started"
            );

            while let Some(event) = rx.recv().await {
                self.handle(event);
            }

            tracing::info!(
                pair = %self.report.pair,
                candles = self.report.candles,
                rejected = self.report.rejected,
                partials_dispatched = self.report.partials_dispatched,
                orders = self.report.orders,
                "feed closed, instrument worker stopping"
            );
            self.report
        })
    }
}
