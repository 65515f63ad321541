use barbot::broker::{Broker, PaperBroker};
use barbot::config::{RuleConfig, RuleTrigger, Settings};
use barbot::execution::{
    Controller, FeedEvent, InstrumentWorker, RecordingDiagnostics, Scheduler,
};
use barbot::feed::{MarketScenario, SyntheticFeed};
use barbot::metrics::TradeSummary;
use barbot::models::Side;
use barbot::strategy::{CrossoverConfig, CrossoverStrategy, StrategyHandle};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;

const PAIR: &str = "BTCUSDT";

#[tokio::test]
async fn test_e2e_synthetic_pipeline() {
    let _ = tracing_subscriber::fmt::try_init();

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let candles = SyntheticFeed::new(PAIR, 42)
        .with_partials(2)
        .generate(MarketScenario::Volatile, 300, start);
    assert_eq!(candles.len(), 900);

    let broker = Arc::new(PaperBroker::new().with_balance("USDT", 10_000.0));
    let diagnostics = RecordingDiagnostics::default();
    let strategy = CrossoverStrategy::new(PAIR, CrossoverConfig::default());
    let controller = Controller::new(
        PAIR,
        StrategyHandle::high_frequency(strategy),
        broker.clone(),
        Arc::new(diagnostics.clone()),
    );

    let mut scheduler = Scheduler::new(PAIR);
    RuleConfig {
        side: Side::Buy,
        size: 0.1,
        trigger: RuleTrigger::CloseAbove(0.0),
    }
    .register(&mut scheduler);

    let (tx, rx) = mpsc::channel(16);
    let handle = InstrumentWorker::new(controller, scheduler, broker.clone())
        .subscribe(broker.clone())
        .spawn(rx);

    let (preload, live) = candles.split_at(150);
    for candle in preload {
        tx.send(FeedEvent::Candle(candle.clone())).await.unwrap();
    }
    tx.send(FeedEvent::Start).await.unwrap();
    for candle in live {
        tx.send(FeedEvent::Candle(candle.clone())).await.unwrap();
    }
    // replayed bar from the past is rejected
    tx.send(FeedEvent::Candle(candles[0].clone())).await.unwrap();
    drop(tx);

    let report = handle.await.unwrap();

    assert_eq!(report.pair, PAIR);
    assert_eq!(report.candles, 301);
    assert_eq!(report.partials, 600);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.orders, 1);
    assert_eq!(report.strategy_failures, 0);
    assert!(report.dispatched > 0);
    // every bucket after warm-up revises the stored row intrabar
    assert_eq!(report.partials_dispatched, 2 * (300 - 21));
    assert_eq!(diagnostics.events().len(), 1);

    let summary = TradeSummary::from_pnls(&broker.realized_pnls());
    assert_eq!(summary.winning_trades + summary.losing_trades, summary.total_trades);

    let account = broker.account().unwrap();
    assert!(account.balance("USDT").total() >= 0.0);
    assert!(account.balance("BTC").total() >= 0.0);
}

#[test]
fn test_default_settings_drive_a_run() {
    let settings = Settings::from_toml("").unwrap();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let candles = SyntheticFeed::new(&settings.pair, settings.feed.seed)
        .with_interval(settings.feed.interval_minutes)
        .with_partials(settings.feed.partials_per_candle)
        .generate(settings.feed.scenario, 50, start);

    assert_eq!(candles.len(), 50 * (settings.feed.partials_per_candle + 1));
    assert!(candles.iter().all(|c| c.pair == settings.pair));
}
