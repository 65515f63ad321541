use anyhow::{Context, Result};
use barbot::broker::{Broker, PaperBroker};
use barbot::config::Settings;
use barbot::execution::{
    Controller, FeedEvent, InstrumentWorker, Scheduler, TracingDiagnostics, WorkerReport,
};
use barbot::feed::{load_candles, MarketScenario, SyntheticFeed};
use barbot::metrics::TradeSummary;
use barbot::models::{split_pair, Candle};
use barbot::strategy::{CrossoverStrategy, StrategyHandle};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "barbot", about = "Candle-driven strategy runner with a paper broker")]
struct Cli {
    /// TOML settings file; BARBOT_* environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run against a seeded synthetic feed
    Synthetic {
        #[arg(long)]
        candles: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, value_enum)]
        scenario: Option<MarketScenario>,
    },
    /// Replay candles from a JSON-lines file
    Replay { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    setup_logging(&settings.log_filter);

    let candles = match cli.command {
        Commands::Synthetic {
            candles,
            seed,
            scenario,
        } => {
            let feed = &mut settings.feed;
            feed.candles = candles.unwrap_or(feed.candles);
            feed.seed = seed.unwrap_or(feed.seed);
            feed.scenario = scenario.unwrap_or(feed.scenario);
            synthetic_candles(&settings)
        }
        Commands::Replay { path } => {
            let candles = load_candles(&path)
                .with_context(|| format!("failed to read candles from {}", path.display()))?;
            if let Some(first) = candles.first() {
                settings.pair = first.pair.clone();
            }
            candles
        }
    };

    tracing::info!(pair = %settings.pair, candles = candles.len(), "🚀 barbot starting");

    let broker = paper_broker(&settings)?;
    let report = run(&settings, broker.clone(), candles).await?;
    print_summary(&settings, &broker, &report, cli.json)?;

    Ok(())
}

fn setup_logging(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn synthetic_candles(settings: &Settings) -> Vec<Candle> {
    let feed = &settings.feed;
    let start = Utc::now() - Duration::minutes(feed.candles as i64 * feed.interval_minutes);

    SyntheticFeed::new(&settings.pair, feed.seed)
        .with_interval(feed.interval_minutes)
        .with_partials(feed.partials_per_candle)
        .generate(feed.scenario, feed.candles, start)
}

fn paper_broker(settings: &Settings) -> Result<Arc<PaperBroker>> {
    let (_, quote) = split_pair(&settings.pair)
        .with_context(|| format!("cannot determine quote asset of {}", settings.pair))?;

    Ok(Arc::new(
        PaperBroker::new().with_balance(quote, settings.paper.initial_balance),
    ))
}

/// Feed every candle through a spawned worker, arming the strategy once
/// `preload` complete candles have been stored
async fn run(
    settings: &Settings,
    broker: Arc<PaperBroker>,
    candles: Vec<Candle>,
) -> Result<WorkerReport> {
    let strategy = CrossoverStrategy::new(&settings.pair, settings.strategy.clone());
    let controller = Controller::new(
        &settings.pair,
        StrategyHandle::high_frequency(strategy),
        broker.clone(),
        Arc::new(TracingDiagnostics),
    );

    let mut scheduler = Scheduler::new(&settings.pair);
    for rule in &settings.rules {
        rule.register(&mut scheduler);
    }

    let (tx, rx) = mpsc::channel(settings.feed.channel_buffer());
    let handle = InstrumentWorker::new(controller, scheduler, broker.clone())
        .subscribe(broker)
        .spawn(rx);

    let mut completed = 0;
    let mut started = false;
    for candle in candles {
        if !started && completed >= settings.feed.preload {
            tx.send(FeedEvent::Start)
                .await
                .context("instrument worker stopped")?;
            started = true;
        }

        let complete = candle.complete;
        tx.send(FeedEvent::Candle(candle))
            .await
            .context("instrument worker stopped")?;
        if complete {
            completed += 1;
        }
    }

    if !started {
        tracing::warn!(completed, preload = settings.feed.preload, "feed ended during preload");
    }

    drop(tx);
    handle.await.context("instrument worker panicked")
}

fn print_summary(
    settings: &Settings,
    broker: &PaperBroker,
    report: &WorkerReport,
    json: bool,
) -> Result<()> {
    let summary = TradeSummary::from_pnls(&broker.realized_pnls());
    let account = broker.account()?;

    if json {
        let output = serde_json::json!({
            "report": report,
            "summary": summary,
            "balances": account.balances,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("\n=== {} ===", settings.pair);
    println!(
        "Candles: {} ({} partial, {} rejected)",
        report.candles, report.partials, report.rejected
    );
    println!(
        "Strategy calls: {} candle, {} intrabar ({} failed)",
        report.dispatched, report.partials_dispatched, report.strategy_failures
    );
    println!(
        "Scheduled orders: {} ({} failed attempts)",
        report.orders, report.failed_orders
    );
    println!(
        "Trades: {} | Win rate: {:.1}% | Total P&L: {:.2}",
        summary.total_trades, summary.win_rate, summary.total_pnl
    );
    println!(
        "Payoff: {:.2} | Profit factor: {:.2}",
        summary.payoff, summary.profit_factor
    );
    for balance in &account.balances {
        println!("{:<8} {:>14.6}", balance.asset, balance.total());
    }

    Ok(())
}
