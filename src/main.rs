use anyhow::Context;
use backtester::{
    replay_events, simulator_from_settings, store_from_settings, Broker, ChannelSource,
    LiveBroker, MarketEvent, NavRecorder, ProgressObserver, RunSummary, ScheduledOrders,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use configuration::{init_tracing, load_config, Settings};
use core_types::Currency;
use executor::BrokerSimulator;
use price_graph::{PriceGraph, SeriesStore};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// The main entry point for the Ledgerline replay tool.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine: overrides may come from the real environment.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let _guard = init_tracing(&settings.logging)?;

    match cli.command {
        Commands::Run(args) => handle_run(&settings, args),
        Commands::Live(args) => handle_live(&settings, args).await,
        Commands::Price(args) => handle_price(&settings, args),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Multi-currency portfolio accounting and order execution simulator.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the run configuration (TOML).
    #[arg(long, short, global = true, default_value = "config/ledgerline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the configured orders over the configured quote history.
    Run(RunArgs),
    /// Stream the configured quotes through the live broker instead of stepping through them.
    Live(RunArgs),
    /// Show the conversion path and bid/ask between two currencies.
    Price(PriceArgs),
}

#[derive(Parser)]
struct RunArgs {
    /// Print the final ledger snapshot as JSON instead of tables.
    #[arg(long)]
    json: bool,

    /// Do not draw a progress bar.
    #[arg(long)]
    quiet: bool,
}

#[derive(Parser)]
struct PriceArgs {
    /// The currency being sold (e.g., "EUR").
    #[arg(long)]
    from: Currency,

    /// The currency being received (e.g., "JPY").
    #[arg(long)]
    to: Currency,

    /// Time of the lookup (RFC 3339). Defaults to the latest quote.
    #[arg(long)]
    at: Option<DateTime<Utc>>,
}

// ==============================================================================
// Command Logic
// ==============================================================================

fn handle_run(settings: &Settings, args: RunArgs) -> anyhow::Result<()> {
    let mut broker = Broker::from_settings(settings)?;
    let mut strategy = ScheduledOrders::from_settings(&settings.orders)?;

    let now = broker.simulator().now();
    let steps = broker.simulator().graph().times().filter(|time| **time >= now).count();
    let mut observer = progress(steps as u64, args.quiet)?;

    let summary = broker.run(
        &mut strategy,
        &mut observer,
        settings.broker.start_time,
        settings.broker.max_iterations,
    )?;
    let recorder = observer.finish("Replay complete");
    print_report(broker.simulator(), &summary, &recorder, args.json)
}

async fn handle_live(settings: &Settings, args: RunArgs) -> anyhow::Result<()> {
    let store = store_from_settings(&settings.quotes)?;
    let start = settings
        .broker
        .start_time
        .or_else(|| store.get_min_time())
        .context("no quotes configured and no start time set")?;
    // The graph starts empty and is filled by the feed.
    let simulator = simulator_from_settings(settings, PriceGraph::new(), Some(start))?;

    let events = replay_events(&store);
    let steps: BTreeSet<_> = events.iter().map(MarketEvent::time).collect();
    let mut observer = progress(steps.len() as u64, args.quiet)?;

    let (sender, source) = ChannelSource::new(1024);
    let feed = tokio::spawn(async move {
        for event in events {
            if sender.send(event).await.is_err() {
                break;
            }
        }
    });

    let mut live = LiveBroker::new(simulator, source);
    let mut strategy = ScheduledOrders::from_settings(&settings.orders)?;
    let summary = live.run(&mut strategy, &mut observer).await?;
    feed.await?;

    let recorder = observer.finish("Feed complete");
    live.handle()
        .with_simulator(|simulator| print_report(simulator, &summary, &recorder, args.json))
        .await
}

fn handle_price(settings: &Settings, args: PriceArgs) -> anyhow::Result<()> {
    let store = store_from_settings(&settings.quotes)?;
    let graph = PriceGraph::from_store(&store)?;
    let at = args
        .at
        .or_else(|| graph.max_time())
        .context("no quotes configured")?;

    let path = graph.path(&args.from, &args.to, at)?;
    let price = graph.price(&args.from, &args.to, at)?;
    let hops = path.iter().map(Currency::to_string).collect::<Vec<_>>().join(" -> ");

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Path", "Bid", "Ask", "Spread", "Time"]);
    table.add_row(vec![
        hops,
        price.bid.to_string(),
        price.ask.to_string(),
        price.spread().to_string(),
        at.to_rfc3339(),
    ]);
    println!("{table}");
    Ok(())
}

// ==============================================================================
// Reporting
// ==============================================================================

fn progress(steps: u64, quiet: bool) -> anyhow::Result<ProgressObserver<NavRecorder>> {
    if quiet {
        return Ok(ProgressObserver::hidden(NavRecorder::new()));
    }
    Ok(ProgressObserver::new(steps, NavRecorder::new())?)
}

fn print_report(
    simulator: &BrokerSimulator,
    summary: &RunSummary,
    recorder: &NavRecorder,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&simulator.snapshot())?);
        return Ok(());
    }

    let numeraire = simulator.default_numeraire();
    let values = simulator.values_all_accounts(numeraire, simulator.now()).ok();
    let weights = simulator.weights(simulator.now()).ok();

    let mut ledger = Table::new();
    ledger.load_preset(UTF8_FULL).set_header(vec![
        "Account".to_string(),
        "Balance".to_string(),
        format!("Value ({})", numeraire),
        "Weight".to_string(),
    ]);
    for account in simulator.accounts() {
        let value = values
            .as_ref()
            .and_then(|values| values.get(account.currency()))
            .map(|value| value.round_dp(2).to_string())
            .unwrap_or_else(|| "n/a".to_string());
        let weight = weights
            .as_ref()
            .and_then(|weights| weights.get(account.currency()).copied().flatten())
            .map(|weight| format!("{}%", (weight * Decimal::ONE_HUNDRED).round_dp(2)))
            .unwrap_or_else(|| "n/a".to_string());
        ledger.add_row(vec![
            account.currency().to_string(),
            account.balance().to_string(),
            value,
            weight,
        ]);
    }
    println!("{ledger}");

    if !simulator.costs_by_filter().is_empty() {
        let mut costs = Table::new();
        costs
            .load_preset(UTF8_FULL)
            .set_header(vec!["Filter", "Paid from", "Total"]);
        for (filter, totals) in simulator.costs_by_filter() {
            for (currency, total) in totals {
                costs.add_row(vec![filter.clone(), currency.to_string(), total.to_string()]);
            }
        }
        println!("{costs}");
    }

    println!("Period:   {} -> {}", summary.start, summary.end);
    println!(
        "Steps:    {} ({} orders executed, {} rejected)",
        summary.steps, summary.executed, summary.rejected
    );
    match summary.final_nav {
        Some(nav) => println!("NAV:      {} {}", nav.round_dp(2), numeraire),
        None => println!("NAV:      n/a (some accounts cannot be priced)"),
    }
    if let Some(total_return) = recorder.last().and_then(|point| point.total_return) {
        println!("Return:   {}%", (total_return * Decimal::ONE_HUNDRED).round_dp(2));
    }
    for record in simulator.rejected_orders() {
        println!(
            "Rejected: {} {} ({})",
            record.id,
            record.order,
            record.reason.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}
