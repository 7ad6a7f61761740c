use anyhow::{bail, Context, Result};
use barbot::api::AlpacaClient;
use barbot::clock::ClockTime;
use barbot::config::Settings;
use barbot::data::{BarSource, InMemoryTickStore, SyntheticTickGenerator};
use barbot::db::PostgresTickStore;
use barbot::execution::IndicatorFeed;
use barbot::indicators::IndicatorError;
use barbot::models::{ListOrders, Order, OrderQueryStatus};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

const DEMO_BASE_PRICE: f64 = 150.0;
const DEMO_TICKS_PER_MINUTE: usize = 12;

#[derive(Parser)]
#[command(author, version, about = "Minute-bar moving averages and Alpaca order tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Keep a bar window fresh and log moving averages on every tick
    Watch(WatchArgs),

    /// Inspect and cancel orders on the Alpaca account
    Orders {
        #[command(subcommand)]
        command: OrdersCommand,
    },
}

#[derive(Args)]
struct WatchArgs {
    /// Ticker symbol (defaults to BARBOT_TICKER)
    #[arg(long)]
    ticker: Option<String>,

    /// Number of minute bars kept in the window
    #[arg(long)]
    capacity: Option<usize>,

    /// SMA period to report (repeatable)
    #[arg(long = "sma", default_values_t = vec![5])]
    sma_periods: Vec<usize>,

    /// EMA period to report (repeatable)
    #[arg(long = "ema", default_values_t = vec![5])]
    ema_periods: Vec<usize>,

    /// Seconds between updates
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Use generated ticks in memory instead of Postgres
    #[arg(long)]
    demo: bool,

    /// Seed for the demo tick generator
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Subcommand)]
enum OrdersCommand {
    /// List orders
    List {
        #[arg(long, value_enum, default_value_t = StatusFilter::Open)]
        status: StatusFilter,

        #[arg(long, default_value_t = 50)]
        limit: u32,
    },

    /// Show one order
    Get {
        id: String,

        /// Include bracket legs
        #[arg(long)]
        nested: bool,
    },

    /// Cancel one order
    Cancel { id: String },

    /// Cancel every open order
    CancelAll,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusFilter {
    Open,
    Closed,
    All,
}

impl From<StatusFilter> for OrderQueryStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Open => OrderQueryStatus::Open,
            StatusFilter::Closed => OrderQueryStatus::Closed,
            StatusFilter::All => OrderQueryStatus::All,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;
    setup_logging();

    match cli.command {
        Command::Watch(args) => watch(args, &settings).await,
        Command::Orders { command } => orders(command, &settings).await,
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("barbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ============================================================================
// Watch
// ============================================================================

async fn watch(args: WatchArgs, settings: &Settings) -> Result<()> {
    let ticker = args.ticker.unwrap_or_else(|| settings.ticker.clone());
    let capacity = args.capacity.unwrap_or(settings.window_capacity);
    let interval_secs = args.interval_secs.unwrap_or(settings.poll_interval_secs);

    if capacity == 0 {
        bail!("--capacity must be at least 1");
    }
    if interval_secs == 0 {
        bail!("--interval-secs must be at least 1");
    }

    tracing::info!("🚀 barbot watching {}", ticker);
    tracing::info!("  Window: {} bars", capacity);
    tracing::info!("  SMA periods: {:?}", args.sma_periods);
    tracing::info!("  EMA periods: {:?}", args.ema_periods);
    tracing::info!("  Interval: {}s", interval_secs);

    if args.demo {
        let store = InMemoryTickStore::new();
        let producer = start_demo_feed(&store, &ticker, capacity, args.seed)?;
        let feed = IndicatorFeed::new(ticker, capacity, store);

        let result = watch_loop(feed, &args.sma_periods, &args.ema_periods, interval_secs).await;
        producer.abort();
        result
    } else {
        let store = PostgresTickStore::new(&settings.database_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to Postgres: {}", e))?;
        let feed = IndicatorFeed::new(ticker, capacity, store);

        watch_loop(feed, &args.sma_periods, &args.ema_periods, interval_secs).await
    }
}

async fn watch_loop<S: BarSource>(
    mut feed: IndicatorFeed<S>,
    sma_periods: &[usize],
    ema_periods: &[usize],
    interval_secs: u64,
) -> Result<()> {
    let mut ticks = interval(Duration::from_secs(interval_secs));
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticks.tick() => report_indicators(&mut feed, sma_periods, ema_periods).await,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("🛑 Shutting down");
                return Ok(());
            }
        }
    }
}

async fn report_indicators<S: BarSource>(
    feed: &mut IndicatorFeed<S>,
    sma_periods: &[usize],
    ema_periods: &[usize],
) {
    for &period in sma_periods {
        let reading = feed.sma(period).await;
        report(feed.ticker(), "SMA", period, reading);
    }
    for &period in ema_periods {
        let reading = feed.ema(period).await;
        report(feed.ticker(), "EMA", period, reading);
    }

    if let Some(bar) = feed.window().newest() {
        tracing::info!(
            "📊 {} {} close={:.4} ({}/{} bars)",
            bar.ticker,
            bar.time(),
            bar.close,
            feed.window().len(),
            feed.window().capacity()
        );
    }
}

fn report(ticker: &str, name: &str, period: usize, reading: std::result::Result<f64, IndicatorError>) {
    match reading {
        Ok(value) => tracing::info!("📈 {} {}({}) = {:.4}", ticker, name, period, value),
        Err(e @ IndicatorError::InsufficientData { .. }) => {
            tracing::info!("⏳ {} {}({}): {}", ticker, name, period, e)
        }
        Err(e) => tracing::warn!("⚠️  {} {}({}) unavailable: {}", ticker, name, period, e),
    }
}

/// Seed the store with a full window of history and keep adding live ticks
fn start_demo_feed(
    store: &InMemoryTickStore,
    ticker: &str,
    capacity: usize,
    seed: u64,
) -> Result<JoinHandle<()>> {
    let mut generator = SyntheticTickGenerator::new(seed, DEMO_BASE_PRICE);
    let history = generator.generate_history(ticker, ClockTime::now(), capacity, DEMO_TICKS_PER_MINUTE);
    tracing::info!("🎲 Seeded {} demo ticks for {}", history.len(), ticker);
    for tick in history {
        store.record(tick).map_err(anyhow::Error::msg)?;
    }

    let store = store.clone();
    let ticker = ticker.to_string();

    Ok(tokio::spawn(async move {
        let mut ticks = interval(Duration::from_secs(1));
        loop {
            ticks.tick().await;
            if let Some(tick) = generator.next_tick(&ticker, ClockTime::now()) {
                if let Err(e) = store.record(tick) {
                    tracing::warn!("Failed to record demo tick: {}", e);
                }
            }
        }
    }))
}

// ============================================================================
// Orders
// ============================================================================

async fn orders(command: OrdersCommand, settings: &Settings) -> Result<()> {
    let alpaca = settings.alpaca().context("Alpaca credentials are required for order commands")?;
    let client = AlpacaClient::new(&alpaca).context("Failed to build Alpaca client")?;

    match command {
        OrdersCommand::List { status, limit } => {
            let query = ListOrders {
                status: status.into(),
                limit,
                ..Default::default()
            };
            let orders = client.list_orders(&query).await.context("Failed to list orders")?;

            tracing::info!("📋 {} orders", orders.len());
            for order in &orders {
                print_order(order);
            }
        }
        OrdersCommand::Get { id, nested } => {
            let order = client
                .get_order(&id, nested)
                .await
                .with_context(|| format!("Failed to fetch order {}", id))?;
            print_order(&order);
            for leg in order.legs.iter().flatten() {
                print_order(leg);
            }
        }
        OrdersCommand::Cancel { id } => {
            let order = client
                .cancel_order(&id)
                .await
                .with_context(|| format!("Failed to cancel order {}", id))?;
            tracing::info!("🗑️  Cancel requested");
            print_order(&order);
        }
        OrdersCommand::CancelAll => {
            let results = client.cancel_orders().await.context("Failed to cancel orders")?;
            tracing::info!("🗑️  Cancel requested for {} orders", results.len());
            for result in &results {
                tracing::info!("  {} -> HTTP {}", result.id, result.status);
            }
        }
    }

    Ok(())
}

fn print_order(order: &Order) {
    let qty = order
        .qty
        .map(|q| q.to_string())
        .unwrap_or_else(|| "-".to_string());

    tracing::info!(
        "  {} {} {:?} {:?} qty={} filled={} status={:?}",
        order.id,
        order.symbol,
        order.side,
        order.order_type,
        qty,
        order.filled_qty,
        order.status
    );
}
