use anyhow::Context;
use clap::Parser;
use log::{error, info};
use loghound::alerts::AlertMonitor;
use loghound::bus::Bus;
use loghound::dashboard::Console;
use loghound::messages::Topic;
use loghound::shutdown::{ShutdownToken, WaitGroup};
use loghound::stats::StatsAggregator;
use loghound::tailer::FileTailer;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

/// History window of the dashboard series, in seconds.
const DASHBOARD_WINDOW_SECS: i64 = 600;

/// Command-line arguments for loghound
#[derive(Parser)]
#[command(
    name = "loghound",
    about = "Tails an HTTP access log and raises threshold alerts on a live terminal view",
    long_about = "Loghound watches a common-log-format access log for appended writes, \
                  derives rolling request and byte counters from every entry, and raises \
                  hysteresis-based threshold alerts, all surfaced on a terminal dashboard."
)]
struct Cli {
    /// Common log format file to monitor
    #[arg(short, long, value_name = "FILE", default_value = "/tmp/access.log")]
    logfile: PathBuf,

    /// Metric watched by the alert monitor
    #[arg(short, long, default_value = "requests.total")]
    metric: String,

    /// Alert threshold, in metric units per second
    #[arg(short, long, default_value_t = 10.0)]
    threshold: f64,

    /// Window considered for the alert threshold, in seconds
    #[arg(short, long, value_name = "SECONDS", default_value_t = 120)]
    alert_window: u64,

    /// Interval between counter snapshots, in seconds
    #[arg(short, long, value_name = "SECONDS", default_value_t = 2)]
    stats_interval: u64,

    /// Run without the terminal dashboard
    #[arg(long)]
    headless: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("loghound: {err:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    init_logging(&cli)?;
    info!("main: starting loghound");

    let token = ShutdownToken::new();
    let wg = WaitGroup::new();

    // Workers connect before the dispatch loop starts; the bus instance is
    // moved into its own thread afterwards.
    let bus = Bus::new();
    let tailer_link = bus.connect(&[]);
    let stats_link = bus.connect(&[Topic::Data]);
    let alerts_link = bus.connect(&[Topic::Stat]);
    let console_link = bus.connect(&[Topic::Stat, Topic::Alert]);

    // Startup failures here are fatal: no point entering steady state
    // without the tailed file.
    let tailer = FileTailer::open(&cli.logfile, tailer_link)
        .with_context(|| format!("failed monitoring {}", cli.logfile.display()))?;

    let aggregator = StatsAggregator::new(stats_link, Duration::from_secs(cli.stats_interval));
    let monitor = AlertMonitor::new(
        alerts_link,
        &cli.metric,
        cli.threshold,
        Duration::from_secs(cli.alert_window),
    );

    wg.add(4);
    spawn_worker(move |token, wg| bus.run(token, wg), &token, &wg);
    spawn_worker(move |token, wg| tailer.run(token, wg), &token, &wg);
    spawn_worker(move |token, wg| aggregator.run(token, wg), &token, &wg);
    spawn_worker(move |token, wg| monitor.run(token, wg), &token, &wg);

    let signal_token = token.clone();
    ctrlc::set_handler(move || {
        info!("main: interrupt received, shutting down");
        signal_token.cancel();
    })
    .context("failed installing the signal handler")?;

    if cli.headless {
        info!("main: running headless, press Ctrl-C to stop");
        while !token.is_cancelled() {
            thread::sleep(Duration::from_millis(200));
        }
    } else {
        let console = Console::new(console_link, DASHBOARD_WINDOW_SECS);
        if let Err(err) = console.run(token.clone()) {
            error!("main: dashboard failed: {err}");
        }
    }

    info!("main: stopping workers");
    token.cancel();
    wg.wait();
    info!("main: all workers stopped, exiting");

    Ok(())
}

fn spawn_worker<F>(worker: F, token: &ShutdownToken, wg: &WaitGroup)
where
    F: FnOnce(ShutdownToken, WaitGroup) + Send + 'static,
{
    let (token, wg) = (token.clone(), wg.clone());
    thread::spawn(move || worker(token, wg));
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::from_default_env();

    if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    } else if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(log::LevelFilter::Info);
    }

    if !cli.headless {
        // The dashboard owns the terminal, so logs go to a file.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open("loghound.log")
            .context("failed opening loghound.log")?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
        eprintln!("writing logs to ./loghound.log");
    }

    builder.init();
    Ok(())
}
