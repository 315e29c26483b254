//! Synthetic traffic generator
//!
//! Appends randomized common-log-format lines to a file at a jittered
//! interval, for demos and manual testing of the pipeline.

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use rand::Rng;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const USERS: &[&str] = &[
    "Alice", "Bob", "Carol", "Carlos", "Charly", "Dan", "Erin", "Faythe",
];

const METHODS: &[&str] = &["GET", "PUT", "POST", "DELETE"];

const PATHS: &[&str] = &[
    "/admin/one",
    "/admin/two",
    "/admin/three",
    "/users/one",
    "/users/two",
    "/users/three",
    "/customers/one",
    "/customers/two",
    "/customers/three",
    "/example/one",
    "/example/two",
    "/example/three",
    "/news/one",
    "/news/two",
    "/news/three",
    "/home/one",
    "/home/two",
    "/home/three",
];

const STATUSES: &[&str] = &["200", "202", "300", "301", "400", "404", "422", "500"];

/// Command-line arguments for the traffic generator
#[derive(Parser)]
#[command(
    name = "traffic",
    about = "Appends synthetic common-log-format traffic to a file"
)]
struct Cli {
    /// File to append log lines to
    #[arg(short, long, value_name = "FILE", default_value = "/tmp/access.log")]
    logfile: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("failed installing the signal handler")?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cli.logfile)
        .with_context(|| format!("failed opening {}", cli.logfile.display()))?;

    println!("appending traffic to {}, press Ctrl-C to stop", cli.logfile.display());

    let mut rng = rand::rng();
    while running.load(Ordering::SeqCst) {
        file.write_all(fake_line(&mut rng).as_bytes())
            .context("failed writing log line")?;
        file.flush().context("failed flushing log file")?;

        thread::sleep(Duration::from_millis(rng.random_range(10..100)));
    }

    Ok(())
}

fn pick<'a>(rng: &mut impl Rng, options: &[&'a str]) -> &'a str {
    options[rng.random_range(0..options.len())]
}

fn fake_line(rng: &mut impl Rng) -> String {
    let now = Local::now().format("%d/%b/%Y:%H:%M:%S %z");
    let ip = format!(
        "{}.{}.{}.{}",
        rng.random_range(0..256),
        rng.random_range(0..256),
        rng.random_range(0..256),
        rng.random_range(0..256)
    );

    let user = pick(rng, USERS);
    let method = pick(rng, METHODS);
    let path = pick(rng, PATHS);
    let status = pick(rng, STATUSES);
    let bytes = rng.random_range(0..10_000);

    format!("{ip} - {user} [{now}] \"{method} {path} HTTP/1.0\" {status} {bytes}\n")
}
