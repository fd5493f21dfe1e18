//! compliance-ui CLI
//!
//! Replays pending-operation scenarios on the virtual-time event loop and
//! validates issue-tracker configuration files.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use compliance_ui::deferred::{Deferred, Settlement};
use compliance_ui::event_loop::EventLoop;
use compliance_ui::issue_tracker::IssueTrackerConfig;
use compliance_ui::notifier::{NotifierConfig, PendingOperationQueue};
use compliance_ui::request::RequestFailure;
use compliance_ui::{Error, VERSION};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "compliance-ui")]
#[command(author, version, about = "Pending-operation queue and modal view models", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue one request per delay and print every queue transition
    Simulate {
        /// Virtual latency of each request in milliseconds
        #[arg(short, long, value_delimiter = ',', default_value = "30,10,20")]
        delays: Vec<u64>,

        /// Zero-based indexes of requests that fail instead of succeeding
        #[arg(short, long, value_delimiter = ',')]
        fail: Vec<usize>,

        /// Enqueue every request twice to show deduplication
        #[arg(long)]
        duplicate: bool,

        /// Exit with an error if any request failed
        #[arg(long)]
        strict: bool,
    },

    /// Load an issue-tracker configuration file and print it
    CheckConfig {
        /// JSON configuration file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let outcome = match cli.command {
        Commands::Simulate {
            delays,
            fail,
            duplicate,
            strict,
        } => simulate(&delays, &fail, duplicate, strict),
        Commands::CheckConfig { file } => check_config(&file),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn setup_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn simulate(delays: &[u64], fail: &[usize], duplicate: bool, strict: bool) -> anyhow::Result<()> {
    if delays.is_empty() {
        bail!("at least one delay is required");
    }
    if let Some(bad) = fail.iter().find(|&&i| i >= delays.len()) {
        bail!("--fail index {} is out of range for {} requests", bad, delays.len());
    }

    println!("compliance-ui {} - simulating {} requests", VERSION, delays.len());

    let event_loop = EventLoop::new();
    let (on, off) = (event_loop.clone(), event_loop.clone());
    let queue = PendingOperationQueue::new(
        NotifierConfig::new()
            .on_non_empty(move || println!("[{:>5}ms] queue has pending work", on.current_time()))
            .on_empty(move || println!("[{:>5}ms] queue is empty", off.current_time())),
    );

    let mut requests = Vec::with_capacity(delays.len());
    for (index, &delay) in delays.iter().enumerate() {
        let request: Deferred<usize, RequestFailure> = event_loop.deferred();
        let clock = event_loop.clone();
        request.always(move || {
            println!("[{:>5}ms] request #{} settled", clock.current_time(), index)
        });
        if fail.contains(&index) {
            event_loop.reject_after(&request, delay, RequestFailure::new(500, "simulated failure"));
        } else {
            event_loop.resolve_after(&request, delay, index);
        }

        queue
            .enqueue(&request)
            .with_context(|| format!("enqueueing request #{}", index))?;
        if duplicate {
            queue.enqueue(&request)?;
        }
        println!(
            "[{:>5}ms] request #{} enqueued ({} pending)",
            event_loop.current_time(),
            index,
            queue.len()
        );
        requests.push(request);
    }

    let clock = event_loop.clone();
    queue.notify_when_empty(Rc::new(move || {
        println!("[{:>5}ms] all requests settled, close button enabled", clock.current_time())
    }));

    let result = event_loop.run_until_idle();
    let stats = queue.stats();
    println!(
        "\n{} tasks in {}ms virtual time; {} enqueued, {} deduplicated, {} settled",
        result.tasks_processed, result.final_time, stats.enqueued, stats.deduplicated, stats.settled
    );

    if strict {
        for (index, request) in requests.iter().enumerate() {
            if let Some(Settlement::Rejected(failure)) = request.settlement() {
                return Err(Error::from(failure)).with_context(|| format!("request #{} failed", index));
            }
        }
    }
    Ok(())
}

fn check_config(file: &Path) -> anyhow::Result<()> {
    let config = IssueTrackerConfig::load(file)
        .with_context(|| format!("loading '{}'", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
