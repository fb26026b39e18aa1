//! boxguard worker
//!
//! Writes a run of keys into a shared box and prints a JSON report on
//! stdout. Several workers pointed at the same `--root` and `--name`
//! exercise multi-owner access across processes.

use boxguard_testkit::{run_worker, WorkerPlan};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Writes keys into a boxguard box under a multi-owner policy.
#[derive(Parser)]
#[command(name = "boxguard-worker")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the boxes
    #[arg(short, long)]
    root: PathBuf,

    /// Box name
    #[arg(short, long, default_value = "shared")]
    name: String,

    /// Prefix of every key written
    #[arg(short, long)]
    prefix: String,

    /// Number of keys to write
    #[arg(short, long, default_value = "100")]
    count: usize,

    /// Keep the box open for the whole run instead of sharing it
    #[arg(long)]
    single_owner: bool,

    /// Give up after this many open attempts
    #[arg(long)]
    max_tries: Option<u32>,

    /// Milliseconds between open attempts
    #[arg(long, default_value = "5")]
    delay_ms: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // stdout carries the report
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let plan = WorkerPlan {
        root: args.root,
        name: args.name,
        prefix: args.prefix,
        count: args.count,
        multi_owner: !args.single_owner,
        max_tries: args.max_tries,
        retry_delay: Duration::from_millis(args.delay_ms),
    };

    let report = run_worker(&plan).await?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
