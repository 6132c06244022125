use std::io::{self, BufReader};
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use number_pipeline::config::{DEFAULT_BUFFER_CAPACITY, DEFAULT_EXIT_KEYWORD, DEFAULT_FLUSH_INTERVAL};
use number_pipeline::{source, ConsoleSource, PipelineBuilder, PipelineConfig};
use tracing_subscriber::EnvFilter;

const DEFAULT_FLUSH_INTERVAL_MS: u64 = DEFAULT_FLUSH_INTERVAL.as_millis() as u64;

#[derive(Parser, Debug)]
#[command(name = "number-pipeline")]
#[command(about = "Filters console integers and flushes multiples of three in timed batches")]
struct Args {
    /// Number of items the buffering stage keeps between flushes
    #[arg(short, long, default_value_t = DEFAULT_BUFFER_CAPACITY)]
    capacity: usize,

    /// Milliseconds between buffer flushes
    #[arg(short = 'i', long, default_value_t = DEFAULT_FLUSH_INTERVAL_MS)]
    flush_interval_ms: u64,

    /// Keyword that ends the program (case-insensitive)
    #[arg(short, long, default_value = DEFAULT_EXIT_KEYWORD)]
    exit_keyword: String,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            buffer_capacity: self.capacity,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            exit_keyword: self.exit_keyword.clone(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so prompts on stdout stay readable
    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .init();

    let config = args.config();
    let pipeline = PipelineBuilder::new()
        .with_config(config.clone())
        .build()
        .context("invalid configuration")?;

    let console = ConsoleSource::new(BufReader::new(io::stdin()), io::stdout(), config.exit_keyword);
    let (values, source_handle) =
        source::spawn(console, pipeline.cancel_signal(), pipeline.ready_handshake())?;

    let mut running = pipeline.start(values)?;
    if let Some(consumer) = running.consumer() {
        consumer.run(|value| println!("Processed: {value}"));
    }

    tracing::info!("{}", running.metrics_summary());
    running.wait()?;

    source_handle
        .join()
        .map_err(|_| anyhow!("source thread panicked"))??;

    Ok(())
}
