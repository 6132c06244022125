//! An interactive, concurrent number-processing pipeline.
//!
//! A console source emits integers one at a time. Two filter stages drop
//! negatives and anything that is not a non-zero multiple of three. A
//! buffering stage collects survivors in a fixed-size ring buffer and flushes
//! them downstream on a timer. A consumer drains the output and hands the
//! source a ready token so it can prompt for the next value.
//!
//! # Features
//!
//! - One thread per stage, joined by rendezvous channels from crossbeam
//! - Ring buffer that evicts the oldest item when full, guarded by a parking_lot mutex
//! - Fill and flush loops racing input, timer and cancellation with `select!`
//! - A single broadcast cancel signal every blocking wait observes
//! - Per-stage counters: received, forwarded, rejected, evicted, flushes
//!
//! # Example
//!
//! ```ignore
//! use number_pipeline::{source, ConsoleSource, PipelineBuilder};
//! use std::io::{self, BufReader};
//!
//! let pipeline = PipelineBuilder::new().build()?;
//! let console = ConsoleSource::new(BufReader::new(io::stdin()), io::stdout(), "exit");
//! let (values, _source) =
//!     source::spawn(console, pipeline.cancel_signal(), pipeline.ready_handshake())?;
//!
//! let mut running = pipeline.start(values)?;
//! if let Some(consumer) = running.consumer() {
//!     consumer.run(|value| println!("{value}"));
//! }
//! running.wait()?;
//! ```

pub mod buffer;
pub mod buffer_stage;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod signal;
pub mod source;
pub mod stage;

/// A single value flowing through the pipeline
pub type Item = i64;

// Re-exports for convenience
pub use buffer::RingBuffer;
pub use buffer_stage::BufferStage;
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use metrics::{MetricsSnapshot, StageMetrics};
pub use pipeline::{Consumer, Pipeline, PipelineBuilder, RunningPipeline};
pub use signal::{CancelSignal, ReadyHandshake};
pub use source::{Command, ConsoleSource};
pub use stage::{FilterStage, Stage, StageRunner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
