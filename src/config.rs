use crate::error::{PipelineError, Result};
use std::time::Duration;

/// Default number of items the buffering stage keeps between flushes
pub const DEFAULT_BUFFER_CAPACITY: usize = 10;

/// Default period between buffer flushes
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Default console keyword that stops the pipeline
pub const DEFAULT_EXIT_KEYWORD: &str = "exit";

/// Startup configuration for a pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Ring buffer capacity of the buffering stage
    pub buffer_capacity: usize,
    /// Time between buffer flushes
    pub flush_interval: Duration,
    /// Case-insensitive keyword that ends the console source
    pub exit_keyword: String,
}

impl PipelineConfig {
    /// Check that every value is usable
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(PipelineError::ConfigError(
                "buffer capacity must be at least 1".into(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(PipelineError::ConfigError(
                "flush interval must be non-zero".into(),
            ));
        }
        if self.exit_keyword.trim().is_empty() {
            return Err(PipelineError::ConfigError(
                "exit keyword must not be blank".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            exit_keyword: DEFAULT_EXIT_KEYWORD.to_string(),
        }
    }
}
