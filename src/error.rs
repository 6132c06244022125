use thiserror::Error;

/// Result type for number pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or running the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A stage thread could not be spawned or panicked
    #[error("Thread error: {0}")]
    ThreadError(String),

    /// Console I/O failed inside the source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
