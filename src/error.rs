use thiserror::Error;

/// Result type for ring pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while configuring or running a pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Circular buffer capacity must be positive
    #[error("Buffer capacity must be a positive integer, got {0}")]
    InvalidCapacity(i64),

    /// Drain interval must be a positive number of seconds
    #[error("Drain interval must be a positive number of seconds, got {0}")]
    InvalidInterval(i64),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input token that is neither an integer nor the exit command
    #[error("only integers are accepted: {0:?}")]
    InvalidToken(String),

    /// The shutdown signal fired or the receiving side is gone
    #[error("Pipeline is shut down")]
    ShutDown,

    /// Stage execution error
    #[error("Stage execution failed: {0}")]
    StageError(String),

    /// Thread join error
    #[error("Thread join error: {0}")]
    ThreadError(String),

    /// Console I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
