//! Error types for the command line tool.

use thiserror::Error;
use wimod_hci::HciError;

/// Errors that can occur in the host tool.
#[derive(Error, Debug)]
pub enum CliError {
    /// Failed to read a file or open the connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// HCI operation failed.
    #[error(transparent)]
    Hci(#[from] HciError),

    /// Command line value could not be parsed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias for the host tool.
pub type CliResult<T> = Result<T, CliError>;
