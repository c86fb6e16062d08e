//! CLI-level errors (wraps application errors)

use thiserror::Error;

use crate::errors::{AppError, SchemaError};
use crate::exitcode;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    App(#[from] AppError),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Usage(String),
}

impl From<SchemaError> for CliError {
    fn from(e: SchemaError) -> Self {
        CliError::App(AppError::Schema(e))
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgs(_) | CliError::Usage(_) => exitcode::USAGE,
            CliError::App(e) => match e {
                AppError::Config { .. } => exitcode::CONFIG,
                AppError::Io { .. } => exitcode::NOINPUT,
                AppError::InvalidModel { .. } => exitcode::DATAERR,
                AppError::Schema(SchemaError::PathNotFound(_)) => exitcode::USAGE,
                AppError::Schema(_) => exitcode::SOFTWARE,
            },
        }
    }
}
