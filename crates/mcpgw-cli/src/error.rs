//! CLI-level error type: wraps gateway/config/IO failures with an exit
//! code, the way `turbomcp-proxy::cli::error` formats `ProxyError` for the
//! terminal.

use thiserror::Error;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("gateway error: {0}")]
    Gateway(#[from] mcpgw_proxy::GatewayError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid bind address: {0}")]
    InvalidBindAddr(String),
}

impl CliError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Prints a one-line error to stderr and returns the process exit code
/// (spec.md §6 "CLI exit codes": 0 success, non-zero on unrecoverable
/// startup failure).
#[must_use]
pub fn display_error(error: &CliError) -> i32 {
    eprintln!("error: {error}");
    1
}
