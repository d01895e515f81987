//! CLI error types and exit codes

use thiserror::Error;
use tokenguard::{AuthError, ErrorKind};

/// Process exit codes
pub mod exit_code {
    /// Token accepted / command succeeded
    pub const OK: i32 = 0;
    /// Token rejected
    pub const REJECTED: i32 = 1;
    /// Bad configuration or arguments
    pub const CONFIG: i32 = 2;
    /// Authority unreachable or misbehaving
    pub const UNAVAILABLE: i32 = 3;
}

/// Errors that abort a CLI command
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration sources could not be loaded or merged
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// The library rejected the configuration or the authority failed
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// Invalid command arguments
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// JSON output failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything else, with context
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::InvalidArguments(_) => exit_code::CONFIG,
            Self::Auth(e) if e.kind == ErrorKind::ConfigurationInvalid => exit_code::CONFIG,
            Self::Auth(e) if e.is_transient() => exit_code::UNAVAILABLE,
            Self::Auth(_) => exit_code::REJECTED,
            Self::Json(_) | Self::Other(_) => exit_code::REJECTED,
        }
    }

    /// Hints printed under the error message
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Config(_) => vec![
                "Check the --config file syntax",
                "Check TOKENGUARD_* environment variables",
            ],
            Self::Auth(e) => match e.kind {
                ErrorKind::ConfigurationInvalid => {
                    vec!["Set --authority or TOKENGUARD_AUTHORITY to an https URL"]
                }
                ErrorKind::DiscoveryUnavailable | ErrorKind::NoSigningKeys => vec![
                    "Verify the authority URL",
                    "Run `tokenguard discover` to inspect the discovery document",
                ],
                ErrorKind::EndpointUnavailable => vec![
                    "Check that the authority publishes an introspection endpoint",
                    "Increase the timeout with --timeout",
                ],
                _ => vec![],
            },
            Self::InvalidArguments(_) => vec!["Use --help to see expected usage"],
            _ => vec![],
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Print an error and its suggestions to stderr, returning the exit code
pub fn display_error(error: &CliError) -> i32 {
    eprintln!("Error: {error}");
    let suggestions = error.suggestions();
    if !suggestions.is_empty() {
        eprintln!();
        eprintln!("Suggestions:");
        for suggestion in suggestions {
            eprintln!("  - {suggestion}");
        }
    }
    error.exit_code()
}
