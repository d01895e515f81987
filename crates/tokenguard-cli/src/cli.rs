//! CLI argument parsing and dispatch

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::commands;
use crate::error::CliResult;
use crate::settings::{self, SettingsArgs};

/// tokenguard - OAuth2 bearer token validation
///
/// Validate tokens against an identity authority and inspect its metadata.
#[derive(Parser, Debug)]
#[command(
    name = "tokenguard",
    version,
    about = "Validate OAuth2 bearer tokens against an identity authority",
    long_about = "Validate OAuth2 bearer tokens locally (JWT signature, issuer, audience, lifetime)\n\
                  or through the authority's introspection endpoint, and enforce required scopes.\n\n\
                  Configuration is read from --config, then TOKENGUARD_* environment variables,\n\
                  then command-line flags. Pass client secrets through TOKENGUARD_CLIENT_SECRET\n\
                  or the config file, never on the command line."
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Enable verbose logging (-v, -vv, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all logging except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a token and enforce required scopes
    Validate(ValidateArgs),

    /// Fetch and print the authority's discovery metadata
    Discover,
}

/// Token input for `validate`
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Raw token; read from stdin when neither a token nor --header is given
    #[arg(conflicts_with = "header")]
    pub token: Option<String>,

    /// Full `Authorization` header value, e.g. "Bearer eyJ..."
    #[arg(long)]
    pub header: Option<String>,

    /// Authenticate only, skipping the required-scope check
    #[arg(long)]
    pub skip_scopes: bool,
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Human,
    /// Compact JSON (for scripting)
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

impl Cli {
    /// Execute the CLI command, returning the process exit code
    ///
    /// # Errors
    ///
    /// Returns `CliError` if configuration fails or the command cannot run.
    pub async fn execute(self) -> CliResult<i32> {
        self.init_tracing();

        let config = settings::load(&self.settings)?;

        match self.command {
            Command::Validate(args) => commands::validate(config, args, self.format).await,
            Command::Discover => commands::discover(config, self.format).await,
        }
    }

    /// Initialize tracing based on verbosity; `RUST_LOG` wins when set.
    /// Logs go to stderr so stdout stays parseable.
    fn init_tracing(&self) {
        let level = if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_parsing() {
        let cli = Cli::try_parse_from([
            "tokenguard",
            "validate",
            "eyJ.abc.def",
            "--authority",
            "https://auth.example.com",
            "--scope",
            "api1",
            "--scope",
            "api2",
        ])
        .unwrap();

        let Command::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(args.token.as_deref(), Some("eyJ.abc.def"));
        assert_eq!(cli.settings.scopes, vec!["api1", "api2"]);
        assert_eq!(
            cli.settings.authority.as_deref(),
            Some("https://auth.example.com")
        );
    }

    #[test]
    fn test_token_conflicts_with_header() {
        let cli = Cli::try_parse_from([
            "tokenguard",
            "validate",
            "abc",
            "--header",
            "Bearer abc",
        ]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_verbosity_levels() {
        let cli = Cli::try_parse_from(["tokenguard", "-vvv", "discover"]).unwrap();
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let cli = Cli::try_parse_from(["tokenguard", "-v", "--quiet", "discover"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_mode_flag() {
        let cli =
            Cli::try_parse_from(["tokenguard", "discover", "--mode", "local", "-f", "json"])
                .unwrap();
        assert_eq!(cli.settings.mode, Some(tokenguard::ValidationMode::Local));
        assert_eq!(cli.format, OutputFormat::Json);
    }
}
