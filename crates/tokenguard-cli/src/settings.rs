//! Layered configuration loading
//!
//! Sources, lowest precedence first:
//!
//! 1. `--config <file>` (TOML, YAML or JSON, by extension)
//! 2. `TOKENGUARD_*` environment variables, e.g. `TOKENGUARD_AUTHORITY`,
//!    `TOKENGUARD_CLIENT_SECRET`, `TOKENGUARD_REQUIRED_SCOPES="api1 api2"`
//! 3. command-line overrides
//!
//! The merged result is deserialized into a [`ValidationConfig`] and
//! validated before any command runs.

use std::path::PathBuf;

use clap::Args;
use config::{Config, Environment, File};
use tokenguard::{EndpointMethod, ValidationConfig, ValidationMode};
use tracing::debug;

use crate::error::CliResult;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TOKENGUARD";

/// Configuration arguments shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Configuration file
    #[arg(long, short = 'c', global = true, env = "TOKENGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Identity authority base URL
    #[arg(long, global = true)]
    pub authority: Option<String>,

    /// Validation mode: local, endpoint or both
    #[arg(long, global = true, value_parser = parse_mode)]
    pub mode: Option<ValidationMode>,

    /// Required scope (repeatable)
    #[arg(long = "scope", global = true)]
    pub scopes: Vec<String>,

    /// Expected audience
    #[arg(long, global = true)]
    pub audience: Option<String>,

    /// Client id for the introspection endpoint
    #[arg(long, global = true)]
    pub client_id: Option<String>,

    /// Introspection request method
    #[arg(long, global = true, value_parser = parse_method)]
    pub endpoint_method: Option<EndpointMethod>,

    /// Timeout for outbound calls, in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

fn parse_mode(s: &str) -> Result<ValidationMode, String> {
    s.parse().map_err(|e: tokenguard::AuthError| e.message)
}

fn parse_method(s: &str) -> Result<EndpointMethod, String> {
    match s.to_ascii_lowercase().as_str() {
        "post" => Ok(EndpointMethod::Post),
        "get" => Ok(EndpointMethod::Get),
        other => Err(format!("unknown endpoint method '{other}' (expected post or get)")),
    }
}

/// Load configuration from the process environment
///
/// # Errors
///
/// Returns `CliError::Config` if a source cannot be read or merged, and
/// `CliError::Auth` if the merged configuration does not validate.
pub fn load(args: &SettingsArgs) -> CliResult<ValidationConfig> {
    load_with_env(args, None)
}

/// Load configuration, reading environment variables from `env` when given
///
/// # Errors
///
/// Same as [`load`].
pub fn load_with_env(
    args: &SettingsArgs,
    env: Option<config::Map<String, String>>,
) -> CliResult<ValidationConfig> {
    let mut builder = Config::builder();

    if let Some(path) = &args.config {
        debug!(path = %path.display(), "Loading configuration file");
        builder = builder.add_source(File::from(path.clone()));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(" ")
            .with_list_parse_key("required_scopes")
            .source(env),
    );

    builder = builder
        .set_override_option("authority", args.authority.clone())?
        .set_override_option("mode", args.mode.map(|m| m.to_string()))?
        .set_override_option("audience", args.audience.clone())?
        .set_override_option("client_id", args.client_id.clone())?
        .set_override_option(
            "endpoint_method",
            args.endpoint_method.map(|m| match m {
                EndpointMethod::Post => "post",
                EndpointMethod::Get => "get",
            }),
        )?
        .set_override_option("http_timeout", args.timeout)?;

    if !args.scopes.is_empty() {
        builder = builder.set_override("required_scopes", args.scopes.clone())?;
    }

    let config: ValidationConfig = builder.build()?.try_deserialize()?;
    config.validate()?;

    debug!(authority = %config.authority, mode = %config.mode, "Configuration loaded");
    Ok(config)
}
