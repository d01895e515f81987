//! Command implementations

use std::io::Read;
use std::time::UNIX_EPOCH;

use anyhow::Context;
use serde_json::{Value, json};
use tokenguard::{
    AuthError, AuthorityMetadata, Authentication, Authenticator, BearerChallenge, ErrorKind,
    ValidationConfig, extract_bearer_token,
};
use tracing::debug;

use crate::cli::{OutputFormat, ValidateArgs};
use crate::error::{CliError, CliResult, exit_code};
use crate::output;

/// `tokenguard validate`
///
/// # Errors
///
/// Returns `CliError` for configuration problems and unreadable input. A
/// rejected token is not an error: it is reported and mapped to an exit code.
pub async fn validate(
    config: ValidationConfig,
    args: ValidateArgs,
    format: OutputFormat,
) -> CliResult<i32> {
    let authenticator = Authenticator::new(config)?;
    let input = read_token(&args)?;

    let outcome = match input.as_deref().map_err(|e| e.clone()) {
        Ok(token) if args.skip_scopes => authenticator.authenticate(token).await,
        Ok(token) => authenticator.authorize(token).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(auth) => {
            output::print(&accepted_report(&auth), format, output::human_accepted)?;
            Ok(exit_code::OK)
        }
        Err(e) if e.kind == ErrorKind::ConfigurationInvalid => Err(e.into()),
        Err(e) => {
            let report = rejected_report(&e, authenticator.scope_requirement().scopes());
            output::print(&report, format, output::human_rejected)?;
            Ok(if e.is_transient() {
                exit_code::UNAVAILABLE
            } else {
                exit_code::REJECTED
            })
        }
    }
}

/// `tokenguard discover`
///
/// # Errors
///
/// Returns `CliError::Auth` if the authority cannot be resolved.
pub async fn discover(config: ValidationConfig, format: OutputFormat) -> CliResult<i32> {
    let authenticator = Authenticator::new(config)?;
    let metadata = authenticator.prime().await?;

    let report = metadata_report(&authenticator, &metadata);
    output::print(&report, format, output::human_metadata)?;
    Ok(exit_code::OK)
}

/// Token from the argument, the header, or stdin.
///
/// The inner result carries header parsing failures so they are reported
/// like any other rejection.
fn read_token(args: &ValidateArgs) -> CliResult<Result<String, AuthError>> {
    if let Some(header) = &args.header {
        return Ok(extract_bearer_token(header).map(str::to_owned));
    }
    if let Some(token) = &args.token {
        return Ok(Ok(token.clone()));
    }

    debug!("Reading token from stdin");
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read token from stdin")?;

    let token = buffer.trim();
    if token.is_empty() {
        return Err(CliError::InvalidArguments(
            "no token given (pass a token, --header, or pipe one on stdin)".into(),
        ));
    }
    Ok(Ok(token.to_string()))
}

fn accepted_report(auth: &Authentication) -> Value {
    json!({
        "allowed": true,
        "source": auth.source().to_string(),
        "path": auth.path,
        "identity": auth.identity,
    })
}

fn rejected_report(error: &AuthError, required_scopes: &[String]) -> Value {
    let challenge =
        BearerChallenge::for_error(error, required_scopes).map(|c| c.to_header_value());

    json!({
        "allowed": false,
        "kind": error.kind.as_str(),
        "status": error.status_code().as_u16(),
        "message": error.message,
        "challenge": challenge,
    })
}

fn metadata_report(authenticator: &Authenticator, metadata: &AuthorityMetadata) -> Value {
    let keys: Vec<Value> = metadata
        .signing_keys
        .iter()
        .map(|key| {
            json!({
                "kid": key.kid,
                "alg": key.jwk.common.key_algorithm.map(|a| a.to_string()),
            })
        })
        .collect();

    let fetched_at = metadata
        .fetched_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    json!({
        "authority": authenticator.resolver().authority().as_str(),
        "discovery_url": authenticator.resolver().discovery_url().as_str(),
        "issuer": metadata.issuer,
        "jwks_uri": metadata.jwks_uri.as_ref().map(|u| u.as_str()),
        "introspection_endpoint": metadata.introspection_endpoint.as_ref().map(|u| u.as_str()),
        "signing_keys": keys,
        "fetched_at": fetched_at,
    })
}
