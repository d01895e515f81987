//! Result rendering
//!
//! Every command builds one JSON report; `--format` decides whether it is
//! printed as JSON or rendered for humans.

use std::io::Write;

use serde_json::Value;

use crate::cli::OutputFormat;
use crate::error::CliResult;

/// Print `report` to stdout in the requested format
///
/// # Errors
///
/// Returns `CliError::Json` if serialization fails and `CliError::Other` if
/// stdout cannot be written.
pub fn print(report: &Value, format: OutputFormat, human: fn(&Value) -> String) -> CliResult<()> {
    let rendered = render(report, format, human)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}").map_err(anyhow::Error::from)?;
    Ok(())
}

fn render(report: &Value, format: OutputFormat, human: fn(&Value) -> String) -> CliResult<String> {
    Ok(match format {
        OutputFormat::Human => human(report),
        OutputFormat::Json => serde_json::to_string(report)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(report)?,
    })
}

fn field<'a>(report: &'a Value, pointer: &str) -> &'a str {
    report.pointer(pointer).and_then(Value::as_str).unwrap_or("-")
}

fn joined(report: &Value, pointer: &str) -> String {
    match report.pointer(pointer).and_then(Value::as_array) {
        Some(items) if !items.is_empty() => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        _ => "-".to_string(),
    }
}

/// Human rendering of an accepted token
pub fn human_accepted(report: &Value) -> String {
    let path = report["path"]
        .as_array()
        .map(|states| {
            states
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" -> ")
        })
        .unwrap_or_default();

    let expires = report
        .pointer("/identity/expires_at")
        .and_then(Value::as_u64)
        .map_or_else(|| "-".to_string(), |exp| exp.to_string());

    format!(
        "accepted via {} ({path})\n  name:    {}\n  scopes:  {}\n  roles:   {}\n  expires: {expires}",
        field(report, "/source"),
        field(report, "/identity/name"),
        joined(report, "/identity/scopes"),
        joined(report, "/identity/roles"),
    )
}

/// Human rendering of a rejected token
pub fn human_rejected(report: &Value) -> String {
    let mut out = format!(
        "rejected: {}: {}\n  status:  {}",
        field(report, "/kind"),
        field(report, "/message"),
        report["status"],
    );
    if let Some(challenge) = report["challenge"].as_str() {
        out.push_str(&format!("\n  WWW-Authenticate: {challenge}"));
    }
    out
}

/// Human rendering of authority metadata
pub fn human_metadata(report: &Value) -> String {
    let mut out = format!(
        "authority: {}\n  discovery:     {}\n  issuer:        {}\n  jwks_uri:      {}\n  introspection: {}\n  signing keys:",
        field(report, "/authority"),
        field(report, "/discovery_url"),
        field(report, "/issuer"),
        field(report, "/jwks_uri"),
        field(report, "/introspection_endpoint"),
    );

    for key in report["signing_keys"].as_array().into_iter().flatten() {
        out.push_str(&format!(
            "\n    - kid={} alg={}",
            field(key, "/kid"),
            field(key, "/alg")
        ));
    }
    out
}
