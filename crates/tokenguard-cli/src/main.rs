//! tokenguard CLI entry point
//!
//! ```bash
//! # Validate a JWT locally, requiring scope api1
//! tokenguard --authority https://auth.example.com --mode local --scope api1 validate eyJhbGciOi...
//!
//! # Validate an opaque token via introspection, JSON output
//! TOKENGUARD_CLIENT_ID=api TOKENGUARD_CLIENT_SECRET=secret \
//!   tokenguard -c tokenguard.toml -f json validate --header "Bearer 2YotnFZFEjr1zCsicMWpAA"
//!
//! # Inspect the authority's discovery metadata
//! tokenguard --authority https://auth.example.com discover
//! ```

#![warn(clippy::all)]

mod cli;
mod commands;
mod error;
mod output;
mod settings;

use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    match cli.execute().await {
        Ok(code) => std::process::exit(code),
        Err(e) => std::process::exit(error::display_error(&e)),
    }
}
