//! Relay CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Resolve configuration**: built-in defaults, then the JSON config file
//!    (`--config` / `RELAY_CONFIG`), then command-line flags.
//! 2. **Wire observability**: `tracing-subscriber` with an env filter, text or
//!    JSON output, and an optional OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure**: a [`host::NativeEnvironment`] injected
//!    into a [`dispatch::Dispatcher`], with a signing session when enabled.
//! 4. **Make one call** and print its outcome as JSON on stdout. The exit
//!    status is non-zero for failure outcomes.

mod config;
mod telemetry;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dispatch::{Dispatcher, SigningSession};
use host::NativeEnvironment;
use protocol::TransportOutcome;

use crate::config::{Cli, FileConfig, Settings};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(cli, file)?;
    let _telemetry = telemetry::init(settings.log_format, settings.otlp_endpoint.as_deref())?;

    let outcome = call(&settings).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("rendering outcome")?
    );
    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn call(settings: &Settings) -> Result<TransportOutcome> {
    let env = NativeEnvironment::new(settings.user_agent.clone(), &settings.location)
        .context("building native host")?;
    let mut dispatcher =
        Dispatcher::new(Arc::new(env)).with_defaults(settings.defaults.clone());
    if let Some(app) = &settings.signing {
        dispatcher = dispatcher.with_signing(SigningSession::new(app.clone()));
    }

    dispatcher
        .invoke_and_wait(settings.request.clone())
        .await
        .context("invalid request")
}
