//! Configuration layering: built-in defaults, then the JSON config file,
//! then command-line flags.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use protocol::{ApplicationId, BodyEncoding, InvokeOptions, TransportPreference};
use serde::Deserialize;
use serde_json::Value;

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// `--transport` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    /// Let the selector decide.
    Auto,
    /// Force the legacy cross-domain transport.
    Legacy,
}

/// `--encoding` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EncodingArg {
    /// `application/json`.
    Json,
    /// `application/x-www-form-urlencoded`.
    Form,
}

/// Send one remote call and print its outcome as JSON.
#[derive(Debug, Parser)]
#[command(name = "relay", version, about)]
pub struct Cli {
    /// Destination (`http`, `https`, `ws` or `wss`).
    pub url: Option<String>,

    /// Request method.
    #[arg(short = 'X', long)]
    pub method: Option<String>,

    /// Payload; JSON objects and arrays are sent structured.
    #[arg(short, long)]
    pub data: Option<String>,

    /// Extra header as `Name: value`. Repeatable.
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Timeout in milliseconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Offline retry interval in milliseconds.
    #[arg(long)]
    pub interval: Option<u64>,

    /// Give up after this many offline retries.
    #[arg(long)]
    pub retries: Option<u32>,

    /// Treat data and socket replies as binary.
    #[arg(long)]
    pub binary: bool,

    /// Adapter preference for http(s) destinations.
    #[arg(long, value_enum)]
    pub transport: Option<TransportArg>,

    /// Encoding for structured bodies.
    #[arg(long, value_enum)]
    pub encoding: Option<EncodingArg>,

    /// Attach the application id and body signature to requests.
    #[arg(long)]
    pub sign: bool,

    /// Application id for signed requests.
    #[arg(long, env = "RELAY_APP_ID")]
    pub app_id: Option<String>,

    /// User agent reported by the host.
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Location requests are issued from, for same-origin checks.
    #[arg(long)]
    pub location: Option<String>,

    /// JSON config file.
    #[arg(short, long, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// OTLP gRPC endpoint; tracing spans are exported when set.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

/// Contents of the JSON config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Options every call is merged over.
    pub defaults: InvokeOptions,
    /// Application id for signed requests.
    pub application_id: Option<String>,
    /// Enables signing.
    pub signing: bool,
    /// User agent reported by the host.
    pub user_agent: Option<String>,
    /// Location requests are issued from.
    pub location: Option<String>,
    /// Log output format.
    pub log_format: Option<LogFormat>,
    /// OTLP gRPC endpoint.
    pub otlp_endpoint: Option<String>,
}

impl FileConfig {
    /// Reads and parses `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// Everything `main` needs, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Defaults the dispatcher merges every call over.
    pub defaults: InvokeOptions,
    /// The call to make.
    pub request: InvokeOptions,
    /// Signing session id, when signing is enabled.
    pub signing: Option<ApplicationId>,
    /// User agent for the native host.
    pub user_agent: String,
    /// Location for the native host.
    pub location: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// OTLP endpoint, if exporting.
    pub otlp_endpoint: Option<String>,
}

impl Settings {
    /// Layers `cli` over `file` over the built-in defaults.
    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self> {
        let defaults = InvokeOptions::merge(&InvokeOptions::documented_defaults(), file.defaults);

        let signing = (cli.sign || file.signing).then(|| {
            cli.app_id
                .clone()
                .or(file.application_id)
                .and_then(ApplicationId::new)
                .unwrap_or_default()
        });

        Ok(Self {
            request: request_options(&cli)?,
            defaults,
            signing,
            user_agent: cli
                .user_agent
                .or(file.user_agent)
                .unwrap_or_else(|| host::DEFAULT_USER_AGENT.to_owned()),
            location: cli
                .location
                .or(file.location)
                .unwrap_or_else(|| host::DEFAULT_LOCATION.to_owned()),
            log_format: cli.log_format.or(file.log_format).unwrap_or_default(),
            otlp_endpoint: cli.otlp_endpoint.or(file.otlp_endpoint),
        })
    }
}

fn request_options(cli: &Cli) -> Result<InvokeOptions> {
    let headers = if cli.headers.is_empty() {
        None
    } else {
        Some(parse_headers(&cli.headers)?)
    };
    Ok(InvokeOptions {
        url: cli.url.clone(),
        method: cli.method.clone(),
        data: cli.data.clone().map(Value::String),
        headers,
        timeout: cli.timeout,
        interval: cli.interval,
        retries: cli.retries,
        binary: cli.binary.then_some(true),
        transport: cli.transport.map(|t| match t {
            TransportArg::Auto => TransportPreference::Auto,
            TransportArg::Legacy => TransportPreference::Legacy,
        }),
        encoding: cli.encoding.map(|e| match e {
            EncodingArg::Json => BodyEncoding::Json,
            EncodingArg::Form => BodyEncoding::Form,
        }),
        asynchronous: None,
    })
}

fn parse_headers(raw: &[String]) -> Result<BTreeMap<String, String>> {
    let mut headers = BTreeMap::new();
    for entry in raw {
        let Some((name, value)) = entry.split_once(':') else {
            bail!("header '{entry}' must look like 'Name: value'");
        };
        let name = name.trim();
        if name.is_empty() {
            bail!("header '{entry}' has an empty name");
        }
        headers.insert(name.to_owned(), value.trim().to_owned());
    }
    Ok(headers)
}
