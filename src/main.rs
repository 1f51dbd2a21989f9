//! `relay`: issue one request through a configured sender.
//!
//! ```text
//! relay [--config FILE] [--base-url URL] METHOD PATH
//!       [-H name:value]... [-p name=value]... [--data BODY] [--json]
//! ```
//!
//! Parameter names keep their sigils: `-p '{id}=7'` fills a path
//! placeholder, `-p ';v=2'` adds a matrix parameter, `-p page=3` a query
//! parameter.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde_json::Value;

use relay_client::config::{load_config, ClientConfig};
use relay_client::observability::{logging, metrics};
use relay_client::{Method, Sender};

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Send an HTTP request through the relay client pipeline", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL, overriding the configured targets.
    #[arg(short, long)]
    base_url: Option<String>,

    /// HTTP method.
    method: Method,

    /// Path template, e.g. `/users/{id}`.
    path: String,

    /// Request header as `name:value`.
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Request parameter as `name=value`.
    #[arg(short = 'p', long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Request body.
    #[arg(short, long)]
    data: Option<String>,

    /// Send `--data` as JSON and ask for JSON back.
    #[arg(long)]
    json: bool,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once(':')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .ok_or_else(|| format!("expected name:value, got '{raw}'"))
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    if let Some(base_url) = cli.base_url {
        config.transport.base_urls = vec![base_url];
    }

    logging::init(&config.observability.log_filter);
    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let sender = Sender::from_config(&config)?;

    let mut builder = sender.request(cli.method, cli.path);
    for (name, value) in &cli.headers {
        builder = builder.header(name, value.clone());
    }
    for (name, value) in &cli.params {
        builder = builder.param(name, value.clone());
    }
    if cli.json {
        builder = builder.header("Accept", "application/json");
    }
    builder = match (cli.data, cli.json) {
        (Some(data), true) => builder.json(&serde_json::from_str::<Value>(&data)?),
        (Some(data), false) => builder.text(data),
        (None, _) => builder,
    };
    let request = builder.build()?;

    let mut response = sender.execute(&request).await?;
    println!("{} {}", response.status(), response.message());
    for (name, value) in response.headers().pairs() {
        println!("{name}: {value}");
    }
    println!();

    let text = response.text().await?;
    let is_json = response.media_type().is_some_and(|m| m.subtype() == "json" || m.subtype().ends_with("+json"));
    match serde_json::from_str::<Value>(&text) {
        Ok(value) if is_json => println!("{}", serde_json::to_string_pretty(&value)?),
        _ => println!("{text}"),
    }

    let success = response.head().is_success();
    response.close();
    sender.close().await;

    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
