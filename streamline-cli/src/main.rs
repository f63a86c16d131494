// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! Streamline CLI - call a JSON API through the Streamline pipeline.
//!
//! # Examples
//!
//! ```bash
//! # GET with query parameters
//! streamline --base-url https://api.example.com request posts -Q page=2 -Q limit=10
//!
//! # POST a JSON body with an extra header
//! streamline --config api.json -H "Authorization: Bearer abc" \
//!     request posts -X post -d '{"title":"hello"}'
//!
//! # Download a file into the configured download directory
//! streamline --config api.json download files/report --output report.csv
//!
//! # Print per-request network metrics to stderr
//! streamline --config api.json --metrics request posts
//!
//! # List session profiles
//! streamline profiles --format json
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use streamline_core::{ApiError, CoreError, Language, NetworkMetric, ServiceConfiguration};
use streamline_fetch::{BuiltRequest, Service, ServiceFactory, SessionProfile};

use commands::{download, profiles, request};

// ============================================================================
// CLI Definition
// ============================================================================

/// Streamline CLI - JSON API calls with metrics.
#[derive(Parser)]
#[command(name = "streamline")]
#[command(about = "Call JSON APIs through the Streamline request pipeline")]
#[command(version)]
#[command(author = "Streamline Contributors")]
pub struct Cli {
    /// Command to run.
    #[command(subcommand)]
    pub command: Commands,

    /// JSON configuration file (baseUrl, port, apiKey, language, ...).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the API. Overrides the configuration file.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Port of the API. Overrides the configuration file.
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// API key sent as X-API-Key.
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Language of messages and the lang header (pt-BR or en-US).
    #[arg(long, global = true)]
    pub language: Option<Language>,

    /// Session profile (no-background, light-background, ...).
    #[arg(long, global = true, default_value = "no-background")]
    pub profile: SessionProfile,

    /// Extra header as "Name: value". Repeatable.
    #[arg(long = "header", short = 'H', global = true, value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Print network metrics to stderr.
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Send a request and print the JSON response.
    #[command(visible_alias = "r")]
    Request(request::RequestArgs),

    /// Download a response body to a file.
    #[command(visible_alias = "d")]
    Download(download::DownloadArgs),

    /// List session profiles and their timeouts.
    Profiles,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// No internet connection.
    Offline = 2,
    /// The API rejected the request.
    Rejected = 3,
    /// Invalid configuration.
    Config = 4,
}

impl ExitCode {
    /// Picks the exit code for a failed command.
    fn for_error(err: &anyhow::Error) -> Self {
        if let Some(api) = err.downcast_ref::<ApiError>() {
            return match api {
                ApiError::NoInternetConnection => Self::Offline,
                ApiError::AcknowledgedByApi(_) => Self::Rejected,
                ApiError::UnknownError(_) | ApiError::Info(_) => Self::Error,
            };
        }
        if err.downcast_ref::<CoreError>().is_some() {
            return Self::Config;
        }
        Self::Error
    }
}

/// Parses a "Name: value" header argument.
fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected \"Name: value\", got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {raw:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

// ============================================================================
// Service Setup
// ============================================================================

/// Resolves the configuration from the file and flag overrides.
pub fn build_config(cli: &Cli) -> Result<ServiceConfiguration> {
    let mut config = match (&cli.config, &cli.base_url) {
        (Some(path), _) => ServiceConfiguration::from_json_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        (None, Some(base_url)) => ServiceConfiguration::new(base_url.clone()),
        (None, None) => {
            return Err(CoreError::InvalidConfig(
                "either --config or --base-url is required".to_string(),
            )
            .into());
        }
    };

    if let Some(base_url) = &cli.base_url {
        config.base_url.clone_from(base_url);
    }
    if cli.port.is_some() {
        config.port = cli.port;
    }
    if cli.api_key.is_some() {
        config.api_key.clone_from(&cli.api_key);
    }
    if let Some(language) = cli.language {
        config.language = language;
    }

    config.validate()?;
    debug!(base_url = %config.base_url, port = ?config.port, "Configuration resolved");
    Ok(config)
}

/// Builds the service used by the request and download commands.
pub fn make_service(cli: &Cli) -> Result<Service> {
    let config = build_config(cli)?;
    let mut service = ServiceFactory::new(config)
        .with_profile(cli.profile)
        .make_http_service()
        .context("Failed to create HTTP transport")?;

    if !cli.headers.is_empty() {
        let headers = cli.headers.clone();
        service = service.interceptor(move |request: &mut BuiltRequest| {
            for (name, value) in &headers {
                request.set_header(name.as_str(), value.as_str());
            }
        });
    }

    if cli.metrics {
        service.on_metric(|metric: NetworkMetric| eprintln!("{}", format_metric(&metric)));
    }

    Ok(service)
}

fn format_metric(metric: &NetworkMetric) -> String {
    let status = metric
        .status_code
        .map_or_else(|| "-".to_string(), |s| s.to_string());
    format!(
        "[metric] {} status={} total={}ms sent={}B received={}B",
        metric.url_path,
        status,
        metric.total_duration.as_millis(),
        metric.bytes_sent,
        metric.bytes_received,
    )
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("streamline=debug,streamline_fetch=debug,streamline_core=debug,info")
    } else {
        EnvFilter::new("streamline=warn,streamline_fetch=warn")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Request(args) => request::run(args, &cli).await,
        Commands::Download(args) => download::run(args, &cli).await,
        Commands::Profiles => profiles::run(&cli),
    };

    if let Err(e) = result {
        if !cli.quiet {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(ExitCode::for_error(&e) as i32);
    }

    Ok(())
}
