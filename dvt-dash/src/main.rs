//! DVT compatibility dashboard
//!
//! Interactive dashboard (default) plus scriptable commands for launching
//! SSD compatibility tests and reading their results.

#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dvt_common::config::{ConfigSource, LoadedConfig, Severity, log_dir, validate_config};
use dvt_common::{DashConfig, RefreshOrdering, TestCategory, TestConfig, TestId};
use dvt_dash::api::{ApiClient, ApiError};
use dvt_dash::logging::{LogTarget, init_logging};
use dvt_dash::reconciler::{Reconciler, ResultCache};
use dvt_dash::tui::{TuiConfig, run_tui};
use dvt_dash::{LiveChannel, launch_and_wait, launch_test, render};
use is_terminal::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "dvt-dash")]
#[command(author, version, about = "DVT compatibility dashboard - launch SSD tests and follow their results")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "DVT_CONFIG")]
    config: Option<PathBuf>,

    /// Backend API base URL (overrides config and DVT_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Live channel URL (default: derived from the API URL)
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// How overlapping refreshes are applied: last_arrival or sequenced
    #[arg(long, global = true)]
    refresh_ordering: Option<RefreshOrdering>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive dashboard (default)
    Dashboard {
        /// High contrast colours
        #[arg(long)]
        high_contrast: bool,
    },

    /// List test results, newest first
    Results {
        /// Only this test type or category (boot_drive, data-drive, ...)
        #[arg(long = "type")]
        test_type: Option<String>,

        /// Show at most this many results
        #[arg(long)]
        limit: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one test result
    #[command(name = "result")]
    Get {
        id: String,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Submit a test run
    Launch {
        /// Category to run (boot-drive, data-drive, system-robustness, certification)
        category: TestCategory,

        /// Primary device under test (default: from config)
        #[arg(long)]
        device: Option<String>,

        /// Additional device for multi-device runs (repeatable)
        #[arg(long = "extra-device")]
        extra_devices: Vec<String>,

        /// Test parameter as key=value (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,

        /// Follow the run on the live channel until it finishes
        #[arg(long)]
        wait: bool,

        /// Give up waiting after this many seconds
        #[arg(long, requires = "wait")]
        timeout_secs: Option<u64>,
    },

    /// Backend health and test module readiness
    Status,

    /// List launchable test categories
    Catalog,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration and where each value came from
    Show,
}

fn apply_cli_overrides(loaded: &mut LoadedConfig, cli: &Cli) {
    if let Some(url) = &cli.api_url {
        loaded.config.api_url = url.clone();
        loaded.sources.set("api_url", ConfigSource::CommandLine);
    }
    if let Some(url) = &cli.ws_url {
        loaded.config.ws_url = Some(url.clone());
        loaded.sources.set("ws_url", ConfigSource::CommandLine);
    }
    if let Some(ordering) = cli.refresh_ordering {
        loaded.config.refresh_ordering = ordering;
        loaded.sources.set("refresh_ordering", ConfigSource::CommandLine);
    }
}

fn api_client(config: &DashConfig) -> Result<ApiClient> {
    ApiClient::new(
        &config.api_url,
        Duration::from_secs(config.request_timeout_secs),
    )
    .context("invalid API configuration")
}

/// Category filter: a catalog name maps to its test type, anything else is
/// matched literally.
fn normalize_type_filter(raw: &str) -> String {
    TestCategory::from_id(raw)
        .map(|c| c.test_type().to_string())
        .unwrap_or_else(|| raw.to_string())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut loaded = DashConfig::load(cli.config.as_deref())?;
    apply_cli_overrides(&mut loaded, &cli);

    let command = cli.command.unwrap_or(Commands::Dashboard {
        high_contrast: false,
    });

    let target = if matches!(command, Commands::Dashboard { .. }) {
        LogTarget::File(log_dir())
    } else {
        LogTarget::Stderr
    };
    let _log_guard = init_logging(target, cli.verbose, &loaded.config.log_level)?;

    if !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let warnings = validate_config(&loaded.config);
    for warning in &warnings {
        match warning.severity {
            Severity::Error | Severity::Warning => {
                warn!(key = warning.key, "{}", warning.message)
            }
            Severity::Info => debug!(key = warning.key, "{}", warning.message),
        }
    }

    let config = &loaded.config;
    match command {
        Commands::Dashboard { high_contrast } => {
            let tui_config = TuiConfig {
                api: api_client(config)?,
                live_url: config.live_url(),
                refresh_interval: Duration::from_millis(
                    config.refresh_interval_ms.clamp(250, 600_000),
                ),
                refresh_ordering: config.refresh_ordering,
                launch_defaults: config.launch_defaults(),
                high_contrast,
            };
            run_tui(tui_config).await?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Results {
            test_type,
            limit,
            json,
        } => {
            let api = api_client(config)?;
            let mut cache = ResultCache::default();
            cache.replace(api.list_results().await?);
            let filter = test_type.as_deref().map(normalize_type_filter);
            let rows: Vec<_> = cache
                .newest_first()
                .into_iter()
                .filter(|r| filter.as_deref().is_none_or(|t| r.test_type == t))
                .take(limit.unwrap_or(usize::MAX))
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print!("{}", render::format_results(&rows));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Get { id, json } => {
            let api = api_client(config)?;
            let result = match api.get_result(&TestId::new(id)).await {
                Ok(result) => result,
                Err(err @ ApiError::NotFound(_)) => bail!(err),
                Err(err) => return Err(err).context("failed to fetch test result"),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", render::format_result_detail(&result));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Launch {
            category,
            device,
            extra_devices,
            params,
            wait,
            timeout_secs,
        } => {
            let mut run_config: TestConfig = config.launch_defaults();
            if let Some(device) = device {
                run_config.ssd_device_path = device;
            }
            if !extra_devices.is_empty() {
                run_config.set_extra_devices(extra_devices);
            }
            for param in &params {
                run_config.insert_parameter(param)?;
            }
            let api = api_client(config)?;

            if !wait {
                let ack = launch_test(&api, category, &run_config).await?;
                println!("Submitted {} as {}", category, ack.test_id);
                return Ok(ExitCode::SUCCESS);
            }

            let live_url = config.live_url();
            let mut live = LiveChannel::connect(&live_url).await?;
            let mut reconciler = Reconciler::new(config.refresh_ordering);
            let outcome = launch_and_wait(
                &api,
                &mut live,
                &mut reconciler,
                category,
                &run_config,
                timeout_secs.map(Duration::from_secs),
            )
            .await;
            live.close().await;
            let outcome = outcome?;

            info!(test_id = %outcome.ack.test_id, failed = outcome.failed(), "run finished");
            match &outcome.result {
                Some(result) => print!("{}", render::format_result_detail(result)),
                None => println!(
                    "{} finished ({}), no result recorded yet",
                    outcome.ack.test_id,
                    if outcome.failed() { "failed" } else { "completed" }
                ),
            }
            Ok(if outcome.failed() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }

        Commands::Status => {
            let api = api_client(config)?;
            let health = api.health().await.map_err(|e| e.to_string());
            let modules = api.module_status().await.map_err(|e| e.to_string());
            print!(
                "{}",
                render::format_status(
                    &config.api_url,
                    health.as_deref().map_err(Clone::clone),
                    modules.as_ref().map_err(Clone::clone),
                )
            );
            Ok(if health.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Catalog => {
            print!("{}", render::format_catalog());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Config {
            action: ConfigAction::Show,
        } => {
            print!(
                "{}",
                render::format_config(&loaded, &config.live_url(), &warnings)
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}
