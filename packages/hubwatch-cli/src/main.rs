//! Hubwatch CLI - Gateway device presence agent for home networks
//!
//! This binary provides a small agent that can:
//! - Validate gateway credentials with a one-shot fetch
//! - Watch the gateway and report device arrivals/departures
//! - Run as a foreground daemon (for systemd integration)

mod daemon;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hubwatch_core::{GatewayClient, GatewayError, HttpGatewayClient, config};

#[derive(Parser)]
#[command(name = "hubwatch")]
#[command(author = "Hubwatch Team")]
#[command(version)]
#[command(about = "Gateway device presence agent for home networks")]
#[command(long_about = "
Hubwatch polls your network gateway for connected client devices and
maintains a smoothed presence view: a device that misses a single scan
is not reported away until the consider-home window expires.

Quick start:
  1. Write a config:        hubwatch config --example > ~/.config/hubwatch/config.toml
  2. Check credentials:     hubwatch check
  3. Watch the gateway:     hubwatch watch

For systemd integration, run 'hubwatch watch' as a simple service.
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the host list once to validate gateway credentials
    Check,

    /// Poll the gateway and report presence changes
    Watch {
        /// Override the poll interval in seconds
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show configuration paths and settings
    Config {
        /// Print an example config file and exit
        #[arg(long)]
        example: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("hubwatch={log_level},hubwatch_core={log_level}").into()
            }),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Check => cmd_check(&cli).await,
        Commands::Watch { interval } => daemon::run_watch(interval).await,
        Commands::Config { example } => cmd_config(&cli, example),
    }
}

async fn cmd_check(cli: &Cli) -> Result<()> {
    let cfg = config::load_config()?;
    let client =
        HttpGatewayClient::with_timeout(&cfg.gateway_host, &cfg.password, cfg.request_timeout)
            .context("Failed to build gateway client")?;

    match client.fetch_hosts().await {
        Ok(hosts) => match cli.format {
            OutputFormat::Text => {
                println!(
                    "Connected to gateway {} ({} hosts)",
                    cfg.gateway_host,
                    hosts.len()
                );
                for host in &hosts {
                    println!(
                        "  {}  {:<6} {}",
                        host.mac_address,
                        if host.active { "active" } else { "idle" },
                        host.name
                            .as_deref()
                            .or(host.hostname.as_deref())
                            .unwrap_or("-"),
                    );
                }
                Ok(())
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&hosts)?);
                Ok(())
            }
        },
        Err(GatewayError::Authentication(reason)) => {
            eprintln!("Error: invalid credentials ({reason})");
            eprintln!("Update the gateway password and run 'hubwatch check' again.");
            std::process::exit(1);
        }
        Err(GatewayError::Communication(reason)) => {
            eprintln!("Error: cannot connect to gateway {} ({reason})", cfg.gateway_host);
            std::process::exit(1);
        }
        Err(GatewayError::Unclassified(reason)) => {
            eprintln!("Error: unknown gateway failure ({reason})");
            std::process::exit(1);
        }
    }
}

fn cmd_config(cli: &Cli, example: bool) -> Result<()> {
    if example {
        print!("{}", config::generate_example_config());
        return Ok(());
    }

    let cfg = config::load_config()?;
    match cli.format {
        OutputFormat::Text => {
            println!("Config file:    {}", config::get_config_file_path_string());
            println!("Gateway:        {} (from {})", cfg.gateway_host, cfg.source);
            println!("Poll interval:  {}s", cfg.poll_interval.as_secs());
            println!("Consider home:  {}s", cfg.consider_home.as_secs());
            println!("Policy:         {:?}", cfg.policy);
        }
        OutputFormat::Json => {
            let out = serde_json::json!({
                "configFile": config::get_config_file_path_string(),
                "gateway": cfg.gateway_host,
                "source": cfg.source.to_string(),
                "pollIntervalSecs": cfg.poll_interval.as_secs(),
                "considerHomeSecs": cfg.consider_home.as_secs(),
                "policy": format!("{:?}", cfg.policy),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}
