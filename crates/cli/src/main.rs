//! VM Sentinel CLI
//!
//! Lists and acknowledges VM utilization notifications, browses the audit
//! trail and triggers reconciliation passes on a running sentinel.

mod client;
mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{audit, notifications, scan};
use output::OutputFormat;

/// VM Sentinel CLI
#[derive(Parser)]
#[command(name = "vms")]
#[command(
    author,
    version,
    about = "CLI for the VM Sentinel notification service",
    long_about = None
)]
pub struct Cli {
    /// API endpoint URL (can also be set via SENTINEL_API_URL env var)
    #[arg(long, env = "SENTINEL_API_URL")]
    pub api_url: Option<String>,

    /// Output format [default: table]
    #[arg(long, short)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List notifications
    List {
        /// Filter by status (open, ack, cleared)
        #[arg(long, short)]
        status: Option<String>,

        /// Filter by provider (vmware, hyperv, kvm, cedia)
        #[arg(long, short)]
        provider: Option<String>,

        /// Filter by metric (cpu, ram, disk)
        #[arg(long, short)]
        metric: Option<String>,

        /// Filter by VM name
        #[arg(long)]
        vm: Option<String>,

        /// Filter by environment
        #[arg(long, short)]
        env: Option<String>,

        /// Include archived notifications
        #[arg(long)]
        all: bool,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        offset: Option<usize>,
    },

    /// Show one notification
    Show {
        /// Notification ID
        id: i64,
    },

    /// Acknowledge an open notification
    Ack {
        /// Notification ID
        id: i64,

        /// Operator name (defaults to config, then $USER)
        #[arg(long)]
        by: Option<String>,
    },

    /// Show the audit trail
    Audit {
        /// Only events for this notification
        #[arg(long)]
        id: Option<i64>,

        /// Only this action (created, updated, cleared, acknowledged)
        #[arg(long, short)]
        action: Option<String>,
    },

    /// Run a reconciliation pass now
    Scan,

    /// Show sentinel health
    Status,

    /// Manage local CLI settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective settings
    Show,

    /// Persist settings to the config file
    Set {
        #[arg(long)]
        api_url: Option<String>,

        #[arg(long)]
        operator: Option<String>,

        /// Default output format (table, json)
        #[arg(long)]
        format: Option<OutputFormat>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        output::print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let format = config.format(cli.format)?;
    let api_url = config.api_url(cli.api_url);

    if cli.verbose {
        output::print_info(&format!("Using API at {api_url}"));
    }

    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::List {
            status,
            provider,
            metric,
            vm,
            env,
            all,
            limit,
            offset,
        } => {
            let args = notifications::ListArgs {
                status,
                provider,
                metric,
                vm_name: vm,
                env,
                include_archived: all,
                limit,
                offset,
            };
            notifications::list_notifications(&client, args, format).await?;
        }
        Commands::Show { id } => {
            notifications::show_notification(&client, id, format).await?;
        }
        Commands::Ack { id, by } => {
            let by = config.operator(by).context(
                "No operator name; pass --by or set one with `vms config set --operator`",
            )?;
            notifications::acknowledge(&client, id, &by, format).await?;
        }
        Commands::Audit { id, action } => {
            audit::show_audit(&client, id, action, format).await?;
        }
        Commands::Scan => {
            scan::run_scan(&client, format).await?;
        }
        Commands::Status => {
            scan::show_status(&client, format).await?;
        }
        Commands::Config(ConfigCommands::Show) => {
            let path = config::Config::config_path()?;
            println!("Config file: {}", path.display());
            println!("API URL:     {}", api_url);
            println!("Operator:    {}", config.operator(None).unwrap_or_else(|| "-".to_string()));
            println!("Format:      {:?}", format);
        }
        Commands::Config(ConfigCommands::Set {
            api_url,
            operator,
            format,
        }) => {
            let mut updated = config.clone();
            if let Some(url) = api_url {
                url::Url::parse(&url).context("Invalid API URL")?;
                updated.api_url = Some(url);
            }
            if operator.is_some() {
                updated.operator = operator;
            }
            if let Some(format) = format {
                let name = match format {
                    OutputFormat::Table => "table",
                    OutputFormat::Json => "json",
                };
                updated.default_format = Some(name.to_string());
            }
            let path = config::Config::config_path()?;
            updated.save_to(&path)?;
            output::print_success(&format!("Saved {}", path.display()));
        }
    }

    Ok(())
}
