//! srxauto - Juniper SRX configuration automation CLI.
//!
//! Thin front end over the library: builds a request from flags and
//! configured defaults, drives the engine, and renders the outcome as
//! colored text or JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;

use srxauto::audit::{self, AuditLog};
use srxauto::callback::ConsoleCallback;
use srxauto::config::{AppConfig, Defaults};
use srxauto::engine::{ConfigurationEngine, ConfigurationOutcome};
use srxauto::request::ConfigurationRequest;
use srxauto::telemetry;

#[derive(Parser)]
#[command(
    name = "srxauto",
    version,
    about = "Juniper SRX firewall configuration automation",
    long_about = "Automates SRX interface, zone and policy configuration over \
                  NETCONF/SSH, with a fully simulated mode for environments \
                  without hardware."
)]
struct Cli {
    /// Path to a configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply interface, zone and policy configuration to a device
    Configure(TargetArgs),
    /// Dry-run the configuration sequence without committing
    Validate(TargetArgs),
    /// Capture a backup of the committed device configuration
    Backup(TargetArgs),
    /// Probe device connectivity and show device facts
    TestConnection(TargetArgs),
    /// Show recorded configuration attempts from the audit sink
    History {
        /// Audit sink file (defaults to the configured one)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Show at most this many entries, most recent first
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Device management address
    #[arg(long, default_value = "192.168.1.1")]
    host: String,

    /// NETCONF port
    #[arg(long)]
    port: Option<u16>,

    /// Username for authentication
    #[arg(short, long)]
    user: Option<String>,

    /// Password for authentication
    #[arg(long, env = "SRXAUTO_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Interface to configure
    #[arg(short, long)]
    interface: Option<String>,

    /// Interface address in CIDR notation
    #[arg(short, long)]
    address: Option<String>,

    /// Security zone for the interface
    #[arg(short, long)]
    zone: Option<String>,

    /// Run against the in-memory mock device, no transport
    #[arg(long)]
    simulate: bool,

    /// Per-operation timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl TargetArgs {
    /// Merge flags over configured defaults into a request.
    fn to_request(&self, defaults: &Defaults) -> ConfigurationRequest {
        let mut request = ConfigurationRequest::new(&self.host)
            .with_port(self.port.unwrap_or(defaults.port))
            .with_interface(self.interface.as_deref().unwrap_or(&defaults.interface))
            .with_address(self.address.as_deref().unwrap_or(&defaults.address))
            .with_zone(self.zone.as_deref().unwrap_or(&defaults.zone))
            .with_timeout(self.timeout.unwrap_or(defaults.timeout_secs))
            .simulated(self.simulate);

        let username = self.user.clone().or_else(|| defaults.username.clone());
        if let (Some(username), Some(password)) = (username, self.password.clone()) {
            request = request.with_credentials(username, password);
        }
        request
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("{} {:#}", "warning:".yellow(), e);
        AppConfig::default()
    });
    match cli.verbose {
        0 => {}
        1 => config.logging.level = "debug".to_string(),
        _ => config.logging.level = "trace".to_string(),
    }
    telemetry::init_logging(&config.logging)?;

    let audit = Arc::new(match &config.audit.file {
        Some(path) => AuditLog::with_sink(path.clone()),
        None => AuditLog::new(),
    });
    let engine =
        ConfigurationEngine::new(audit).with_callback(Arc::new(ConsoleCallback::new()));

    let exit_code = match &cli.command {
        Commands::Configure(args) => run_configure(&engine, args, &config).await,
        Commands::Validate(args) => run_validate(&engine, args, &config).await,
        Commands::Backup(args) => run_backup(&engine, args, &config).await,
        Commands::TestConnection(args) => run_test_connection(&engine, args, &config).await,
        Commands::History { file, limit } => run_history(file.as_ref(), *limit, &config),
    };

    std::process::exit(exit_code);
}

async fn run_configure(
    engine: &ConfigurationEngine,
    args: &TargetArgs,
    config: &AppConfig,
) -> i32 {
    let request = args.to_request(&config.defaults);
    match engine.configure(&request).await {
        Ok(outcome) => {
            render_outcome(&outcome, args.output);
            if outcome.success {
                0
            } else {
                2
            }
        }
        Err(e) => report_error(&e),
    }
}

async fn run_validate(engine: &ConfigurationEngine, args: &TargetArgs, config: &AppConfig) -> i32 {
    let request = args.to_request(&config.defaults);
    match engine.validate(&request).await {
        Ok(report) => {
            match args.output {
                OutputFormat::Json => print_json(&report),
                OutputFormat::Text => {
                    println!("{}", report.message);
                    if report.valid && !report.commands.is_empty() {
                        println!("\nDirectives checked:");
                        for command in &report.commands {
                            println!("  {}", command);
                        }
                    }
                }
            }
            if report.valid {
                0
            } else {
                2
            }
        }
        Err(e) => report_error(&e),
    }
}

async fn run_backup(engine: &ConfigurationEngine, args: &TargetArgs, config: &AppConfig) -> i32 {
    let request = args.to_request(&config.defaults);
    match engine.backup(&request).await {
        Ok(record) => {
            match args.output {
                OutputFormat::Json => print_json(&record),
                OutputFormat::Text => {
                    println!(
                        "Backup of {} created at {} ({} bytes)",
                        record.host,
                        record.timestamp.to_rfc3339(),
                        record.configuration.len()
                    );
                }
            }
            0
        }
        Err(e) => report_error(&e),
    }
}

async fn run_test_connection(
    engine: &ConfigurationEngine,
    args: &TargetArgs,
    config: &AppConfig,
) -> i32 {
    let request = args.to_request(&config.defaults);
    match engine.test_connection(&request).await {
        Ok(report) => {
            match args.output {
                OutputFormat::Json => print_json(&report),
                OutputFormat::Text => {
                    if let Some(facts) = &report.facts {
                        println!("{} {}", "connected:".green(), report.host);
                        println!("  hostname: {}", facts.hostname);
                        println!("  model:    {}", facts.model);
                        println!("  version:  {}", facts.version);
                        println!("  serial:   {}", facts.serial);
                        if let Some(uptime) = &facts.uptime {
                            println!("  uptime:   {}", uptime);
                        }
                    } else {
                        println!(
                            "{} {}: {}",
                            "unreachable:".red(),
                            report.host,
                            report.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                }
            }
            if report.connected {
                0
            } else {
                4
            }
        }
        Err(e) => report_error(&e),
    }
}

fn run_history(file: Option<&PathBuf>, limit: usize, config: &AppConfig) -> i32 {
    let Some(path) = file.or(config.audit.file.as_ref()) else {
        eprintln!(
            "{} no audit sink configured; set [audit] file in srxauto.toml or pass --file",
            "error:".red().bold()
        );
        return 1;
    };

    match audit::read_sink(path) {
        Ok(entries) => {
            if entries.is_empty() {
                println!("No configuration attempts recorded.");
                return 0;
            }
            // Most recent first for display.
            for entry in entries.iter().rev().take(limit) {
                let status = if entry.outcome.success {
                    "ok".green()
                } else {
                    "failed".red()
                };
                println!(
                    "{}  {}  {}  {} -> zone '{}'  [{}]",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    status,
                    entry.request.host,
                    entry.request.interface,
                    entry.request.zone,
                    if entry.request.simulate { "simulated" } else { "real" },
                );
            }
            0
        }
        Err(e) => {
            eprintln!("{} failed to read '{}': {}", "error:".red().bold(), path.display(), e);
            1
        }
    }
}

fn render_outcome(outcome: &ConfigurationOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(outcome),
        OutputFormat::Text => {
            println!("{}", outcome.message);
            if outcome.success && !outcome.commands.is_empty() {
                println!("\nApplied directives:");
                for command in &outcome.commands {
                    println!("  {}", command);
                }
            }
            if let Some(failed) = &outcome.failed_step {
                println!(
                    "\nCompleted {} of {} steps before '{}' failed.",
                    outcome.completed_steps.len(),
                    srxauto::engine::ApplyStep::SEQUENCE.len(),
                    failed.step
                );
            }
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("{} failed to serialize output: {}", "error:".red().bold(), e),
    }
}

fn report_error(error: &srxauto::error::Error) -> i32 {
    eprintln!("{} {}", "error:".red().bold(), error);
    error.exit_code()
}
