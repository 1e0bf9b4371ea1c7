//! flowctl - install and remove match-action rules through the controller
//!
//! Rules are addressed by table name and match fields only. The controller's
//! flow ids never need to be known: `delete` finds the matching rule itself.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use flow_rules::config::load_environment;
use flow_rules::prelude::*;
use flow_rules::RuleError;
use tracing::{error, info};

mod scenario;

#[derive(Parser, Debug)]
#[command(name = "flowctl")]
#[command(about = "Match-action rule control for the controller flow REST API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Controller REST base URL
    #[arg(long, global = true)]
    url: Option<String>,

    /// Device identifier
    #[arg(long, global = true)]
    device: Option<String>,

    /// Switch type appended to the device identifier (e.g. bmv2)
    #[arg(long, global = true)]
    switch_type: Option<String>,

    /// Refuse to delete when several rules match
    #[arg(long, global = true)]
    strict: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install a rule
    Install {
        #[command(flatten)]
        target: TargetArgs,

        /// Forward out of this port (forward table)
        #[arg(long)]
        output: Option<u16>,

        /// Explicit no-op action (forward table)
        #[arg(long)]
        noop: bool,

        #[arg(long)]
        priority: Option<u32>,

        /// Idle timeout in seconds
        #[arg(long)]
        timeout: Option<u32>,

        /// Rule never times out
        #[arg(long)]
        permanent: bool,

        /// Print the payload instead of sending it
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete the rule matching the given fields
    Delete {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Print the controller id of the rule matching the given fields
    Resolve {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// List rules on the device
    List {
        #[arg(long)]
        table: Option<String>,
    },
    /// Forward 1<->2 directly
    Bypass,
    /// Route traffic through the classifier
    Enable,
    /// Remove the bypass and classifier rules
    Disable,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Table name (forward, fxpt_format)
    #[arg(short, long)]
    table: String,

    #[command(flatten)]
    matches: MatchArgs,
}

/// Match fields; omitted fields are not matched on
#[derive(Args, Debug, Default)]
struct MatchArgs {
    #[arg(long, value_parser = parse_u8)]
    ingress_port: Option<u8>,
    #[arg(long, value_parser = parse_u8)]
    egress_port: Option<u8>,
    #[arg(long)]
    eth_dst: Option<String>,
    #[arg(long)]
    eth_src: Option<String>,
    /// Ethernet type, decimal or 0x-prefixed hex
    #[arg(long, value_parser = parse_u16)]
    eth_type: Option<u16>,
    #[arg(long)]
    ipv4_src: Option<String>,
    #[arg(long)]
    ipv4_dst: Option<String>,
    #[arg(long, value_parser = parse_u8)]
    ipv4_proto: Option<u8>,
    #[arg(long, value_parser = parse_u16)]
    l4_src: Option<u16>,
    #[arg(long, value_parser = parse_u16)]
    l4_dst: Option<u16>,
}

impl From<MatchArgs> for MatchOptions {
    fn from(a: MatchArgs) -> Self {
        MatchOptions {
            ingress_port: a.ingress_port,
            egress_port: a.egress_port,
            eth_dst: a.eth_dst,
            eth_src: a.eth_src,
            eth_type: a.eth_type,
            ipv4_src: a.ipv4_src,
            ipv4_dst: a.ipv4_dst,
            ipv4_proto: a.ipv4_proto,
            l4_src: a.l4_src,
            l4_dst: a.l4_dst,
        }
    }
}

fn parse_number(raw: &str) -> std::result::Result<u64, String> {
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    }
    .map_err(|e| format!("{}: {}", raw, e))
}

fn parse_u8(raw: &str) -> std::result::Result<u8, String> {
    u8::try_from(parse_number(raw)?).map_err(|_| format!("{} does not fit in one byte", raw))
}

fn parse_u16(raw: &str) -> std::result::Result<u16, String> {
    u16::try_from(parse_number(raw)?).map_err(|_| format!("{} does not fit in two bytes", raw))
}

fn load_config(cli: &Cli) -> Result<ControllerConfig> {
    let config = match &cli.config {
        Some(path) => ControllerConfig::load(path)?,
        None => ControllerConfig::load_default()?,
    };
    Ok(apply_cli(cli, config.apply_env()))
}

/// Command-line flags win over file and environment settings.
fn apply_cli(cli: &Cli, mut config: ControllerConfig) -> ControllerConfig {
    if let Some(url) = &cli.url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(device) = &cli.device {
        config.device_id = device.clone();
    }
    if let Some(switch_type) = &cli.switch_type {
        config.switch_type = Some(switch_type.clone());
    }
    if cli.strict {
        config.ambiguity = AmbiguityPolicy::RejectAmbiguous;
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    load_environment();
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("flowctl={}", level).parse()?)
                .add_directive(format!("flow_rules={}", level).parse()?),
        )
        .init();

    if let Err(e) = run(cli).await {
        if let Some(rule_err) = e.downcast_ref::<RuleError>() {
            error!("{} (hint: {})", e, rule_err.suggestion());
        }
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let session = RuleSession::connect(&config).context("Failed to create controller session")?;

    match cli.command {
        Commands::Install {
            target,
            output,
            noop,
            priority,
            timeout,
            permanent,
            dry_run,
        } => {
            let matches = MatchOptions::from(target.matches);
            let actions = ActionOptions {
                output_port: output,
                no_op: noop,
            };
            let rule = RuleOptions {
                priority: priority.unwrap_or(config.default_priority),
                timeout: timeout.unwrap_or(config.default_timeout),
                permanent,
            };
            if dry_run {
                let payload = session.build(&target.table, &matches, &actions, &rule)?;
                println!("{}", serde_json::to_string_pretty(&payload)?);
                return Ok(());
            }
            let ack = session.install_rule(&target.table, &matches, &actions, &rule).await?;
            match ack.flow_id() {
                Some(id) => println!("{}", id),
                None => info!("Rule installed in {}", target.table),
            }
        }
        Commands::Delete { target } => {
            let matches = MatchOptions::from(target.matches);
            match session.delete_rule(&target.table, &matches).await? {
                Ack::NotPresent => info!("No matching rule in {}, nothing deleted", target.table),
                ack => info!("Deleted rule {}", ack.flow_id().unwrap_or_default()),
            }
        }
        Commands::Resolve { target } => {
            let matches = MatchOptions::from(target.matches);
            if let Some(id) = session.resolve_rule(&target.table, &matches).await? {
                println!("{}", id);
            }
        }
        Commands::List { table } => {
            let flows = session.list_rules(table.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&flows)?);
        }
        Commands::Bypass => scenario::install_all(&session, &scenario::bypass_rules()).await?,
        Commands::Enable => scenario::install_all(&session, &scenario::enable_rules()).await?,
        Commands::Disable => scenario::delete_all(&session, &scenario::disable_rules()).await?,
    }
    Ok(())
}
