use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pagerelay_core::config::{self, Config};
use pagerelay_core::service::http::{serve, AppState};
use pagerelay_core::util::mask_secret;

#[derive(Parser)]
#[command(
    name = "pagerelay",
    about = "pagerelay - Facebook Messenger bot backed by Gemini",
    version = pagerelay_core::VERSION,
)]
struct Cli {
    /// Config file (default: ~/.pagerelay/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server
    Serve {
        /// Listen port (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
        /// Listen address (overrides HOST)
        #[arg(long)]
        host: Option<String>,
    },
    /// Show resolved configuration
    Status,
    /// Run one completion with the configured instruction and print the reply
    Ask {
        /// Message to send
        message: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env()
        .add_directive(format!("pagerelay={level}").parse()?)
        .add_directive(format!("pagerelay_core={level}").parse()?);
    if cli.verbose {
        filter = filter.add_directive("tower_http=debug".parse()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = config::load_config_from_env(cli.config.as_deref());

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(cfg, port, host).await?,
        Commands::Status => cmd_status(&cfg, cli.config.as_deref())?,
        Commands::Ask { message } => cmd_ask(cfg, message).await?,
    }

    Ok(())
}

// ====== Commands ======

async fn cmd_serve(mut cfg: Config, port: Option<u16>, host: Option<String>) -> Result<()> {
    if let Some(port) = port {
        cfg.server.port = port;
    }
    if let Some(host) = host {
        cfg.server.host = host;
    }

    for warning in cfg.validate() {
        tracing::warn!("{}", warning);
    }

    let addr = cfg.bind_addr();
    let state = Arc::new(AppState::from_config(cfg)?);
    tracing::info!(
        "Relaying Messenger to {} (temperature {})",
        state.pipeline.settings().model,
        state.pipeline.settings().temperature
    );
    serve(&addr, state).await
}

fn cmd_status(cfg: &Config, config_path: Option<&std::path::Path>) -> Result<()> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(config::get_config_path);

    println!("pagerelay {} Status\n", pagerelay_core::VERSION);
    println!(
        "Config: {} {}",
        path.display(),
        if path.exists() { "✓" } else { "✗" }
    );
    println!("Listen: {}", cfg.bind_addr());
    println!("Status page: {}", if cfg.server.status_page { "on" } else { "off" });
    println!("Model: {}", cfg.completion.model);
    println!("Temperature: {}", cfg.completion.temperature);
    println!("Page access token: {}", mask_secret(&cfg.facebook.page_access_token));
    println!("Verify token: {}", mask_secret(&cfg.facebook.verify_token));
    println!("Completion API key: {}", mask_secret(&cfg.completion.api_key));
    match &cfg.completion.system_instruction_file {
        Some(file) => println!("System instruction: file {}", file),
        None => println!(
            "System instruction: inline ({} chars)",
            cfg.completion.system_instruction.chars().count()
        ),
    }

    let warnings = cfg.validate();
    if !warnings.is_empty() {
        println!();
        for warning in warnings {
            println!("! {}", warning);
        }
    }
    Ok(())
}

async fn cmd_ask(cfg: Config, message: Vec<String>) -> Result<()> {
    let text = message.join(" ");
    if text.trim().is_empty() {
        anyhow::bail!("Nothing to ask. Usage: pagerelay ask <message>");
    }

    let state = AppState::from_config(cfg)?;
    let reply = state.pipeline.complete(&text).await?;
    println!("{}", reply);
    Ok(())
}
