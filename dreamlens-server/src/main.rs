use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dreamlens_core::commands::{dreamlens_root, ensure_initialized};
use dreamlens_core::Commands;

#[derive(Parser)]
#[command(
    name = "dreamlens",
    about = "Dream archetype classification service with metrics and analytics"
)]
struct Cli {
    /// Data root (config.toml, resources/, store/, logbook/). Defaults to $DREAMLENS_ROOT or .dreamlens
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Debug-level logging when RUST_LOG is unset
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the HTTP server (default)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create the data root and its default files, then exit
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let root = cli.root.unwrap_or_else(dreamlens_root);
    match cli.cmd.unwrap_or(Cmd::Serve {
        host: None,
        port: None,
    }) {
        Cmd::Init => {
            let report = ensure_initialized(&root)?;
            println!("root: {}", report.root.display());
            for c in &report.created {
                println!("  created  {c}");
            }
            for e in &report.existed {
                println!("  exists   {e}");
            }
            Ok(())
        }
        Cmd::Serve { host, port } => {
            let commands = tokio::task::spawn_blocking(move || Commands::open(&root))
                .await
                .context("startup task")??;
            let server = &commands.config().server;
            let host = host.unwrap_or_else(|| server.host.clone());
            let port = port.unwrap_or(server.port);
            let ip: IpAddr = host
                .parse()
                .with_context(|| format!("invalid listen host `{host}`"))?;
            dreamlens_server::serve(Arc::new(commands), SocketAddr::new(ip, port)).await
        }
    }
}
