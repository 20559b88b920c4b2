use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use ytfront::core::proxy_prober::discover_port;
use ytfront::utils::logging::init_tracing;
use ytfront::{api, AppConfig, AppState, ProxyEndpoint, ProxyProber};

#[derive(Parser)]
#[command(name = "ytfront", version, about = "HTTP front-end for YouTube downloads")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Start without checking the local proxy
        #[arg(long)]
        skip_probe: bool,
    },
    /// Probe the local proxy once and report the result
    Probe {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            bind,
            config,
            skip_probe,
        } => serve(bind, config, skip_probe).await,
        Command::Probe { config } => probe(config).await,
    }
}

async fn serve(bind: Option<String>, config_path: Option<PathBuf>, skip_probe: bool) -> Result<()> {
    let mut config = AppConfig::load(config_path.as_deref())?;
    if let Some(bind) = bind {
        config.server.bind_address = bind;
        config.validate()?;
    }

    let proxy = if skip_probe || !config.proxy.probe_on_startup {
        info!("Skipping proxy probe");
        None
    } else {
        info!("Testing proxy connection...");
        let endpoint = ProxyProber::from_config(&config.proxy).probe().await;
        if endpoint.is_none() {
            warn!("Failed to establish proxy connection, continuing with configured proxy settings");
        }
        endpoint
    };

    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.server.bind_address))?;

    let state = AppState::new(config, proxy).context("Failed to initialize service")?;
    let registry = state.orchestrator.registry().clone();
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🌐 Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let active = registry.active();
    if active > 0 {
        warn!("Shutting down with {} download(s) still running", active);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn probe(config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let mut prober = ProxyProber::from_config(&config.proxy);

    let candidates: Vec<u16> = std::iter::once(config.proxy.port)
        .chain(config.proxy.candidate_ports.iter().copied())
        .collect();
    let open_port = discover_port(prober.host(), &candidates).await;
    match open_port {
        Some(port) if port != prober.port() => {
            info!("Configured port {} is closed, using {}", prober.port(), port);
            prober = prober.with_port(port);
        }
        Some(_) => {}
        None => {
            println!("No open proxy port on {} (tried {:?})", prober.host(), candidates);
            return Ok(());
        }
    }

    report(prober.probe().await);
    Ok(())
}

fn report(endpoint: Option<ProxyEndpoint>) {
    match endpoint {
        Some(endpoint) => println!("Working proxy: {}", endpoint),
        None => println!("No working proxy configuration found"),
    }
}
