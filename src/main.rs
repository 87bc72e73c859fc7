use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crew_scrape_engine::config::ServiceConfig;
use crew_scrape_engine::engine::session::SessionManager;
use crew_scrape_engine::portal::registry::PortalRegistry;
use crew_scrape_engine::server::handler::ScrapeServer;
use crew_scrape_engine::telemetry::init_tracing;

/// Crew portal scrape service.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON configuration file. Missing fields use built-in defaults.
    #[arg(short, long, env = "CREW_SCRAPE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overrides the config file.
    #[arg(long, env = "CREW_SCRAPE_BIND")]
    bind: Option<IpAddr>,

    /// Port to listen on, overrides the config file.
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

impl Args {
    fn to_config(&self) -> Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::from_file(path)?,
            None => ServiceConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.server.bind_addr = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Error: {e:?}");
        std::process::exit(1);
    }
    info!("crew scrape server terminated");
}

async fn run(args: Args) -> Result<()> {
    let config = args.to_config()?;

    let registry = PortalRegistry::from_config(&config.portals)?;
    let manager = Arc::new(SessionManager::new(registry, &config));

    let shutdown = CancellationToken::new();
    let sweeper = manager.spawn_sweeper(config.cache.sweep_interval, shutdown.clone());

    let server = ScrapeServer::start(&config, Arc::clone(&manager)).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    shutdown.cancel();
    server.shutdown().await;
    sweeper.await?;
    Ok(())
}
