//! Chamber PLC register bridge
//!
//! Polls the chamber controller, aggregates alarm state, and serves the
//! event feed UI collaborators subscribe to.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bridgesrv::config::{self, BridgeConfig};
use bridgesrv::hub::{BridgeEvent, BridgeHub};
use bridgesrv::transport::sim::SimTransport;
use bridgesrv::transport::RegisterTransport;

#[derive(Parser, Debug, Clone)]
#[command(name = "bridgesrv", about = "Chamber PLC register bridge")]
struct Args {
    /// Configuration file (missing file falls back to defaults + env)
    #[arg(short, long, default_value = "config/bridgesrv.yaml")]
    config: PathBuf,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Log filter, e.g. "info" or "bridgesrv=debug" (overrides RUST_LOG)
    #[arg(long)]
    log: Option<String>,
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log.as_deref());

    let config = if args.config.exists() {
        info!(path = %args.config.display(), "loading configuration");
        BridgeConfig::load(&args.config)?
    } else {
        info!(
            path = %args.config.display(),
            "no configuration file, using defaults with env overrides"
        );
        BridgeConfig::from_env()?
    };

    config::validate(&config)?;
    let map = config.register_map()?;

    if args.validate {
        info!(registers = map.len(), "validation completed successfully");
        return Ok(());
    }

    let transport: Arc<dyn RegisterTransport> = if config.uses_simulator() {
        info!("simulation mode: in-memory chamber device");
        Arc::new(SimTransport::with_standard_bank())
    } else {
        // The transport trait is the seam for real protocol drivers; none
        // ship in this tree.
        anyhow::bail!(
            "no driver for endpoint '{}'; only sim:// is built in",
            config.transport.endpoint
        );
    };

    info!(
        service = %config.service.name,
        chamber = %config.service.chamber,
        interval_ms = config.polling.interval_ms,
        "starting chamber bridge"
    );
    let hub = BridgeHub::start(&config, map, transport)?;

    // Console feed: log link transitions and alarm edges the same way a
    // UI collaborator would consume them.
    let mut feed = hub.subscribe();
    let feed_task = tokio::spawn(async move {
        let mut last_link: Option<(bool, bool)> = None;
        while let Some(event) = feed.recv().await {
            match event {
                BridgeEvent::State(state) => {
                    let link = (state.connected, state.stale);
                    if last_link != Some(link) {
                        info!(connected = state.connected, stale = state.stale, "link state");
                        last_link = Some(link);
                    }
                }
                BridgeEvent::Alarm(alarm) => {
                    info!(
                        alarm = %alarm.kind,
                        transition = ?alarm.transition,
                        seat = alarm.seat_label.as_deref().unwrap_or("-"),
                        "alarm edge"
                    );
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    hub.shutdown().await?;
    feed_task.abort();

    Ok(())
}
