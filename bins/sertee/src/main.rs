use anyhow::{Context, Result};
use clap::Parser;
use sertee_config::{Overrides, SerteeConfig};
use sertee_engine::endpoint::UnixEndpoint;
use sertee_engine::{Multiplexer, StopReason, Upstream};
use sertee_ring::RingConfig;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sertee")]
#[command(about = "share one serial stream between many consumers")]
struct Args {
    #[arg(short, long, help = "configuration file path (toml format)")]
    config: Option<String>,

    #[arg(short = 'S', long, help = "upstream device or stream path")]
    source: Option<PathBuf>,

    #[arg(
        short,
        long,
        value_delimiter = ',',
        help = "consumer names, comma separated (repeat a name for independent readers)"
    )]
    name: Option<Vec<String>>,

    #[arg(long, help = "ring buffer capacity in bytes")]
    bufsize: Option<usize>,

    #[arg(long, help = "directory holding the consumer sockets")]
    socket_dir: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            source: self.source.clone(),
            capacity: self.bufsize,
            consumers: self.name.clone(),
            socket_dir: self.socket_dir.clone(),
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SerteeConfig::load(path.as_str())
            .with_context(|| format!("failed to load config path={path}"))?,
        None => SerteeConfig::default(),
    }
    .with_overrides(args.overrides());

    init_tracing(&config.log_level);

    let source = config.validate().context("invalid configuration")?;
    let ring = RingConfig::new(config.capacity)?;
    let upstream = Upstream::open(source)
        .with_context(|| format!("failed to open source path={}", source.display()))?;
    info!(source = %source.display(), capacity = config.capacity, "upstream opened");

    let mut mux = Multiplexer::new(upstream, ring, config.idle_timeout_ms)?;

    std::fs::create_dir_all(&config.socket_dir).with_context(|| {
        format!("failed to create socket dir path={}", config.socket_dir.display())
    })?;
    for (name, path) in config.socket_paths() {
        let endpoint = UnixEndpoint::bind(name.as_str(), &path)
            .with_context(|| format!("failed to bind consumer socket path={}", path.display()))?;
        info!(consumer = %name, path = %path.display(), "consumer socket bound");
        mux.add_endpoint(endpoint)?;
    }

    match mux.run() {
        Ok(StopReason::UpstreamClosed) => {
            info!("upstream closed, shutting down");
            Ok(())
        }
        Ok(reason) => {
            info!(?reason, "shutting down");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "multiplexer failed");
            Err(e.into())
        }
    }
}
