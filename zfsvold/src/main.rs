//! Docker volume plugin daemon serving ZFS datasets.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use libzfsvol::ZfsDriver;
use libzfsvol::config::{DEFAULT_SOCKET_PATH, PluginConfig};
use libzfsvol::dataset::ZfsCli;
use libzfsvol::dataset::zfs::DEFAULT_ZFS_BINARY;
use libzfsvol::logging;
use libzfsvol::transport::{PluginListener, PluginServer};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "zfsvold", version, about = "ZFS volume plugin for container engines")]
struct Cli {
    /// Root dataset for volumes. Repeat for several roots; the first one
    /// receives unqualified legacy names.
    #[arg(
        long = "dataset-name",
        value_name = "DATASET",
        env = "ZFS_PLUGIN_DATASETS",
        value_delimiter = ','
    )]
    datasets: Vec<String>,

    /// Resolve bare volume names against the first dataset.
    #[arg(long, env = "ZFS_PLUGIN_LEGACY_NAMES")]
    legacy_names: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Socket to bind when none is handed over at startup.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// `zfs` command to run.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_ZFS_BINARY)]
    zfs_binary: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(logging::level(cli.verbose)) {
        eprintln!("failed to initialise logging: {e}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = PluginConfig::new(&cli.datasets, cli.legacy_names)?
        .with_socket_path(&cli.socket)
        .with_zfs_binary(&cli.zfs_binary);

    let backend = Arc::new(ZfsCli::new(&config.zfs_binary));
    let driver = ZfsDriver::new(backend, &config.datasets, config.legacy_names)
        .await
        .context("failed to prepare root datasets")?;

    let listener = PluginListener::select(PluginListener::from_env()?, &config.socket_path)
        .await
        .context("failed to open plugin socket")?;

    PluginServer::new(Arc::new(driver))
        .with_shutdown_timeout(config.shutdown_timeout)
        .run(listener, shutdown_signal())
        .await?;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = interrupt => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}
