//! pgsql-dbus: the daemon
//!
//! Owns `org.postgresql.instance` on the user bus and serves `Ping` and
//! `Query` against the configured PostgreSQL server.
//!
//! # Usage
//!
//! ```bash
//! # Serve with the built-in defaults (/tmp socket, port 15433)
//! pgsql-dbus
//!
//! # Point at a TCP server on the system bus
//! pgsql-dbus --system --host db.internal --port 5432
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use pgsql_dbus::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pgsql-dbus")]
#[command(version)]
#[command(about = "PostgreSQL query bridge on D-Bus", long_about = None)]
#[command(after_help = "EXAMPLES:
    pgsql-dbus
    pgsql-dbus --host /var/run/postgresql --port 5432
    busctl --user call org.postgresql.instance /org/postgresql/instance org.postgresql.instance Ping")]
struct Cli {
    /// Config file (default: <config dir>/pgsql-dbus/config.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database host or Unix-socket directory
    #[arg(long)]
    host: Option<String>,

    /// Database port
    #[arg(short, long)]
    port: Option<u16>,

    /// Serve on the system bus instead of the user bus
    #[arg(long)]
    system: bool,

    /// Reject numeric column text that does not parse cleanly
    #[arg(long)]
    strict: bool,
}

impl Cli {
    fn apply(&self, config: &mut DaemonConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.system {
            config.bus = BusKind::System;
        }
        if self.strict {
            config.numeric_parsing = ParsePolicy::Strict;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    tokio::select! {
        result = serve(&cli) => {
            if let Err(e) = result {
                error!("{:#}", e);
            }
            ExitCode::FAILURE
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            ExitCode::SUCCESS
        }
    }
}

/// Bootstrap and serve. Only returns on failure.
async fn serve(cli: &Cli) -> anyhow::Result<()> {
    let mut config = DaemonConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    let context = config.context().context("Invalid connection settings")?;

    info!(
        "🚀 pgsql-dbus starting with database {}, {:?} numeric parsing",
        context, config.numeric_parsing
    );

    let transport = ZbusTransport::connect(config.bus, &config.service_name).await?;

    let bridge = Bridge::new(PgDatabase::new(), context, config.numeric_parsing);
    let service = Service::new(bridge, config.object_path.as_str(), config.interface.as_str());
    let mut service_loop = ServiceLoop::new(transport, service);

    // The connection is released when the loop is dropped.
    let err = service_loop.run().await;
    drop(service_loop);
    Err(err.into())
}
