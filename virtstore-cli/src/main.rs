//! # virtstore
//!
//! Operator CLI over the storage pool and volume bindings. Every method in
//! the binding's table is reachable through `virtstore call`; the other
//! subcommands are typed shortcuts for common inspections.
//!
//! ## Usage
//! ```bash
//! virtstore --uri qemu:///system pool-list --all
//! virtstore --uri test:///default call pool:default-pool refresh
//! virtstore -o json vol-info default-pool disk.qcow2
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info};

mod cli;
mod commands;
mod config;

use cli::Args;
use commands::Executor;
use config::Config;

fn main() -> Result<()> {
    let args = Args::parse();

    let (config, source) = Config::resolve(args.config.as_deref())?;
    let config = config.with_cli_overrides(&args);

    virtstore_common::init_logging(&config.logging.level, config.logging.format)?;

    match source {
        Some(path) => info!(config_path = %path, "Configuration loaded"),
        None => debug!("No configuration file, using defaults"),
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        uri = %config.connection.uri,
        libvirt = virtstore_binding::native::libvirt_available(),
        "Starting virtstore"
    );

    let executor = Executor::new(&config.connection.uri, args.output);
    if let Err(e) = executor.run(&args.command) {
        error!(error = %e, "Command failed");
        return Err(e);
    }

    Ok(())
}
