//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// virtstore - libvirt storage pool and volume tool
#[derive(Parser, Debug)]
#[command(name = "virtstore")]
#[command(about = "virtstore - libvirt storage pool and volume tool")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long, env = "VIRTSTORE_CONFIG")]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Connection URI (e.g., qemu:///system, test:///default)
    #[arg(long, env = "VIRTSTORE_URI")]
    pub uri: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List storage pools
    PoolList {
        /// Include inactive, persistent pools
        #[arg(long)]
        all: bool,
    },

    /// Show one storage pool
    PoolInfo {
        /// Pool name
        pool: String,
    },

    /// List the volumes of a pool
    VolList {
        /// Pool name
        pool: String,
    },

    /// Show one storage volume
    VolInfo {
        /// Pool name
        pool: String,
        /// Volume name
        volume: String,
    },

    /// Define a persistent pool from an XML file
    PoolDefine {
        /// Path to the pool XML
        file: PathBuf,
    },

    /// Start a transient pool from an XML file
    PoolCreate {
        /// Path to the pool XML
        file: PathBuf,
    },

    /// Invoke a registered method by name
    ///
    /// Target is `conn`, `pool:<name>` or `vol:<pool>/<name>`. Arguments are
    /// read as nil, true, false, integers, or strings.
    Call {
        target: String,
        method: String,
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print the method table
    Methods {
        /// Restrict to one class (Connect, StoragePool, StorageVol, ...)
        class: Option<String>,
    },

    /// Print the constant table
    Constants,
}

/// How results are printed.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}
