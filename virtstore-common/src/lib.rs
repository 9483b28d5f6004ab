//! # virtstore Common
//!
//! Shared utilities for the virtstore components.
//!
//! ## Logging
//!
//! ```rust,ignore
//! use virtstore_common::{init_logging, LogFormat};
//!
//! init_logging("info", LogFormat::Pretty)?;
//! tracing::info!("ready");
//! ```

pub mod logging;

pub use logging::{init_logging, LogFormat};
