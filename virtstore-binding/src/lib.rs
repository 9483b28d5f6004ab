//! # virtstore binding
//!
//! Storage pool and volume bindings over libvirt.
//!
//! Every operation forwards to exactly one libvirt entry point (list
//! operations use a count query followed by a fill call). Pool state,
//! volume allocation and XML validation stay inside libvirt.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   Runtime (dispatch by method name)     │
//! │   registry: static method/const table   │
//! └─────────────────────┬───────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────┐
//! │  Connection / StoragePool / StorageVol  │
//! │  (typed operations, error translation)  │
//! └─────────────────────┬───────────────────┘
//!                       │
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │  LibvirtConnect   │     │    MockConnect    │
//! │   (via libvirt)   │     │    (in memory)    │
//! └───────────────────┘     └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use virtstore_binding::Connection;
//!
//! let conn = Connection::open("qemu:///system")?;
//! let pool = conn.lookup_storage_pool_by_name("default")?;
//! for name in pool.list_volumes()? {
//!     let vol = pool.lookup_volume_by_name(&name)?;
//!     println!("{} {:?}", vol.path()?, vol.info()?);
//! }
//! pool.free()?;
//! ```

pub mod connection;
pub mod constants;
pub mod error;
pub mod native;
pub mod pool;
pub mod registry;
pub mod runtime;
pub mod value;
pub mod volume;

mod handle;
mod methods;
mod xml;

pub use connection::Connection;
pub use constants::{PoolState, VolType};
pub use error::{ErrorKind, Result, StorageError};
pub use native::mock::{MockConnect, MockHost};
pub use pool::{PoolInfo, StoragePool};
pub use registry::{Class, ConstantDef, MethodDef};
pub use runtime::Runtime;
pub use value::Value;
pub use volume::{StorageVol, VolInfo};
