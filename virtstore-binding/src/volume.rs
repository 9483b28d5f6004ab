//! Storage volumes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::connection::Connection;
use crate::constants::VolType;
use crate::error::{native_failure, ErrorKind, Result};
use crate::handle::Handle;
use crate::native::{NativeResult, NativeVol, RawVolInfo};
use crate::pool::StoragePool;

/// Snapshot returned by [`StorageVol::info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolInfo {
    #[serde(rename = "type")]
    pub kind: VolType,
    pub capacity: u64,
    pub allocation: u64,
}

impl From<RawVolInfo> for VolInfo {
    fn from(raw: RawVolInfo) -> Self {
        Self {
            kind: VolType::from_raw(raw.kind),
            capacity: raw.capacity,
            allocation: raw.allocation,
        }
    }
}

/// A storage volume inside one pool.
pub struct StorageVol {
    handle: Handle<dyn NativeVol>,
}

impl StorageVol {
    pub(crate) fn wrap(native: Box<dyn NativeVol>, conn: &Arc<Connection>) -> Self {
        Self {
            handle: Handle::wrap("StorageVol", "virStorageVolFree", native, conn),
        }
    }

    pub(crate) fn handle(&self) -> &Handle<dyn NativeVol> {
        &self.handle
    }

    fn call<R>(
        &self,
        kind: ErrorKind,
        call: &'static str,
        f: impl FnOnce(&dyn NativeVol) -> NativeResult<R>,
    ) -> Result<R> {
        let conn = self.handle.connection();
        self.handle
            .with(|native| f(native))?
            .map_err(|e| native_failure(kind, call, conn.as_deref(), e))
    }

    pub fn is_freed(&self) -> bool {
        self.handle.is_released()
    }

    /// The pool holding this volume.
    pub fn pool(&self) -> Result<StoragePool> {
        let conn = self.handle.require_connection()?;
        let native = self.call(ErrorKind::Retrieve, "virStoragePoolLookupByVolume", |v| {
            v.pool()
        })?;
        Ok(StoragePool::wrap(native, &conn))
    }

    pub fn name(&self) -> Result<String> {
        self.call(ErrorKind::Retrieve, "virStorageVolGetName", |v| v.name())
    }

    /// Backend specific identifier, unique on the host.
    pub fn key(&self) -> Result<String> {
        self.call(ErrorKind::Retrieve, "virStorageVolGetKey", |v| v.key())
    }

    pub fn path(&self) -> Result<String> {
        self.call(ErrorKind::Retrieve, "virStorageVolGetPath", |v| v.path())
    }

    /// Remove the volume's storage (`vol_delete::NORMAL` or `ZEROED`).
    ///
    /// The wrapper stays valid and must still be freed.
    #[instrument(skip(self))]
    pub fn delete(&self, flags: u32) -> Result<()> {
        info!("Deleting storage volume");
        self.call(ErrorKind::Operation, "virStorageVolDelete", |v| v.delete(flags))
    }

    /// Overwrite the volume's contents.
    #[instrument(skip(self))]
    pub fn wipe(&self, flags: u32) -> Result<()> {
        info!("Wiping storage volume");
        self.call(ErrorKind::Operation, "virStorageVolWipe", |v| v.wipe(flags))
    }

    pub fn info(&self) -> Result<VolInfo> {
        let raw = self.call(ErrorKind::Retrieve, "virStorageVolGetInfo", |v| v.info())?;
        Ok(VolInfo::from(raw))
    }

    pub fn xml_desc(&self, flags: u32) -> Result<String> {
        self.call(ErrorKind::Retrieve, "virStorageVolGetXMLDesc", |v| {
            v.xml_desc(flags)
        })
    }

    /// Release the native volume object. The volume itself is untouched.
    pub fn free(&self) -> Result<()> {
        self.handle.release()
    }
}

impl std::fmt::Debug for StorageVol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageVol")
            .field("freed", &self.is_freed())
            .finish()
    }
}
