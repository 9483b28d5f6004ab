//! Storage pools.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::connection::Connection;
use crate::constants::PoolState;
use crate::error::{native_failure, ErrorKind, Result};
use crate::handle::Handle;
use crate::native::{NativePool, NativeResult, RawPoolInfo};
use crate::value::collect_names;
use crate::volume::StorageVol;

/// Snapshot returned by [`StoragePool::info`].
///
/// Plain data, independent of the pool it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub state: PoolState,
    /// Logical size in bytes
    pub capacity: u64,
    /// Bytes currently allocated
    pub allocation: u64,
    /// Bytes still free for new volumes
    pub available: u64,
}

impl From<RawPoolInfo> for PoolInfo {
    fn from(raw: RawPoolInfo) -> Self {
        Self {
            state: PoolState::from_raw(raw.state),
            capacity: raw.capacity,
            allocation: raw.allocation,
            available: raw.available,
        }
    }
}

/// A storage pool on the host.
pub struct StoragePool {
    handle: Handle<dyn NativePool>,
}

impl StoragePool {
    pub(crate) fn wrap(native: Box<dyn NativePool>, conn: &Arc<Connection>) -> Self {
        Self {
            handle: Handle::wrap("StoragePool", "virStoragePoolFree", native, conn),
        }
    }

    fn call<R>(
        &self,
        kind: ErrorKind,
        call: &'static str,
        f: impl FnOnce(&dyn NativePool) -> NativeResult<R>,
    ) -> Result<R> {
        let conn = self.handle.connection();
        self.handle
            .with(|native| f(native))?
            .map_err(|e| native_failure(kind, call, conn.as_deref(), e))
    }

    /// True once [`free`](Self::free) has run.
    pub fn is_freed(&self) -> bool {
        self.handle.is_released()
    }

    /// The connection this pool was obtained from, while it is alive.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.handle.connection()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Build the underlying storage (`pool_build::NEW`, `REPAIR`, `RESIZE`).
    #[instrument(skip(self))]
    pub fn build(&self, flags: u32) -> Result<()> {
        info!("Building storage pool");
        self.call(ErrorKind::Operation, "virStoragePoolBuild", |p| p.build(flags))
    }

    /// Remove the persistent definition.
    #[instrument(skip(self))]
    pub fn undefine(&self) -> Result<()> {
        info!("Undefining storage pool");
        self.call(ErrorKind::Operation, "virStoragePoolUndefine", |p| p.undefine())
    }

    /// Start an inactive pool.
    #[instrument(skip(self))]
    pub fn create(&self, flags: u32) -> Result<()> {
        info!("Starting storage pool");
        self.call(ErrorKind::Operation, "virStoragePoolCreate", |p| p.create(flags))
    }

    /// Stop an active pool. The underlying storage is left untouched.
    #[instrument(skip(self))]
    pub fn destroy(&self) -> Result<()> {
        info!("Stopping storage pool");
        self.call(ErrorKind::Operation, "virStoragePoolDestroy", |p| p.destroy())
    }

    /// Delete the underlying storage (`pool_delete::NORMAL` or `ZEROED`).
    #[instrument(skip(self))]
    pub fn delete(&self, flags: u32) -> Result<()> {
        info!("Deleting storage pool");
        self.call(ErrorKind::Operation, "virStoragePoolDelete", |p| p.delete(flags))
    }

    /// Rescan the pool for volumes.
    #[instrument(skip(self))]
    pub fn refresh(&self, flags: u32) -> Result<()> {
        debug!("Refreshing storage pool");
        self.call(ErrorKind::Operation, "virStoragePoolRefresh", |p| p.refresh(flags))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn name(&self) -> Result<String> {
        self.call(ErrorKind::Retrieve, "virStoragePoolGetName", |p| p.name())
    }

    pub fn uuid(&self) -> Result<String> {
        self.call(ErrorKind::Retrieve, "virStoragePoolGetUUIDString", |p| {
            p.uuid_string()
        })
    }

    /// Current state and sizes as reported by the host.
    pub fn info(&self) -> Result<PoolInfo> {
        let raw = self.call(ErrorKind::Retrieve, "virStoragePoolGetInfo", |p| p.info())?;
        Ok(PoolInfo::from(raw))
    }

    /// XML description, returned exactly as the library produced it.
    pub fn xml_desc(&self, flags: u32) -> Result<String> {
        self.call(ErrorKind::Retrieve, "virStoragePoolGetXMLDesc", |p| {
            p.xml_desc(flags)
        })
    }

    pub fn autostart(&self) -> Result<bool> {
        self.call(ErrorKind::Retrieve, "virStoragePoolGetAutostart", |p| {
            p.autostart()
        })
    }

    #[instrument(skip(self))]
    pub fn set_autostart(&self, autostart: bool) -> Result<()> {
        info!("Setting storage pool autostart");
        self.call(ErrorKind::Operation, "virStoragePoolSetAutostart", |p| {
            p.set_autostart(autostart)
        })
    }

    pub fn is_active(&self) -> Result<bool> {
        self.call(ErrorKind::Operation, "virStoragePoolIsActive", |p| p.is_active())
    }

    pub fn is_persistent(&self) -> Result<bool> {
        self.call(ErrorKind::Operation, "virStoragePoolIsPersistent", |p| {
            p.is_persistent()
        })
    }

    // =========================================================================
    // Volumes
    // =========================================================================

    pub fn num_of_volumes(&self) -> Result<u32> {
        self.call(ErrorKind::Retrieve, "virStoragePoolNumOfVolumes", |p| {
            p.num_of_volumes()
        })
    }

    /// Names of the volumes in this pool.
    pub fn list_volumes(&self) -> Result<Vec<String>> {
        collect_names(
            || self.num_of_volumes(),
            |max| {
                self.call(ErrorKind::Retrieve, "virStoragePoolListVolumes", |p| {
                    p.list_volumes(max)
                })
            },
        )
    }

    pub fn lookup_volume_by_name(&self, name: &str) -> Result<StorageVol> {
        let conn = self.handle.require_connection()?;
        let native = self.call(ErrorKind::Retrieve, "virStorageVolLookupByName", |p| {
            p.vol_lookup_by_name(name)
        })?;
        Ok(StorageVol::wrap(native, &conn))
    }

    /// Look up a volume by key.
    ///
    /// The library resolves keys per connection, so the result may live in
    /// a different pool than `self`.
    pub fn lookup_volume_by_key(&self, key: &str) -> Result<StorageVol> {
        self.handle.require_connection()?.lookup_volume_by_key(key)
    }

    /// Look up a volume by path. Resolved per connection, like
    /// [`lookup_volume_by_key`](Self::lookup_volume_by_key).
    pub fn lookup_volume_by_path(&self, path: &str) -> Result<StorageVol> {
        self.handle.require_connection()?.lookup_volume_by_path(path)
    }

    /// Create a volume from `xml`.
    #[instrument(skip(self, xml))]
    pub fn create_vol_xml(&self, xml: &str, flags: u32) -> Result<StorageVol> {
        info!("Creating storage volume");
        let conn = self.handle.require_connection()?;
        let native = self.call(ErrorKind::Operation, "virStorageVolCreateXML", |p| {
            p.vol_create_xml(xml, flags)
        })?;
        Ok(StorageVol::wrap(native, &conn))
    }

    /// Create a volume from `xml`, copying its contents from `clone`.
    #[instrument(skip(self, xml, clone))]
    pub fn create_vol_xml_from(
        &self,
        xml: &str,
        clone: &StorageVol,
        flags: u32,
    ) -> Result<StorageVol> {
        info!("Cloning storage volume");
        let conn = self.handle.require_connection()?;
        let native = clone.handle().with(|source| {
            self.call(ErrorKind::Operation, "virStorageVolCreateXMLFrom", |p| {
                p.vol_create_xml_from(xml, source, flags)
            })
        })??;
        Ok(StorageVol::wrap(native, &conn))
    }

    /// Release the native pool object. The pool itself is untouched.
    ///
    /// Any later call on this wrapper fails with `InvalidHandle`. Calling
    /// `free` again does nothing.
    pub fn free(&self) -> Result<()> {
        self.handle.release()
    }
}

impl std::fmt::Debug for StoragePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoragePool")
            .field("freed", &self.is_freed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::native::mock::MockHost;

    const POOL_XML: &str = "<pool type='dir'><name>images</name>\
        <capacity unit='bytes'>1000</capacity><allocation unit='bytes'>400</allocation>\
        <available unit='bytes'>600</available><target><path>/srv/images</path></target></pool>";

    fn setup() -> (Arc<MockHost>, Arc<Connection>) {
        let host = MockHost::new();
        let conn = Connection::from_native("mock:///", Box::new(host.connect("mock:///")));
        (host, conn)
    }

    #[test]
    fn test_info_outlives_free() {
        let (_host, conn) = setup();
        let pool = conn.create_storage_pool_xml(POOL_XML, 0).unwrap();

        let info = pool.info().unwrap();
        pool.free().unwrap();

        assert_eq!(
            info,
            PoolInfo {
                state: PoolState::Running,
                capacity: 1000,
                allocation: 400,
                available: 600,
            }
        );
        assert!(matches!(
            pool.info(),
            Err(StorageError::InvalidHandle { class: "StoragePool" })
        ));
    }

    #[test]
    fn test_list_volumes_empty_skips_fill() {
        let (host, conn) = setup();
        let pool = conn.create_storage_pool_xml(POOL_XML, 0).unwrap();

        assert!(pool.list_volumes().unwrap().is_empty());
        assert_eq!(host.calls_to("virStoragePoolNumOfVolumes"), 1);
        assert_eq!(host.calls_to("virStoragePoolListVolumes"), 0);
    }

    #[test]
    fn test_fill_failure_is_reported() {
        let (host, conn) = setup();
        let pool = conn.create_storage_pool_xml(POOL_XML, 0).unwrap();
        pool.create_vol_xml("<volume><name>a.img</name></volume>", 0).unwrap();

        host.fail_next("virStoragePoolListVolumes", "connection reset");
        let err = pool.list_volumes().unwrap_err();
        assert_eq!(err.call(), Some("virStoragePoolListVolumes"));
        assert_eq!(err.kind(), Some(ErrorKind::Retrieve));
    }

    #[test]
    fn test_lookup_by_path_goes_through_connection() {
        let (host, conn) = setup();
        let pool = conn.create_storage_pool_xml(POOL_XML, 0).unwrap();
        pool.create_vol_xml("<volume><name>a.img</name></volume>", 0).unwrap();

        let vol = pool.lookup_volume_by_path("/srv/images/a.img").unwrap();
        assert_eq!(vol.name().unwrap(), "a.img");
        assert_eq!(host.calls_to("virStorageVolLookupByPath"), 1);
    }

    #[test]
    fn test_operations_after_connection_close() {
        let (_host, conn) = setup();
        let pool = conn.define_storage_pool_xml(POOL_XML, 0).unwrap();
        conn.close().unwrap();

        // Forwarding calls still reach the pool object.
        assert_eq!(pool.name().unwrap(), "images");
        assert!(matches!(
            pool.lookup_volume_by_key("/srv/images/a.img"),
            Err(StorageError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_failure_categories() {
        let (host, conn) = setup();
        let pool = conn.define_storage_pool_xml(POOL_XML, 0).unwrap();

        let err = pool.refresh(0).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Operation));
        assert_eq!(err.call(), Some("virStoragePoolRefresh"));

        host.fail_next("virStoragePoolIsActive", "boom");
        let err = pool.is_active().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Operation));
        assert_eq!(err.uri(), Some("mock:///"));
    }
}
