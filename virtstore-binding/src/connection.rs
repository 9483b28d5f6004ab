//! Connections and the connection-scoped storage operations.

use std::sync::{Arc, RwLock};

use tracing::{debug, info, instrument};

use crate::error::{native_failure, ErrorKind, Result, StorageError};
use crate::native::{self, NativeConnect, NativeResult};
use crate::pool::StoragePool;
use crate::value::collect_names;
use crate::volume::StorageVol;

/// A session to a virtualization host.
///
/// Pools and volumes obtained through a connection only keep a weak
/// reference to it. Dropping the last `Arc` (or calling [`close`]) ends the
/// session for connection-scoped calls.
///
/// [`close`]: Connection::close
pub struct Connection {
    uri: String,
    native: RwLock<Option<Box<dyn NativeConnect>>>,
}

impl Connection {
    /// Open a connection to `uri`.
    ///
    /// Common URIs:
    /// - `qemu:///system` - System-wide QEMU/KVM
    /// - `qemu+ssh://user@host/system` - Remote via SSH
    /// - `test:///default` - In-memory host with one running pool
    /// - `mock:///` - Empty in-memory host
    pub fn open(uri: &str) -> Result<Arc<Self>> {
        info!(uri = %uri, "Opening storage connection");
        let native = native::connect(uri)?;
        Ok(Self::from_native(uri, native))
    }

    /// Wrap an already opened native connection.
    pub fn from_native(uri: &str, native: Box<dyn NativeConnect>) -> Arc<Self> {
        Arc::new(Self {
            uri: uri.to_string(),
            native: RwLock::new(Some(native)),
        })
    }

    /// URI this connection was opened with.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_closed(&self) -> bool {
        self.native.read().map(|n| n.is_none()).unwrap_or(true)
    }

    /// Close the connection. Closing twice is a no-op.
    #[instrument(skip(self), fields(uri = %self.uri))]
    pub fn close(&self) -> Result<()> {
        let native = self
            .native
            .write()
            .map_err(|_| StorageError::Internal("Lock poisoned".to_string()))?
            .take();

        match native {
            Some(native) => {
                info!("Closing storage connection");
                native.close().map_err(|e| {
                    native_failure(ErrorKind::Operation, "virConnectClose", Some(self), e)
                })
            }
            None => Ok(()),
        }
    }

    /// Run one native call, translating its failure.
    pub(crate) fn call<R>(
        &self,
        kind: ErrorKind,
        call: &'static str,
        f: impl FnOnce(&dyn NativeConnect) -> NativeResult<R>,
    ) -> Result<R> {
        let slot = self
            .native
            .read()
            .map_err(|_| StorageError::Internal("Lock poisoned".to_string()))?;
        let native = slot.as_deref().ok_or(StorageError::ConnectionClosed)?;

        f(native).map_err(|e| native_failure(kind, call, Some(self), e))
    }

    /// URI reported by the library (`virConnectGetURI`).
    pub fn get_uri(&self) -> Result<String> {
        self.call(ErrorKind::Retrieve, "virConnectGetURI", |c| c.uri())
    }

    // =========================================================================
    // Pool enumeration
    // =========================================================================

    /// Number of active storage pools.
    pub fn num_of_storage_pools(&self) -> Result<u32> {
        self.call(ErrorKind::Retrieve, "virConnectNumOfStoragePools", |c| {
            c.num_of_storage_pools()
        })
    }

    /// Names of the active storage pools.
    pub fn list_storage_pools(&self) -> Result<Vec<String>> {
        collect_names(
            || self.num_of_storage_pools(),
            |max| {
                self.call(ErrorKind::Retrieve, "virConnectListStoragePools", |c| {
                    c.list_storage_pools(max)
                })
            },
        )
    }

    /// Number of inactive, persistent storage pools.
    pub fn num_of_defined_storage_pools(&self) -> Result<u32> {
        self.call(
            ErrorKind::Retrieve,
            "virConnectNumOfDefinedStoragePools",
            |c| c.num_of_defined_storage_pools(),
        )
    }

    /// Names of the inactive, persistent storage pools.
    pub fn list_defined_storage_pools(&self) -> Result<Vec<String>> {
        collect_names(
            || self.num_of_defined_storage_pools(),
            |max| {
                self.call(
                    ErrorKind::Retrieve,
                    "virConnectListDefinedStoragePools",
                    |c| c.list_defined_storage_pools(max),
                )
            },
        )
    }

    /// Probe the host for potential pool sources of type `kind`.
    ///
    /// Returns the XML document produced by the library.
    #[instrument(skip(self, spec))]
    pub fn discover_storage_pool_sources(
        &self,
        kind: &str,
        spec: Option<&str>,
        flags: u32,
    ) -> Result<String> {
        debug!("Discovering storage pool sources");
        self.call(
            ErrorKind::Retrieve,
            "virConnectFindStoragePoolSources",
            |c| c.find_storage_pool_sources(kind, spec, flags),
        )
    }

    // =========================================================================
    // Pool lookup and creation
    // =========================================================================

    /// Look up a storage pool by name.
    pub fn lookup_storage_pool_by_name(self: &Arc<Self>, name: &str) -> Result<StoragePool> {
        let native = self.call(ErrorKind::Retrieve, "virStoragePoolLookupByName", |c| {
            c.pool_lookup_by_name(name)
        })?;
        Ok(StoragePool::wrap(native, self))
    }

    /// Look up a storage pool by its UUID string.
    pub fn lookup_storage_pool_by_uuid(self: &Arc<Self>, uuid: &str) -> Result<StoragePool> {
        let native = self.call(
            ErrorKind::Retrieve,
            "virStoragePoolLookupByUUIDString",
            |c| c.pool_lookup_by_uuid_string(uuid),
        )?;
        Ok(StoragePool::wrap(native, self))
    }

    /// Start a transient storage pool from `xml`.
    #[instrument(skip(self, xml), fields(uri = %self.uri))]
    pub fn create_storage_pool_xml(self: &Arc<Self>, xml: &str, flags: u32) -> Result<StoragePool> {
        info!(flags, "Creating transient storage pool");
        let native = self.call(ErrorKind::Operation, "virStoragePoolCreateXML", |c| {
            c.pool_create_xml(xml, flags)
        })?;
        Ok(StoragePool::wrap(native, self))
    }

    /// Define a persistent storage pool from `xml`.
    #[instrument(skip(self, xml), fields(uri = %self.uri))]
    pub fn define_storage_pool_xml(self: &Arc<Self>, xml: &str, flags: u32) -> Result<StoragePool> {
        info!(flags, "Defining storage pool");
        let native = self.call(ErrorKind::Definition, "virStoragePoolDefineXML", |c| {
            c.pool_define_xml(xml, flags)
        })?;
        Ok(StoragePool::wrap(native, self))
    }

    // =========================================================================
    // Volume lookup
    // =========================================================================

    pub(crate) fn lookup_volume_by_key(self: &Arc<Self>, key: &str) -> Result<StorageVol> {
        let native = self.call(ErrorKind::Retrieve, "virStorageVolLookupByKey", |c| {
            c.vol_lookup_by_key(key)
        })?;
        Ok(StorageVol::wrap(native, self))
    }

    pub(crate) fn lookup_volume_by_path(self: &Arc<Self>, path: &str) -> Result<StorageVol> {
        let native = self.call(ErrorKind::Retrieve, "virStorageVolLookupByPath", |c| {
            c.vol_lookup_by_path(path)
        })?;
        Ok(StorageVol::wrap(native, self))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("uri", &self.uri)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::mock::{MockHost, DEFAULT_POOL_NAME};

    #[test]
    fn test_open_mock_uri() {
        let conn = Connection::open("test:///default").unwrap();
        assert_eq!(conn.uri(), "test:///default");
        assert_eq!(conn.get_uri().unwrap(), "test:///default");
        assert_eq!(conn.list_storage_pools().unwrap(), vec![DEFAULT_POOL_NAME]);
        assert!(conn.list_defined_storage_pools().unwrap().is_empty());
    }

    #[cfg(not(feature = "libvirt"))]
    #[test]
    fn test_open_without_libvirt_fails() {
        let err = Connection::open("qemu:///system").unwrap_err();
        assert!(matches!(err, StorageError::ConnectionFailed(_)));
    }

    #[test]
    fn test_close_twice() {
        let host = MockHost::new();
        let conn = Connection::from_native("mock:///", Box::new(host.connect("mock:///")));

        conn.close().unwrap();
        conn.close().unwrap();
        assert!(conn.is_closed());
        assert_eq!(host.calls_to("virConnectClose"), 1);
        assert!(matches!(
            conn.num_of_storage_pools(),
            Err(StorageError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_empty_list_skips_fill() {
        let host = MockHost::new();
        let conn = Connection::from_native("mock:///", Box::new(host.connect("mock:///")));

        assert!(conn.list_storage_pools().unwrap().is_empty());
        assert_eq!(host.calls_to("virConnectNumOfStoragePools"), 1);
        assert_eq!(host.calls_to("virConnectListStoragePools"), 0);
    }

    #[test]
    fn test_failed_lookup_is_retrieve_error() {
        let conn = Connection::open("mock:///").unwrap();
        let err = conn.lookup_storage_pool_by_name("missing").unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::Retrieve));
        assert_eq!(err.call(), Some("virStoragePoolLookupByName"));
        assert_eq!(err.uri(), Some("mock:///"));
    }
}
