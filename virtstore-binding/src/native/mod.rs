//! Native library boundary.
//!
//! These traits mirror the libvirt storage entry points one to one. A
//! method returning `Err` is the native failure indicator (a NULL pointer or
//! a negative return code in C); the error carries the library's message.
//!
//! Two implementations exist:
//! - [`libvirt`] forwards to the system library (requires the `libvirt` feature)
//! - [`mock`] keeps an in-memory host and journals every call it receives

use std::any::Any;
use std::fmt;

use crate::error::Result;

pub mod libvirt;
pub mod mock;

/// Failure reported by the native library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    /// Human-readable message from the library.
    pub message: String,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for NativeError {}

/// Result of a native call.
pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Mirror of `virStoragePoolInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPoolInfo {
    pub state: i32,
    pub capacity: u64,
    pub allocation: u64,
    pub available: u64,
}

/// Mirror of `virStorageVolInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawVolInfo {
    pub kind: i32,
    pub capacity: u64,
    pub allocation: u64,
}

/// An object owned by the native library that must be returned exactly once.
pub trait NativeObject: Send + Sync {
    /// Return the object to the library (`vir*Free`).
    fn free(self: Box<Self>) -> NativeResult<()>;

    /// Access to the concrete type, used when one native object is passed
    /// as an argument to another (volume cloning).
    fn as_any(&self) -> &dyn Any;
}

/// Native connection (`virConnectPtr`).
pub trait NativeConnect: Send + Sync {
    // =========================================================================
    // Connection
    // =========================================================================

    /// `virConnectGetURI`
    fn uri(&self) -> NativeResult<String>;

    /// `virConnectClose`
    fn close(self: Box<Self>) -> NativeResult<()>;

    // =========================================================================
    // Pool enumeration
    // =========================================================================

    /// `virConnectNumOfStoragePools`
    fn num_of_storage_pools(&self) -> NativeResult<u32>;

    /// `virConnectListStoragePools`
    fn list_storage_pools(&self, max: usize) -> NativeResult<Vec<String>>;

    /// `virConnectNumOfDefinedStoragePools`
    fn num_of_defined_storage_pools(&self) -> NativeResult<u32>;

    /// `virConnectListDefinedStoragePools`
    fn list_defined_storage_pools(&self, max: usize) -> NativeResult<Vec<String>>;

    /// `virConnectFindStoragePoolSources`
    fn find_storage_pool_sources(
        &self,
        kind: &str,
        spec: Option<&str>,
        flags: u32,
    ) -> NativeResult<String>;

    // =========================================================================
    // Pool lookup and creation
    // =========================================================================

    /// `virStoragePoolLookupByName`
    fn pool_lookup_by_name(&self, name: &str) -> NativeResult<Box<dyn NativePool>>;

    /// `virStoragePoolLookupByUUIDString`
    fn pool_lookup_by_uuid_string(&self, uuid: &str) -> NativeResult<Box<dyn NativePool>>;

    /// `virStoragePoolCreateXML`
    fn pool_create_xml(&self, xml: &str, flags: u32) -> NativeResult<Box<dyn NativePool>>;

    /// `virStoragePoolDefineXML`
    fn pool_define_xml(&self, xml: &str, flags: u32) -> NativeResult<Box<dyn NativePool>>;

    // =========================================================================
    // Volume lookup (connection scoped in the library)
    // =========================================================================

    /// `virStorageVolLookupByKey`
    fn vol_lookup_by_key(&self, key: &str) -> NativeResult<Box<dyn NativeVol>>;

    /// `virStorageVolLookupByPath`
    fn vol_lookup_by_path(&self, path: &str) -> NativeResult<Box<dyn NativeVol>>;
}

/// Native storage pool (`virStoragePoolPtr`).
pub trait NativePool: NativeObject {
    /// `virStoragePoolBuild`
    fn build(&self, flags: u32) -> NativeResult<()>;

    /// `virStoragePoolUndefine`
    fn undefine(&self) -> NativeResult<()>;

    /// `virStoragePoolCreate`
    fn create(&self, flags: u32) -> NativeResult<()>;

    /// `virStoragePoolDestroy`
    fn destroy(&self) -> NativeResult<()>;

    /// `virStoragePoolDelete`
    fn delete(&self, flags: u32) -> NativeResult<()>;

    /// `virStoragePoolRefresh`
    fn refresh(&self, flags: u32) -> NativeResult<()>;

    /// `virStoragePoolGetName`
    fn name(&self) -> NativeResult<String>;

    /// `virStoragePoolGetUUIDString`
    fn uuid_string(&self) -> NativeResult<String>;

    /// `virStoragePoolGetInfo`
    fn info(&self) -> NativeResult<RawPoolInfo>;

    /// `virStoragePoolGetXMLDesc`
    fn xml_desc(&self, flags: u32) -> NativeResult<String>;

    /// `virStoragePoolGetAutostart`
    fn autostart(&self) -> NativeResult<bool>;

    /// `virStoragePoolSetAutostart`
    fn set_autostart(&self, autostart: bool) -> NativeResult<()>;

    /// `virStoragePoolNumOfVolumes`
    fn num_of_volumes(&self) -> NativeResult<u32>;

    /// `virStoragePoolListVolumes`
    fn list_volumes(&self, max: usize) -> NativeResult<Vec<String>>;

    /// `virStoragePoolIsActive`
    fn is_active(&self) -> NativeResult<bool>;

    /// `virStoragePoolIsPersistent`
    fn is_persistent(&self) -> NativeResult<bool>;

    /// `virStorageVolLookupByName`
    fn vol_lookup_by_name(&self, name: &str) -> NativeResult<Box<dyn NativeVol>>;

    /// `virStorageVolCreateXML`
    fn vol_create_xml(&self, xml: &str, flags: u32) -> NativeResult<Box<dyn NativeVol>>;

    /// `virStorageVolCreateXMLFrom`
    fn vol_create_xml_from(
        &self,
        xml: &str,
        clone: &dyn NativeVol,
        flags: u32,
    ) -> NativeResult<Box<dyn NativeVol>>;
}

/// Native storage volume (`virStorageVolPtr`).
pub trait NativeVol: NativeObject {
    /// `virStoragePoolLookupByVolume`
    fn pool(&self) -> NativeResult<Box<dyn NativePool>>;

    /// `virStorageVolGetName`
    fn name(&self) -> NativeResult<String>;

    /// `virStorageVolGetKey`
    fn key(&self) -> NativeResult<String>;

    /// `virStorageVolGetPath`
    fn path(&self) -> NativeResult<String>;

    /// `virStorageVolDelete`
    fn delete(&self, flags: u32) -> NativeResult<()>;

    /// `virStorageVolWipe`
    fn wipe(&self, flags: u32) -> NativeResult<()>;

    /// `virStorageVolGetInfo`
    fn info(&self) -> NativeResult<RawVolInfo>;

    /// `virStorageVolGetXMLDesc`
    fn xml_desc(&self, flags: u32) -> NativeResult<String>;
}

/// Open a native connection for `uri`.
///
/// `mock://` and `test://` URIs select the in-memory host. Everything else
/// goes to libvirt when it is compiled in.
pub fn connect(uri: &str) -> Result<Box<dyn NativeConnect>> {
    if mock::handles_uri(uri) {
        return Ok(Box::new(mock::MockConnect::open(uri)));
    }

    #[cfg(feature = "libvirt")]
    {
        let conn = libvirt::LibvirtConnect::open(uri)?;
        Ok(Box::new(conn))
    }

    #[cfg(not(feature = "libvirt"))]
    {
        Err(crate::error::StorageError::ConnectionFailed(format!(
            "{}: libvirt support is not compiled in",
            uri
        )))
    }
}

/// Check if the libvirt backend is compiled in.
pub fn libvirt_available() -> bool {
    libvirt::is_available()
}
