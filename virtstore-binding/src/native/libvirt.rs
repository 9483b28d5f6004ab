//! Native boundary backed by the system libvirt.
//!
//! Requires the `libvirt` feature and libvirt installed on the host.

/// Check if the libvirt backend is compiled in.
pub fn is_available() -> bool {
    cfg!(feature = "libvirt")
}

#[cfg(feature = "libvirt")]
pub use backend::{LibvirtConnect, LibvirtPool, LibvirtVol};

#[cfg(feature = "libvirt")]
mod backend {
    use std::any::Any;
    use std::ffi::CStr;
    use std::ptr;

    use libc::{c_char, c_int};
    use tracing::{debug, info, warn};
    use virt::connect::Connect;
    use virt::storage_pool::StoragePool;
    use virt::storage_vol::StorageVol;

    use crate::error::{Result, StorageError};
    use crate::native::{
        NativeConnect, NativeError, NativeObject, NativePool, NativeResult, NativeVol,
        RawPoolInfo, RawVolInfo,
    };

    fn native(e: virt::error::Error) -> NativeError {
        NativeError::new(e.to_string())
    }

    /// Run a libvirt list call with a buffer of exactly `max` slots.
    ///
    /// `fill` gets the buffer and its length and returns the number of names
    /// written, or -1. Every returned string is owned by the caller and freed
    /// here.
    fn fill_names<F>(max: usize, fill: F) -> NativeResult<Vec<String>>
    where
        F: FnOnce(*mut *mut c_char, c_int) -> c_int,
    {
        let maxnames = c_int::try_from(max)
            .map_err(|_| NativeError::new(format!("too many names to list: {}", max)))?;
        let mut buf: Vec<*mut c_char> = vec![ptr::null_mut(); max];

        let got = fill(buf.as_mut_ptr(), maxnames);
        if got < 0 {
            return Err(native(virt::error::Error::last_error()));
        }

        let got = usize::try_from(got).unwrap_or(0).min(max);
        let names = buf[..got]
            .iter()
            .filter(|p| !p.is_null())
            .map(|&p| {
                // SAFETY: libvirt hands back NUL terminated strings allocated
                // with malloc, one per filled slot.
                unsafe {
                    let name = CStr::from_ptr(p).to_string_lossy().into_owned();
                    libc::free(p.cast());
                    name
                }
            })
            .collect();
        Ok(names)
    }

    /// Free a virt object exactly once.
    ///
    /// virt keeps its pointer after a failed free and its `Drop` would free
    /// it again and panic, so the object is leaked on failure.
    fn free_once<T, E, F>(mut obj: T, free: F) -> NativeResult<()>
    where
        E: std::fmt::Display,
        F: FnOnce(&mut T) -> std::result::Result<(), E>,
    {
        match free(&mut obj) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Native free failed, leaking object");
                std::mem::forget(obj);
                Err(NativeError::new(e.to_string()))
            }
        }
    }

    /// Libvirt connection.
    pub struct LibvirtConnect {
        conn: Connect,
    }

    // SAFETY: libvirt connections are thread safe since 0.6.0. The wrapper
    // only hands out shared references to the raw pointer.
    unsafe impl Send for LibvirtConnect {}
    unsafe impl Sync for LibvirtConnect {}

    impl LibvirtConnect {
        /// Connect to the libvirt daemon at `uri`.
        ///
        /// Common URIs:
        /// - `qemu:///system` - System-wide QEMU/KVM
        /// - `qemu:///session` - User session QEMU
        /// - `qemu+ssh://user@host/system` - Remote via SSH
        pub fn open(uri: &str) -> Result<Self> {
            info!(uri = %uri, "Connecting to libvirt");

            let conn = Connect::open(Some(uri))
                .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

            info!("Connected to libvirt");
            Ok(Self { conn })
        }
    }

    impl NativeConnect for LibvirtConnect {
        fn uri(&self) -> NativeResult<String> {
            self.conn.get_uri().map_err(native)
        }

        fn close(mut self: Box<Self>) -> NativeResult<()> {
            debug!("Closing libvirt connection");
            self.conn.close().map(|_| ()).map_err(native)
        }

        fn num_of_storage_pools(&self) -> NativeResult<u32> {
            self.conn.num_of_storage_pools().map_err(native)
        }

        fn list_storage_pools(&self, max: usize) -> NativeResult<Vec<String>> {
            let conn = self.conn.as_ptr();
            // SAFETY: `conn` stays valid while `self` is borrowed.
            fill_names(max, |names, n| unsafe {
                virt::sys::virConnectListStoragePools(conn, names, n)
            })
        }

        fn num_of_defined_storage_pools(&self) -> NativeResult<u32> {
            self.conn.num_of_defined_storage_pools().map_err(native)
        }

        fn list_defined_storage_pools(&self, max: usize) -> NativeResult<Vec<String>> {
            let conn = self.conn.as_ptr();
            // SAFETY: `conn` stays valid while `self` is borrowed.
            fill_names(max, |names, n| unsafe {
                virt::sys::virConnectListDefinedStoragePools(conn, names, n)
            })
        }

        fn find_storage_pool_sources(
            &self,
            kind: &str,
            spec: Option<&str>,
            flags: u32,
        ) -> NativeResult<String> {
            self.conn
                .find_storage_pool_sources(kind, spec, flags)
                .map_err(native)
        }

        fn pool_lookup_by_name(&self, name: &str) -> NativeResult<Box<dyn NativePool>> {
            let pool = StoragePool::lookup_by_name(&self.conn, name).map_err(native)?;
            Ok(Box::new(LibvirtPool { pool }))
        }

        fn pool_lookup_by_uuid_string(&self, uuid: &str) -> NativeResult<Box<dyn NativePool>> {
            let pool = StoragePool::lookup_by_uuid_string(&self.conn, uuid).map_err(native)?;
            Ok(Box::new(LibvirtPool { pool }))
        }

        fn pool_create_xml(&self, xml: &str, flags: u32) -> NativeResult<Box<dyn NativePool>> {
            let pool = StoragePool::create_xml(&self.conn, xml, flags).map_err(native)?;
            Ok(Box::new(LibvirtPool { pool }))
        }

        fn pool_define_xml(&self, xml: &str, flags: u32) -> NativeResult<Box<dyn NativePool>> {
            let pool = StoragePool::define_xml(&self.conn, xml, flags).map_err(native)?;
            Ok(Box::new(LibvirtPool { pool }))
        }

        fn vol_lookup_by_key(&self, key: &str) -> NativeResult<Box<dyn NativeVol>> {
            let vol = StorageVol::lookup_by_key(&self.conn, key).map_err(native)?;
            Ok(Box::new(LibvirtVol { vol }))
        }

        fn vol_lookup_by_path(&self, path: &str) -> NativeResult<Box<dyn NativeVol>> {
            let vol = StorageVol::lookup_by_path(&self.conn, path).map_err(native)?;
            Ok(Box::new(LibvirtVol { vol }))
        }
    }

    /// Libvirt storage pool.
    pub struct LibvirtPool {
        pool: StoragePool,
    }

    // SAFETY: see `LibvirtConnect`.
    unsafe impl Send for LibvirtPool {}
    unsafe impl Sync for LibvirtPool {}

    impl NativeObject for LibvirtPool {
        fn free(self: Box<Self>) -> NativeResult<()> {
            let LibvirtPool { pool } = *self;
            free_once(pool, |p| p.free())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl NativePool for LibvirtPool {
        fn build(&self, flags: u32) -> NativeResult<()> {
            self.pool.build(flags).map(|_| ()).map_err(native)
        }

        fn undefine(&self) -> NativeResult<()> {
            self.pool.undefine().map(|_| ()).map_err(native)
        }

        fn create(&self, flags: u32) -> NativeResult<()> {
            self.pool.create(flags).map(|_| ()).map_err(native)
        }

        fn destroy(&self) -> NativeResult<()> {
            self.pool.destroy().map(|_| ()).map_err(native)
        }

        fn delete(&self, flags: u32) -> NativeResult<()> {
            self.pool.delete(flags).map(|_| ()).map_err(native)
        }

        fn refresh(&self, flags: u32) -> NativeResult<()> {
            self.pool.refresh(flags).map(|_| ()).map_err(native)
        }

        fn name(&self) -> NativeResult<String> {
            self.pool.get_name().map_err(native)
        }

        fn uuid_string(&self) -> NativeResult<String> {
            self.pool.get_uuid_string().map_err(native)
        }

        fn info(&self) -> NativeResult<RawPoolInfo> {
            let info = self.pool.get_info().map_err(native)?;
            Ok(RawPoolInfo {
                state: info.state as i32,
                capacity: info.capacity,
                allocation: info.allocation,
                available: info.available,
            })
        }

        fn xml_desc(&self, flags: u32) -> NativeResult<String> {
            self.pool.get_xml_desc(flags).map_err(native)
        }

        fn autostart(&self) -> NativeResult<bool> {
            self.pool.get_autostart().map_err(native)
        }

        fn set_autostart(&self, autostart: bool) -> NativeResult<()> {
            self.pool.set_autostart(autostart).map(|_| ()).map_err(native)
        }

        fn num_of_volumes(&self) -> NativeResult<u32> {
            self.pool.num_of_volumes().map_err(native)
        }

        fn list_volumes(&self, max: usize) -> NativeResult<Vec<String>> {
            let pool = self.pool.as_ptr();
            // SAFETY: `pool` stays valid while `self` is borrowed.
            fill_names(max, |names, n| unsafe {
                virt::sys::virStoragePoolListVolumes(pool, names, n)
            })
        }

        fn is_active(&self) -> NativeResult<bool> {
            self.pool.is_active().map_err(native)
        }

        fn is_persistent(&self) -> NativeResult<bool> {
            self.pool.is_persistent().map_err(native)
        }

        fn vol_lookup_by_name(&self, name: &str) -> NativeResult<Box<dyn NativeVol>> {
            let vol = StorageVol::lookup_by_name(&self.pool, name).map_err(native)?;
            Ok(Box::new(LibvirtVol { vol }))
        }

        fn vol_create_xml(&self, xml: &str, flags: u32) -> NativeResult<Box<dyn NativeVol>> {
            let vol = StorageVol::create_xml(&self.pool, xml, flags).map_err(native)?;
            Ok(Box::new(LibvirtVol { vol }))
        }

        fn vol_create_xml_from(
            &self,
            xml: &str,
            clone: &dyn NativeVol,
            flags: u32,
        ) -> NativeResult<Box<dyn NativeVol>> {
            let source = clone
                .as_any()
                .downcast_ref::<LibvirtVol>()
                .ok_or_else(|| NativeError::new("Invalid storage volume: not a libvirt volume"))?;
            let vol = StorageVol::create_xml_from(&self.pool, xml, &source.vol, flags)
                .map_err(native)?;
            Ok(Box::new(LibvirtVol { vol }))
        }
    }

    /// Libvirt storage volume.
    pub struct LibvirtVol {
        vol: StorageVol,
    }

    // SAFETY: see `LibvirtConnect`.
    unsafe impl Send for LibvirtVol {}
    unsafe impl Sync for LibvirtVol {}

    impl NativeObject for LibvirtVol {
        fn free(self: Box<Self>) -> NativeResult<()> {
            let LibvirtVol { vol } = *self;
            free_once(vol, |v| v.free())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl NativeVol for LibvirtVol {
        fn pool(&self) -> NativeResult<Box<dyn NativePool>> {
            let pool = StoragePool::lookup_by_volume(&self.vol).map_err(native)?;
            Ok(Box::new(LibvirtPool { pool }))
        }

        fn name(&self) -> NativeResult<String> {
            self.vol.get_name().map_err(native)
        }

        fn key(&self) -> NativeResult<String> {
            self.vol.get_key().map_err(native)
        }

        fn path(&self) -> NativeResult<String> {
            self.vol.get_path().map_err(native)
        }

        fn delete(&self, flags: u32) -> NativeResult<()> {
            self.vol.delete(flags).map(|_| ()).map_err(native)
        }

        fn wipe(&self, flags: u32) -> NativeResult<()> {
            self.vol.wipe(flags).map(|_| ()).map_err(native)
        }

        fn info(&self) -> NativeResult<RawVolInfo> {
            let info = self.vol.get_info().map_err(native)?;
            Ok(RawVolInfo {
                kind: info.kind as i32,
                capacity: info.capacity,
                allocation: info.allocation,
            })
        }

        fn xml_desc(&self, flags: u32) -> NativeResult<String> {
            self.vol.get_xml_desc(flags).map_err(native)
        }
    }

}
