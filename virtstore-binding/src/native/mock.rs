//! Mock storage host for testing and development.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use super::{
    NativeConnect, NativeError, NativeObject, NativePool, NativeResult, NativeVol, RawPoolInfo,
    RawVolInfo,
};
use crate::constants::{pool_state, vol_type};
use crate::xml::{PoolXml, VolumeXml};

/// Capacity reported for pools whose XML does not declare one.
pub const DEFAULT_POOL_CAPACITY: u64 = 10 * 1024 * 1024 * 1024;

/// Name of the pool every `test:///default` host starts with.
pub const DEFAULT_POOL_NAME: &str = "default-pool";

/// Sources reported for `logical` discovery.
const LOGICAL_SOURCES: &str = "<sources>
  <source>
    <name>vg0</name>
    <format type='lvm2'/>
  </source>
</sources>
";

const DEFAULT_POOL_XML: &str = "<pool type='dir'>
  <name>default-pool</name>
  <uuid>dfe224cb-28fb-8dd0-c4b2-64eb3f0f4566</uuid>
  <capacity unit='bytes'>107374182400</capacity>
  <allocation unit='bytes'>0</allocation>
  <target>
    <path>/default-pool</path>
  </target>
</pool>";

/// Check whether `uri` is served by the mock host.
pub(crate) fn handles_uri(uri: &str) -> bool {
    uri.starts_with("mock://") || uri.starts_with("test://")
}

/// One entry of the host's call journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCall {
    /// Native entry point name, e.g. `virStoragePoolBuild`.
    pub name: &'static str,
    /// Flags argument, for entry points that take one.
    pub flags: Option<u32>,
}

/// In-memory stand-in for a libvirt host.
///
/// Every entry point invoked through a [`MockConnect`] (or any pool or
/// volume obtained from it) is appended to a journal. A failure can be
/// injected for the next invocation of any entry point. Useful for:
/// - Unit and integration testing
/// - Development without libvirt installed
pub struct MockHost {
    pools: RwLock<BTreeMap<String, MockPool>>,
    journal: Mutex<Vec<NativeCall>>,
    failures: Mutex<HashMap<&'static str, String>>,
    live_objects: AtomicUsize,
}

struct MockPool {
    uuid: String,
    xml: String,
    state: i32,
    persistent: bool,
    autostart: bool,
    capacity: u64,
    allocation: u64,
    available: Option<u64>,
    target_path: String,
    volumes: BTreeMap<String, MockVolume>,
}

struct MockVolume {
    xml: String,
    kind: i32,
    capacity: u64,
    allocation: u64,
    path: String,
}

impl MockPool {
    fn from_xml(xml: &str, def: PoolXml, state: i32, persistent: bool) -> Self {
        let target_path = def
            .target_path
            .unwrap_or_else(|| format!("/var/lib/virtstore/{}", def.name));

        Self {
            uuid: def
                .uuid
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            xml: xml.to_string(),
            state,
            persistent,
            autostart: false,
            capacity: def.capacity.unwrap_or(DEFAULT_POOL_CAPACITY),
            allocation: def.allocation.unwrap_or(0),
            available: def.available,
            target_path,
            volumes: BTreeMap::new(),
        }
    }

    fn is_active(&self) -> bool {
        self.state != pool_state::INACTIVE
    }

    fn info(&self) -> RawPoolInfo {
        let allocation = self
            .volumes
            .values()
            .fold(self.allocation, |acc, v| acc.saturating_add(v.allocation));

        RawPoolInfo {
            state: self.state,
            capacity: self.capacity,
            allocation,
            available: self
                .available
                .unwrap_or_else(|| self.capacity.saturating_sub(allocation)),
        }
    }
}

impl MockHost {
    /// Create an empty mock host.
    pub fn new() -> Arc<Self> {
        info!("Creating mock storage host");
        Arc::new(Self {
            pools: RwLock::new(BTreeMap::new()),
            journal: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            live_objects: AtomicUsize::new(0),
        })
    }

    /// Create a mock host holding one running, persistent `default-pool`.
    pub fn with_default_pool() -> Arc<Self> {
        let host = Self::new();
        if let Ok(def) = PoolXml::parse(DEFAULT_POOL_XML) {
            if let Ok(mut pools) = host.pools.write() {
                let mut pool =
                    MockPool::from_xml(DEFAULT_POOL_XML, def, pool_state::RUNNING, true);
                pool.autostart = true;
                pools.insert(DEFAULT_POOL_NAME.to_string(), pool);
            }
        }
        host
    }

    /// Open a connection to this host.
    pub fn connect(self: &Arc<Self>, uri: &str) -> MockConnect {
        MockConnect {
            host: Arc::clone(self),
            uri: uri.to_string(),
        }
    }

    // =========================================================================
    // Inspection (test support)
    // =========================================================================

    /// Every call received so far, oldest first.
    pub fn calls(&self) -> Vec<NativeCall> {
        self.journal
            .lock()
            .map(|j| j.clone())
            .unwrap_or_default()
    }

    /// Number of times `name` was invoked.
    pub fn calls_to(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.name == name).count()
    }

    /// Flags passed to the most recent invocation of `name`.
    pub fn last_flags(&self, name: &str) -> Option<u32> {
        self.calls()
            .iter()
            .rev()
            .find(|c| c.name == name)
            .and_then(|c| c.flags)
    }

    /// Make the next invocation of `call` fail with `message`.
    pub fn fail_next(&self, call: &'static str, message: impl Into<String>) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(call, message.into());
        }
    }

    /// Pool and volume objects handed out and not yet freed.
    pub fn live_objects(&self) -> usize {
        self.live_objects.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Journal an entry point and fire any injected failure for it.
    fn enter(&self, name: &'static str, flags: Option<u32>) -> NativeResult<()> {
        self.journal
            .lock()
            .map_err(|_| NativeError::new("Lock poisoned"))?
            .push(NativeCall { name, flags });

        let injected = self
            .failures
            .lock()
            .map_err(|_| NativeError::new("Lock poisoned"))?
            .remove(name);

        match injected {
            Some(message) => {
                debug!(call = name, "Injected failure");
                Err(NativeError::new(message))
            }
            None => Ok(()),
        }
    }

    fn read(&self) -> NativeResult<RwLockReadGuard<'_, BTreeMap<String, MockPool>>> {
        self.pools
            .read()
            .map_err(|_| NativeError::new("Lock poisoned"))
    }

    fn write(&self) -> NativeResult<RwLockWriteGuard<'_, BTreeMap<String, MockPool>>> {
        self.pools
            .write()
            .map_err(|_| NativeError::new("Lock poisoned"))
    }

    fn pool_ref(self: &Arc<Self>, name: &str) -> Box<dyn NativePool> {
        self.live_objects.fetch_add(1, Ordering::SeqCst);
        Box::new(MockPoolRef {
            host: Arc::clone(self),
            name: name.to_string(),
        })
    }

    fn vol_ref(self: &Arc<Self>, pool: &str, name: &str) -> Box<dyn NativeVol> {
        self.live_objects.fetch_add(1, Ordering::SeqCst);
        Box::new(MockVolRef {
            host: Arc::clone(self),
            pool: pool.to_string(),
            name: name.to_string(),
        })
    }

    fn released(&self) {
        self.live_objects.fetch_sub(1, Ordering::SeqCst);
    }

    /// Find the volume whose key (or path) equals `needle`.
    fn find_volume(&self, needle: &str) -> NativeResult<Option<(String, String)>> {
        let pools = self.read()?;
        Ok(pools.iter().find_map(|(pool_name, pool)| {
            pool.volumes
                .iter()
                .find(|(_, v)| v.path == needle)
                .map(|(vol_name, _)| (pool_name.clone(), vol_name.clone()))
        }))
    }
}

fn no_pool(name: &str) -> NativeError {
    NativeError::new(format!(
        "Storage pool not found: no storage pool with matching name '{}'",
        name
    ))
}

fn no_volume(name: &str) -> NativeError {
    NativeError::new(format!(
        "Storage volume not found: no storage vol with matching name '{}'",
        name
    ))
}

fn not_active(name: &str) -> NativeError {
    NativeError::new(format!(
        "Requested operation is not valid: storage pool '{}' is not active",
        name
    ))
}

fn already_active(name: &str) -> NativeError {
    NativeError::new(format!(
        "Requested operation is not valid: storage pool '{}' is already active",
        name
    ))
}

fn check_flags(flags: u32, allowed: u32) -> NativeResult<()> {
    if flags & !allowed != 0 {
        return Err(NativeError::new(format!(
            "Invalid argument: unsupported flags (0x{:x})",
            flags & !allowed
        )));
    }
    Ok(())
}

fn vol_kind(kind: Option<&str>) -> NativeResult<i32> {
    match kind {
        None | Some("file") => Ok(vol_type::FILE),
        Some("block") => Ok(vol_type::BLOCK),
        Some(other) => Err(NativeError::new(format!(
            "XML error: unknown volume type '{}'",
            other
        ))),
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Connection to a [`MockHost`].
pub struct MockConnect {
    host: Arc<MockHost>,
    uri: String,
}

impl MockConnect {
    /// Open a mock connection. `test:///default` starts with `default-pool`.
    pub fn open(uri: &str) -> Self {
        let host = if uri == "test:///default" {
            MockHost::with_default_pool()
        } else {
            MockHost::new()
        };
        host.connect(uri)
    }

    /// The host behind this connection.
    pub fn host(&self) -> &Arc<MockHost> {
        &self.host
    }

    fn names(&self, active: bool, max: usize) -> NativeResult<Vec<String>> {
        let pools = self.host.read()?;
        Ok(pools
            .iter()
            .filter(|(_, p)| {
                if active {
                    p.is_active()
                } else {
                    p.persistent && !p.is_active()
                }
            })
            .map(|(name, _)| name.clone())
            .take(max)
            .collect())
    }
}

impl NativeConnect for MockConnect {
    fn uri(&self) -> NativeResult<String> {
        self.host.enter("virConnectGetURI", None)?;
        Ok(self.uri.clone())
    }

    fn close(self: Box<Self>) -> NativeResult<()> {
        self.host.enter("virConnectClose", None)
    }

    fn num_of_storage_pools(&self) -> NativeResult<u32> {
        self.host.enter("virConnectNumOfStoragePools", None)?;
        Ok(self.names(true, usize::MAX)?.len() as u32)
    }

    fn list_storage_pools(&self, max: usize) -> NativeResult<Vec<String>> {
        self.host.enter("virConnectListStoragePools", None)?;
        self.names(true, max)
    }

    fn num_of_defined_storage_pools(&self) -> NativeResult<u32> {
        self.host.enter("virConnectNumOfDefinedStoragePools", None)?;
        Ok(self.names(false, usize::MAX)?.len() as u32)
    }

    fn list_defined_storage_pools(&self, max: usize) -> NativeResult<Vec<String>> {
        self.host.enter("virConnectListDefinedStoragePools", None)?;
        self.names(false, max)
    }

    fn find_storage_pool_sources(
        &self,
        kind: &str,
        spec: Option<&str>,
        flags: u32,
    ) -> NativeResult<String> {
        self.host.enter("virConnectFindStoragePoolSources", Some(flags))?;
        check_flags(flags, 0)?;

        match (kind, spec) {
            ("logical", _) => Ok(LOGICAL_SOURCES.to_string()),
            ("netfs" | "iscsi", None) => Err(NativeError::new(format!(
                "Invalid argument: source specification is required for pool type '{}'",
                kind
            ))),
            ("netfs" | "iscsi" | "fs" | "disk", _) => Ok("<sources>\n</sources>\n".to_string()),
            _ => Err(NativeError::new(format!(
                "this function is not supported by the connection driver: \
                 pool type '{}' does not support source discovery",
                kind
            ))),
        }
    }

    fn pool_lookup_by_name(&self, name: &str) -> NativeResult<Box<dyn NativePool>> {
        self.host.enter("virStoragePoolLookupByName", None)?;
        if !self.host.read()?.contains_key(name) {
            return Err(no_pool(name));
        }
        Ok(self.host.pool_ref(name))
    }

    fn pool_lookup_by_uuid_string(&self, uuid: &str) -> NativeResult<Box<dyn NativePool>> {
        self.host.enter("virStoragePoolLookupByUUIDString", None)?;
        let name = self
            .host
            .read()?
            .iter()
            .find(|(_, p)| p.uuid.eq_ignore_ascii_case(uuid))
            .map(|(name, _)| name.clone())
            .ok_or_else(|| {
                NativeError::new(format!(
                    "Storage pool not found: no storage pool with matching uuid '{}'",
                    uuid
                ))
            })?;
        Ok(self.host.pool_ref(&name))
    }

    fn pool_create_xml(&self, xml: &str, flags: u32) -> NativeResult<Box<dyn NativePool>> {
        self.host.enter("virStoragePoolCreateXML", Some(flags))?;
        check_flags(flags, 0x7)?;

        let def = PoolXml::parse(xml).map_err(NativeError::new)?;
        let name = def.name.clone();
        {
            let mut pools = self.host.write()?;
            if pools.contains_key(&name) {
                return Err(NativeError::new(format!(
                    "operation failed: pool '{}' already exists",
                    name
                )));
            }
            debug!(pool = %name, "Starting transient mock pool");
            pools.insert(
                name.clone(),
                MockPool::from_xml(xml, def, pool_state::RUNNING, false),
            );
        }
        Ok(self.host.pool_ref(&name))
    }

    fn pool_define_xml(&self, xml: &str, flags: u32) -> NativeResult<Box<dyn NativePool>> {
        self.host.enter("virStoragePoolDefineXML", Some(flags))?;
        check_flags(flags, 0x1)?;

        let def = PoolXml::parse(xml).map_err(NativeError::new)?;
        let name = def.name.clone();
        {
            let mut pools = self.host.write()?;
            match pools.get_mut(&name) {
                Some(existing) => {
                    if let Some(ref uuid) = def.uuid {
                        if !uuid.eq_ignore_ascii_case(&existing.uuid) {
                            return Err(NativeError::new(format!(
                                "operation failed: pool '{}' is already defined with uuid {}",
                                name, existing.uuid
                            )));
                        }
                    }
                    debug!(pool = %name, "Redefining mock pool");
                    let state = existing.state;
                    let autostart = existing.autostart;
                    let volumes = std::mem::take(&mut existing.volumes);
                    let uuid = existing.uuid.clone();
                    let mut updated = MockPool::from_xml(xml, def, state, true);
                    updated.uuid = uuid;
                    updated.autostart = autostart;
                    updated.volumes = volumes;
                    *existing = updated;
                }
                None => {
                    debug!(pool = %name, "Defining mock pool");
                    pools.insert(
                        name.clone(),
                        MockPool::from_xml(xml, def, pool_state::INACTIVE, true),
                    );
                }
            }
        }
        Ok(self.host.pool_ref(&name))
    }

    fn vol_lookup_by_key(&self, key: &str) -> NativeResult<Box<dyn NativeVol>> {
        self.host.enter("virStorageVolLookupByKey", None)?;
        let (pool, name) = self.host.find_volume(key)?.ok_or_else(|| {
            NativeError::new(format!(
                "Storage volume not found: no storage vol with matching key {}",
                key
            ))
        })?;
        Ok(self.host.vol_ref(&pool, &name))
    }

    fn vol_lookup_by_path(&self, path: &str) -> NativeResult<Box<dyn NativeVol>> {
        self.host.enter("virStorageVolLookupByPath", None)?;
        let (pool, name) = self.host.find_volume(path)?.ok_or_else(|| {
            NativeError::new(format!(
                "Storage volume not found: no storage vol with matching path '{}'",
                path
            ))
        })?;
        Ok(self.host.vol_ref(&pool, &name))
    }
}

// =============================================================================
// Pools
// =============================================================================

struct MockPoolRef {
    host: Arc<MockHost>,
    name: String,
}

impl MockPoolRef {
    fn with<R>(&self, f: impl FnOnce(&MockPool) -> NativeResult<R>) -> NativeResult<R> {
        let pools = self.host.read()?;
        let pool = pools.get(&self.name).ok_or_else(|| no_pool(&self.name))?;
        f(pool)
    }

    fn with_mut<R>(&self, f: impl FnOnce(&mut MockPool) -> NativeResult<R>) -> NativeResult<R> {
        let mut pools = self.host.write()?;
        let pool = pools.get_mut(&self.name).ok_or_else(|| no_pool(&self.name))?;
        f(pool)
    }

    fn require_active(&self, pool: &MockPool) -> NativeResult<()> {
        if pool.is_active() {
            Ok(())
        } else {
            Err(not_active(&self.name))
        }
    }

    fn insert_volume(
        &self,
        xml: &str,
        def: VolumeXml,
        template: Option<(u64, u64)>,
    ) -> NativeResult<()> {
        let kind = vol_kind(def.kind.as_deref())?;
        self.with_mut(|pool| {
            self.require_active(pool)?;
            if pool.volumes.contains_key(&def.name) {
                return Err(NativeError::new(format!(
                    "storage volume name '{}' already in use",
                    def.name
                )));
            }

            let (template_capacity, template_allocation) = template.unwrap_or((0, 0));
            let capacity = def.capacity.unwrap_or(template_capacity);
            let volume = MockVolume {
                xml: xml.to_string(),
                kind,
                capacity,
                allocation: def.allocation.unwrap_or(template_allocation).min(capacity),
                path: format!("{}/{}", pool.target_path.trim_end_matches('/'), def.name),
            };
            debug!(pool = %self.name, volume = %def.name, "Creating mock volume");
            pool.volumes.insert(def.name.clone(), volume);
            Ok(())
        })
    }
}

impl NativeObject for MockPoolRef {
    fn free(self: Box<Self>) -> NativeResult<()> {
        self.host.released();
        self.host.enter("virStoragePoolFree", None)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl NativePool for MockPoolRef {
    fn build(&self, flags: u32) -> NativeResult<()> {
        self.host.enter("virStoragePoolBuild", Some(flags))?;
        check_flags(flags, 0xF)?;
        self.with(|pool| {
            if pool.is_active() {
                return Err(already_active(&self.name));
            }
            Ok(())
        })
    }

    fn undefine(&self) -> NativeResult<()> {
        self.host.enter("virStoragePoolUndefine", None)?;
        let mut pools = self.host.write()?;
        let pool = pools.get_mut(&self.name).ok_or_else(|| no_pool(&self.name))?;
        if !pool.persistent {
            return Err(NativeError::new(format!(
                "Requested operation is not valid: cannot undefine transient storage pool '{}'",
                self.name
            )));
        }
        if pool.is_active() {
            pool.persistent = false;
            pool.autostart = false;
        } else {
            pools.remove(&self.name);
        }
        Ok(())
    }

    fn create(&self, flags: u32) -> NativeResult<()> {
        self.host.enter("virStoragePoolCreate", Some(flags))?;
        check_flags(flags, 0x7)?;
        self.with_mut(|pool| {
            if pool.is_active() {
                return Err(already_active(&self.name));
            }
            pool.state = pool_state::RUNNING;
            Ok(())
        })
    }

    fn destroy(&self) -> NativeResult<()> {
        self.host.enter("virStoragePoolDestroy", None)?;
        let mut pools = self.host.write()?;
        let pool = pools.get_mut(&self.name).ok_or_else(|| no_pool(&self.name))?;
        if !pool.is_active() {
            return Err(not_active(&self.name));
        }
        if pool.persistent {
            pool.state = pool_state::INACTIVE;
        } else {
            pools.remove(&self.name);
        }
        Ok(())
    }

    fn delete(&self, flags: u32) -> NativeResult<()> {
        self.host.enter("virStoragePoolDelete", Some(flags))?;
        check_flags(flags, 0x1)?;
        self.with_mut(|pool| {
            if pool.is_active() {
                return Err(already_active(&self.name));
            }
            pool.volumes.clear();
            Ok(())
        })
    }

    fn refresh(&self, flags: u32) -> NativeResult<()> {
        self.host.enter("virStoragePoolRefresh", Some(flags))?;
        check_flags(flags, 0)?;
        self.with(|pool| self.require_active(pool))
    }

    fn name(&self) -> NativeResult<String> {
        self.host.enter("virStoragePoolGetName", None)?;
        self.with(|_| Ok(self.name.clone()))
    }

    fn uuid_string(&self) -> NativeResult<String> {
        self.host.enter("virStoragePoolGetUUIDString", None)?;
        self.with(|pool| Ok(pool.uuid.clone()))
    }

    fn info(&self) -> NativeResult<RawPoolInfo> {
        self.host.enter("virStoragePoolGetInfo", None)?;
        self.with(|pool| Ok(pool.info()))
    }

    fn xml_desc(&self, flags: u32) -> NativeResult<String> {
        self.host.enter("virStoragePoolGetXMLDesc", Some(flags))?;
        check_flags(flags, 0x1)?;
        self.with(|pool| Ok(pool.xml.clone()))
    }

    fn autostart(&self) -> NativeResult<bool> {
        self.host.enter("virStoragePoolGetAutostart", None)?;
        self.with(|pool| Ok(pool.autostart))
    }

    fn set_autostart(&self, autostart: bool) -> NativeResult<()> {
        self.host.enter("virStoragePoolSetAutostart", None)?;
        self.with_mut(|pool| {
            if !pool.persistent {
                return Err(NativeError::new(
                    "Requested operation is not valid: cannot set autostart for transient pool",
                ));
            }
            pool.autostart = autostart;
            Ok(())
        })
    }

    fn num_of_volumes(&self) -> NativeResult<u32> {
        self.host.enter("virStoragePoolNumOfVolumes", None)?;
        self.with(|pool| {
            self.require_active(pool)?;
            Ok(pool.volumes.len() as u32)
        })
    }

    fn list_volumes(&self, max: usize) -> NativeResult<Vec<String>> {
        self.host.enter("virStoragePoolListVolumes", None)?;
        self.with(|pool| {
            self.require_active(pool)?;
            Ok(pool.volumes.keys().take(max).cloned().collect())
        })
    }

    fn is_active(&self) -> NativeResult<bool> {
        self.host.enter("virStoragePoolIsActive", None)?;
        self.with(|pool| Ok(pool.is_active()))
    }

    fn is_persistent(&self) -> NativeResult<bool> {
        self.host.enter("virStoragePoolIsPersistent", None)?;
        self.with(|pool| Ok(pool.persistent))
    }

    fn vol_lookup_by_name(&self, name: &str) -> NativeResult<Box<dyn NativeVol>> {
        self.host.enter("virStorageVolLookupByName", None)?;
        self.with(|pool| {
            self.require_active(pool)?;
            if pool.volumes.contains_key(name) {
                Ok(())
            } else {
                Err(no_volume(name))
            }
        })?;
        Ok(self.host.vol_ref(&self.name, name))
    }

    fn vol_create_xml(&self, xml: &str, flags: u32) -> NativeResult<Box<dyn NativeVol>> {
        self.host.enter("virStorageVolCreateXML", Some(flags))?;
        check_flags(flags, 0x1)?;
        let def = VolumeXml::parse(xml).map_err(NativeError::new)?;
        let name = def.name.clone();
        self.insert_volume(xml, def, None)?;
        Ok(self.host.vol_ref(&self.name, &name))
    }

    fn vol_create_xml_from(
        &self,
        xml: &str,
        clone: &dyn NativeVol,
        flags: u32,
    ) -> NativeResult<Box<dyn NativeVol>> {
        self.host.enter("virStorageVolCreateXMLFrom", Some(flags))?;
        check_flags(flags, 0x1)?;

        let source = clone
            .as_any()
            .downcast_ref::<MockVolRef>()
            .ok_or_else(|| NativeError::new("Invalid storage volume: not a mock volume"))?;
        let template = source.with(|v| Ok((v.capacity, v.allocation)))?;

        let def = VolumeXml::parse(xml).map_err(NativeError::new)?;
        let name = def.name.clone();
        self.insert_volume(xml, def, Some(template))?;
        Ok(self.host.vol_ref(&self.name, &name))
    }
}

// =============================================================================
// Volumes
// =============================================================================

struct MockVolRef {
    host: Arc<MockHost>,
    pool: String,
    name: String,
}

impl MockVolRef {
    fn with<R>(&self, f: impl FnOnce(&MockVolume) -> NativeResult<R>) -> NativeResult<R> {
        let pools = self.host.read()?;
        let volume = pools
            .get(&self.pool)
            .and_then(|p| p.volumes.get(&self.name))
            .ok_or_else(|| no_volume(&self.name))?;
        f(volume)
    }
}

impl NativeObject for MockVolRef {
    fn free(self: Box<Self>) -> NativeResult<()> {
        self.host.released();
        self.host.enter("virStorageVolFree", None)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl NativeVol for MockVolRef {
    fn pool(&self) -> NativeResult<Box<dyn NativePool>> {
        self.host.enter("virStoragePoolLookupByVolume", None)?;
        if !self.host.read()?.contains_key(&self.pool) {
            return Err(no_pool(&self.pool));
        }
        Ok(self.host.pool_ref(&self.pool))
    }

    fn name(&self) -> NativeResult<String> {
        self.host.enter("virStorageVolGetName", None)?;
        self.with(|_| Ok(self.name.clone()))
    }

    fn key(&self) -> NativeResult<String> {
        self.host.enter("virStorageVolGetKey", None)?;
        self.with(|v| Ok(v.path.clone()))
    }

    fn path(&self) -> NativeResult<String> {
        self.host.enter("virStorageVolGetPath", None)?;
        self.with(|v| Ok(v.path.clone()))
    }

    fn delete(&self, flags: u32) -> NativeResult<()> {
        self.host.enter("virStorageVolDelete", Some(flags))?;
        check_flags(flags, 0x1)?;
        let mut pools = self.host.write()?;
        let pool = pools
            .get_mut(&self.pool)
            .ok_or_else(|| no_pool(&self.pool))?;
        if !pool.is_active() {
            return Err(not_active(&self.pool));
        }
        pool.volumes
            .remove(&self.name)
            .map(|_| ())
            .ok_or_else(|| no_volume(&self.name))
    }

    fn wipe(&self, flags: u32) -> NativeResult<()> {
        self.host.enter("virStorageVolWipe", Some(flags))?;
        check_flags(flags, 0)?;
        self.with(|_| Ok(()))
    }

    fn info(&self) -> NativeResult<RawVolInfo> {
        self.host.enter("virStorageVolGetInfo", None)?;
        self.with(|v| {
            Ok(RawVolInfo {
                kind: v.kind,
                capacity: v.capacity,
                allocation: v.allocation,
            })
        })
    }

    fn xml_desc(&self, flags: u32) -> NativeResult<String> {
        self.host.enter("virStorageVolGetXMLDesc", Some(flags))?;
        check_flags(flags, 0)?;
        self.with(|v| Ok(v.xml.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POOL_XML: &str = "<pool type='dir'><name>images</name>\
        <capacity unit='bytes'>1000</capacity><allocation>400</allocation>\
        <available>600</available><target><path>/srv/images</path></target></pool>";

    #[test]
    fn test_define_start_destroy() {
        let host = MockHost::new();
        let conn = host.connect("mock:///");

        let pool = conn.pool_define_xml(POOL_XML, 0).unwrap();
        assert!(!pool.is_active().unwrap());
        assert!(pool.is_persistent().unwrap());
        assert_eq!(conn.num_of_defined_storage_pools().unwrap(), 1);
        assert_eq!(conn.num_of_storage_pools().unwrap(), 0);

        pool.create(0).unwrap();
        assert_eq!(pool.info().unwrap().state, pool_state::RUNNING);
        assert!(pool.create(0).is_err());
        assert_eq!(conn.list_storage_pools(8).unwrap(), vec!["images".to_string()]);

        pool.destroy().unwrap();
        assert_eq!(pool.info().unwrap().state, pool_state::INACTIVE);

        pool.free().unwrap();
        assert_eq!(host.live_objects(), 0);
    }

    #[test]
    fn test_transient_pool_vanishes_on_destroy() {
        let host = MockHost::new();
        let conn = host.connect("mock:///");

        let pool = conn.pool_create_xml(POOL_XML, 0).unwrap();
        assert!(!pool.is_persistent().unwrap());
        pool.destroy().unwrap();
        assert!(conn.pool_lookup_by_name("images").is_err());
        pool.free().unwrap();
    }

    #[test]
    fn test_volumes_and_info() {
        let host = MockHost::new();
        let conn = host.connect("mock:///");
        let pool = conn.pool_create_xml(POOL_XML, 0).unwrap();

        let xml = "<volume><name>a.img</name><capacity>100</capacity>\
                   <allocation>50</allocation></volume>";
        let vol = pool.vol_create_xml(xml, 0).unwrap();
        assert_eq!(vol.path().unwrap(), "/srv/images/a.img");
        assert_eq!(vol.key().unwrap(), "/srv/images/a.img");
        assert_eq!(pool.num_of_volumes().unwrap(), 1);

        let info = pool.info().unwrap();
        assert_eq!(info.allocation, 450);
        assert_eq!(info.available, 600);

        let clone = pool
            .vol_create_xml_from("<volume><name>b.img</name></volume>", vol.as_ref(), 0)
            .unwrap();
        assert_eq!(clone.info().unwrap().capacity, 100);

        let found = conn.vol_lookup_by_path("/srv/images/b.img").unwrap();
        assert_eq!(found.name().unwrap(), "b.img");

        vol.delete(0).unwrap();
        assert_eq!(pool.list_volumes(8).unwrap(), vec!["b.img".to_string()]);
        assert!(vol.info().is_err());
    }

    #[test]
    fn test_journal_and_failure_injection() {
        let host = MockHost::with_default_pool();
        let conn = host.connect("test:///default");

        host.fail_next("virStoragePoolLookupByName", "boom");
        assert_eq!(
            conn.pool_lookup_by_name(DEFAULT_POOL_NAME).err(),
            Some(NativeError::new("boom"))
        );

        let pool = conn.pool_lookup_by_name(DEFAULT_POOL_NAME).unwrap();
        pool.refresh(0).unwrap();
        assert_eq!(host.calls_to("virStoragePoolLookupByName"), 2);
        assert_eq!(host.last_flags("virStoragePoolRefresh"), Some(0));
        assert!(pool.autostart().unwrap());
    }

    #[test]
    fn test_find_sources() {
        let conn = MockConnect::open("mock:///");
        assert!(conn
            .find_storage_pool_sources("logical", None, 0)
            .unwrap()
            .contains("vg0"));
        assert!(conn.find_storage_pool_sources("netfs", None, 0).is_err());
        assert!(conn.find_storage_pool_sources("dir", None, 0).is_err());
    }
}
