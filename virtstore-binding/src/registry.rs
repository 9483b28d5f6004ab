//! Method and constant registration.
//!
//! Both tables are `static` and never change. [`init`] indexes them once per
//! process; every dynamic call goes through that index.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::info;

use crate::constants::{pool_build, pool_delete, pool_state, vol_delete, vol_type};
use crate::error::{Result, StorageError};
use crate::methods as m;
use crate::value::Value;

use self::Class::{Connect, StoragePool, StoragePoolInfo, StorageVol, StorageVolInfo};

/// Wrapper classes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Class {
    Connect,
    StoragePool,
    StorageVol,
    StoragePoolInfo,
    StorageVolInfo,
}

impl Class {
    pub const ALL: [Class; 5] = [
        Class::Connect,
        Class::StoragePool,
        Class::StorageVol,
        Class::StoragePoolInfo,
        Class::StorageVolInfo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Class::Connect => "Connect",
            Class::StoragePool => "StoragePool",
            Class::StorageVol => "StorageVol",
            Class::StoragePoolInfo => "StoragePoolInfo",
            Class::StorageVolInfo => "StorageVolInfo",
        }
    }

    pub fn from_name(name: &str) -> Option<Class> {
        Class::ALL.iter().copied().find(|c| c.name() == name)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Adapter from dynamic arguments to one typed operation.
pub(crate) type Adapter = fn(&Value, &[Value]) -> Result<Value>;

/// One registered method.
#[derive(Clone, Copy, Serialize)]
pub struct MethodDef {
    pub class: Class,
    pub name: &'static str,
    /// Native entry point, `None` for attribute readers on info values.
    pub native: Option<&'static str>,
    /// Required positional arguments.
    pub required: usize,
    /// Optional trailing arguments (`nil` when omitted).
    pub optional: usize,
    #[serde(skip)]
    pub(crate) adapter: Adapter,
}

impl MethodDef {
    /// Check `given` against the accepted argument count.
    pub fn check_arity(&self, given: usize) -> Result<()> {
        if given >= self.required && given <= self.required + self.optional {
            return Ok(());
        }

        let expected = if self.optional == 0 {
            self.required.to_string()
        } else {
            format!("{}..{}", self.required, self.required + self.optional)
        };
        Err(StorageError::Arity {
            method: self.name,
            given,
            expected,
        })
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("class", &self.class)
            .field("name", &self.name)
            .field("native", &self.native)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .finish()
    }
}

/// One registered constant.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConstantDef {
    pub class: Class,
    pub name: &'static str,
    pub value: i64,
}

const fn def(
    class: Class,
    name: &'static str,
    native: Option<&'static str>,
    required: usize,
    optional: usize,
    adapter: Adapter,
) -> MethodDef {
    MethodDef {
        class,
        name,
        native,
        required,
        optional,
        adapter,
    }
}

/// Every callable method.
#[rustfmt::skip]
pub static METHODS: &[MethodDef] = &[
    // Connect
    def(Connect, "num_of_storage_pools", Some("virConnectNumOfStoragePools"), 0, 0, m::conn_num_of_storage_pools),
    def(Connect, "list_storage_pools", Some("virConnectListStoragePools"), 0, 0, m::conn_list_storage_pools),
    def(Connect, "num_of_defined_storage_pools", Some("virConnectNumOfDefinedStoragePools"), 0, 0, m::conn_num_of_defined_storage_pools),
    def(Connect, "list_defined_storage_pools", Some("virConnectListDefinedStoragePools"), 0, 0, m::conn_list_defined_storage_pools),
    def(Connect, "lookup_storage_pool_by_name", Some("virStoragePoolLookupByName"), 1, 0, m::conn_lookup_storage_pool_by_name),
    def(Connect, "lookup_storage_pool_by_uuid", Some("virStoragePoolLookupByUUIDString"), 1, 0, m::conn_lookup_storage_pool_by_uuid),
    def(Connect, "create_storage_pool_xml", Some("virStoragePoolCreateXML"), 1, 1, m::conn_create_storage_pool_xml),
    def(Connect, "define_storage_pool_xml", Some("virStoragePoolDefineXML"), 1, 1, m::conn_define_storage_pool_xml),
    def(Connect, "discover_storage_pool_sources", Some("virConnectFindStoragePoolSources"), 1, 2, m::conn_discover_storage_pool_sources),
    def(Connect, "uri", Some("virConnectGetURI"), 0, 0, m::conn_uri),
    def(Connect, "close", Some("virConnectClose"), 0, 0, m::conn_close),
    // StoragePool
    def(StoragePool, "build", Some("virStoragePoolBuild"), 0, 1, m::pool_build),
    def(StoragePool, "undefine", Some("virStoragePoolUndefine"), 0, 0, m::pool_undefine),
    def(StoragePool, "create", Some("virStoragePoolCreate"), 0, 1, m::pool_create),
    def(StoragePool, "destroy", Some("virStoragePoolDestroy"), 0, 0, m::pool_destroy),
    def(StoragePool, "delete", Some("virStoragePoolDelete"), 0, 1, m::pool_delete),
    def(StoragePool, "refresh", Some("virStoragePoolRefresh"), 0, 1, m::pool_refresh),
    def(StoragePool, "name", Some("virStoragePoolGetName"), 0, 0, m::pool_name),
    def(StoragePool, "uuid", Some("virStoragePoolGetUUIDString"), 0, 0, m::pool_uuid),
    def(StoragePool, "info", Some("virStoragePoolGetInfo"), 0, 0, m::pool_info),
    def(StoragePool, "xml_desc", Some("virStoragePoolGetXMLDesc"), 0, 1, m::pool_xml_desc),
    def(StoragePool, "autostart", Some("virStoragePoolGetAutostart"), 0, 0, m::pool_autostart),
    def(StoragePool, "autostart?", Some("virStoragePoolGetAutostart"), 0, 0, m::pool_autostart),
    def(StoragePool, "autostart=", Some("virStoragePoolSetAutostart"), 1, 0, m::pool_set_autostart),
    def(StoragePool, "num_of_volumes", Some("virStoragePoolNumOfVolumes"), 0, 0, m::pool_num_of_volumes),
    def(StoragePool, "list_volumes", Some("virStoragePoolListVolumes"), 0, 0, m::pool_list_volumes),
    def(StoragePool, "lookup_volume_by_name", Some("virStorageVolLookupByName"), 1, 0, m::pool_lookup_volume_by_name),
    def(StoragePool, "lookup_volume_by_key", Some("virStorageVolLookupByKey"), 1, 0, m::pool_lookup_volume_by_key),
    def(StoragePool, "lookup_volume_by_path", Some("virStorageVolLookupByPath"), 1, 0, m::pool_lookup_volume_by_path),
    def(StoragePool, "create_vol_xml", Some("virStorageVolCreateXML"), 1, 1, m::pool_create_vol_xml),
    def(StoragePool, "create_vol_xml_from", Some("virStorageVolCreateXMLFrom"), 2, 1, m::pool_create_vol_xml_from),
    def(StoragePool, "active?", Some("virStoragePoolIsActive"), 0, 0, m::pool_is_active),
    def(StoragePool, "persistent?", Some("virStoragePoolIsPersistent"), 0, 0, m::pool_is_persistent),
    def(StoragePool, "free", Some("virStoragePoolFree"), 0, 0, m::pool_free),
    // StorageVol
    def(StorageVol, "pool", Some("virStoragePoolLookupByVolume"), 0, 0, m::vol_pool),
    def(StorageVol, "name", Some("virStorageVolGetName"), 0, 0, m::vol_name),
    def(StorageVol, "key", Some("virStorageVolGetKey"), 0, 0, m::vol_key),
    def(StorageVol, "path", Some("virStorageVolGetPath"), 0, 0, m::vol_path),
    def(StorageVol, "delete", Some("virStorageVolDelete"), 0, 1, m::vol_delete),
    def(StorageVol, "wipe", Some("virStorageVolWipe"), 0, 1, m::vol_wipe),
    def(StorageVol, "info", Some("virStorageVolGetInfo"), 0, 0, m::vol_info),
    def(StorageVol, "xml_desc", Some("virStorageVolGetXMLDesc"), 0, 1, m::vol_xml_desc),
    def(StorageVol, "free", Some("virStorageVolFree"), 0, 0, m::vol_free),
    // Info values
    def(StoragePoolInfo, "state", None, 0, 0, m::pool_info_state),
    def(StoragePoolInfo, "capacity", None, 0, 0, m::pool_info_capacity),
    def(StoragePoolInfo, "allocation", None, 0, 0, m::pool_info_allocation),
    def(StoragePoolInfo, "available", None, 0, 0, m::pool_info_available),
    def(StorageVolInfo, "type", None, 0, 0, m::vol_info_type),
    def(StorageVolInfo, "capacity", None, 0, 0, m::vol_info_capacity),
    def(StorageVolInfo, "allocation", None, 0, 0, m::vol_info_allocation),
];

const fn constant(class: Class, name: &'static str, value: i64) -> ConstantDef {
    ConstantDef { class, name, value }
}

/// Every registered constant, mirroring the library's enums.
pub static CONSTANTS: &[ConstantDef] = &[
    constant(StoragePool, "INACTIVE", pool_state::INACTIVE as i64),
    constant(StoragePool, "BUILDING", pool_state::BUILDING as i64),
    constant(StoragePool, "RUNNING", pool_state::RUNNING as i64),
    constant(StoragePool, "DEGRADED", pool_state::DEGRADED as i64),
    constant(StoragePool, "INACCESSIBLE", pool_state::INACCESSIBLE as i64),
    constant(StoragePool, "BUILD_NEW", pool_build::NEW as i64),
    constant(StoragePool, "BUILD_REPAIR", pool_build::REPAIR as i64),
    constant(StoragePool, "BUILD_RESIZE", pool_build::RESIZE as i64),
    constant(StoragePool, "DELETE_NORMAL", pool_delete::NORMAL as i64),
    constant(StoragePool, "DELETE_ZEROED", pool_delete::ZEROED as i64),
    constant(StorageVol, "FILE", vol_type::FILE as i64),
    constant(StorageVol, "BLOCK", vol_type::BLOCK as i64),
    constant(StorageVol, "DELETE_NORMAL", vol_delete::NORMAL as i64),
    constant(StorageVol, "DELETE_ZEROED", vol_delete::ZEROED as i64),
];

/// Index over [`METHODS`] and [`CONSTANTS`].
pub struct Registry {
    methods: HashMap<Class, HashMap<&'static str, &'static MethodDef>>,
    constants: HashMap<Class, HashMap<&'static str, i64>>,
}

static REGISTRY: OnceCell<Registry> = OnceCell::new();

/// Build the process-wide registry. Later calls return the same instance.
pub fn init() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let mut methods: HashMap<Class, HashMap<&'static str, &'static MethodDef>> =
            HashMap::new();
        for d in METHODS {
            methods.entry(d.class).or_default().insert(d.name, d);
        }

        let mut constants: HashMap<Class, HashMap<&'static str, i64>> = HashMap::new();
        for c in CONSTANTS {
            constants.entry(c.class).or_default().insert(c.name, c.value);
        }

        info!(
            methods = METHODS.len(),
            constants = CONSTANTS.len(),
            "Registered storage classes"
        );

        Registry { methods, constants }
    })
}

impl Registry {
    /// Find `name` on `class`.
    pub fn method(&self, class: Class, name: &str) -> Result<&'static MethodDef> {
        self.methods
            .get(&class)
            .and_then(|m| m.get(name))
            .copied()
            .ok_or_else(|| StorageError::NoMethod {
                class: class.name(),
                method: name.to_string(),
            })
    }

    /// Methods registered on `class`, in table order.
    pub fn methods(&self, class: Class) -> Vec<&'static MethodDef> {
        METHODS.iter().filter(|d| d.class == class).collect()
    }

    pub fn constant(&self, class: Class, name: &str) -> Result<i64> {
        self.constants
            .get(&class)
            .and_then(|c| c.get(name))
            .copied()
            .ok_or_else(|| StorageError::NoConstant {
                class: class.name(),
                name: name.to_string(),
            })
    }

    /// Constants registered on `class`, in table order.
    pub fn constants(&self, class: Class) -> Vec<&'static ConstantDef> {
        CONSTANTS.iter().filter(|c| c.class == class).collect()
    }
}
