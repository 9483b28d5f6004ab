//! Adapters bound in the method table.
//!
//! Each adapter unwraps its receiver and positional arguments, calls one
//! typed operation and wraps the result. Arity has already been checked by
//! the runtime.

use std::sync::Arc;

use crate::connection::Connection;
use crate::error::{Result, StorageError};
use crate::pool::{PoolInfo, StoragePool};
use crate::value::{flags, optional_string, string, Value};
use crate::volume::{StorageVol, VolInfo};

fn receiver_mismatch(expected: &str, got: &Value) -> StorageError {
    StorageError::TypeMismatch(format!(
        "receiver must be a {}, got {}",
        expected,
        got.type_name()
    ))
}

fn conn(recv: &Value) -> Result<&Arc<Connection>> {
    recv.as_connection()
        .ok_or_else(|| receiver_mismatch("Connect", recv))
}

fn pool(recv: &Value) -> Result<&StoragePool> {
    recv.as_pool()
        .map(|p| p.as_ref())
        .ok_or_else(|| receiver_mismatch("StoragePool", recv))
}

fn vol(recv: &Value) -> Result<&StorageVol> {
    recv.as_vol()
        .map(|v| v.as_ref())
        .ok_or_else(|| receiver_mismatch("StorageVol", recv))
}

fn recv_pool_info(recv: &Value) -> Result<&PoolInfo> {
    recv.as_pool_info()
        .ok_or_else(|| receiver_mismatch("StoragePoolInfo", recv))
}

fn recv_vol_info(recv: &Value) -> Result<&VolInfo> {
    recv.as_vol_info()
        .ok_or_else(|| receiver_mismatch("StorageVolInfo", recv))
}

// =============================================================================
// Connect
// =============================================================================

pub(crate) fn conn_num_of_storage_pools(recv: &Value, _args: &[Value]) -> Result<Value> {
    conn(recv)?.num_of_storage_pools().map(Value::from)
}

pub(crate) fn conn_list_storage_pools(recv: &Value, _args: &[Value]) -> Result<Value> {
    conn(recv)?.list_storage_pools().map(Value::from)
}

pub(crate) fn conn_num_of_defined_storage_pools(recv: &Value, _args: &[Value]) -> Result<Value> {
    conn(recv)?.num_of_defined_storage_pools().map(Value::from)
}

pub(crate) fn conn_list_defined_storage_pools(recv: &Value, _args: &[Value]) -> Result<Value> {
    conn(recv)?.list_defined_storage_pools().map(Value::from)
}

pub(crate) fn conn_lookup_storage_pool_by_name(recv: &Value, args: &[Value]) -> Result<Value> {
    let name = string(args, 0, "name")?;
    conn(recv)?.lookup_storage_pool_by_name(name).map(Value::from)
}

pub(crate) fn conn_lookup_storage_pool_by_uuid(recv: &Value, args: &[Value]) -> Result<Value> {
    let uuid = string(args, 0, "uuid")?;
    conn(recv)?.lookup_storage_pool_by_uuid(uuid).map(Value::from)
}

pub(crate) fn conn_create_storage_pool_xml(recv: &Value, args: &[Value]) -> Result<Value> {
    let xml = string(args, 0, "xml")?;
    let flags = flags(args, 1)?;
    conn(recv)?.create_storage_pool_xml(xml, flags).map(Value::from)
}

pub(crate) fn conn_define_storage_pool_xml(recv: &Value, args: &[Value]) -> Result<Value> {
    let xml = string(args, 0, "xml")?;
    let flags = flags(args, 1)?;
    conn(recv)?.define_storage_pool_xml(xml, flags).map(Value::from)
}

pub(crate) fn conn_discover_storage_pool_sources(recv: &Value, args: &[Value]) -> Result<Value> {
    let kind = string(args, 0, "type")?;
    let spec = optional_string(args, 1, "spec")?;
    let flags = flags(args, 2)?;
    conn(recv)?
        .discover_storage_pool_sources(kind, spec, flags)
        .map(Value::from)
}

pub(crate) fn conn_uri(recv: &Value, _args: &[Value]) -> Result<Value> {
    conn(recv)?.get_uri().map(Value::from)
}

pub(crate) fn conn_close(recv: &Value, _args: &[Value]) -> Result<Value> {
    conn(recv)?.close().map(Value::from)
}

// =============================================================================
// StoragePool
// =============================================================================

pub(crate) fn pool_build(recv: &Value, args: &[Value]) -> Result<Value> {
    pool(recv)?.build(flags(args, 0)?).map(Value::from)
}

pub(crate) fn pool_undefine(recv: &Value, _args: &[Value]) -> Result<Value> {
    pool(recv)?.undefine().map(Value::from)
}

pub(crate) fn pool_create(recv: &Value, args: &[Value]) -> Result<Value> {
    pool(recv)?.create(flags(args, 0)?).map(Value::from)
}

pub(crate) fn pool_destroy(recv: &Value, _args: &[Value]) -> Result<Value> {
    pool(recv)?.destroy().map(Value::from)
}

pub(crate) fn pool_delete(recv: &Value, args: &[Value]) -> Result<Value> {
    pool(recv)?.delete(flags(args, 0)?).map(Value::from)
}

pub(crate) fn pool_refresh(recv: &Value, args: &[Value]) -> Result<Value> {
    pool(recv)?.refresh(flags(args, 0)?).map(Value::from)
}

pub(crate) fn pool_name(recv: &Value, _args: &[Value]) -> Result<Value> {
    pool(recv)?.name().map(Value::from)
}

pub(crate) fn pool_uuid(recv: &Value, _args: &[Value]) -> Result<Value> {
    pool(recv)?.uuid().map(Value::from)
}

pub(crate) fn pool_info(recv: &Value, _args: &[Value]) -> Result<Value> {
    pool(recv)?.info().map(Value::from)
}

pub(crate) fn pool_xml_desc(recv: &Value, args: &[Value]) -> Result<Value> {
    pool(recv)?.xml_desc(flags(args, 0)?).map(Value::from)
}

pub(crate) fn pool_autostart(recv: &Value, _args: &[Value]) -> Result<Value> {
    pool(recv)?.autostart().map(Value::from)
}

pub(crate) fn pool_set_autostart(recv: &Value, args: &[Value]) -> Result<Value> {
    let autostart = args.first().map(Value::is_truthy).unwrap_or(false);
    pool(recv)?.set_autostart(autostart).map(Value::from)
}

pub(crate) fn pool_num_of_volumes(recv: &Value, _args: &[Value]) -> Result<Value> {
    pool(recv)?.num_of_volumes().map(Value::from)
}

pub(crate) fn pool_list_volumes(recv: &Value, _args: &[Value]) -> Result<Value> {
    pool(recv)?.list_volumes().map(Value::from)
}

pub(crate) fn pool_lookup_volume_by_name(recv: &Value, args: &[Value]) -> Result<Value> {
    let name = string(args, 0, "name")?;
    pool(recv)?.lookup_volume_by_name(name).map(Value::from)
}

pub(crate) fn pool_lookup_volume_by_key(recv: &Value, args: &[Value]) -> Result<Value> {
    let key = string(args, 0, "key")?;
    pool(recv)?.lookup_volume_by_key(key).map(Value::from)
}

pub(crate) fn pool_lookup_volume_by_path(recv: &Value, args: &[Value]) -> Result<Value> {
    let path = string(args, 0, "path")?;
    pool(recv)?.lookup_volume_by_path(path).map(Value::from)
}

pub(crate) fn pool_create_vol_xml(recv: &Value, args: &[Value]) -> Result<Value> {
    let xml = string(args, 0, "xml")?;
    let flags = flags(args, 1)?;
    pool(recv)?.create_vol_xml(xml, flags).map(Value::from)
}

pub(crate) fn pool_create_vol_xml_from(recv: &Value, args: &[Value]) -> Result<Value> {
    let xml = string(args, 0, "xml")?;
    let clone = args
        .get(1)
        .and_then(Value::as_vol)
        .ok_or_else(|| {
            StorageError::TypeMismatch(format!(
                "clone_vol must be a StorageVol, got {}",
                args.get(1).map(Value::type_name).unwrap_or("nothing")
            ))
        })?;
    let flags = flags(args, 2)?;
    pool(recv)?.create_vol_xml_from(xml, clone, flags).map(Value::from)
}

pub(crate) fn pool_is_active(recv: &Value, _args: &[Value]) -> Result<Value> {
    pool(recv)?.is_active().map(Value::from)
}

pub(crate) fn pool_is_persistent(recv: &Value, _args: &[Value]) -> Result<Value> {
    pool(recv)?.is_persistent().map(Value::from)
}

pub(crate) fn pool_free(recv: &Value, _args: &[Value]) -> Result<Value> {
    pool(recv)?.free().map(Value::from)
}

// =============================================================================
// StorageVol
// =============================================================================

pub(crate) fn vol_pool(recv: &Value, _args: &[Value]) -> Result<Value> {
    vol(recv)?.pool().map(Value::from)
}

pub(crate) fn vol_name(recv: &Value, _args: &[Value]) -> Result<Value> {
    vol(recv)?.name().map(Value::from)
}

pub(crate) fn vol_key(recv: &Value, _args: &[Value]) -> Result<Value> {
    vol(recv)?.key().map(Value::from)
}

pub(crate) fn vol_path(recv: &Value, _args: &[Value]) -> Result<Value> {
    vol(recv)?.path().map(Value::from)
}

pub(crate) fn vol_delete(recv: &Value, args: &[Value]) -> Result<Value> {
    vol(recv)?.delete(flags(args, 0)?).map(Value::from)
}

pub(crate) fn vol_wipe(recv: &Value, args: &[Value]) -> Result<Value> {
    vol(recv)?.wipe(flags(args, 0)?).map(Value::from)
}

pub(crate) fn vol_info(recv: &Value, _args: &[Value]) -> Result<Value> {
    vol(recv)?.info().map(Value::from)
}

pub(crate) fn vol_xml_desc(recv: &Value, args: &[Value]) -> Result<Value> {
    vol(recv)?.xml_desc(flags(args, 0)?).map(Value::from)
}

pub(crate) fn vol_free(recv: &Value, _args: &[Value]) -> Result<Value> {
    vol(recv)?.free().map(Value::from)
}

// =============================================================================
// Info attribute readers
// =============================================================================

pub(crate) fn pool_info_state(recv: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::Int(i64::from(recv_pool_info(recv)?.state.as_raw())))
}

pub(crate) fn pool_info_capacity(recv: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::from(recv_pool_info(recv)?.capacity))
}

pub(crate) fn pool_info_allocation(recv: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::from(recv_pool_info(recv)?.allocation))
}

pub(crate) fn pool_info_available(recv: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::from(recv_pool_info(recv)?.available))
}

pub(crate) fn vol_info_type(recv: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::Int(i64::from(recv_vol_info(recv)?.kind.as_raw())))
}

pub(crate) fn vol_info_capacity(recv: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::from(recv_vol_info(recv)?.capacity))
}

pub(crate) fn vol_info_allocation(recv: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::from(recv_vol_info(recv)?.allocation))
}
