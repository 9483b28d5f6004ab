//! Integration tests for dynamic dispatch through the method table.

use std::sync::Arc;

use virtstore_binding::{
    Class, Connection, ErrorKind, MockHost, Runtime, StorageError, Value,
};

const POOL_XML: &str = "<pool type='dir'><name>scratch</name>\
    <capacity unit='bytes'>1000</capacity><allocation unit='bytes'>400</allocation>\
    <available unit='bytes'>600</available><target><path>/scratch</path></target></pool>";

fn connect() -> (Arc<MockHost>, Value) {
    let host = MockHost::new();
    let conn = Connection::from_native("mock:///", Box::new(host.connect("mock:///")));
    (host, Value::Connect(conn))
}

/// Test that omitted and nil flags both reach the native call as 0.
#[test]
fn test_optional_flags() {
    let rt = Runtime::new();
    let (host, conn) = connect();

    let pool = rt
        .call(&conn, "define_storage_pool_xml", &[Value::from(POOL_XML)])
        .unwrap();
    assert_eq!(host.last_flags("virStoragePoolDefineXML"), Some(0));

    rt.call(&pool, "build", &[]).unwrap();
    assert_eq!(host.last_flags("virStoragePoolBuild"), Some(0));

    rt.call(&pool, "build", &[Value::Nil]).unwrap();
    assert_eq!(host.last_flags("virStoragePoolBuild"), Some(0));

    let repair = rt.constant(Class::StoragePool, "BUILD_REPAIR").unwrap();
    rt.call(&pool, "build", &[repair]).unwrap();
    assert_eq!(host.last_flags("virStoragePoolBuild"), Some(1));

    assert!(matches!(
        rt.call(&pool, "build", &[Value::Int(-1)]),
        Err(StorageError::Range(_))
    ));
    assert!(matches!(
        rt.call(&pool, "build", &[Value::from("1")]),
        Err(StorageError::TypeMismatch(_))
    ));
    assert_eq!(host.calls_to("virStoragePoolBuild"), 3);
}

/// Test arity errors for required and optional arguments.
#[test]
fn test_arity() {
    let rt = Runtime::new();
    let (host, conn) = connect();

    let err = rt.call(&conn, "create_storage_pool_xml", &[]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Wrong number of arguments for create_storage_pool_xml (0 for 1..2)"
    );

    let err = rt
        .call(&conn, "uri", &[Value::Nil])
        .unwrap_err();
    assert!(matches!(err, StorageError::Arity { given: 1, .. }));

    // Arity is checked before anything reaches the host.
    assert!(host.calls().is_empty());
}

/// Test info values and their attribute readers.
#[test]
fn test_info_readers() {
    let rt = Runtime::new();
    let (_host, conn) = connect();

    let pool = rt
        .call(&conn, "create_storage_pool_xml", &[Value::from(POOL_XML), Value::Nil])
        .unwrap();
    let info = rt.call(&pool, "info", &[]).unwrap();
    rt.call(&pool, "free", &[]).unwrap();

    let read = |attr: &str| rt.call(&info, attr, &[]).unwrap().as_i64();
    assert_eq!(read("state"), Some(2));
    assert_eq!(read("capacity"), Some(1000));
    assert_eq!(read("allocation"), Some(400));
    assert_eq!(read("available"), Some(600));

    assert!(matches!(
        rt.call(&pool, "info", &[]),
        Err(StorageError::InvalidHandle { .. })
    ));
}

/// Test volume methods, cloning and truthiness of `autostart=`.
#[test]
fn test_volume_dispatch() {
    let rt = Runtime::new();
    let (host, conn) = connect();

    let pool = rt
        .call(&conn, "create_storage_pool_xml", &[Value::from(POOL_XML)])
        .unwrap();
    let vol = rt
        .call(
            &pool,
            "create_vol_xml",
            &[Value::from(
                "<volume type='block'><name>base</name><capacity>64</capacity></volume>",
            )],
        )
        .unwrap();
    let copy = rt
        .call(
            &pool,
            "create_vol_xml_from",
            &[Value::from("<volume><name>copy</name></volume>"), vol.clone()],
        )
        .unwrap();

    let info = rt.call(&copy, "info", &[]).unwrap();
    assert_eq!(rt.call(&info, "capacity", &[]).unwrap().as_i64(), Some(64));
    assert_eq!(
        rt.call(&info, "type", &[]).unwrap().as_i64(),
        rt.constant(Class::StorageVol, "FILE").unwrap().as_i64()
    );

    let owner = rt.call(&copy, "pool", &[]).unwrap();
    assert_eq!(rt.call(&owner, "name", &[]).unwrap().as_str(), Some("scratch"));

    assert!(matches!(
        rt.call(&pool, "create_vol_xml_from", &[Value::from("<volume/>"), Value::Nil]),
        Err(StorageError::TypeMismatch(_))
    ));

    // Transient pools reject autostart; the value still reaches the host.
    let err = rt.call(&pool, "autostart=", &[Value::Nil]).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Operation));
    assert_eq!(host.calls_to("virStoragePoolSetAutostart"), 1);

    rt.call(&vol, "wipe", &[]).unwrap();
    rt.call(&vol, "delete", &[Value::Nil]).unwrap();
    assert_eq!(host.last_flags("virStorageVolDelete"), Some(0));
    rt.call(&vol, "free", &[]).unwrap();
    rt.call(&vol, "free", &[]).unwrap();
}

/// Test that the registration table covers every class.
#[test]
fn test_method_enumeration() {
    let rt = Runtime::new();

    let names: Vec<_> = rt.methods(Class::StorageVol).iter().map(|d| d.name).collect();
    assert_eq!(
        names,
        vec!["pool", "name", "key", "path", "delete", "wipe", "info", "xml_desc", "free"]
    );

    let autostart = rt
        .methods(Class::StoragePool)
        .into_iter()
        .filter(|d| d.native == Some("virStoragePoolGetAutostart"))
        .count();
    assert_eq!(autostart, 2);

    assert!(rt.methods(Class::StoragePoolInfo).iter().all(|d| d.native.is_none()));
    assert!(matches!(
        rt.constant(Class::Connect, "RUNNING"),
        Err(StorageError::NoConstant { class: "Connect", .. })
    ));
}

/// Test connection level methods through the runtime.
#[test]
fn test_connection_dispatch() {
    let rt = Runtime::new();
    let conn = rt.open("test:///default").unwrap();

    assert_eq!(
        rt.call(&conn, "uri", &[]).unwrap().as_str(),
        Some("test:///default")
    );
    assert_eq!(
        rt.call(&conn, "num_of_storage_pools", &[]).unwrap().as_i64(),
        Some(1)
    );

    let err = rt
        .call(&conn, "lookup_storage_pool_by_uuid", &[Value::from("not-a-uuid")])
        .unwrap_err();
    assert_eq!(err.call(), Some("virStoragePoolLookupByUUIDString"));

    rt.call(&conn, "close", &[]).unwrap();
    assert!(matches!(
        rt.call(&conn, "list_storage_pools", &[]),
        Err(StorageError::ConnectionClosed)
    ));
}
