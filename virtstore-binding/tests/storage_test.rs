//! Integration tests for the typed storage operations.
//!
//! These tests run against the mock host and inspect its call journal.

use std::sync::Arc;

use virtstore_binding::{
    Connection, ErrorKind, MockHost, PoolInfo, PoolState, StorageError, VolType,
};

const POOL_XML: &str = r#"<pool type='dir'>
  <name>images</name>
  <uuid>8f1f5c2e-6d7a-4b8e-9a55-3c2f1d0e9b41</uuid>
  <capacity unit='bytes'>1000</capacity>
  <allocation unit='bytes'>400</allocation>
  <available unit='bytes'>600</available>
  <target>
    <path>/var/lib/libvirt/images</path>
  </target>
</pool>"#;

fn connect() -> (Arc<MockHost>, Arc<Connection>) {
    let host = MockHost::new();
    let conn = Connection::from_native("mock:///", Box::new(host.connect("mock:///")));
    (host, conn)
}

/// Test that a freed pool rejects every call and is freed exactly once.
#[test]
fn test_free_invalidates_handle() {
    let (host, conn) = connect();
    let pool = conn.define_storage_pool_xml(POOL_XML, 0).unwrap();
    assert_eq!(host.live_objects(), 1);

    pool.free().unwrap();
    pool.free().unwrap();
    assert!(pool.is_freed());

    for result in [pool.name().map(|_| ()), pool.refresh(0), pool.undefine()] {
        assert!(matches!(
            result,
            Err(StorageError::InvalidHandle { class: "StoragePool" })
        ));
    }

    drop(pool);
    assert_eq!(host.calls_to("virStoragePoolFree"), 1);
    assert_eq!(host.live_objects(), 0);
}

/// Test that dropping wrappers without `free` releases native objects.
#[test]
fn test_drop_releases_native_objects() {
    let (host, conn) = connect();
    {
        let pool = conn.create_storage_pool_xml(POOL_XML, 0).unwrap();
        let _vol = pool
            .create_vol_xml("<volume><name>a.img</name></volume>", 0)
            .unwrap();
        assert_eq!(host.live_objects(), 2);
    }
    assert_eq!(host.live_objects(), 0);
    assert_eq!(host.calls_to("virStorageVolFree"), 1);
}

/// Test that listing an empty pool never reaches the fill call.
#[test]
fn test_list_volumes_on_empty_pool() {
    let (host, conn) = connect();
    let pool = conn.create_storage_pool_xml(POOL_XML, 0).unwrap();

    assert_eq!(pool.list_volumes().unwrap(), Vec::<String>::new());
    assert_eq!(host.calls_to("virStoragePoolNumOfVolumes"), 1);
    assert_eq!(host.calls_to("virStoragePoolListVolumes"), 0);
}

/// Test count-then-fill ordering and a failing fill call.
#[test]
fn test_list_volumes_count_then_fill() {
    let (host, conn) = connect();
    let pool = conn.create_storage_pool_xml(POOL_XML, 0).unwrap();
    for name in ["b.img", "a.img"] {
        pool.create_vol_xml(&format!("<volume><name>{}</name></volume>", name), 0)
            .unwrap();
    }

    assert_eq!(pool.list_volumes().unwrap(), vec!["a.img", "b.img"]);

    let calls: Vec<_> = host
        .calls()
        .into_iter()
        .map(|c| c.name)
        .filter(|n| n.starts_with("virStoragePool") && n.contains("Volumes"))
        .collect();
    assert_eq!(calls, vec!["virStoragePoolNumOfVolumes", "virStoragePoolListVolumes"]);

    host.fail_next("virStoragePoolListVolumes", "internal error: buffer too small");
    let err = pool.list_volumes().unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Retrieve));
    assert!(err.to_string().contains("buffer too small"));
}

/// Test that omitted flags reach the native layer as 0.
#[test]
fn test_default_flags_are_zero() {
    let (host, conn) = connect();
    let pool = conn.define_storage_pool_xml(POOL_XML, 0).unwrap();

    pool.build(0).unwrap();
    pool.create(0).unwrap();
    pool.xml_desc(0).unwrap();

    for call in [
        "virStoragePoolDefineXML",
        "virStoragePoolBuild",
        "virStoragePoolCreate",
        "virStoragePoolGetXMLDesc",
    ] {
        assert_eq!(host.last_flags(call), Some(0), "{}", call);
    }
}

/// Test that pool info carries the reported values and outlives the pool.
#[test]
fn test_pool_info_snapshot() {
    let (_host, conn) = connect();
    let pool = conn.create_storage_pool_xml(POOL_XML, 0).unwrap();

    let info = pool.info().unwrap();
    pool.free().unwrap();
    drop(pool);

    assert_eq!(
        info,
        PoolInfo {
            state: PoolState::Running,
            capacity: 1000,
            allocation: 400,
            available: 600,
        }
    );
}

/// Test that a failed name lookup is a retrieve error naming the call.
#[test]
fn test_lookup_failure_is_retrieve_error() {
    let (_host, conn) = connect();

    match conn.lookup_storage_pool_by_name("nope") {
        Err(StorageError::Retrieve { call, message, uri }) => {
            assert_eq!(call, "virStoragePoolLookupByName");
            assert!(message.contains("nope"));
            assert_eq!(uri.as_deref(), Some("mock:///"));
        }
        other => panic!("expected retrieve error, got {:?}", other),
    }
}

/// Test that a rejected definition is a definition error.
#[test]
fn test_define_failure_is_definition_error() {
    let (_host, conn) = connect();

    let err = conn
        .define_storage_pool_xml("<pool><uuid>x</uuid></pool>", 0)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Definition));
    assert_eq!(err.call(), Some("virStoragePoolDefineXML"));

    let err = conn.create_storage_pool_xml("<pool/>", 0).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Operation));
}

/// Test that the XML description comes back untouched.
#[test]
fn test_define_xml_round_trip() {
    let (_host, conn) = connect();

    let pool = conn.define_storage_pool_xml(POOL_XML, 0).unwrap();
    assert_eq!(pool.xml_desc(0).unwrap(), POOL_XML);

    let again = conn
        .lookup_storage_pool_by_uuid("8f1f5c2e-6d7a-4b8e-9a55-3c2f1d0e9b41")
        .unwrap();
    assert_eq!(again.name().unwrap(), "images");
}

/// Test the persistent pool lifecycle through the typed API.
#[test]
fn test_pool_lifecycle() {
    let (_host, conn) = connect();
    let pool = conn.define_storage_pool_xml(POOL_XML, 0).unwrap();

    assert!(!pool.is_active().unwrap());
    assert!(pool.is_persistent().unwrap());
    assert_eq!(conn.list_defined_storage_pools().unwrap(), vec!["images"]);

    pool.build(0).unwrap();
    pool.create(0).unwrap();
    assert_eq!(conn.list_storage_pools().unwrap(), vec!["images"]);
    assert_eq!(conn.num_of_defined_storage_pools().unwrap(), 0);

    pool.set_autostart(true).unwrap();
    assert!(pool.autostart().unwrap());

    let err = pool.delete(0).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Operation));

    pool.destroy().unwrap();
    pool.delete(0).unwrap();
    pool.undefine().unwrap();
    assert_eq!(conn.num_of_storage_pools().unwrap(), 0);
    assert_eq!(conn.num_of_defined_storage_pools().unwrap(), 0);
}

/// Test volume creation, lookup and removal.
#[test]
fn test_volume_operations() {
    let (_host, conn) = connect();
    let pool = conn.create_storage_pool_xml(POOL_XML, 0).unwrap();

    let vol = pool
        .create_vol_xml(
            "<volume type='file'><name>disk.qcow2</name>\
             <capacity unit='KiB'>4</capacity><allocation unit='bytes'>100</allocation></volume>",
            0,
        )
        .unwrap();

    let path = vol.path().unwrap();
    assert_eq!(path, "/var/lib/libvirt/images/disk.qcow2");

    let info = vol.info().unwrap();
    assert_eq!(info.kind, VolType::File);
    assert_eq!(info.capacity, 4096);
    assert_eq!(info.allocation, 100);

    let by_name = pool.lookup_volume_by_name("disk.qcow2").unwrap();
    let by_key = pool.lookup_volume_by_key(&vol.key().unwrap()).unwrap();
    let by_path = pool.lookup_volume_by_path(&path).unwrap();
    for found in [&by_name, &by_key, &by_path] {
        assert_eq!(found.name().unwrap(), "disk.qcow2");
    }

    assert_eq!(pool.info().unwrap().allocation, 500);

    vol.delete(0).unwrap();
    assert_eq!(pool.num_of_volumes().unwrap(), 0);
    assert!(matches!(
        by_name.info(),
        Err(StorageError::Retrieve { call: "virStorageVolGetInfo", .. })
    ));
}

/// Test that handles do not keep their connection alive.
#[test]
fn test_connection_back_reference() {
    let (_host, conn) = connect();
    let pool = conn.create_storage_pool_xml(POOL_XML, 0).unwrap();
    assert!(pool.connection().is_some());

    drop(conn);
    assert!(pool.connection().is_none());
    assert!(matches!(
        pool.lookup_volume_by_name("a.img"),
        Err(StorageError::ConnectionClosed)
    ));

    // Errors raised without a live connection carry no URI.
    let err = pool.refresh(1).unwrap_err();
    assert_eq!(err.uri(), None);
}

/// Test source discovery with and without a source specification.
#[test]
fn test_discover_sources() {
    let (host, conn) = connect();

    let xml = conn.discover_storage_pool_sources("logical", None, 0).unwrap();
    assert!(xml.contains("<sources>"));

    let err = conn
        .discover_storage_pool_sources("netfs", None, 0)
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Retrieve));

    conn.discover_storage_pool_sources("netfs", Some("<source><host name='nas'/></source>"), 0)
        .unwrap();
    assert_eq!(host.calls_to("virConnectFindStoragePoolSources"), 3);
}
