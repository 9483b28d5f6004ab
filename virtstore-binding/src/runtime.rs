//! Dynamic entry point: dispatch method calls by name.

use tracing::{debug, instrument};

use crate::connection::Connection;
use crate::error::{Result, StorageError};
use crate::registry::{self, Class, ConstantDef, MethodDef, Registry};
use crate::value::Value;

/// Dispatches calls through the process-wide registry.
///
/// ```rust,ignore
/// use virtstore_binding::{Runtime, Value};
///
/// let rt = Runtime::new();
/// let conn = rt.open("test:///default")?;
/// let pool = rt.call(&conn, "lookup_storage_pool_by_name", &["default-pool".into()])?;
/// let info = rt.call(&pool, "info", &[])?;
/// println!("{}", info);
/// ```
#[derive(Clone, Copy)]
pub struct Runtime {
    registry: &'static Registry,
}

impl Runtime {
    /// Create a runtime. Registers the classes on first use.
    pub fn new() -> Self {
        Self {
            registry: registry::init(),
        }
    }

    /// Open a connection and return it as a `Connect` value.
    pub fn open(&self, uri: &str) -> Result<Value> {
        Connection::open(uri).map(Value::Connect)
    }

    /// Invoke `method` on `receiver` with positional `args`.
    #[instrument(skip(self, receiver, args), fields(class, args = args.len()))]
    pub fn call(&self, receiver: &Value, method: &str, args: &[Value]) -> Result<Value> {
        let class = receiver.class().ok_or_else(|| StorageError::NoMethod {
            class: receiver.type_name(),
            method: method.to_string(),
        })?;
        tracing::Span::current().record("class", class.name());

        let def = self.registry.method(class, method)?;
        def.check_arity(args.len())?;

        debug!(native = ?def.native, "Dispatching");
        (def.adapter)(receiver, args)
    }

    /// Resolve `Class::NAME`.
    pub fn constant(&self, class: Class, name: &str) -> Result<Value> {
        self.registry.constant(class, name).map(Value::Int)
    }

    pub fn methods(&self, class: Class) -> Vec<&'static MethodDef> {
        self.registry.methods(class)
    }

    pub fn constants(&self, class: Class) -> Vec<&'static ConstantDef> {
        self.registry.constants(class)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::mock::DEFAULT_POOL_NAME;

    #[test]
    fn test_dispatch_through_table() {
        let rt = Runtime::new();
        let conn = rt.open("test:///default").unwrap();

        let names = rt.call(&conn, "list_storage_pools", &[]).unwrap();
        assert_eq!(names.as_list().map(|l| l.len()), Some(1));

        let pool = rt
            .call(&conn, "lookup_storage_pool_by_name", &[Value::from(DEFAULT_POOL_NAME)])
            .unwrap();
        assert_eq!(
            rt.call(&pool, "name", &[]).unwrap().as_str(),
            Some(DEFAULT_POOL_NAME)
        );
        assert_eq!(rt.call(&pool, "autostart?", &[]).unwrap().as_bool(), Some(true));

        let info = rt.call(&pool, "info", &[]).unwrap();
        let state = rt.call(&info, "state", &[]).unwrap();
        assert_eq!(
            state.as_i64(),
            rt.constant(Class::StoragePool, "RUNNING").unwrap().as_i64()
        );
    }

    #[test]
    fn test_unknown_method_and_arity() {
        let rt = Runtime::new();
        let conn = rt.open("mock:///").unwrap();

        assert!(matches!(
            rt.call(&conn, "list_domains", &[]),
            Err(StorageError::NoMethod { class: "Connect", .. })
        ));
        assert!(matches!(
            rt.call(&conn, "lookup_storage_pool_by_name", &[]),
            Err(StorageError::Arity { given: 0, .. })
        ));
        assert!(matches!(
            rt.call(&Value::Int(1), "name", &[]),
            Err(StorageError::NoMethod { class: "integer", .. })
        ));
    }
}
