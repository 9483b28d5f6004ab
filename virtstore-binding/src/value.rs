//! Dynamic values and argument marshalling.
//!
//! The runtime passes arguments and results as [`Value`]s. The helpers here
//! turn positional arguments into native call arguments:
//! - trailing flags default to 0 when absent or `Nil`
//! - strings are passed through untouched
//! - list results use a count query followed by a sized fill call

use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::connection::Connection;
use crate::error::{Result, StorageError};
use crate::pool::{PoolInfo, StoragePool};
use crate::registry::Class;
use crate::volume::{StorageVol, VolInfo};

/// A dynamically typed argument or result.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    /// Byte counts that may not fit an `i64`.
    UInt(u64),
    Str(String),
    List(Vec<Value>),
    Connect(Arc<Connection>),
    Pool(Arc<StoragePool>),
    Vol(Arc<StorageVol>),
    PoolInfo(PoolInfo),
    VolInfo(VolInfo),
}

impl Value {
    /// Class of an object value, `None` for plain data.
    pub fn class(&self) -> Option<Class> {
        match self {
            Value::Connect(_) => Some(Class::Connect),
            Value::Pool(_) => Some(Class::StoragePool),
            Value::Vol(_) => Some(Class::StorageVol),
            Value::PoolInfo(_) => Some(Class::StoragePoolInfo),
            Value::VolInfo(_) => Some(Class::StorageVolInfo),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::UInt(_) => "integer",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Connect(_) => "Connect",
            Value::Pool(_) => "StoragePool",
            Value::Vol(_) => "StorageVol",
            Value::PoolInfo(_) => "StoragePoolInfo",
            Value::VolInfo(_) => "StorageVolInfo",
        }
    }

    /// `Nil` and `false` are false, everything else is true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_connection(&self) -> Option<&Arc<Connection>> {
        match self {
            Value::Connect(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_pool(&self) -> Option<&Arc<StoragePool>> {
        match self {
            Value::Pool(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_vol(&self) -> Option<&Arc<StorageVol>> {
        match self {
            Value::Vol(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_pool_info(&self) -> Option<&PoolInfo> {
        match self {
            Value::PoolInfo(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_vol_info(&self) -> Option<&VolInfo> {
        match self {
            Value::VolInfo(i) => Some(i),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::UInt(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nil
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items.into_iter().map(Value::Str).collect())
    }
}

impl From<Arc<Connection>> for Value {
    fn from(conn: Arc<Connection>) -> Self {
        Value::Connect(conn)
    }
}

impl From<StoragePool> for Value {
    fn from(pool: StoragePool) -> Self {
        Value::Pool(Arc::new(pool))
    }
}

impl From<StorageVol> for Value {
    fn from(vol: StorageVol) -> Self {
        Value::Vol(Arc::new(vol))
    }
}

impl From<PoolInfo> for Value {
    fn from(info: PoolInfo) -> Self {
        Value::PoolInfo(info)
    }
}

impl From<VolInfo> for Value {
    fn from(info: VolInfo) -> Self {
        Value::VolInfo(info)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::UInt(u) => write!(f, "{}", u),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str("\n")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Connect(c) => write!(f, "#<Connect {}>", c.uri()),
            Value::Pool(_) => f.write_str("#<StoragePool>"),
            Value::Vol(_) => f.write_str("#<StorageVol>"),
            Value::PoolInfo(i) => write!(
                f,
                "state: {}\ncapacity: {}\nallocation: {}\navailable: {}",
                i.state.as_str(),
                i.capacity,
                i.allocation,
                i.available
            ),
            Value::VolInfo(i) => write!(
                f,
                "type: {}\ncapacity: {}\nallocation: {}",
                i.kind.as_str(),
                i.capacity,
                i.allocation
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Nil => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::UInt(u) => serializer.serialize_u64(*u),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::PoolInfo(i) => i.serialize(serializer),
            Value::VolInfo(i) => i.serialize(serializer),
            Value::Connect(_) | Value::Pool(_) | Value::Vol(_) => {
                serializer.collect_str(self)
            }
        }
    }
}

// =============================================================================
// Argument helpers
// =============================================================================

/// Optional trailing flags at `index`. Absent or `Nil` means 0.
pub(crate) fn flags(args: &[Value], index: usize) -> Result<u32> {
    match args.get(index) {
        None | Some(Value::Nil) => Ok(0),
        Some(Value::Int(i)) => u32::try_from(*i)
            .map_err(|_| StorageError::Range(format!("flags {} out of range for u32", i))),
        Some(Value::UInt(u)) => u32::try_from(*u)
            .map_err(|_| StorageError::Range(format!("flags {} out of range for u32", u))),
        Some(other) => Err(StorageError::TypeMismatch(format!(
            "flags must be an integer, got {}",
            other.type_name()
        ))),
    }
}

/// Required string argument at `index`.
pub(crate) fn string<'a>(args: &'a [Value], index: usize, what: &str) -> Result<&'a str> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(StorageError::TypeMismatch(format!(
            "{} must be a string, got {}",
            what,
            other.type_name()
        ))),
        None => Err(StorageError::TypeMismatch(format!("{} is required", what))),
    }
}

/// Optional string argument at `index`. Absent or `Nil` means `None`.
pub(crate) fn optional_string<'a>(
    args: &'a [Value],
    index: usize,
    what: &str,
) -> Result<Option<&'a str>> {
    match args.get(index) {
        None | Some(Value::Nil) => Ok(None),
        Some(_) => string(args, index, what).map(Some),
    }
}

/// Run a count query, then the fill call sized by its result.
///
/// The fill call is skipped when the count is zero. A host reporting more
/// names than counted is truncated to the count.
pub(crate) fn collect_names(
    count: impl FnOnce() -> Result<u32>,
    fill: impl FnOnce(usize) -> Result<Vec<String>>,
) -> Result<Vec<String>> {
    let count = count()? as usize;
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut names = fill(count)?;
    names.truncate(count);
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{PoolState, VolType};
    use std::cell::Cell;

    #[test]
    fn test_flags_defaults_and_ranges() {
        assert_eq!(flags(&[], 0).unwrap(), 0);
        assert_eq!(flags(&[Value::Nil], 0).unwrap(), 0);
        assert_eq!(flags(&[Value::from("x"), Value::Int(3)], 1).unwrap(), 3);
        assert_eq!(flags(&[Value::UInt(u64::from(u32::MAX))], 0).unwrap(), u32::MAX);

        assert!(matches!(flags(&[Value::Int(-1)], 0), Err(StorageError::Range(_))));
        assert!(matches!(
            flags(&[Value::Int(i64::from(u32::MAX) + 1)], 0),
            Err(StorageError::Range(_))
        ));
        assert!(matches!(
            flags(&[Value::from("1")], 0),
            Err(StorageError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_strings_pass_through() {
        let args = [Value::from("  <pool/>\n"), Value::Nil];
        assert_eq!(string(&args, 0, "xml").unwrap(), "  <pool/>\n");
        assert_eq!(optional_string(&args, 1, "spec").unwrap(), None);
        assert_eq!(optional_string(&args, 2, "spec").unwrap(), None);
        assert!(string(&args, 1, "name").is_err());
        assert!(string(&args, 5, "name").is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::from("").is_truthy());
    }

    #[test]
    fn test_collect_names() {
        let filled = Cell::new(false);
        let names = collect_names(
            || Ok(0),
            |_| {
                filled.set(true);
                Ok(vec!["x".to_string()])
            },
        )
        .unwrap();
        assert!(names.is_empty());
        assert!(!filled.get());

        let names = collect_names(
            || Ok(1),
            |max| {
                assert_eq!(max, 1);
                Ok(vec!["a".to_string(), "b".to_string()])
            },
        )
        .unwrap();
        assert_eq!(names, vec!["a"]);

        let err = collect_names(
            || Ok(2),
            |_| Err(StorageError::Internal("fill failed".to_string())),
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::Internal(_)));
    }

    #[test]
    fn test_serialize_info_values() {
        let pool = Value::from(PoolInfo {
            state: PoolState::Running,
            capacity: 1000,
            allocation: 400,
            available: 600,
        });
        let json = serde_json::to_value(&pool).unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["available"], 600);

        let list = Value::from(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(serde_json::to_string(&list).unwrap(), r#"["a","b"]"#);

        let vol = Value::from(VolInfo {
            kind: VolType::Block,
            capacity: 1,
            allocation: 1,
        });
        assert_eq!(vol.class(), Some(Class::StorageVolInfo));
        assert!(vol.to_string().starts_with("type: block"));
    }
}
