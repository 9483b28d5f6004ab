//! Error types for the storage binding layer.

use thiserror::Error;
use tracing::warn;

use crate::connection::Connection;
use crate::native::NativeError;

/// Category of a failed native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Lookup, info and list failures.
    Retrieve,
    /// Persistent definition failures.
    Definition,
    /// Creation and every other failure.
    Operation,
}

/// Errors that can occur during storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A lookup, info or list call failed.
    #[error("Call to {call} failed: {message}")]
    Retrieve {
        call: &'static str,
        message: String,
        uri: Option<String>,
    },

    /// Defining a persistent object failed.
    #[error("Call to {call} failed: {message}")]
    Definition {
        call: &'static str,
        message: String,
        uri: Option<String>,
    },

    /// Any other native call failed.
    #[error("Call to {call} failed: {message}")]
    Operation {
        call: &'static str,
        message: String,
        uri: Option<String>,
    },

    /// The wrapper was used after `free`.
    #[error("{class} has been freed")]
    InvalidHandle { class: &'static str },

    /// The connection this object was obtained from is gone.
    #[error("Connection is closed")]
    ConnectionClosed,

    /// Failed to open a connection.
    #[error("Failed to connect: {0}")]
    ConnectionFailed(String),

    /// No such method on the receiver's class.
    #[error("Undefined method '{method}' for {class}")]
    NoMethod { class: &'static str, method: String },

    /// No such constant on the class.
    #[error("Uninitialized constant {class}::{name}")]
    NoConstant { class: &'static str, name: String },

    /// Wrong number of arguments.
    #[error("Wrong number of arguments for {method} ({given} for {expected})")]
    Arity {
        method: &'static str,
        given: usize,
        expected: String,
    },

    /// Argument of the wrong type.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Numeric argument out of range.
    #[error("Value out of range: {0}")]
    Range(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Category of a translated native failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            StorageError::Retrieve { .. } => Some(ErrorKind::Retrieve),
            StorageError::Definition { .. } => Some(ErrorKind::Definition),
            StorageError::Operation { .. } => Some(ErrorKind::Operation),
            _ => None,
        }
    }

    /// Name of the native entry point that failed, if any.
    pub fn call(&self) -> Option<&'static str> {
        match self {
            StorageError::Retrieve { call, .. }
            | StorageError::Definition { call, .. }
            | StorageError::Operation { call, .. } => Some(call),
            _ => None,
        }
    }

    /// URI of the connection the failure happened on, when still reachable.
    pub fn uri(&self) -> Option<&str> {
        match self {
            StorageError::Retrieve { uri, .. }
            | StorageError::Definition { uri, .. }
            | StorageError::Operation { uri, .. } => uri.as_deref(),
            _ => None,
        }
    }
}

/// Translate a native failure into a categorized error.
///
/// This is the only place failure categories are decided. Nothing is retried.
pub(crate) fn native_failure(
    kind: ErrorKind,
    call: &'static str,
    conn: Option<&Connection>,
    err: NativeError,
) -> StorageError {
    let uri = conn.map(|c| c.uri().to_string());
    let message = err.message;

    warn!(call = call, uri = ?uri, error = %message, "Native call failed");

    match kind {
        ErrorKind::Retrieve => StorageError::Retrieve { call, message, uri },
        ErrorKind::Definition => StorageError::Definition { call, message, uri },
        ErrorKind::Operation => StorageError::Operation { call, message, uri },
    }
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_keeps_call_and_message() {
        let err = native_failure(
            ErrorKind::Retrieve,
            "virStoragePoolLookupByName",
            None,
            NativeError::new("Storage pool not found: no pool with matching name 'x'"),
        );

        assert_eq!(err.kind(), Some(ErrorKind::Retrieve));
        assert_eq!(err.call(), Some("virStoragePoolLookupByName"));
        assert!(err.uri().is_none());
        assert!(err.to_string().contains("no pool with matching name"));
    }

    #[test]
    fn test_categories() {
        let def = native_failure(
            ErrorKind::Definition,
            "virStoragePoolDefineXML",
            None,
            NativeError::new("bad xml"),
        );
        assert!(matches!(def, StorageError::Definition { .. }));

        let op = native_failure(
            ErrorKind::Operation,
            "virStoragePoolBuild",
            None,
            NativeError::new("busy"),
        );
        assert!(matches!(op, StorageError::Operation { .. }));

        let freed = StorageError::InvalidHandle { class: "StoragePool" };
        assert_eq!(freed.kind(), None);
        assert_eq!(freed.call(), None);
        assert_eq!(freed.to_string(), "StoragePool has been freed");
    }
}
