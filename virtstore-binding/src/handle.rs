//! Wrapper tying one native object to the connection it came from.

use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{native_failure, ErrorKind, Result, StorageError};
use crate::native::NativeObject;

/// Owner of exactly one native object.
///
/// Calls borrow the object under a read lock; `release` takes it out under
/// the write lock and hands it back to the library. Once released, every
/// access fails with [`StorageError::InvalidHandle`]. The connection back
/// reference is weak and never keeps the connection alive.
pub(crate) struct Handle<T: ?Sized + NativeObject> {
    class: &'static str,
    free_call: &'static str,
    native: RwLock<Option<Box<T>>>,
    conn: Weak<Connection>,
}

impl<T: ?Sized + NativeObject> Handle<T> {
    pub fn wrap(
        class: &'static str,
        free_call: &'static str,
        native: Box<T>,
        conn: &Arc<Connection>,
    ) -> Self {
        Self {
            class,
            free_call,
            native: RwLock::new(Some(native)),
            conn: Arc::downgrade(conn),
        }
    }

    /// Run `f` against the native object.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let slot = self
            .native
            .read()
            .map_err(|_| StorageError::Internal("Lock poisoned".to_string()))?;

        match slot.as_deref() {
            Some(native) => Ok(f(native)),
            None => Err(StorageError::InvalidHandle { class: self.class }),
        }
    }

    /// Return the native object to the library.
    ///
    /// The object is taken out before the free call, so it is never freed
    /// twice even when the free call itself fails. Releasing an already
    /// released handle does nothing.
    pub fn release(&self) -> Result<()> {
        let native = self
            .native
            .write()
            .map_err(|_| StorageError::Internal("Lock poisoned".to_string()))?
            .take();

        let Some(native) = native else {
            debug!(class = self.class, "Handle already released");
            return Ok(());
        };

        native.free().map_err(|e| {
            native_failure(
                ErrorKind::Operation,
                self.free_call,
                self.connection().as_deref(),
                e,
            )
        })
    }

    pub fn is_released(&self) -> bool {
        self.native.read().map(|slot| slot.is_none()).unwrap_or(true)
    }

    /// The owning connection, if it is still alive.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.conn.upgrade()
    }

    /// The owning connection, or `ConnectionClosed`.
    pub fn require_connection(&self) -> Result<Arc<Connection>> {
        self.connection()
            .filter(|c| !c.is_closed())
            .ok_or(StorageError::ConnectionClosed)
    }
}

impl<T: ?Sized + NativeObject> Drop for Handle<T> {
    fn drop(&mut self) {
        let native = match self.native.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(native) = native {
            if let Err(e) = native.free() {
                warn!(class = self.class, error = %e, "Failed to free native object on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::native::mock::MockConnect;
    use crate::native::NativeResult;

    struct Probe {
        frees: Arc<AtomicUsize>,
    }

    impl NativeObject for Probe {
        fn free(self: Box<Self>) -> NativeResult<()> {
            self.frees.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn probe() -> (Box<Probe>, Arc<AtomicUsize>) {
        let frees = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Probe {
                frees: Arc::clone(&frees),
            }),
            frees,
        )
    }

    fn connection() -> Arc<Connection> {
        Connection::from_native("mock:///", Box::new(MockConnect::open("mock:///")))
    }

    #[test]
    fn test_with_after_release_fails() {
        let conn = connection();
        let (native, frees) = probe();
        let handle = Handle::wrap("StoragePool", "virStoragePoolFree", native, &conn);

        assert!(handle.with(|_| ()).is_ok());
        handle.release().unwrap();

        assert!(handle.is_released());
        assert!(matches!(
            handle.with(|_| ()),
            Err(StorageError::InvalidHandle { class: "StoragePool" })
        ));
        assert_eq!(frees.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let conn = connection();
        let (native, frees) = probe();
        let handle = Handle::wrap("StorageVol", "virStorageVolFree", native, &conn);

        handle.release().unwrap();
        handle.release().unwrap();
        drop(handle);

        assert_eq!(frees.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_frees_unreleased() {
        let conn = connection();
        let (native, frees) = probe();
        let handle = Handle::wrap("StorageVol", "virStorageVolFree", native, &conn);

        drop(handle);
        assert_eq!(frees.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_back_reference_is_weak() {
        let conn = connection();
        let (native, _frees) = probe();
        let handle = Handle::wrap("StoragePool", "virStoragePoolFree", native, &conn);

        assert!(handle.connection().is_some());
        drop(conn);
        assert!(handle.connection().is_none());
        assert!(matches!(
            handle.require_connection(),
            Err(StorageError::ConnectionClosed)
        ));
    }
}
