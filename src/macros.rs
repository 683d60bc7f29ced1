//! Lock helpers for the runtime heap.
//!
//! Heap objects guard their mutable state with [`std::sync::RwLock`]. A poisoned lock
//! means another thread panicked mid-execution, which is reported as
//! [`crate::Error::LockError`] instead of propagating the panic.

/// Acquire a read guard or return [`crate::Error::LockError`] from the enclosing function.
macro_rules! read_lock {
    ($rwlock:expr) => {
        $rwlock.read().map_err(|_| crate::Error::LockError)?
    };
}

/// Acquire a write guard or return [`crate::Error::LockError`] from the enclosing function.
macro_rules! write_lock {
    ($rwlock:expr) => {
        $rwlock.write().map_err(|_| crate::Error::LockError)?
    };
}
