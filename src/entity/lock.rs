//! Reentrant shared/exclusive lock wrapper.
//!
//! `std::sync::RwLock` is not reentrant: a thread that already holds the
//! write lock and asks for it again deadlocks. Entities need exactly
//! that, so this pairs a plain `RwLock<()>` - used purely as the
//! blocking primitive - with an `UnsafeCell<T>` holding the real data,
//! and a sidecar tracking which thread currently holds the writer and
//! how many nested acquires are outstanding, guarded by its own short
//! `Mutex`. Once a thread holds the outer `RwLock<()>` write guard,
//! further acquires on that same thread skip the real lock and go
//! straight to the cell, which is sound because the outer guard already
//! excludes every other thread for the whole nested scope.

use std::cell::UnsafeCell;
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// A writer was requested on a thread that only holds a reader -
    /// escalation is not supported and would risk deadlock.
    CannotEscalateReaderToWriter,
}

struct Sidecar {
    writer_thread: Option<ThreadId>,
    writer_depth: u32,
}

/// A reentrant shared/exclusive lock over `T`.
pub struct EntityLock<T> {
    sync: RwLock<()>,
    data: UnsafeCell<T>,
    sidecar: Mutex<Sidecar>,
}

/// A held lock, released on drop. The exclusive guard whose release is the
/// outermost one for its thread runs listener fan-out before the real lock
/// becomes visibly free to other threads (the caller checks
/// [`Guard::is_outermost_write`] and fans out just before dropping it).
pub enum Guard<'a, T> {
    Write {
        lock: &'a EntityLock<T>,
        _guard: RwLockWriteGuard<'a, ()>,
    },
    WriteReentrant {
        lock: &'a EntityLock<T>,
    },
    Read {
        lock: &'a EntityLock<T>,
        _guard: RwLockReadGuard<'a, ()>,
    },
    ReadViaWriter {
        lock: &'a EntityLock<T>,
    },
}

impl<T> EntityLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            sync: RwLock::new(()),
            data: UnsafeCell::new(value),
            sidecar: Mutex::new(Sidecar {
                writer_thread: None,
                writer_depth: 0,
            }),
        }
    }

    fn current_thread_holds_writer(&self) -> bool {
        let sidecar = self.sidecar.lock().unwrap();
        sidecar.writer_thread == Some(thread::current().id())
    }

    /// Acquires the exclusive lock. Reentrant: a thread that already holds
    /// the writer may call this again without blocking.
    pub fn lock(&self) -> Guard<'_, T> {
        if self.current_thread_holds_writer() {
            let mut sidecar = self.sidecar.lock().unwrap();
            sidecar.writer_depth += 1;
            return Guard::WriteReentrant { lock: self };
        }

        let guard = self.sync.write().unwrap();
        let mut sidecar = self.sidecar.lock().unwrap();
        sidecar.writer_thread = Some(thread::current().id());
        sidecar.writer_depth = 1;
        drop(sidecar);

        Guard::Write {
            lock: self,
            _guard: guard,
        }
    }

    /// Acquires the shared lock. A thread already holding the writer may
    /// also acquire a reader; it is simply counted, since the writer guard
    /// already grants it read access. A reader acquire on a thread that
    /// holds nothing blocks normally on the real `RwLock`.
    pub fn lock_shared(&self) -> Guard<'_, T> {
        if self.current_thread_holds_writer() {
            return Guard::ReadViaWriter { lock: self };
        }

        let guard = self.sync.read().unwrap();
        Guard::Read {
            lock: self,
            _guard: guard,
        }
    }

    /// A writer acquire attempted by a thread that holds only a reader is
    /// forbidden. This returns the error a caller can surface instead of
    /// deadlocking;
    /// detecting the reader-only case requires the caller to track its own
    /// held mode, since the lock itself cannot distinguish "no one holds
    /// anything" from "this thread holds a reader".
    pub fn forbidden_escalation() -> LockError {
        LockError::CannotEscalateReaderToWriter
    }
}

impl<T> Guard<'_, T> {
    pub fn get(&self) -> &T {
        match self {
            Guard::Write { lock, .. } => unsafe { &*lock.data.get() },
            Guard::WriteReentrant { lock } => unsafe { &*lock.data.get() },
            Guard::Read { lock, .. } => unsafe { &*lock.data.get() },
            Guard::ReadViaWriter { lock } => unsafe { &*lock.data.get() },
        }
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Guard::Write { lock, .. } => Some(unsafe { &mut *lock.data.get() }),
            Guard::WriteReentrant { lock } => Some(unsafe { &mut *lock.data.get() }),
            _ => None,
        }
    }

    /// True for the one guard whose drop will trigger listener fan-out
    /// (the outermost writer release).
    pub fn is_outermost_write(&self) -> bool {
        matches!(self, Guard::Write { .. })
    }
}

impl<T> Drop for Guard<'_, T> {
    fn drop(&mut self) {
        match self {
            Guard::Write { lock, .. } => {
                let mut sidecar = lock.sidecar.lock().unwrap();
                sidecar.writer_depth -= 1;
                if sidecar.writer_depth == 0 {
                    sidecar.writer_thread = None;
                }
            }
            Guard::WriteReentrant { lock } => {
                let mut sidecar = lock.sidecar.lock().unwrap();
                sidecar.writer_depth -= 1;
            }
            Guard::Read { .. } | Guard::ReadViaWriter { .. } => {}
        }
    }
}

// Safety: access to the `UnsafeCell` is only ever granted while the thread
// holds either the real `RwLock` guard or is recorded as the current writer
// in `sidecar`, both of which enforce the same exclusion `RwLock<T>` would.
unsafe impl<T: Send> Send for EntityLock<T> {}
unsafe impl<T: Send + Sync> Sync for EntityLock<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn reentrant_write_then_write_then_read_then_read() {
        let lock = EntityLock::new(0u32);

        let outer = lock.lock();
        {
            let inner = lock.lock();
            {
                let r1 = lock.lock_shared();
                {
                    let r2 = lock.lock_shared();
                    assert_eq!(*r2.get(), 0);
                }
                assert_eq!(*r1.get(), 0);
            }
            drop(inner);
        }
        drop(outer);
    }

    #[test]
    fn mutation_through_reentrant_write_guard() {
        let lock = EntityLock::new(0u32);
        let mut outer = lock.lock();
        *outer.get_mut().unwrap() = 1;
        {
            let mut inner = lock.lock();
            *inner.get_mut().unwrap() = 2;
        }
        assert_eq!(*outer.get(), 2);
    }

    #[test]
    fn exclusive_blocks_other_threads() {
        let lock = Arc::new(EntityLock::new(0u32));
        let lock2 = Arc::clone(&lock);

        let guard = lock.lock();
        let handle = thread::spawn(move || {
            let _g = lock2.lock();
        });

        thread::yield_now();
        drop(guard);
        handle.join().unwrap();
    }

    #[test]
    fn outermost_write_guard_is_flagged() {
        let lock = EntityLock::new(0u32);
        let outer = lock.lock();
        assert!(outer.is_outermost_write());
    }
}
