//! Owner tracked mutual exclusion.
//!
//! [`SyncLock`] records which execution context currently holds it. A second
//! `lock` from the holder does not block: it reports that nothing was newly
//! acquired, so nested critical sections on the same context coalesce instead
//! of deadlocking. [`SyncLockGuard`] releases on drop only when its own
//! acquisition was the one that took the lock.
//!
//! Contexts are identified by an explicit [`ContextId`] token rather than by
//! any notion of the current task. [`ContextId::current`] derives a stable id
//! for the calling thread, which is what code running inside one synchronous
//! section (no `.await` while the guard is alive) should use.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::trace;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_CONTEXT: ContextId = ContextId::next();
}

/// Identity of one execution context.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(NonZeroU64);

impl ContextId {
    /// Allocates a fresh id never handed out before in this process.
    pub fn next() -> Self {
        let raw = NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// The id bound to the calling thread.
    pub fn current() -> Self {
        THREAD_CONTEXT.with(|id| *id)
    }

    pub fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextId({})", self.0)
    }
}

/// A blocking lock that remembers its owner.
#[derive(Debug, Default)]
pub struct SyncLock {
    owner: Mutex<Option<ContextId>>,
    released: Condvar,
}

impl SyncLock {
    pub const fn new() -> Self {
        Self { owner: Mutex::new(None), released: Condvar::new() }
    }

    fn owner_slot(&self) -> MutexGuard<'_, Option<ContextId>> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until `context` owns the lock.
    ///
    /// Returns `true` when the lock was newly acquired and `false` when
    /// `context` already was the owner, in which case nothing changes.
    pub fn lock(&self, context: ContextId) -> bool {
        let mut owner = self.owner_slot();
        if *owner == Some(context) {
            trace!(?context, "lock already held by caller, coalescing");
            return false;
        }

        while owner.is_some() {
            owner = self.released.wait(owner).unwrap_or_else(PoisonError::into_inner);
        }

        *owner = Some(context);
        true
    }

    /// Acquires without blocking. Same return contract as [`SyncLock::lock`]
    /// except that `None` is returned when another context holds the lock.
    pub fn try_lock(&self, context: ContextId) -> Option<bool> {
        let mut owner = self.owner_slot();
        match *owner {
            Some(current) if current == context => Some(false),
            Some(_) => None,
            None => {
                *owner = Some(context);
                Some(true)
            }
        }
    }

    /// Releases the lock and clears the owner, whoever holds it.
    pub fn unlock(&self) {
        let mut owner = self.owner_slot();
        *owner = None;
        drop(owner);
        self.released.notify_one();
    }

    pub fn owner(&self) -> Option<ContextId> {
        *self.owner_slot()
    }

    pub fn is_locked(&self) -> bool {
        self.owner().is_some()
    }

    /// Acquires for `context` and returns a guard releasing on drop.
    pub fn guard(&self, context: ContextId) -> SyncLockGuard<'_> {
        let acquired = self.lock(context);
        SyncLockGuard { lock: self, acquired }
    }

    /// Shorthand for `guard(ContextId::current())`.
    pub fn guard_current(&self) -> SyncLockGuard<'_> {
        self.guard(ContextId::current())
    }
}

/// Scoped acquisition of a [`SyncLock`].
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SyncLockGuard<'a> {
    lock: &'a SyncLock,
    acquired: bool,
}

impl SyncLockGuard<'_> {
    /// Whether this guard took the lock, as opposed to nesting inside a holder.
    pub fn acquired(&self) -> bool {
        self.acquired
    }
}

impl Drop for SyncLockGuard<'_> {
    fn drop(&mut self) {
        if self.acquired {
            self.lock.unlock();
        }
    }
}
