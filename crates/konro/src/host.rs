//! # Host Lock Boundary
//!
//! Some host environments serialize their own execution behind a global
//! lock (an interpreter lock, for example). Blocking on a pool job while
//! holding such a lock would stall the host for the full duration of the
//! computation, so the binding glue is expected to release it around the
//! wait.
//!
//! [`HostLock`] captures that contract as a scoped release: calling
//! [`release`](HostLock::release) hands back a guard, and dropping the
//! guard reacquires the lock. Because the guard is dropped on every exit
//! path, including panics, the lock is always reacquired.

/// A host-level lock that can be released for the duration of a scope.
///
/// Implemented by binding glue, not by this crate; see
/// [`TranslationJob::get_with`](crate::TranslationJob::get_with) for the
/// call site that honors it.
pub trait HostLock {
    /// Guard that reacquires the lock when dropped.
    type Guard;

    /// Releases the lock, returning the reacquisition guard.
    fn release(&self) -> Self::Guard;
}
