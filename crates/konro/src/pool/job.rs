use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::TranslationError;
use crate::host::HostLock;
use crate::result::TranslationResult;

/// Awaitable handle to the results of one pool submission.
///
/// A job resolves to one [`TranslationResult`] per submitted example, in
/// submission order. It can be consumed either as a `Future` from async
/// code, or through [`get`](TranslationJob::get) from a plain thread.
/// If the pool shuts down before the job is fulfilled, the job resolves
/// to [`TranslationError::PoolClosed`].
pub struct TranslationJob {
    id: Uuid,
    receiver: oneshot::Receiver<Result<Vec<TranslationResult>, TranslationError>>,
}

impl fmt::Debug for TranslationJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationJob").field("id", &self.id).finish()
    }
}

impl TranslationJob {
    pub(crate) fn new(
        id: Uuid,
        receiver: oneshot::Receiver<Result<Vec<TranslationResult>, TranslationError>>,
    ) -> Self {
        Self { id, receiver }
    }

    /// Identifier of this submission, matching the pool's log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Blocks the calling thread until the job completes.
    ///
    /// Must not be called from within an async runtime; async callers
    /// await the job instead.
    pub fn get(self) -> Result<Vec<TranslationResult>, TranslationError> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(TranslationError::PoolClosed))
    }

    /// Blocks like [`get`](Self::get), releasing the given host lock for
    /// exactly the duration of the wait.
    ///
    /// The lock is reacquired on every exit path, including panics, via
    /// the guard returned by [`HostLock::release`].
    pub fn get_with<L: HostLock>(self, lock: &L) -> Result<Vec<TranslationResult>, TranslationError> {
        let _guard = lock.release();
        self.get()
    }
}

impl Future for TranslationJob {
    type Output = Result<Vec<TranslationResult>, TranslationError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().receiver)
            .poll(cx)
            .map(|received| match received {
                Ok(result) => result,
                Err(_) => Err(TranslationError::PoolClosed),
            })
    }
}
