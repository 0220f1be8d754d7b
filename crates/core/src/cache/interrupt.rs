//! Interrupt coordination for the owner connection.
//!
//! SQLite's interrupt flag is connection-global: it aborts whatever statement
//! is running when it is raised. Every touch of it goes through one mutex,
//! which writers also hold for the full length of their transaction so an
//! interrupt can never land in the middle of a write.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Instant;

use tokio_rusqlite::rusqlite::InterruptHandle;
use tokio_util::sync::CancellationToken;

use super::Error;

/// Shared handle to the connection's interrupt primitive.
#[derive(Clone)]
pub(crate) struct Interrupter {
    handle: Arc<Mutex<InterruptHandle>>,
}

impl std::fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupter").finish_non_exhaustive()
    }
}

impl Interrupter {
    pub(crate) fn new(handle: InterruptHandle) -> Self {
        Self { handle: Arc::new(Mutex::new(handle)) }
    }

    /// Take the mutex for the duration of a write.
    ///
    /// The handle itself carries no state a panicking holder could corrupt,
    /// so a poisoned lock is recovered.
    pub(crate) fn hold(&self) -> MutexGuard<'_, InterruptHandle> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Abort whatever statement is running on the connection. Blocks while a
    /// write holds the mutex.
    pub(crate) fn interrupt(&self) {
        self.hold().interrupt();
    }

    /// Interrupt from outside the executor queue.
    ///
    /// Runs on the blocking pool so waiting for the mutex never stalls the
    /// caller's scheduler. Reaches a unit that is already running, which a
    /// queued interrupt could not.
    pub(crate) async fn force(&self) -> Result<(), Error> {
        let this = self.clone();
        let started = Instant::now();
        tokio::task::spawn_blocking(move || this.interrupt())
            .await
            .map_err(|e| Error::InterruptFailed(e.to_string()))?;
        tracing::debug!(elapsed_us = started.elapsed().as_micros() as u64, "forced interrupt");
        Ok(())
    }

    /// Interrupt without waiting for the mutex.
    ///
    /// Returns false when the mutex is taken. A write holding it means no
    /// select can be running on the owner thread, so there is nothing to abort.
    pub(crate) fn try_interrupt(&self) -> bool {
        match self.handle.try_lock() {
            Ok(handle) => handle.interrupt(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().interrupt(),
            Err(TryLockError::WouldBlock) => return false,
        }
        true
    }
}

/// Interrupts the connection if dropped while armed.
///
/// Covers a select future dropped mid-flight (a timeout or a losing
/// `select!` branch): the running query is aborted instead of left to finish.
/// `Drop` cannot await, so this uses [`Interrupter::try_interrupt`]. The
/// `abandoned` token is cancelled first so a unit still waiting in the queue,
/// or sitting between statements, skips its remaining work.
#[derive(Debug)]
pub(crate) struct InterruptOnDrop {
    armed: Option<(Interrupter, CancellationToken)>,
}

impl InterruptOnDrop {
    pub(crate) fn arm(interrupter: &Interrupter, abandoned: &CancellationToken) -> Self {
        Self { armed: Some((interrupter.clone(), abandoned.clone())) }
    }

    pub(crate) fn disarm(mut self) {
        self.armed = None;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some((interrupter, abandoned)) = self.armed.take() {
            abandoned.cancel();
            let delivered = interrupter.try_interrupt();
            tracing::debug!(delivered, "interrupt on drop");
        }
    }
}
