//! Synchronous entry into async evaluation.
//!
//! Flush hooks run synchronously, but policy and workflow lookups are async.
//! [`AsyncBridge`] runs each call on a dedicated thread with its own
//! current-thread runtime, so it never blocks on a runtime the caller may
//! already be inside. The caller's identity is re-established on that thread
//! before the future is polled.

use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};
use warden_types::CallerIdentity;

use crate::error::GateError;
use crate::identity::with_identity;

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

/// Runs async work to completion from synchronous code.
///
/// Clones share the abandoned-worker count.
#[derive(Clone, Debug)]
pub struct AsyncBridge {
    timeout: Duration,
    abandoned: Arc<AtomicUsize>,
}

impl AsyncBridge {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            abandoned: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Timed-out workers whose future has not finished yet.
    ///
    /// Each one holds an OS thread and its runtime until the future
    /// completes; a future that never completes holds them forever.
    pub fn abandoned_workers(&self) -> usize {
        self.abandoned.load(Ordering::Acquire)
    }

    /// Build the future on a worker thread and block until it resolves.
    ///
    /// Errors from the future are returned unchanged. A panic on the worker
    /// thread becomes [`GateError::Bridge`]; exceeding the timeout becomes
    /// [`GateError::BridgeTimeout`] and abandons the worker thread, which
    /// keeps running until its future completes (see
    /// [`AsyncBridge::abandoned_workers`]).
    pub fn run<F, Fut, T>(&self, identity: &CallerIdentity, make: F) -> Result<T, GateError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, GateError>>,
        T: Send + 'static,
    {
        let identity = identity.clone();
        let (tx, rx) = mpsc::sync_channel(1);
        let abandoned = Arc::clone(&self.abandoned);
        let state = Arc::new(AtomicU8::new(RUNNING));
        let worker_state = Arc::clone(&state);

        let worker = thread::Builder::new()
            .name("warden-bridge".to_string())
            .spawn(move || {
                let _completion = Completion {
                    state: worker_state,
                    abandoned,
                };
                let result = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(with_identity(identity, make())),
                    Err(e) => Err(GateError::Bridge(format!("failed to start runtime: {e}"))),
                };
                // The receiver is gone once the caller has timed out.
                let _ = tx.send(result);
            })
            .map_err(|e| GateError::Bridge(format!("failed to spawn worker: {e}")))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => {
                if worker.join().is_err() {
                    debug!("Bridge worker panicked after delivering its result");
                }
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                let abandoned_workers = self.abandoned.fetch_add(1, Ordering::AcqRel) + 1;
                if state
                    .compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    // Finished after the deadline; its result is already sent.
                    self.abandoned.fetch_sub(1, Ordering::AcqRel);
                    let result = rx
                        .recv()
                        .map_err(|_| GateError::Bridge("worker exited without a result".into()))?;
                    let _ = worker.join();
                    return result;
                }
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    abandoned_workers,
                    "Bridge call timed out; worker thread abandoned"
                );
                Err(GateError::BridgeTimeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                Err(GateError::Bridge("worker exited without a result".to_string()))
            }
        }
    }
}

/// Marks a worker finished when its thread ends, including by unwinding.
struct Completion {
    state: Arc<AtomicU8>,
    abandoned: Arc<AtomicUsize>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self
            .state
            .compare_exchange(RUNNING, FINISHED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.abandoned.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
