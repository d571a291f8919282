//! The single logical execution context that user callbacks run on.
//!
//! TLS handshakes call the verification hook from whatever thread drives
//! the connection. User callbacks must not run concurrently with each
//! other, so the hook posts a job to the [`Dispatcher`]'s worker thread and
//! blocks until the worker has run it. A job posted from the worker itself
//! runs inline instead of deadlocking on its own queue.
//!
//! The queue and the reply path are `tokio::sync` channels driven from plain
//! threads (`blocking_recv`), so no runtime is required. `run_blocking` must
//! not be called from inside an async task.
//!
//! The dispatcher also owns the method table that
//! [`VerifyCallback::Named`](crate::verify::VerifyCallback::Named) callbacks
//! resolve against.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle, ThreadId};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::verify::{MethodName, VerifyFn, VerifyResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors returned when handing work to the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to spawn dispatcher thread: {0}")]
    Spawn(String),

    #[error("dispatcher is shut down")]
    Closed,

    #[error("dispatched job did not complete")]
    Abandoned,
}

/// Named methods callable by [`VerifyCallback::Named`](crate::verify::VerifyCallback::Named).
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: Arc<RwLock<HashMap<MethodName, Arc<VerifyFn>>>>,
}

impl MethodTable {
    pub fn insert(&self, name: MethodName, method: Arc<VerifyFn>) {
        self.methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, method);
    }

    pub fn get(&self, name: &MethodName) -> Option<Arc<VerifyFn>> {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &MethodName) -> bool {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

/// Handle to a dispatcher worker. Cloning shares the same worker; the worker
/// exits once the last handle is dropped.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    sender: Option<mpsc::UnboundedSender<Job>>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
    methods: MethodTable,
}

impl Dispatcher {
    /// Start a dispatcher with a worker thread called `name`.
    pub fn spawn(name: impl Into<String>) -> Result<Self, DispatchError> {
        let name = name.into();
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();

        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(receiver))
            .map_err(|e| DispatchError::Spawn(e.to_string()))?;
        let worker_id = worker.thread().id();

        debug!(dispatcher = %name, "dispatcher started");

        Ok(Self {
            inner: Arc::new(Inner {
                name,
                sender: Some(sender),
                worker: Some(worker),
                worker_id,
                methods: MethodTable::default(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns `true` when called from the dispatcher's worker thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.worker_id
    }

    /// Run `f` on the worker thread and block until it returns.
    ///
    /// Runs inline when already on the worker. If `f` panics the worker
    /// survives and the caller gets [`DispatchError::Abandoned`].
    pub fn run_blocking<F, R>(&self, f: F) -> Result<R, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return Ok(f());
        }

        let sender = self.inner.sender.as_ref().ok_or(DispatchError::Closed)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            // A panic in `f` drops `reply_tx` unsent.
            let _ = reply_tx.send(f());
        });

        sender.send(job).map_err(|_| DispatchError::Closed)?;
        reply_rx
            .blocking_recv()
            .map_err(|_| DispatchError::Abandoned)
    }

    /// Register a method callable through `VerifyCallback::Named(name)`.
    /// Replaces any previous method with the same name.
    pub fn register_method<F>(&self, name: impl AsRef<str>, method: F)
    where
        F: Fn(Option<&str>, Option<&str>) -> VerifyResult + Send + Sync + 'static,
    {
        self.inner
            .methods
            .insert(MethodName::new(name), Arc::new(method));
    }

    pub fn has_method(&self, name: impl AsRef<str>) -> bool {
        self.inner.methods.contains(&MethodName::new(name))
    }

    pub fn methods(&self) -> &MethodTable {
        &self.inner.methods
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.inner.name)
            .finish()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Closing the queue ends the worker loop.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if thread::current().id() == self.worker_id {
                return;
            }
            if worker.join().is_err() {
                warn!(dispatcher = %self.name, "dispatcher worker panicked");
            }
        }
    }
}

fn run_worker(mut receiver: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = receiver.blocking_recv() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("dispatched job panicked");
        }
    }
    debug!("dispatcher queue closed");
}
