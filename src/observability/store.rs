//! Request-scoped context store.
//!
//! The active [`LogContext`] is bound to the current tokio task through a
//! task-local slot, so handlers, middleware and repositories can enrich it
//! without threading a parameter through every layer. Two requests running
//! interleaved on the same worker each see only their own binding.

use std::future::Future;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::context::{ContextPatch, LogContext};

tokio::task_local! {
    static CURRENT_CONTEXT: ContextSlot;
}

/// What a scope is bound to. The request's own scope owns the context; tasks
/// spawned from it only observe it while the request is still alive.
enum ContextSlot {
    Request(RequestHandle),
    Detached(Weak<Mutex<LogContext>>),
}

impl ContextSlot {
    fn handle(&self) -> Option<RequestHandle> {
        match self {
            ContextSlot::Request(handle) => Some(handle.clone()),
            ContextSlot::Detached(weak) => weak.upgrade().map(|inner| RequestHandle { inner }),
        }
    }
}

/// Shared handle to one request's [`LogContext`].
#[derive(Debug, Clone, Default)]
pub struct RequestHandle {
    inner: Arc<Mutex<LogContext>>,
}

impl RequestHandle {
    pub fn new(context: LogContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(context)),
        }
    }

    pub fn snapshot(&self) -> LogContext {
        self.inner.lock().clone()
    }

    /// Run `f` with the context locked. `f` must not call back into the store
    /// or the enrichment functions: the lock is not reentrant.
    pub fn update<R>(&self, f: impl FnOnce(&mut LogContext) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    pub fn ptr_eq(&self, other: &RequestHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Run `future` with `handle` as the active request context.
pub async fn run_with_context<F>(handle: RequestHandle, future: F) -> F::Output
where
    F: Future,
{
    CURRENT_CONTEXT.scope(ContextSlot::Request(handle), future).await
}

/// Synchronous counterpart of [`run_with_context`].
pub fn run_with_context_sync<R>(handle: RequestHandle, f: impl FnOnce() -> R) -> R {
    CURRENT_CONTEXT.sync_scope(ContextSlot::Request(handle), f)
}

/// Handle bound to the current scope, if any.
pub fn current_handle() -> Option<RequestHandle> {
    CURRENT_CONTEXT.try_with(ContextSlot::handle).ok().flatten()
}

/// Snapshot of the active context, or `None` outside any request scope.
pub fn get_request_context() -> Option<LogContext> {
    current_handle().map(|handle| handle.snapshot())
}

/// Shallow-merge `patch` into the active context. No-op without one.
pub fn set_request_context(patch: ContextPatch) {
    with_request_context(|ctx| ctx.apply(patch));
}

/// Mutate the active context in place. Returns `None` without one.
///
/// Same locking rule as [`RequestHandle::update`].
pub(crate) fn with_request_context<R>(f: impl FnOnce(&mut LogContext) -> R) -> Option<R> {
    current_handle().map(|handle| handle.update(f))
}

/// `tokio::spawn` that carries the active request context into the new task.
///
/// The task gets a weak binding: once the request has completed and dropped
/// its context, the task sees no context and its enrichment calls are no-ops.
pub fn spawn_with_context<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match current_handle() {
        Some(handle) => {
            let slot = ContextSlot::Detached(Arc::downgrade(&handle.inner));
            drop(handle);
            tokio::spawn(CURRENT_CONTEXT.scope(slot, future))
        }
        None => tokio::spawn(future),
    }
}
