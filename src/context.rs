//! Execution contexts for callback invocation.
//!
//! Every callback registration names where its callback should run. Context
//! passing is explicit: there is no ambient thread-local capture, only the
//! [`ExecutionContext`] argument handed to the registration call.
//!
//! - [`ExecutionContext::Inline`] runs the callback on whatever thread
//!   completes the operation.
//! - [`ExecutionContext::Default`] defers the choice to the process-wide
//!   default executor (typically a main-loop equivalent), consulted at
//!   invocation time. With no default installed it degrades to inline.
//! - [`ExecutionContext::On`] marshals to an explicit [`Executor`].

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

/// A sink that runs jobs somewhere else (a main loop, a worker, a queue).
///
/// The core never blocks on an executor; `execute` is expected to enqueue
/// and return. Ordering between jobs submitted to the same executor is the
/// executor's contract, not the core's.
pub trait Executor: Send + Sync {
    /// Enqueues a job for execution.
    fn execute(&self, job: Box<dyn FnOnce() + Send>);
}

/// An executor that runs jobs immediately on the submitting thread.
///
/// Useful as an explicit stand-in for inline invocation and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Box<dyn FnOnce() + Send>) {
        job();
    }
}

/// Where a registered callback is invoked.
#[derive(Clone, Default)]
pub enum ExecutionContext {
    /// Invoke on the thread that completes the operation.
    Inline,
    /// Invoke on the process-wide default executor, if one is installed.
    #[default]
    Default,
    /// Invoke on the given executor.
    On(Arc<dyn Executor>),
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline => f.write_str("Inline"),
            Self::Default => f.write_str("Default"),
            Self::On(_) => f.write_str("On(..)"),
        }
    }
}

fn default_slot() -> &'static RwLock<Option<Arc<dyn Executor>>> {
    static SLOT: OnceLock<RwLock<Option<Arc<dyn Executor>>>> = OnceLock::new();
    SLOT.get_or_init(|| RwLock::new(None))
}

/// Installs the process-wide default executor.
///
/// Consulted whenever a callback registered with
/// [`ExecutionContext::Default`] fires, and whenever an operation created
/// with `RUN_CONTINUATIONS_ASYNCHRONOUSLY` needs somewhere to marshal an
/// inline registration. Replaces any previously installed default.
pub fn set_default_context(executor: Arc<dyn Executor>) {
    *default_slot().write() = Some(executor);
}

/// Removes the process-wide default executor.
pub fn clear_default_context() {
    *default_slot().write() = None;
}

/// Returns the process-wide default executor, if installed.
#[must_use]
pub fn default_context() -> Option<Arc<dyn Executor>> {
    default_slot().read().clone()
}

impl ExecutionContext {
    /// Runs `job` per this context's policy.
    ///
    /// `force_marshal` is the `RUN_CONTINUATIONS_ASYNCHRONOUSLY` escape
    /// hatch: it upgrades an inline invocation to the default executor when
    /// one exists, so completion never re-enters the completing caller's
    /// stack. With no executor available the job still runs inline; losing
    /// the callback would be worse than the re-entrancy.
    pub(crate) fn dispatch(&self, force_marshal: bool, job: Box<dyn FnOnce() + Send>) {
        match self {
            Self::On(executor) => executor.execute(job),
            Self::Default => match default_context() {
                Some(executor) => executor.execute(job),
                None => job(),
            },
            Self::Inline => {
                if force_marshal {
                    match default_context() {
                        Some(executor) => executor.execute(job),
                        None => job(),
                    }
                } else {
                    job();
                }
            }
        }
    }
}
