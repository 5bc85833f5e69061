//! Retry: re-invoke an operation factory until success or attempts run out.
//!
//! Each attempt is produced by the factory. Success and cancellation
//! propagate immediately; a fault schedules the configured delay and then
//! re-invokes the factory, until `max_attempts` factory invocations have
//! been made (`0` means unlimited). The final failure after exhausting
//! attempts is surfaced verbatim, not wrapped.
//!
//! Cancelling the retry operation cancels whatever stage is in flight: a
//! pending attempt gets a cancellation request, a pending between-attempt
//! pause is completed as canceled.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::context::ExecutionContext;
use crate::operation::{Operation, OperationBuilder, OperationHooks, WeakOperation};
use crate::state::Status;
use crate::timer;

enum Stage<T> {
    Attempt(Operation<T>),
    Pause(Operation<()>),
}

struct RetryShared<T, F> {
    factory: F,
    delay: Duration,
    max_attempts: u32,
    attempts: AtomicU32,
    stage: Mutex<Option<Stage<T>>>,
    /// Weak back-reference: the target keeps this state alive through its
    /// hooks, so a strong handle here would cycle and leak the core.
    target: OnceLock<WeakOperation<T>>,
}

impl<T, F> RetryShared<T, F>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Operation<T> + Send + Sync + 'static,
{
    /// None once every outside handle to the target has been dropped;
    /// retrying for an unobservable operation is pointless.
    fn target(&self) -> Option<Operation<T>> {
        self.target.get().and_then(WeakOperation::upgrade)
    }
}

struct RetryHooks<T, F>(Arc<RetryShared<T, F>>);

impl<T, F> OperationHooks<T> for RetryHooks<T, F>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Operation<T> + Send + Sync + 'static,
{
    fn on_cancel_requested(&self, _op: &Operation<T>) {
        let stage = {
            let guard = self.0.stage.lock();
            match &*guard {
                Some(Stage::Attempt(attempt)) => Some(Stage::Attempt(attempt.clone())),
                Some(Stage::Pause(pause)) => Some(Stage::Pause(pause.clone())),
                None => None,
            }
        };
        match stage {
            // The attempt decides how cancellation completes; its outcome
            // propagates back through the attempt callback.
            Some(Stage::Attempt(attempt)) => attempt.cancel(),
            Some(Stage::Pause(pause)) => {
                let _ = pause.try_set_canceled(false);
            }
            None => {}
        }
    }
}

fn start_attempt<T, F>(shared: &Arc<RetryShared<T, F>>)
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Operation<T> + Send + Sync + 'static,
{
    let Some(target) = shared.target() else {
        return;
    };
    if target.is_completed() {
        return;
    }
    if target.is_cancellation_requested() {
        // A request that landed while no stage was in flight (before the
        // first attempt was stored, or between a fault and the reattempt)
        // would otherwise be lost; honor it instead of invoking the factory.
        let _ = target.try_set_canceled(false);
        return;
    }
    let made = shared.attempts.fetch_add(1, Ordering::AcqRel) + 1;
    debug!(attempt = made, "retry attempt started");
    let attempt = (shared.factory)();
    *shared.stage.lock() = Some(Stage::Attempt(attempt.clone()));
    let shared = Arc::clone(shared);
    attempt.on_completed(ExecutionContext::Inline, move |a| {
        let Some(target) = shared.target() else {
            return;
        };
        if a.succeeded() || a.is_canceled() {
            super::propagate(&a, &target, false);
            return;
        }
        let error = a.error().expect("faulted attempt stores an error");
        let exhausted =
            shared.max_attempts != 0 && shared.attempts.load(Ordering::Acquire) >= shared.max_attempts;
        if exhausted {
            // Surfaced verbatim, never wrapped.
            let _ = target.try_set_error(error, false);
            return;
        }
        if shared.delay.is_zero() {
            start_attempt(&shared);
            return;
        }
        let pause: Operation<()> = OperationBuilder::new()
            .initial_status(Status::Running)
            .build();
        *shared.stage.lock() = Some(Stage::Pause(pause.clone()));
        timer::arm(pause.clone(), shared.delay);
        let shared = Arc::clone(&shared);
        pause.on_completed(ExecutionContext::Inline, move |p| {
            if p.succeeded() {
                start_attempt(&shared);
            } else if let Some(target) = shared.target() {
                let _ = target
                    .try_set_error(p.error().expect("cancelled pause stores an error"), false);
            }
        });
    });
}

/// Returns an operation that re-invokes `factory` until an attempt succeeds
/// or is canceled, pausing `delay` between faulted attempts, for at most
/// `max_attempts` factory invocations (`0` = unlimited).
pub fn retry<T, F>(factory: F, delay: Duration, max_attempts: u32) -> Operation<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Operation<T> + Send + Sync + 'static,
{
    let shared = Arc::new(RetryShared {
        factory,
        delay,
        max_attempts,
        attempts: AtomicU32::new(0),
        stage: Mutex::new(None),
        target: OnceLock::new(),
    });
    let target: Operation<T> = OperationBuilder::new()
        .initial_status(Status::Running)
        .hooks(Arc::new(RetryHooks(Arc::clone(&shared))))
        .build();
    let _ = shared.target.set(target.downgrade());
    {
        // A completed target still keeps this state alive through its hooks;
        // the final stage has no further use, so drop it eagerly.
        let shared = Arc::clone(&shared);
        target.on_completed(ExecutionContext::Inline, move |_| {
            *shared.stage.lock() = None;
        });
    }
    start_attempt(&shared);
    target
}
