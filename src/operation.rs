//! The operation core: a deferred-computation primitive.
//!
//! An [`Operation`] represents work that some external component drives to
//! completion. The operation itself executes nothing; it tracks status,
//! stores the outcome, and notifies observers. Producers push the outcome in
//! through one of the three terminal setters; consumers observe through
//! status accessors, registered callbacks, blocking [`wait`](Operation::wait),
//! or the cooperative [`poll_iter`](Operation::poll_iter) adapter.
//!
//! # Completion protocol
//!
//! Completion is exactly-once: any mix of
//! [`try_set_result`](Operation::try_set_result),
//! [`try_set_error`](Operation::try_set_error), and
//! [`try_set_canceled`](Operation::try_set_canceled), from any number of
//! threads, resolves to exactly one `true`. Losers get `false`, which makes
//! first-writer-wins races (a timeout racing a result) cheap to express.
//!
//! After the winning commit the core publishes in a fixed order: the
//! status-changed hook, the completed hook, the wait-handle signal, then
//! every registered completion callback in registration order. A panicking
//! hook cannot suppress the signal or the callbacks.
//!
//! # Handles
//!
//! `Operation` is a cheap cloneable handle; clones observe and mutate the
//! same underlying instance. Handle equality (`==`) is instance identity.

use std::any::Any;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use tracing::{debug, error, trace};

use crate::callback::{CallbackId, Keyed, Slot};
use crate::context::ExecutionContext;
use crate::error::{OpError, StateError};
use crate::state::{Options, StateCell, Status};

/// Process-wide id source; ids are unique and non-zero, never reused.
static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

type CompletionFn<T> = Box<dyn FnOnce(Operation<T>) + Send>;
type ProgressFn<T> = Arc<dyn Fn(Operation<T>, f32) + Send + Sync>;

struct CompletionEntry<T> {
    cb: CompletionFn<T>,
    ctx: ExecutionContext,
}

struct ProgressEntry<T> {
    cb: ProgressFn<T>,
    ctx: ExecutionContext,
}

/// Override points for the operation lifecycle.
///
/// Platform adapters implement this to translate core events into native
/// calls; the canonical example is overriding
/// [`on_cancel_requested`](Self::on_cancel_requested) to abort an underlying
/// native handle, which eventually calls back into a terminal setter.
/// All methods default to no-ops.
pub trait OperationHooks<T>: Send + Sync {
    /// Invoked once when the operation transitions to `Running` via
    /// [`Operation::start`] or [`Operation::try_set_running`].
    fn on_started(&self, op: &Operation<T>) {
        let _ = op;
    }

    /// Invoked on the first (and only the first) cancellation request.
    ///
    /// Cancellation is a request, not a guarantee: this hook is expected to
    /// eventually drive the operation to a terminal setter, typically
    /// [`Operation::try_set_canceled`].
    fn on_cancel_requested(&self, op: &Operation<T>) {
        let _ = op;
    }

    /// Invoked on every observable status change.
    fn on_status_changed(&self, op: &Operation<T>, status: Status) {
        let _ = (op, status);
    }

    /// Invoked once, after the terminal status is published and before the
    /// wait handle is signaled.
    fn on_completed(&self, op: &Operation<T>) {
        let _ = op;
    }

    /// Invoked for every accepted progress report.
    fn on_progress(&self, op: &Operation<T>, progress: f32) {
        let _ = (op, progress);
    }
}

struct Core<T> {
    state: StateCell,
    /// Lazily-assigned unique id; 0 means unassigned.
    id: AtomicU64,
    result: OnceLock<T>,
    error: OnceLock<Arc<OpError>>,
    /// Raw bits of the last reported progress value.
    progress: AtomicU32,
    completion: Mutex<Slot<CompletionEntry<T>>>,
    progress_cbs: Mutex<Slot<ProgressEntry<T>>>,
    next_callback: AtomicU64,
    /// Lazily-created blocking primitive; dropped on dispose.
    wait: Mutex<Option<Arc<WaitEvent>>>,
    hooks: Option<Arc<dyn OperationHooks<T>>>,
    user_state: Option<Arc<dyn Any + Send + Sync>>,
}

/// A deferred operation: status, outcome, progress, cancellation, callbacks.
pub struct Operation<T = ()> {
    core: Arc<Core<T>>,
}

impl<T> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> PartialEq for Operation<T> {
    /// Instance identity: two handles are equal when they observe the same
    /// underlying operation.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl<T> Eq for Operation<T> {}

/// Weak counterpart of [`Operation`] for back-references that must not keep
/// the instance alive. A combinator whose state is owned by the operation's
/// own hooks refers back to the operation through this, never through a
/// strong handle, since a strong handle there would cycle and leak the core.
pub(crate) struct WeakOperation<T> {
    core: Weak<Core<T>>,
}

impl<T> WeakOperation<T> {
    /// Returns a strong handle if the operation is still alive.
    pub(crate) fn upgrade(&self) -> Option<Operation<T>> {
        self.core.upgrade().map(|core| Operation { core })
    }
}

impl<T> Operation<T> {
    pub(crate) fn downgrade(&self) -> WeakOperation<T> {
        WeakOperation {
            core: Arc::downgrade(&self.core),
        }
    }
}

impl<T> std::fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("status", &self.core.state.status())
            .field("cancellation_requested", &self.core.state.cancellation_requested())
            .finish_non_exhaustive()
    }
}

/// Configures and constructs an [`Operation`].
pub struct OperationBuilder<T> {
    initial: Status,
    options: Options,
    hooks: Option<Arc<dyn OperationHooks<T>>>,
    user_state: Option<Arc<dyn Any + Send + Sync>>,
}

impl<T: Send + Sync + 'static> OperationBuilder<T> {
    /// Starts a builder for an operation in `Created` status.
    #[must_use]
    pub fn new() -> Self {
        Self {
            initial: Status::Created,
            options: Options::NONE,
            hooks: None,
            user_state: None,
        }
    }

    /// Sets the explicit initial status.
    ///
    /// Combinators construct themselves directly in `Running`; the
    /// pre-completed helpers construct directly in a terminal status.
    #[must_use]
    pub fn initial_status(mut self, status: Status) -> Self {
        self.initial = status;
        self
    }

    /// Sets creation-time options.
    #[must_use]
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Installs lifecycle hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn OperationHooks<T>>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Attaches opaque caller-supplied context, immutable after construction.
    #[must_use]
    pub fn user_state(mut self, state: Arc<dyn Any + Send + Sync>) -> Self {
        self.user_state = Some(state);
        self
    }

    /// Builds the operation.
    #[must_use]
    pub fn build(self) -> Operation<T> {
        let op = Operation {
            core: Arc::new(Core {
                state: StateCell::new(self.initial, self.options),
                id: AtomicU64::new(0),
                result: OnceLock::new(),
                error: OnceLock::new(),
                progress: AtomicU32::new(0.0_f32.to_bits()),
                completion: Mutex::new(Slot::new()),
                progress_cbs: Mutex::new(Slot::new()),
                next_callback: AtomicU64::new(1),
                wait: Mutex::new(None),
                hooks: self.hooks,
                user_state: self.user_state,
            }),
        };
        if self.initial.is_terminal() {
            // Pre-completed: registrations must short-circuit to inline
            // invocation from the first call.
            op.core.completion.lock().seal();
            op.core.progress_cbs.lock().seal();
        }
        op
    }
}

impl<T: Send + Sync + 'static> Default for OperationBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Operation<T> {
    /// Creates an operation in `Created` status with no options.
    #[must_use]
    pub fn new() -> Self {
        OperationBuilder::new().build()
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder() -> OperationBuilder<T> {
        OperationBuilder::new()
    }

    /// Creates an operation already completed with `value`.
    #[must_use]
    pub fn from_result(value: T) -> Self {
        let op = OperationBuilder::new()
            .initial_status(Status::RanToCompletion)
            .build();
        let _ = op.core.result.set(value);
        op
    }

    /// Creates an operation already failed with `error`.
    ///
    /// A cancellation-classified error produces a `Canceled` operation.
    #[must_use]
    pub fn from_error(error: impl Into<Arc<OpError>>) -> Self {
        let error = error.into();
        let status = if error.is_cancellation() {
            Status::Canceled
        } else {
            Status::Faulted
        };
        let op = OperationBuilder::new().initial_status(status).build();
        let _ = op.core.error.set(error);
        op
    }

    /// Creates an operation already completed as canceled.
    #[must_use]
    pub fn from_canceled() -> Self {
        Self::from_error(OpError::cancelled())
    }

    // ------------------------------------------------------------------
    // Identity and opaque state
    // ------------------------------------------------------------------

    /// Returns the unique non-zero id, assigning it on first access.
    ///
    /// Assignment is at most once via compare-and-set; a losing racer
    /// adopts the winner's id and its candidate is burned.
    pub fn id(&self) -> u64 {
        let current = self.core.id.load(Ordering::Acquire);
        if current != 0 {
            return current;
        }
        let candidate = NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed);
        match self
            .core
            .id
            .compare_exchange(0, candidate, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                trace!(id = candidate, "operation id assigned");
                candidate
            }
            Err(existing) => existing,
        }
    }

    /// Returns the caller-supplied context attached at construction.
    #[must_use]
    pub fn user_state(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.core.user_state.clone()
    }

    // ------------------------------------------------------------------
    // Status observation
    // ------------------------------------------------------------------

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.core.state.status()
    }

    /// Returns true once a terminal status and its payload are published.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.core.state.is_completed()
    }

    /// Returns true while the operation has not reached a terminal status.
    ///
    /// This is the cooperative-poll predicate: an external single-step
    /// scheduler keeps stepping while this holds.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.core.state.status().is_terminal()
    }

    /// Returns true if the operation completed successfully.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.core.state.is_completed() && self.status() == Status::RanToCompletion
    }

    /// Returns true if the operation completed with a non-cancellation error.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        self.core.state.is_completed() && self.status() == Status::Faulted
    }

    /// Returns true if the operation completed as canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.core.state.is_completed() && self.status() == Status::Canceled
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancellation_requested(&self) -> bool {
        self.core.state.cancellation_requested()
    }

    /// Advisory flag: did the winning terminal transition claim to have
    /// completed synchronously? Not correctness-load-bearing.
    #[must_use]
    pub fn completed_synchronously(&self) -> bool {
        self.core.state.completed_synchronously()
    }

    /// Returns the stored failure cause.
    ///
    /// `Some` exactly when the status is `Canceled` or `Faulted`.
    #[must_use]
    pub fn error(&self) -> Option<Arc<OpError>> {
        if !self.core.state.is_completed() {
            return None;
        }
        self.core.error.get().cloned()
    }

    /// Returns a reference to the result if the operation has completed
    /// successfully; `None` otherwise.
    #[must_use]
    pub fn try_result(&self) -> Option<&T> {
        if !self.core.state.is_completed() {
            return None;
        }
        self.core.result.get()
    }

    // ------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------

    /// Transitions `Created` → `Scheduled` → `Running`.
    ///
    /// # Errors
    ///
    /// [`StateError::AlreadyStarted`] if the operation already left
    /// `Created`; [`StateError::AlreadyDisposed`] if it was disposed.
    /// Starting twice is a misuse error, unlike the terminal setters, which
    /// lose races silently.
    pub fn start(&self) -> Result<(), StateError> {
        if self.core.state.is_disposed() {
            return Err(StateError::AlreadyDisposed);
        }
        if !self.core.state.try_schedule() {
            return Err(StateError::AlreadyStarted);
        }
        if let Some(hooks) = &self.core.hooks {
            hooks.on_status_changed(self, Status::Scheduled);
        }
        if self.core.state.try_run() {
            trace!(id = self.id(), "operation started");
            if let Some(hooks) = &self.core.hooks {
                hooks.on_status_changed(self, Status::Running);
                hooks.on_started(self);
            }
        }
        Ok(())
    }

    /// Non-erroring variant of [`start`](Self::start) for adapters that race
    /// the kick-off against completion: returns whether this call performed
    /// the transition to `Running`.
    pub fn try_set_running(&self) -> bool {
        let _ = self.core.state.try_schedule();
        if !self.core.state.try_run() {
            return false;
        }
        trace!(id = self.id(), "operation running");
        if let Some(hooks) = &self.core.hooks {
            hooks.on_status_changed(self, Status::Running);
            hooks.on_started(self);
        }
        true
    }

    /// Requests cancellation.
    ///
    /// A no-op when the operation suppresses cancellation or has already
    /// completed. Sets the request flag and invokes the cancel hook exactly
    /// once; it does **not** itself complete the operation. Whether and when
    /// the operation completes as canceled is up to the hook.
    pub fn cancel(&self) {
        if !self.core.state.try_request_cancellation() {
            return;
        }
        debug!(id = self.id(), "cancellation requested");
        if let Some(hooks) = &self.core.hooks {
            hooks.on_cancel_requested(self);
        }
    }

    /// Reports progress. Accepted only while `Running`; ignored otherwise.
    ///
    /// Values are caller-supplied and by convention non-decreasing in
    /// `[0, 1]`; the core stores them verbatim and only clamps in
    /// [`progress`](Self::progress) by status.
    pub fn report_progress(&self, progress: f32) {
        if self.core.state.status() != Status::Running {
            return;
        }
        self.core.progress.store(progress.to_bits(), Ordering::Release);
        if let Some(hooks) = &self.core.hooks {
            hooks.on_progress(self, progress);
        }
        let snapshot: SmallVec<[(ProgressFn<T>, ExecutionContext); 4]> = {
            let slot = self.core.progress_cbs.lock();
            match &*slot {
                Slot::Single(keyed) => {
                    let mut v = SmallVec::new();
                    v.push((keyed.entry.cb.clone(), keyed.entry.ctx.clone()));
                    v
                }
                Slot::Many(entries) => entries
                    .iter()
                    .map(|keyed| (keyed.entry.cb.clone(), keyed.entry.ctx.clone()))
                    .collect(),
                Slot::Empty | Slot::Sealed => SmallVec::new(),
            }
        };
        for (cb, ctx) in snapshot {
            let op = self.clone();
            ctx.dispatch(
                self.force_marshal(),
                Box::new(move || cb(op, progress)),
            );
        }
    }

    /// Returns the observable progress: `0.0` before `Running`, the last
    /// reported value while `Running`, `1.0` once terminal.
    #[must_use]
    pub fn progress(&self) -> f32 {
        match self.core.state.status() {
            Status::Created | Status::Scheduled => 0.0,
            Status::Running => f32::from_bits(self.core.progress.load(Ordering::Acquire)),
            _ => 1.0,
        }
    }

    // ------------------------------------------------------------------
    // Terminal setters
    // ------------------------------------------------------------------

    /// Attempts to complete successfully with `value`.
    ///
    /// Returns true only for the single winning terminal transition of this
    /// instance, across all three setters and all threads.
    pub fn try_set_result(&self, value: T, completed_synchronously: bool) -> bool {
        if !self.core.state.try_reserve_completion() {
            return false;
        }
        let _ = self.core.result.set(value);
        self.commit_and_publish(Status::RanToCompletion, completed_synchronously);
        true
    }

    /// Attempts to complete with `error`.
    ///
    /// An error classified as a cancellation signal completes the operation
    /// as `Canceled` instead of `Faulted`, preserving the error's identity.
    pub fn try_set_error(
        &self,
        error: impl Into<Arc<OpError>>,
        completed_synchronously: bool,
    ) -> bool {
        let error = error.into();
        let terminal = if error.is_cancellation() {
            Status::Canceled
        } else {
            Status::Faulted
        };
        if !self.core.state.try_reserve_completion() {
            return false;
        }
        let _ = self.core.error.set(error);
        self.commit_and_publish(terminal, completed_synchronously);
        true
    }

    /// Attempts to complete as canceled.
    pub fn try_set_canceled(&self, completed_synchronously: bool) -> bool {
        if !self.core.state.try_reserve_completion() {
            return false;
        }
        let _ = self.core.error.set(Arc::new(OpError::cancelled()));
        self.commit_and_publish(Status::Canceled, completed_synchronously);
        true
    }

    /// Post-commit publication. Runs only on the reservation winner's
    /// thread, exactly once per instance.
    ///
    /// Order: status hook, completed hook, wait-handle signal, registered
    /// callbacks. Hook panics are deferred past the signal and the callback
    /// drain, then resumed, so observers are never stranded.
    fn commit_and_publish(&self, terminal: Status, completed_synchronously: bool) {
        self.core
            .state
            .commit_completion(terminal, completed_synchronously);
        debug!(id = self.id(), status = %terminal, "operation completed");

        let hook_panic = self.core.hooks.as_ref().and_then(|hooks| {
            catch_unwind(AssertUnwindSafe(|| {
                hooks.on_status_changed(self, terminal);
                hooks.on_completed(self);
            }))
            .err()
        });

        if let Some(event) = self.core.wait.lock().clone() {
            event.signal();
        }

        // Progress callbacks never fire after termination.
        let _ = self.core.progress_cbs.lock().seal();

        let entries = self.core.completion.lock().seal();
        let drained = entries.len();
        for Keyed { entry, .. } in entries {
            self.dispatch_completion(entry);
        }
        trace!(id = self.id(), callbacks = drained, "completion published");

        if let Some(payload) = hook_panic {
            resume_unwind(payload);
        }
    }

    // ------------------------------------------------------------------
    // Callback registration
    // ------------------------------------------------------------------

    /// Registers a completion callback.
    ///
    /// Callbacks registered before completion fire exactly once, in
    /// registration order, per the context policy. Registering on an
    /// already-completed operation invokes the callback immediately (still
    /// per the context policy). The returned token removes the
    /// registration via [`remove_completion`](Self::remove_completion).
    pub fn on_completed<F>(&self, ctx: ExecutionContext, f: F) -> CallbackId
    where
        F: FnOnce(Operation<T>) + Send + 'static,
    {
        let id = self.next_callback_id();
        let entry = CompletionEntry {
            cb: Box::new(f),
            ctx,
        };
        let outcome = self.core.completion.lock().add(id, entry, false);
        if let Err(entry) = outcome {
            // Sealed while (or before) we held the lock: invoke now rather
            // than lose the callback.
            self.dispatch_completion(entry);
        }
        id
    }

    /// Registers a progress callback, invoked for every accepted progress
    /// report while the operation is `Running`. Never invoked after
    /// termination; registering on a completed operation is a no-op.
    pub fn on_progress<F>(&self, ctx: ExecutionContext, f: F) -> CallbackId
    where
        F: Fn(Operation<T>, f32) + Send + Sync + 'static,
    {
        let id = self.next_callback_id();
        let entry = ProgressEntry {
            cb: Arc::new(f),
            ctx,
        };
        let _ = self.core.progress_cbs.lock().add(id, entry, true);
        id
    }

    /// Removes a completion callback registered earlier.
    ///
    /// Returns true if the registration was found and will no longer fire;
    /// false if it already fired, was already removed, or never existed.
    pub fn remove_completion(&self, id: CallbackId) -> bool {
        self.core.completion.lock().remove(id)
    }

    /// Removes a progress callback registered earlier.
    pub fn remove_progress(&self, id: CallbackId) -> bool {
        self.core.progress_cbs.lock().remove(id)
    }

    fn next_callback_id(&self) -> CallbackId {
        CallbackId::new(self.core.next_callback.fetch_add(1, Ordering::Relaxed))
    }

    fn force_marshal(&self) -> bool {
        self.core
            .state
            .options()
            .contains(Options::RUN_CONTINUATIONS_ASYNCHRONOUSLY)
    }

    fn dispatch_completion(&self, entry: CompletionEntry<T>) {
        let CompletionEntry { cb, ctx } = entry;
        let op = self.clone();
        let job: Box<dyn FnOnce() + Send> = Box::new(move || {
            let id = op.id();
            if catch_unwind(AssertUnwindSafe(move || cb(op))).is_err() {
                // A panicking callback must not starve the ones after it.
                // Recovery is the registrant's business; we log and move on.
                error!(id, "completion callback panicked");
            }
        });
        ctx.dispatch(self.force_marshal(), job);
    }

    // ------------------------------------------------------------------
    // Blocking wait
    // ------------------------------------------------------------------

    /// Blocks the calling thread until the operation completes, then
    /// returns the outcome: `Ok` on success, the stored error otherwise,
    /// with its original identity preserved.
    ///
    /// # Errors
    ///
    /// The stored [`OpError`] when the terminal status is `Canceled` or
    /// `Faulted`.
    pub fn wait(&self) -> Result<(), Arc<OpError>> {
        if !self.core.state.is_completed() {
            self.wait_event().wait();
        }
        self.completed_outcome()
    }

    /// Blocks for at most `timeout`. Returns `None` on timeout, otherwise
    /// the same outcome as [`wait`](Self::wait).
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<(), Arc<OpError>>> {
        if !self.core.state.is_completed() && !self.wait_event().wait_timeout(timeout) {
            return None;
        }
        Some(self.completed_outcome())
    }

    fn completed_outcome(&self) -> Result<(), Arc<OpError>> {
        match self.core.error.get() {
            Some(error) => Err(Arc::clone(error)),
            None => Ok(()),
        }
    }

    /// Lazily creates the wait handle, at most once per instance.
    fn wait_event(&self) -> Arc<WaitEvent> {
        let event = {
            let mut guard = self.core.wait.lock();
            match &*guard {
                Some(event) => Arc::clone(event),
                None => {
                    let event = Arc::new(WaitEvent::new());
                    *guard = Some(Arc::clone(&event));
                    event
                }
            }
        };
        // The completer reads the slot once, at publish time; a handle
        // constructed after that read must observe completion anyway.
        if self.core.state.is_completed() {
            event.signal();
        }
        event
    }

    /// Returns a cooperative-poll iterator that yields the current status
    /// while the operation is pending and ends once it is terminal.
    ///
    /// Lets an external single-step scheduler drive a chain of operations
    /// without blocking a thread.
    #[must_use]
    pub fn poll_iter(&self) -> PollIter<T> {
        PollIter { op: self.clone() }
    }

    // ------------------------------------------------------------------
    // Disposal
    // ------------------------------------------------------------------

    /// Releases the wait handle. Idempotent; a no-op for operations created
    /// with [`Options::DO_NOT_DISPOSE`] (the shared pre-completed
    /// singletons).
    ///
    /// # Errors
    ///
    /// [`StateError::NotTerminal`] when called before the operation reached
    /// a terminal status; that is a usage error, not a race to tolerate.
    pub fn dispose(&self) -> Result<(), StateError> {
        if self.core.state.options().contains(Options::DO_NOT_DISPOSE) {
            return Ok(());
        }
        if !self.core.state.status().is_terminal() {
            return Err(StateError::NotTerminal);
        }
        if self.core.state.try_mark_disposed() {
            *self.core.wait.lock() = None;
            trace!(id = self.id(), "operation disposed");
        }
        Ok(())
    }

    /// Returns true once disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.core.state.is_disposed()
    }
}

impl<T: Clone + Send + Sync + 'static> Operation<T> {
    /// Returns the result of a successfully completed operation.
    ///
    /// # Panics
    ///
    /// Panics when the operation has not completed, or completed with an
    /// error; accessing the result early is a misuse error. Use
    /// [`try_result`](Self::try_result) or [`outcome`](Self::outcome) to
    /// probe without panicking.
    #[must_use]
    pub fn result(&self) -> T {
        assert!(
            self.core.state.is_completed(),
            "operation result accessed before completion"
        );
        if let Some(error) = self.core.error.get() {
            panic!("operation result accessed on a failed operation: {error}");
        }
        self.core
            .result
            .get()
            .cloned()
            .expect("completed successfully with no stored result")
    }

    /// Returns the completed outcome: the result on success, the stored
    /// error otherwise.
    ///
    /// # Panics
    ///
    /// Panics when the operation has not completed.
    pub fn outcome(&self) -> Result<T, Arc<OpError>> {
        assert!(
            self.core.state.is_completed(),
            "operation outcome accessed before completion"
        );
        match self.core.error.get() {
            Some(error) => Err(Arc::clone(error)),
            None => Ok(self
                .core
                .result
                .get()
                .cloned()
                .expect("completed successfully with no stored result")),
        }
    }
}

impl<T: Send + Sync + 'static> Default for Operation<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation<()> {
    /// Shared singleton: already succeeded with no value. Never disposable.
    #[must_use]
    pub fn completed() -> Operation<()> {
        static COMPLETED: OnceLock<Operation<()>> = OnceLock::new();
        COMPLETED
            .get_or_init(|| {
                let op = OperationBuilder::new()
                    .initial_status(Status::RanToCompletion)
                    .options(Options::DO_NOT_DISPOSE)
                    .build();
                let _ = op.core.result.set(());
                op
            })
            .clone()
    }

    /// Shared singleton: already canceled. Never disposable.
    #[must_use]
    pub fn canceled() -> Operation<()> {
        static CANCELED: OnceLock<Operation<()>> = OnceLock::new();
        CANCELED
            .get_or_init(|| {
                let op = OperationBuilder::new()
                    .initial_status(Status::Canceled)
                    .options(Options::DO_NOT_DISPOSE)
                    .build();
                let _ = op.core.error.set(Arc::new(OpError::cancelled()));
                op
            })
            .clone()
    }

    /// Shared singleton: already faulted with a generic error. Never
    /// disposable. Use [`Operation::from_error`] when the error matters.
    #[must_use]
    pub fn faulted() -> Operation<()> {
        static FAULTED: OnceLock<Operation<()>> = OnceLock::new();
        FAULTED
            .get_or_init(|| {
                let op = OperationBuilder::new()
                    .initial_status(Status::Faulted)
                    .options(Options::DO_NOT_DISPOSE)
                    .build();
                let _ = op.core.error.set(Arc::new(OpError::faulted("operation faulted")));
                op
            })
            .clone()
    }
}

/// Cooperative single-step adapter over an operation.
///
/// Yields the current [`Status`] while the operation is pending; ends once
/// it reaches a terminal status.
pub struct PollIter<T> {
    op: Operation<T>,
}

impl<T: Send + Sync + 'static> Iterator for PollIter<T> {
    type Item = Status;

    fn next(&mut self) -> Option<Status> {
        let status = self.op.status();
        if status.is_terminal() {
            None
        } else {
            Some(status)
        }
    }
}

/// Blocking completion event: a boolean under a mutex plus a condvar.
struct WaitEvent {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl WaitEvent {
    fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Idempotent.
    fn signal(&self) {
        let mut signaled = self.flag.lock();
        if !*signaled {
            *signaled = true;
            self.cond.notify_all();
        }
    }

    fn wait(&self) {
        let mut signaled = self.flag.lock();
        while !*signaled {
            self.cond.wait(&mut signaled);
        }
    }

    /// Returns false on timeout.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut signaled = self.flag.lock();
        while !*signaled {
            if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                return *signaled;
            }
        }
        true
    }
}
