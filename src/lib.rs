//! Deferred-operation primitive for hosts without native async support.
//!
//! `deferop` provides an [`Operation`]: a future/promise-style handle for
//! work that some external component drives to completion. The crate
//! executes nothing itself: all scheduling, synchronization, and
//! continuation wiring are implemented by hand on atomics and callbacks,
//! with no async runtime anywhere.
//!
//! # Model
//!
//! A producer completes an operation through one of three terminal setters
//! ([`Operation::try_set_result`], [`Operation::try_set_error`],
//! [`Operation::try_set_canceled`]); exactly one of them, across all
//! threads, ever succeeds. Consumers observe through status accessors,
//! registered callbacks (with an explicit [`ExecutionContext`] naming where
//! each callback runs), a blocking [`Operation::wait`], or the cooperative
//! [`Operation::poll_iter`] adapter.
//!
//! Derived operations compose through the [`combinator`] module:
//! [`continue_with`], [`when_all`], [`when_any`], [`unwrap`], [`retry`],
//! and [`delay`].
//!
//! # Example
//!
//! ```
//! use deferop::{ExecutionContext, Operation};
//!
//! let op: Operation<i32> = Operation::new();
//! op.start().expect("fresh operation");
//!
//! op.on_completed(ExecutionContext::Inline, |op| {
//!     println!("finished: {}", op.result());
//! });
//!
//! // Some external component finishes the work:
//! assert!(op.try_set_result(42, false));
//! assert_eq!(op.result(), 42);
//! ```

#![warn(missing_docs)]

mod callback;
pub mod combinator;
pub mod context;
pub mod error;
mod operation;
pub mod state;
#[cfg(test)]
mod test_util;
mod timer;

pub use callback::CallbackId;
pub use combinator::{
    continue_with, delay, delay_forever, retry, unwrap, when_all, when_any, Continuation,
    ContinuationFilter,
};
pub use context::{
    clear_default_context, default_context, set_default_context, ExecutionContext, Executor,
    InlineExecutor,
};
pub use error::{ErrorKind, OpError, StateError};
pub use operation::{Operation, OperationBuilder, OperationHooks, PollIter};
pub use state::{Options, Status};
