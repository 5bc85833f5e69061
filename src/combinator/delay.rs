//! Timer-driven operations with no antecedent.
//!
//! A delay completes successfully once its interval elapses, driven by the
//! process-wide timer thread. Cancelling a pending delay completes it as
//! canceled immediately; the timer discards the dead entry on its next
//! sweep. [`delay_forever`] never completes on its own and must be canceled
//! externally; racing a real operation against a delay is how timeouts are
//! expressed.

use std::sync::Arc;
use std::time::Duration;

use crate::operation::{Operation, OperationBuilder, OperationHooks};
use crate::state::Status;
use crate::timer;

/// Cancellation immediately completes a delay; there is no underlying work
/// to wind down.
struct DelayHooks;

impl OperationHooks<()> for DelayHooks {
    fn on_cancel_requested(&self, op: &Operation<()>) {
        let _ = op.try_set_canceled(false);
    }
}

/// Returns an operation that completes successfully after `duration`.
///
/// A zero duration returns the shared already-completed singleton.
#[must_use]
pub fn delay(duration: Duration) -> Operation<()> {
    if duration.is_zero() {
        return Operation::completed();
    }
    let op = OperationBuilder::new()
        .initial_status(Status::Running)
        .hooks(Arc::new(DelayHooks))
        .build();
    timer::arm(op.clone(), duration);
    op
}

/// Returns an operation that never completes on its own.
///
/// The caller must cancel it (or race it) to make it terminal.
#[must_use]
pub fn delay_forever() -> Operation<()> {
    OperationBuilder::new()
        .initial_status(Status::Running)
        .hooks(Arc::new(DelayHooks))
        .build()
}
