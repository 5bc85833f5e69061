//! Race-any: finish after the first antecedent.
//!
//! The first antecedent to reach a terminal status claims the race through a
//! single atomic flag; later completions are observed but discarded. The
//! combinator completes successfully with a handle to the winning antecedent
//! (not its unwrapped value), so callers can inspect which one won and why;
//! a winner that faulted still makes the race itself succeed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::operation::{Operation, OperationBuilder};
use crate::state::Status;

/// Returns an operation that completes with the first antecedent to reach a
/// terminal status.
///
/// Progress is the maximum of the antecedents' progress.
///
/// # Panics
///
/// Panics on empty input: a race with no contestants can never finish, so
/// asking for one is a usage error.
pub fn when_any<T>(ops: Vec<Operation<T>>) -> Operation<Operation<T>>
where
    T: Send + Sync + 'static,
{
    assert!(!ops.is_empty(), "when_any requires at least one antecedent");
    let target: Operation<Operation<T>> = OperationBuilder::new()
        .initial_status(Status::Running)
        .build();
    let claimed = Arc::new(AtomicBool::new(false));
    let children = Arc::new(ops);
    for op in children.iter() {
        {
            let target = target.clone();
            let children = Arc::clone(&children);
            op.on_progress(ExecutionContext::Inline, move |_, _| {
                let max = children
                    .iter()
                    .map(Operation::progress)
                    .fold(0.0_f32, f32::max);
                target.report_progress(max);
            });
        }
        let target = target.clone();
        let claimed = Arc::clone(&claimed);
        op.on_completed(ExecutionContext::Inline, move |winner| {
            if claimed.swap(true, Ordering::AcqRel) {
                // A later completion: observed, discarded.
                return;
            }
            let _ = target.try_set_result(winner, false);
        });
    }
    target
}
