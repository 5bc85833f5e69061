//! Aggregate-all: finish after every antecedent.
//!
//! Maintains an atomic remaining-count initialized to the antecedent count;
//! each antecedent's completion callback decrements it, and only the callback
//! that drives the count to zero completes the combinator. When every
//! antecedent succeeded the combinator completes with the results in input
//! order; otherwise it completes with the composite of every non-cancellation
//! failure (all-cancellation aggregates complete as canceled).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::OpError;
use crate::operation::{Operation, OperationBuilder};
use crate::state::Status;

struct WhenAllState<T> {
    children: Vec<Operation<T>>,
    remaining: AtomicUsize,
    target: Operation<Vec<T>>,
}

impl<T: Clone + Send + Sync + 'static> WhenAllState<T> {
    fn report_mean_progress(&self) {
        let sum: f32 = self.children.iter().map(Operation::progress).sum();
        self.target
            .report_progress(sum / self.children.len() as f32);
    }

    fn child_terminal(&self) {
        self.report_mean_progress();
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        // Last child down; every antecedent is now terminal.
        let errors: Vec<Arc<OpError>> = self
            .children
            .iter()
            .filter_map(Operation::error)
            .collect();
        if errors.is_empty() {
            let results: Vec<T> = self.children.iter().map(Operation::result).collect();
            let _ = self.target.try_set_result(results, false);
        } else {
            let _ = self.target.try_set_error(OpError::aggregate(errors), false);
        }
    }
}

/// Returns an operation that completes once every antecedent has reached a
/// terminal status.
///
/// Empty input completes immediately and successfully. Progress is the mean
/// of the antecedents' progress.
pub fn when_all<T>(ops: Vec<Operation<T>>) -> Operation<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    if ops.is_empty() {
        return Operation::from_result(Vec::new());
    }
    let target: Operation<Vec<T>> = OperationBuilder::new()
        .initial_status(Status::Running)
        .build();
    let state = Arc::new(WhenAllState {
        children: ops.clone(),
        remaining: AtomicUsize::new(ops.len()),
        target: target.clone(),
    });
    for op in &ops {
        {
            let state = Arc::clone(&state);
            op.on_progress(ExecutionContext::Inline, move |_, _| {
                state.report_mean_progress();
            });
        }
        let state = Arc::clone(&state);
        op.on_completed(ExecutionContext::Inline, move |_| state.child_terminal());
    }
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_util::init_test_logging;

    #[test]
    fn empty_input_completes_immediately() {
        init_test_logging();
        let all: Operation<Vec<i32>> = when_all(Vec::new());
        assert!(all.succeeded());
        assert!(all.result().is_empty());
    }

    #[test]
    fn completes_only_after_every_antecedent() {
        init_test_logging();
        let a: Operation<i32> = Operation::new();
        let b: Operation<i32> = Operation::new();
        let c: Operation<i32> = Operation::new();
        let all = when_all(vec![a.clone(), b.clone(), c.clone()]);
        assert!(b.try_set_result(2, false));
        assert!(all.is_pending());
        assert!(a.try_set_result(1, false));
        assert!(all.is_pending());
        assert!(c.try_set_result(3, false));
        assert!(all.succeeded());
        assert_eq!(all.result(), vec![1, 2, 3], "input order, not completion order");
    }

    #[test]
    fn any_fault_yields_aggregate() {
        init_test_logging();
        let a: Operation<()> = Operation::new();
        let b: Operation<()> = Operation::new();
        let all = when_all(vec![a.clone(), b.clone()]);
        assert!(a.try_set_error(OpError::faulted("first"), false));
        assert!(all.is_pending(), "still waits for the slow antecedent");
        assert!(b.try_set_error(OpError::faulted("second"), false));
        assert!(all.is_faulted());
        let err = all.error().expect("aggregate");
        assert_eq!(err.kind(), ErrorKind::Aggregate);
        assert_eq!(err.parts().len(), 2);
    }

    #[test]
    fn cancellations_alone_cancel_the_aggregate() {
        init_test_logging();
        let a: Operation<()> = Operation::new();
        let b: Operation<()> = Operation::new();
        let all = when_all(vec![a.clone(), b.clone()]);
        assert!(a.try_set_canceled(false));
        assert!(b.try_set_canceled(false));
        assert!(all.is_canceled());
    }

    #[test]
    fn mixed_failure_is_faulted_not_canceled() {
        init_test_logging();
        let a: Operation<()> = Operation::new();
        let b: Operation<()> = Operation::new();
        let all = when_all(vec![a.clone(), b.clone()]);
        assert!(a.try_set_canceled(false));
        assert!(b.try_set_error(OpError::faulted("real failure"), false));
        assert!(all.is_faulted());
        let err = all.error().expect("aggregate");
        assert_eq!(err.parts().len(), 1, "cancellations dropped from the composite");
    }

    #[test]
    fn progress_is_mean_of_children() {
        init_test_logging();
        let a: Operation<()> = Operation::new();
        let b: Operation<()> = Operation::new();
        a.start().expect("start a");
        b.start().expect("start b");
        let all = when_all(vec![a.clone(), b.clone()]);
        a.report_progress(0.5);
        assert_eq!(all.progress(), 0.25);
        b.report_progress(1.0);
        assert_eq!(all.progress(), 0.75);
    }

    #[test]
    fn pre_completed_antecedents_count() {
        init_test_logging();
        let a = Operation::from_result(1);
        let b = Operation::from_result(2);
        let all = when_all(vec![a, b]);
        assert!(all.succeeded());
        assert_eq!(all.result(), vec![1, 2]);
    }
}
