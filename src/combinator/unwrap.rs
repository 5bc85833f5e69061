//! Flatten a nested operation.
//!
//! `unwrap` subscribes to the outer operation; on outer success it adopts
//! the inner operation's terminal outcome, and on outer failure it
//! propagates that failure directly; there is no inner operation to wait
//! on. Progress blends like a continuation: the outer phase maps to
//! `[0, 0.5]`, the inner to `[0.5, 1.0]`.

use crate::context::ExecutionContext;
use crate::operation::{Operation, OperationBuilder};
use crate::state::Status;

/// Returns an operation mirroring the inner operation of `outer`.
pub fn unwrap<T>(outer: &Operation<Operation<T>>) -> Operation<T>
where
    T: Clone + Send + Sync + 'static,
{
    let target: Operation<T> = OperationBuilder::new()
        .initial_status(Status::Running)
        .build();

    {
        let target = target.clone();
        outer.on_progress(ExecutionContext::Inline, move |_, progress| {
            target.report_progress(progress * 0.5);
        });
    }

    let derived = target.clone();
    outer.on_completed(ExecutionContext::Inline, move |o| {
        if let Some(error) = o.error() {
            let _ = derived.try_set_error(error, false);
            return;
        }
        derived.report_progress(0.5);
        let inner = o.result();
        {
            let derived = derived.clone();
            inner.on_progress(ExecutionContext::Inline, move |_, progress| {
                derived.report_progress(0.5 + progress * 0.5);
            });
        }
        let adopter = derived.clone();
        inner.on_completed(ExecutionContext::Inline, move |i| {
            super::propagate(&i, &adopter, false);
        });
    });

    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OpError;
    use crate::test_util::init_test_logging;
    use std::sync::Arc;

    #[test]
    fn inner_success_propagates() {
        init_test_logging();
        let outer: Operation<Operation<i32>> = Operation::new();
        let inner: Operation<i32> = Operation::new();
        let flat = unwrap(&outer);
        assert!(outer.try_set_result(inner.clone(), false));
        assert!(flat.is_pending(), "waits on the inner operation");
        assert!(inner.try_set_result(5, false));
        assert_eq!(flat.result(), 5);
    }

    #[test]
    fn outer_failure_short_circuits() {
        init_test_logging();
        let outer: Operation<Operation<i32>> = Operation::new();
        let flat = unwrap(&outer);
        let stored: Arc<OpError> = OpError::faulted("outer died").into();
        assert!(outer.try_set_error(Arc::clone(&stored), false));
        assert!(flat.is_faulted());
        assert!(Arc::ptr_eq(&flat.error().expect("propagated"), &stored));
    }

    #[test]
    fn inner_cancellation_propagates() {
        init_test_logging();
        let outer: Operation<Operation<()>> = Operation::new();
        let inner: Operation<()> = Operation::new();
        let flat = unwrap(&outer);
        assert!(outer.try_set_result(inner.clone(), false));
        assert!(inner.try_set_canceled(false));
        assert!(flat.is_canceled());
    }

    #[test]
    fn already_flat_nesting_completes_immediately() {
        init_test_logging();
        let outer = Operation::from_result(Operation::from_result(1));
        let flat = unwrap(&outer);
        assert_eq!(flat.result(), 1);
    }
}
