//! Sequential continuation: run a follow-on stage after an antecedent.
//!
//! The continuation subscribes to its antecedent's completion. When the
//! antecedent's terminal status matches the filter, the factory runs and
//! produces either an immediate value or a follow-on operation whose outcome
//! the continuation adopts. On a filter mismatch the factory never runs:
//! an antecedent failure is propagated unchanged, and an antecedent success
//! that the filter excludes completes the continuation as canceled.
//!
//! Progress is a two-phase blend: `[0, 0.5]` tracks the antecedent,
//! `[0.5, 1.0]` tracks the follow-on stage.

use crate::context::ExecutionContext;
use crate::operation::{Operation, OperationBuilder};
use crate::state::Status;

/// Which antecedent terminal statuses let the factory run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuationFilter(u8);

impl ContinuationFilter {
    /// Run the factory only when the antecedent succeeded.
    pub const ON_SUCCESS: Self = Self(1);
    /// Run the factory only when the antecedent faulted.
    pub const ON_FAULT: Self = Self(2);
    /// Run the factory only when the antecedent was canceled.
    pub const ON_CANCEL: Self = Self(4);
    /// Run the factory on any terminal status.
    pub const ALWAYS: Self = Self(1 | 2 | 4);

    /// Returns true if the filter admits the given terminal status.
    #[must_use]
    pub const fn matches(self, status: Status) -> bool {
        let bit = match status {
            Status::RanToCompletion => 1,
            Status::Faulted => 2,
            Status::Canceled => 4,
            _ => 0,
        };
        self.0 & bit != 0
    }
}

impl std::ops::BitOr for ContinuationFilter {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// What a continuation factory produces: an immediate value, or a follow-on
/// operation whose outcome the continuation adopts.
pub enum Continuation<U> {
    /// Complete immediately with this value.
    Value(U),
    /// Adopt this operation's terminal outcome.
    Op(Operation<U>),
}

/// Runs `factory` after `antecedent` reaches a terminal status admitted by
/// `filter`; returns the derived operation.
pub fn continue_with<T, U, F>(
    antecedent: &Operation<T>,
    filter: ContinuationFilter,
    factory: F,
) -> Operation<U>
where
    T: Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    F: FnOnce(&Operation<T>) -> Continuation<U> + Send + 'static,
{
    let target: Operation<U> = OperationBuilder::new()
        .initial_status(Status::Running)
        .build();

    {
        let target = target.clone();
        antecedent.on_progress(ExecutionContext::Inline, move |_, progress| {
            target.report_progress(progress * 0.5);
        });
    }

    let derived = target.clone();
    antecedent.on_completed(ExecutionContext::Inline, move |a| {
        if !filter.matches(a.status()) {
            match a.error() {
                Some(error) => {
                    let _ = derived.try_set_error(error, false);
                }
                // Success excluded by the filter: there is nothing to
                // propagate, so the continuation is moot.
                None => {
                    let _ = derived.try_set_canceled(false);
                }
            }
            return;
        }
        derived.report_progress(0.5);
        match factory(&a) {
            Continuation::Value(value) => {
                let _ = derived.try_set_result(value, false);
            }
            Continuation::Op(stage) => {
                {
                    let derived = derived.clone();
                    stage.on_progress(ExecutionContext::Inline, move |_, progress| {
                        derived.report_progress(0.5 + progress * 0.5);
                    });
                }
                let derived = derived.clone();
                stage.on_completed(ExecutionContext::Inline, move |b| {
                    super::propagate(&b, &derived, false);
                });
            }
        }
    });

    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OpError;
    use crate::test_util::init_test_logging;

    #[test]
    fn value_continuation_after_success() {
        init_test_logging();
        let a: Operation<i32> = Operation::new();
        let b = continue_with(&a, ContinuationFilter::ON_SUCCESS, |a| {
            Continuation::Value(a.result() * 2)
        });
        assert!(b.is_pending());
        assert!(a.try_set_result(21, false));
        assert!(b.succeeded());
        assert_eq!(b.result(), 42);
    }

    #[test]
    fn operation_continuation_adopts_stage_outcome() {
        init_test_logging();
        let a: Operation<()> = Operation::new();
        let stage: Operation<&'static str> = Operation::new();
        let stage_for_factory = stage.clone();
        let b = continue_with(&a, ContinuationFilter::ON_SUCCESS, move |_| {
            Continuation::Op(stage_for_factory)
        });
        assert!(a.try_set_result((), false));
        assert!(b.is_pending(), "waits on the follow-on stage");
        assert!(stage.try_set_result("done", false));
        assert_eq!(b.result(), "done");
    }

    #[test]
    fn antecedent_fault_skips_factory_and_propagates() {
        init_test_logging();
        let a: Operation<()> = Operation::new();
        let b: Operation<()> = continue_with(&a, ContinuationFilter::ON_SUCCESS, |_| {
            panic!("factory must not run on a filter mismatch")
        });
        let stored: std::sync::Arc<OpError> = OpError::faulted("upstream").into();
        assert!(a.try_set_error(std::sync::Arc::clone(&stored), false));
        assert!(b.is_faulted());
        let err = b.error().expect("propagated");
        assert!(std::sync::Arc::ptr_eq(&err, &stored), "identity preserved");
    }

    #[test]
    fn fault_filter_runs_factory_on_fault() {
        init_test_logging();
        let a: Operation<()> = Operation::new();
        let b = continue_with(&a, ContinuationFilter::ON_FAULT, |a| {
            Continuation::Value(a.error().expect("faulted antecedent").message().to_string())
        });
        assert!(a.try_set_error(OpError::faulted("boom"), false));
        assert_eq!(b.result(), "boom");
    }

    #[test]
    fn success_excluded_by_filter_cancels_continuation() {
        init_test_logging();
        let a: Operation<()> = Operation::new();
        let b: Operation<()> = continue_with(&a, ContinuationFilter::ON_FAULT, |_| {
            panic!("factory must not run")
        });
        assert!(a.try_set_result((), false));
        assert!(b.is_canceled());
    }

    #[test]
    fn progress_blends_across_phases() {
        init_test_logging();
        let a: Operation<()> = Operation::new();
        a.start().expect("start");
        let stage: Operation<()> = Operation::new();
        let stage_for_factory = stage.clone();
        let b = continue_with(&a, ContinuationFilter::ON_SUCCESS, move |_| {
            Continuation::Op(stage_for_factory)
        });
        a.report_progress(0.5);
        assert_eq!(b.progress(), 0.25);
        assert!(a.try_set_result((), false));
        assert_eq!(b.progress(), 0.5);
        stage.start().expect("start stage");
        stage.report_progress(0.5);
        assert_eq!(b.progress(), 0.75);
        assert!(stage.try_set_result((), false));
        assert_eq!(b.progress(), 1.0);
    }

    #[test]
    fn filters_compose_with_bitor() {
        let f = ContinuationFilter::ON_FAULT | ContinuationFilter::ON_CANCEL;
        assert!(f.matches(Status::Faulted));
        assert!(f.matches(Status::Canceled));
        assert!(!f.matches(Status::RanToCompletion));
        assert!(ContinuationFilter::ALWAYS.matches(Status::RanToCompletion));
    }
}
