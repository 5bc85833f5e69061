//! End-to-end combinator semantics, driven the way external collaborators
//! drive them: completion pushed in from other threads, timeouts expressed
//! by racing against a delay.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use deferop::{
    continue_with, delay, delay_forever, retry, unwrap, when_all, when_any, Continuation,
    ContinuationFilter, ErrorKind, ExecutionContext, OpError, Operation,
};

fn init_test_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Completes `op` with `value` from another thread after `after`.
fn complete_later<T: Clone + Send + Sync + 'static>(op: &Operation<T>, value: T, after: Duration) {
    let op = op.clone();
    let _ = thread::spawn(move || {
        thread::sleep(after);
        op.try_set_result(value, false)
    });
}

#[test]
fn timeout_is_a_race_against_delay() {
    init_test_logging();
    // Slow operation loses to the timeout delay.
    let work: Operation<()> = Operation::new();
    let timeout = delay(Duration::from_millis(10));
    let race = when_any(vec![work.clone(), timeout.clone()]);
    let winner = {
        race.wait().expect("race completes");
        race.result()
    };
    assert_eq!(winner, timeout, "the deadline won");
    // The loser is then cancelled by the caller, as a timeout policy would.
    work.cancel();

    // Fast operation beats its timeout.
    let work: Operation<()> = Operation::new();
    let timeout = delay(Duration::from_secs(3600));
    let race = when_any(vec![work.clone(), timeout.clone()]);
    assert!(work.try_set_result((), false));
    assert_eq!(race.result(), work);
    timeout.cancel();
    assert!(timeout.is_canceled());
}

#[test]
fn continuation_chain_runs_in_sequence() {
    init_test_logging();
    let first: Operation<i32> = Operation::new();
    let doubled = continue_with(&first, ContinuationFilter::ON_SUCCESS, |op| {
        Continuation::Value(op.result() * 2)
    });
    let described = continue_with(&doubled, ContinuationFilter::ON_SUCCESS, |op| {
        Continuation::Value(format!("value = {}", op.result()))
    });
    complete_later(&first, 10, Duration::from_millis(10));
    described.wait().expect("chain completes");
    assert_eq!(described.result(), "value = 20");
}

#[test]
fn continuation_factory_spawning_threaded_stage() {
    init_test_logging();
    let fetch: Operation<u64> = Operation::new();
    let derived = continue_with(&fetch, ContinuationFilter::ON_SUCCESS, |op| {
        let stage: Operation<u64> = Operation::new();
        complete_later(&stage, op.result() + 1, Duration::from_millis(10));
        Continuation::Op(stage)
    });
    complete_later(&fetch, 41, Duration::from_millis(5));
    derived.wait().expect("both stages complete");
    assert_eq!(derived.result(), 42);
}

#[test]
fn when_all_collects_threaded_completions() {
    init_test_logging();
    let ops: Vec<Operation<usize>> = (0..5).map(|_| Operation::new()).collect();
    let all = when_all(ops.clone());
    for (i, op) in ops.iter().enumerate() {
        complete_later(op, i, Duration::from_millis(5 + i as u64 * 3));
    }
    all.wait().expect("all complete");
    assert_eq!(all.result(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn when_all_aggregates_threaded_failures() {
    init_test_logging();
    let good: Operation<()> = Operation::new();
    let bad: Operation<()> = Operation::new();
    let all = when_all(vec![good.clone(), bad.clone()]);
    complete_later(&good, (), Duration::from_millis(5));
    {
        let bad = bad.clone();
        let _ = thread::spawn(move || bad.try_set_error(OpError::faulted("worker died"), false));
    }
    let err = all.wait().expect_err("aggregate failure");
    assert_eq!(err.kind(), ErrorKind::Aggregate);
    assert_eq!(err.parts().len(), 1);
    assert_eq!(err.parts()[0].message(), "worker died");
}

#[test]
fn unwrap_flattens_threaded_nesting() {
    init_test_logging();
    let outer: Operation<Operation<i32>> = Operation::new();
    let flat = unwrap(&outer);
    {
        let outer = outer.clone();
        let _ = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            let inner: Operation<i32> = Operation::new();
            complete_later(&inner, 99, Duration::from_millis(5));
            outer.try_set_result(inner, false)
        });
    }
    flat.wait().expect("outer and inner complete");
    assert_eq!(flat.result(), 99);
}

#[test]
fn retry_with_real_delay_between_attempts() {
    init_test_logging();
    let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let a = Arc::clone(&attempts);
    let op = retry(
        move || {
            let n = a.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            if n < 3 {
                Operation::from_error(OpError::faulted("transient"))
            } else {
                Operation::from_result("stable")
            }
        },
        Duration::from_millis(5),
        0,
    );
    op.wait().expect("third attempt succeeds");
    assert_eq!(op.result(), "stable");
    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
}

#[test]
fn delay_forever_races_as_an_uncancelled_timeout() {
    init_test_logging();
    let work: Operation<()> = Operation::new();
    let forever = delay_forever();
    let race = when_any(vec![work.clone(), forever.clone()]);
    complete_later(&work, (), Duration::from_millis(10));
    race.wait().expect("work wins");
    assert_eq!(race.result(), work);
    assert!(forever.is_pending(), "never completes on its own");
    forever.cancel();
}

#[test]
fn combinators_compose_with_callbacks() {
    init_test_logging();
    let a: Operation<i32> = Operation::new();
    let b: Operation<i32> = Operation::new();
    let all = when_all(vec![a.clone(), b.clone()]);
    let sum = continue_with(&all, ContinuationFilter::ON_SUCCESS, |op| {
        Continuation::Value(op.result().iter().sum::<i32>())
    });
    let (tx, rx) = std::sync::mpsc::channel();
    sum.on_completed(ExecutionContext::Inline, move |op| {
        let _ = tx.send(op.result());
    });
    complete_later(&a, 20, Duration::from_millis(5));
    complete_later(&b, 22, Duration::from_millis(10));
    let total = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback delivered");
    assert_eq!(total, 42);
}
