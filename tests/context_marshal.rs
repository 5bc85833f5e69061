//! Execution-context marshaling: callbacks land on the executor named at
//! registration, and `RUN_CONTINUATIONS_ASYNCHRONOUSLY` keeps completion
//! off the completing caller's stack.
//!
//! These tests install the process-wide default context, so they live in
//! their own binary rather than sharing one with tests that assume no
//! default is set.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, OnceLock};
use std::thread;
use std::time::Duration;

use deferop::{
    set_default_context, ExecutionContext, Executor, Operation, OperationBuilder, Options,
};

/// Single-threaded executor draining a channel, standing in for a host
/// main loop.
struct LoopExecutor {
    tx: mpsc::Sender<Box<dyn FnOnce() + Send>>,
}

impl Executor for LoopExecutor {
    fn execute(&self, job: Box<dyn FnOnce() + Send>) {
        self.tx.send(job).expect("loop alive");
    }
}

/// Serializes tests that install the process-wide default context.
fn default_context_guard() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    match LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn spawn_loop() -> (Arc<LoopExecutor>, thread::JoinHandle<()>, Arc<AtomicUsize>) {
    let (tx, rx) = mpsc::channel::<Box<dyn FnOnce() + Send>>();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    let handle = thread::spawn(move || {
        while let Ok(job) = rx.recv_timeout(Duration::from_secs(2)) {
            job();
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    (Arc::new(LoopExecutor { tx }), handle, ran)
}

#[test]
fn callbacks_marshal_to_named_and_default_executors() {
    let _guard = default_context_guard();
    let (executor, loop_thread, ran) = spawn_loop();
    set_default_context(executor.clone());

    let explicit: Operation<i32> = Operation::new();
    let (tx, rx) = mpsc::channel();
    {
        let tx = tx.clone();
        explicit.on_completed(ExecutionContext::On(executor.clone()), move |op| {
            let _ = tx.send(("explicit", op.result(), thread::current().id()));
        });
    }

    let defaulted: Operation<i32> = Operation::new();
    defaulted.on_completed(ExecutionContext::Default, move |op| {
        let _ = tx.send(("default", op.result(), thread::current().id()));
    });

    let completer_thread = thread::current().id();
    assert!(explicit.try_set_result(1, false));
    assert!(defaulted.try_set_result(2, false));

    let mut seen = Vec::new();
    for _ in 0..2 {
        seen.push(rx.recv_timeout(Duration::from_secs(2)).expect("marshaled"));
    }
    seen.sort_by_key(|(label, ..)| *label);
    assert_eq!(seen[0].0, "default");
    assert_eq!(seen[0].1, 2);
    assert_eq!(seen[1].0, "explicit");
    assert_eq!(seen[1].1, 1);
    for (_, _, tid) in &seen {
        assert_ne!(*tid, completer_thread, "never on the completing stack");
    }

    drop(explicit);
    drop(defaulted);
    // The loop exits after its idle timeout.
    loop_thread.join().expect("loop thread");
    assert!(ran.load(Ordering::SeqCst) >= 2);
    deferop::clear_default_context();
}

#[test]
fn run_continuations_asynchronously_upgrades_inline() {
    let _guard = default_context_guard();
    let (executor, loop_thread, _ran) = spawn_loop();
    set_default_context(executor);

    let op: Operation<()> = OperationBuilder::new()
        .options(Options::RUN_CONTINUATIONS_ASYNCHRONOUSLY)
        .build();
    let (tx, rx) = mpsc::channel();
    op.on_completed(ExecutionContext::Inline, move |_| {
        let _ = tx.send(thread::current().id());
    });
    let completer_thread = thread::current().id();
    assert!(op.try_set_result((), false));
    let callback_thread = rx.recv_timeout(Duration::from_secs(2)).expect("marshaled");
    assert_ne!(
        callback_thread, completer_thread,
        "inline registration was forced onto the default executor"
    );
    loop_thread.join().expect("loop thread");
    deferop::clear_default_context();
}
