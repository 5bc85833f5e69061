//! Deadline management for timer-driven operations.
//!
//! A small min-heap of `(deadline, operation)` pairs, owned by one lazily
//! started process-wide timer thread. The thread sleeps until the earliest
//! deadline, completes every due operation with `try_set_result`, and goes
//! back to sleep. A delay operation cancelled before its deadline loses the
//! completion race by the core's exactly-once protocol; its heap entry is
//! discarded on the next sweep.
//!
//! The timer thread fires deadlines; it never executes user work. That keeps
//! the core's contract intact: work is driven by external collaborators, the
//! core only tracks completion.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::operation::Operation;

#[derive(Debug)]
struct TimerEntry {
    deadline: Instant,
    /// Tie-breaker preserving insertion order among equal deadlines.
    generation: u64,
    op: Operation<()>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Eq for TimerEntry {}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse ordering for a min-heap (earliest deadline first).
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of pending deadlines.
#[derive(Debug, Default)]
pub(crate) struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    next_generation: u64,
}

impl TimerHeap {
    pub(crate) fn insert(&mut self, op: Operation<()>, deadline: Instant) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.heap.push(TimerEntry {
            deadline,
            generation,
            op,
        });
    }

    pub(crate) fn peek_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.deadline)
    }

    /// Pops every operation whose deadline is `<= now`, dropping entries
    /// whose operation already completed (cancelled delays).
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Vec<Operation<()>> {
        let mut expired = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                if !entry.op.is_completed() {
                    expired.push(entry.op);
                }
            }
        }
        expired
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

struct TimerShared {
    heap: Mutex<TimerHeap>,
    wakeup: Condvar,
}

/// Returns the process-wide timer, starting its thread on first use.
fn shared() -> &'static TimerShared {
    static SHARED: OnceLock<TimerShared> = OnceLock::new();
    static THREAD: OnceLock<()> = OnceLock::new();
    let timer = SHARED.get_or_init(|| TimerShared {
        heap: Mutex::new(TimerHeap::default()),
        wakeup: Condvar::new(),
    });
    THREAD.get_or_init(|| {
        let _ = thread::Builder::new()
            .name("deferop-timer".into())
            .spawn(move || timer.run())
            .expect("failed to spawn timer thread");
    });
    timer
}

impl TimerShared {
    fn run(&self) {
        loop {
            let due = {
                let mut heap = self.heap.lock();
                loop {
                    let now = Instant::now();
                    match heap.peek_deadline() {
                        Some(deadline) if deadline <= now => break heap.pop_expired(now),
                        Some(deadline) => {
                            let _ = self.wakeup.wait_until(&mut heap, deadline);
                        }
                        None => self.wakeup.wait(&mut heap),
                    }
                }
            };
            for op in due {
                trace!(id = op.id(), "timer deadline fired");
                // Losing to an earlier cancellation is fine.
                let _ = op.try_set_result((), false);
            }
        }
    }
}

/// Arms a deadline that completes `op` successfully once `delay` elapses.
pub(crate) fn arm(op: Operation<()>, delay: Duration) {
    let timer = shared();
    let deadline = Instant::now() + delay;
    {
        let mut heap = timer.heap.lock();
        heap.insert(op, deadline);
        trace!(pending = heap.len(), "timer armed");
    }
    timer.wakeup.notify_one();
}
