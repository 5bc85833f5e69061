//! Packed atomic status + flags word.
//!
//! Every operation carries exactly one [`StateCell`]: a single `AtomicU32`
//! holding the status in its low bits, completion/disposal/cancellation flags
//! above it, and creation-time option bits at the top. All transitions are
//! compare-and-swap retry loops; there is no lock anywhere on this path.
//!
//! Completion is a two-phase protocol:
//!
//! 1. `try_reserve_completion`: at most one caller per instance ever wins
//!    the `COMPLETION_RESERVED` bit. The winner then writes the result/error
//!    payload while the status word still shows the pre-terminal status.
//! 2. `commit_completion`: publishes the terminal status together with the
//!    `COMPLETED` bit in one CAS. Payload is only readable once `COMPLETED`
//!    is observable, so no reader can see a half-written outcome.

use std::sync::atomic::{AtomicU32, Ordering};

/// The lifecycle status of an operation.
///
/// Status is strictly monotonic:
/// `Created < Scheduled < Running < {RanToCompletion, Canceled, Faulted}`.
/// No transition moves backward, and a terminal status is never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum Status {
    /// Constructed, not yet started.
    Created = 0,
    /// Start was requested; the underlying work has not begun running.
    Scheduled = 1,
    /// The underlying work is in flight; progress reports are accepted.
    Running = 2,
    /// Terminal: completed successfully.
    RanToCompletion = 3,
    /// Terminal: completed by cancellation.
    Canceled = 4,
    /// Terminal: completed with an error.
    Faulted = 5,
}

impl Status {
    /// Returns true for `RanToCompletion`, `Canceled`, and `Faulted`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::RanToCompletion | Self::Canceled | Self::Faulted)
    }

    const fn from_bits(bits: u32) -> Self {
        match bits {
            0 => Self::Created,
            1 => Self::Scheduled,
            2 => Self::Running,
            3 => Self::RanToCompletion,
            4 => Self::Canceled,
            _ => Self::Faulted,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::RanToCompletion => "ran-to-completion",
            Self::Canceled => "canceled",
            Self::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

const STATUS_MASK: u32 = 0b111;

const COMPLETION_RESERVED: u32 = 1 << 3;
const COMPLETED: u32 = 1 << 4;
const COMPLETED_SYNCHRONOUSLY: u32 = 1 << 5;
const CANCELLATION_REQUESTED: u32 = 1 << 6;
const DISPOSED: u32 = 1 << 7;

const OPT_SHIFT: u32 = 8;

/// Creation-time options, fixed for the lifetime of the operation.
///
/// Stored in the upper bits of the packed word; written once at construction
/// and read-only thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Options(u32);

impl Options {
    /// No options.
    pub const NONE: Self = Self(0);
    /// `dispose` is a no-op; used for shared pre-completed singletons.
    pub const DO_NOT_DISPOSE: Self = Self(1 << OPT_SHIFT);
    /// Force marshaled callback invocation even for inline registrations,
    /// trading latency for never re-entering the completing caller's stack.
    pub const RUN_CONTINUATIONS_ASYNCHRONOUSLY: Self = Self(1 << (OPT_SHIFT + 1));
    /// `cancel` is a permanent no-op for this instance.
    pub const SUPPRESS_CANCELLATION: Self = Self(1 << (OPT_SHIFT + 2));

    /// Returns true if every option bit in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    const fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for Options {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// The packed status/flags register of one operation.
#[derive(Debug)]
pub struct StateCell {
    word: AtomicU32,
}

impl StateCell {
    /// Creates a cell in the given initial status.
    ///
    /// A terminal initial status is published immediately (the `COMPLETED`
    /// and `COMPLETION_RESERVED` bits are set); this is how the pre-completed
    /// helpers are built.
    #[must_use]
    pub fn new(initial: Status, options: Options) -> Self {
        let mut word = initial as u32 | options.bits();
        if initial.is_terminal() {
            word |= COMPLETION_RESERVED | COMPLETED;
        }
        Self {
            word: AtomicU32::new(word),
        }
    }

    /// Returns the current status.
    ///
    /// During the reserve-to-commit window this still reports the
    /// pre-terminal status; a terminal status only becomes observable
    /// together with the `COMPLETED` bit.
    #[must_use]
    pub fn status(&self) -> Status {
        Status::from_bits(self.word.load(Ordering::Acquire) & STATUS_MASK)
    }

    /// Returns true once the terminal status and payload are published.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.word.load(Ordering::Acquire) & COMPLETED != 0
    }

    /// Returns true if the winning terminal transition was flagged as
    /// having completed synchronously. Advisory only.
    #[must_use]
    pub fn completed_synchronously(&self) -> bool {
        self.word.load(Ordering::Acquire) & COMPLETED_SYNCHRONOUSLY != 0
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn cancellation_requested(&self) -> bool {
        self.word.load(Ordering::Acquire) & CANCELLATION_REQUESTED != 0
    }

    /// Returns true once the operation has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.word.load(Ordering::Acquire) & DISPOSED != 0
    }

    /// Returns the creation-time options.
    #[must_use]
    pub fn options(&self) -> Options {
        Options(self.word.load(Ordering::Relaxed) & !(STATUS_MASK | FLAG_MASK))
    }

    /// Attempts the Created → Scheduled transition.
    pub fn try_schedule(&self) -> bool {
        self.try_advance(Status::Created, Status::Scheduled)
    }

    /// Attempts the Scheduled → Running transition.
    pub fn try_run(&self) -> bool {
        self.try_advance(Status::Scheduled, Status::Running)
    }

    fn try_advance(&self, from: Status, to: Status) -> bool {
        let mut current = self.word.load(Ordering::Acquire);
        loop {
            if current & (COMPLETION_RESERVED | DISPOSED) != 0 {
                return false;
            }
            if current & STATUS_MASK != from as u32 {
                return false;
            }
            let next = (current & !STATUS_MASK) | to as u32;
            match self.word.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Phase one of completion: attempts to win the reservation.
    ///
    /// Exactly one caller per instance ever receives `true`; everyone else,
    /// on every thread, forever, receives `false`. The winner must write the
    /// outcome payload and then call [`commit_completion`](Self::commit_completion).
    pub fn try_reserve_completion(&self) -> bool {
        let mut current = self.word.load(Ordering::Acquire);
        loop {
            if current & COMPLETION_RESERVED != 0 {
                return false;
            }
            match self.word.compare_exchange_weak(
                current,
                current | COMPLETION_RESERVED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Phase two of completion: publishes the terminal status.
    ///
    /// Must only be called by the thread that won
    /// [`try_reserve_completion`](Self::try_reserve_completion), after the
    /// payload fields are fully written.
    ///
    /// # Panics
    ///
    /// Panics if `terminal` is not a terminal status.
    pub fn commit_completion(&self, terminal: Status, synchronously: bool) {
        assert!(terminal.is_terminal(), "commit requires a terminal status");
        let mut current = self.word.load(Ordering::Acquire);
        loop {
            debug_assert!(current & COMPLETION_RESERVED != 0);
            let mut next = (current & !STATUS_MASK) | terminal as u32 | COMPLETED;
            if synchronously {
                next |= COMPLETED_SYNCHRONOUSLY;
            }
            match self.word.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Records a cancellation request.
    ///
    /// Returns false (without setting the flag) when the operation suppresses
    /// cancellation or has already reserved/published completion.
    pub fn try_request_cancellation(&self) -> bool {
        let mut current = self.word.load(Ordering::Acquire);
        loop {
            if current & Options::SUPPRESS_CANCELLATION.bits() != 0 {
                return false;
            }
            if current & COMPLETION_RESERVED != 0 {
                return false;
            }
            if current & CANCELLATION_REQUESTED != 0 {
                // Already requested; idempotent, not a fresh request.
                return false;
            }
            match self.word.compare_exchange_weak(
                current,
                current | CANCELLATION_REQUESTED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Marks the cell disposed. Returns false if it was already disposed.
    pub fn try_mark_disposed(&self) -> bool {
        let prior = self.word.fetch_or(DISPOSED, Ordering::AcqRel);
        prior & DISPOSED == 0
    }
}

const FLAG_MASK: u32 = COMPLETION_RESERVED
    | COMPLETED
    | COMPLETED_SYNCHRONOUSLY
    | CANCELLATION_REQUESTED
    | DISPOSED;
