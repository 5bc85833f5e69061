//! Per-operation callback storage.
//!
//! Each operation owns two registries: one for completion callbacks (fire at
//! most once) and one for progress callbacks (fire zero or more times, only
//! while running). A registry is a [`Slot`] state machine:
//!
//! ```text
//! Empty ──► Single(entry) ──► Many(collection) ──► Sealed
//!   └────────────────────────────► Many            (progress registrations
//!                                                   go straight to Many)
//! ```
//!
//! `Sealed` is the single publish point: [`Slot::seal`] atomically drains
//! every stored entry exactly once, and every registration attempted after
//! sealing hands the entry back so the caller invokes the callback inline
//! instead of losing it. Removal never transitions `Single` back to
//! `Empty` (only to an empty `Many`), which keeps the add path unambiguous.
//!
//! The slot lives behind a short-lived mutex that is never held across a
//! user callback invocation; entries are always moved or snapshotted out
//! first.

use smallvec::SmallVec;

/// Token identifying one registration, used for removal.
///
/// Identity-based removal replaces delegate equality: the token returned by
/// the add call is the only handle to the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

impl CallbackId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// A stored registration: an entry plus its identity token.
#[derive(Debug)]
pub(crate) struct Keyed<E> {
    pub(crate) id: CallbackId,
    pub(crate) entry: E,
}

/// Callback storage for one operation, one callback kind.
#[derive(Debug)]
pub(crate) enum Slot<E> {
    /// No registrations yet.
    Empty,
    /// The common case: exactly one registration, no collection allocated.
    Single(Keyed<E>),
    /// Two or more registrations (or a progress registry), FIFO order.
    Many(SmallVec<[Keyed<E>; 4]>),
    /// Published: stored entries were drained; late registrations run inline.
    Sealed,
}

impl<E> Slot<E> {
    pub(crate) const fn new() -> Self {
        Self::Empty
    }

    /// Adds an entry, preserving FIFO order relative to earlier adds.
    ///
    /// A sealed registry hands the entry back as `Err` so the caller can
    /// invoke it inline instead of losing it.
    ///
    /// `collection_only` skips the `Single` fast path; progress registries
    /// always use the collection form since they are commonly registered
    /// more than once.
    pub(crate) fn add(&mut self, id: CallbackId, entry: E, collection_only: bool) -> Result<CallbackId, E> {
        match self {
            Self::Sealed => Err(entry),
            Self::Empty => {
                if collection_only {
                    let mut entries = SmallVec::new();
                    entries.push(Keyed { id, entry });
                    *self = Self::Many(entries);
                } else {
                    *self = Self::Single(Keyed { id, entry });
                }
                Ok(id)
            }
            Self::Single(_) => {
                // Promote: allocate the collection once, migrate the
                // existing entry in front to keep registration order.
                let Self::Single(first) = std::mem::replace(self, Self::Empty) else {
                    unreachable!()
                };
                let mut entries = SmallVec::new();
                entries.push(first);
                entries.push(Keyed { id, entry });
                *self = Self::Many(entries);
                Ok(id)
            }
            Self::Many(entries) => {
                entries.push(Keyed { id, entry });
                Ok(id)
            }
        }
    }

    /// Removes the registration with the given token.
    ///
    /// Returns true if an entry was removed. A `Single` hit becomes an empty
    /// `Many`, never `Empty`. A sealed registry removes nothing.
    pub(crate) fn remove(&mut self, id: CallbackId) -> bool {
        match self {
            Self::Empty | Self::Sealed => false,
            Self::Single(keyed) => {
                if keyed.id != id {
                    return false;
                }
                *self = Self::Many(SmallVec::new());
                true
            }
            Self::Many(entries) => {
                let before = entries.len();
                entries.retain(|keyed| keyed.id != id);
                entries.len() != before
            }
        }
    }

    /// Publishes: transitions to `Sealed` and returns every stored entry in
    /// FIFO order, exactly once. A second seal returns nothing.
    pub(crate) fn seal(&mut self) -> SmallVec<[Keyed<E>; 4]> {
        match std::mem::replace(self, Self::Sealed) {
            Self::Empty | Self::Sealed => SmallVec::new(),
            Self::Single(keyed) => {
                let mut entries = SmallVec::new();
                entries.push(keyed);
                entries
            }
            Self::Many(entries) => entries,
        }
    }

    /// Returns true once sealed.
    pub(crate) fn is_sealed(&self) -> bool {
        matches!(self, Self::Sealed)
    }
}
