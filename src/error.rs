//! Error types for deferred operations.
//!
//! Two terminal failure statuses exist: `Faulted` (an arbitrary error) and
//! `Canceled` (an explicit cancellation request, or an error classified as a
//! cancellation signal). Both carry an [`OpError`]. Aggregation composes
//! multiple antecedent failures into one composite error; a composite whose
//! every part is a cancellation is itself a cancellation.
//!
//! Misuse errors (double-start, disposing a live operation) are a separate
//! type, [`StateError`]: they represent programmer error and are surfaced
//! loudly at the call site instead of through the terminal status.

use core::fmt;
use std::sync::Arc;

/// The kind of operation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The operation was cancelled before producing a result.
    Cancelled,
    /// The operation failed with an arbitrary error.
    Faulted,
    /// Multiple antecedent failures composed by an aggregating combinator.
    Aggregate,
    /// A deadline elapsed before the operation completed.
    Timeout,
}

impl ErrorKind {
    /// Returns a human-readable name for the kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Faulted => "faulted",
            Self::Aggregate => "aggregate",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The failure cause stored by an operation in the `Canceled` or `Faulted`
/// terminal status.
///
/// `OpError` is shared as `Arc<OpError>` so that combinators can propagate an
/// antecedent's error with its identity preserved (not wrapped, not cloned
/// into a new allocation).
#[derive(Debug)]
pub struct OpError {
    kind: ErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    parts: Vec<Arc<OpError>>,
}

impl OpError {
    /// Creates a fault error with the given message.
    #[must_use]
    pub fn faulted(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Faulted,
            message: message.into(),
            source: None,
            parts: Vec::new(),
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            message: "operation was cancelled".to_string(),
            source: None,
            parts: Vec::new(),
        }
    }

    /// Creates a timeout error for a deadline that elapsed.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            message: message.into(),
            source: None,
            parts: Vec::new(),
        }
    }

    /// Wraps an arbitrary error as a fault, keeping it as the source.
    #[must_use]
    pub fn from_source(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            kind: ErrorKind::Faulted,
            message: source.to_string(),
            source: Some(Box::new(source)),
            parts: Vec::new(),
        }
    }

    /// Composes multiple antecedent failures into one error.
    ///
    /// If every part is a cancellation, the composite reports
    /// [`ErrorKind::Cancelled`] so that an all-cancelled aggregate completes
    /// as cancelled rather than faulted. Otherwise the composite is an
    /// [`ErrorKind::Aggregate`] and only non-cancellation parts are retained.
    ///
    /// # Panics
    ///
    /// Panics if `parts` is empty; aggregating nothing is a combinator bug.
    #[must_use]
    pub fn aggregate(parts: Vec<Arc<OpError>>) -> Self {
        assert!(!parts.is_empty(), "cannot aggregate zero errors");
        if parts.iter().all(|e| e.is_cancellation()) {
            return Self::cancelled();
        }
        let faults: Vec<Arc<OpError>> = parts
            .into_iter()
            .filter(|e| !e.is_cancellation())
            .collect();
        Self {
            kind: ErrorKind::Aggregate,
            message: format!("{} operation(s) failed", faults.len()),
            source: None,
            parts: faults,
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the composed failures of an aggregate error.
    ///
    /// Empty for non-aggregate errors.
    #[must_use]
    pub fn parts(&self) -> &[Arc<OpError>] {
        &self.parts
    }

    /// Returns true if this error is a cancellation signal.
    ///
    /// An error routed through `try_set_error` that reports `true` here
    /// completes the operation as `Canceled` rather than `Faulted`.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parts.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}:", self.message)?;
            for part in &self.parts {
                write!(f, " [{part}]")?;
            }
            Ok(())
        }
    }
}

impl std::error::Error for OpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

/// A misuse of the operation state machine.
///
/// These are programmer errors, distinct from operation-domain failures:
/// they fail loudly at the call site and are never stored as an operation's
/// terminal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// `start` was called on an operation that already left `Created`.
    AlreadyStarted,
    /// The operation was already disposed.
    AlreadyDisposed,
    /// `dispose` was called before the operation reached a terminal status.
    NotTerminal,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "operation was already started"),
            Self::AlreadyDisposed => write!(f, "operation was already disposed"),
            Self::NotTerminal => {
                write!(f, "operation must reach a terminal status before disposal")
            }
        }
    }
}

impl std::error::Error for StateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_of_faults_is_aggregate() {
        let e = OpError::aggregate(vec![
            Arc::new(OpError::faulted("a")),
            Arc::new(OpError::faulted("b")),
        ]);
        assert_eq!(e.kind(), ErrorKind::Aggregate);
        assert_eq!(e.parts().len(), 2);
        assert!(!e.is_cancellation());
    }

    #[test]
    fn aggregate_of_cancellations_is_cancellation() {
        let e = OpError::aggregate(vec![
            Arc::new(OpError::cancelled()),
            Arc::new(OpError::cancelled()),
        ]);
        assert_eq!(e.kind(), ErrorKind::Cancelled);
        assert!(e.is_cancellation());
    }

    #[test]
    fn aggregate_mixed_drops_cancellations() {
        let e = OpError::aggregate(vec![
            Arc::new(OpError::cancelled()),
            Arc::new(OpError::faulted("disk on fire")),
        ]);
        assert_eq!(e.kind(), ErrorKind::Aggregate);
        assert_eq!(e.parts().len(), 1);
        assert_eq!(e.parts()[0].message(), "disk on fire");
    }

    #[test]
    fn converts_into_shared_form() {
        // Terminal setters take `impl Into<Arc<OpError>>`; the std blanket
        // `From<T> for Arc<T>` must cover a bare `OpError`.
        let shared: Arc<OpError> = OpError::faulted("boom").into();
        assert_eq!(shared.kind(), ErrorKind::Faulted);
        assert_eq!(shared.message(), "boom");
    }

    #[test]
    fn source_chain_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let e = OpError::from_source(io);
        assert_eq!(e.kind(), ErrorKind::Faulted);
        assert!(std::error::Error::source(&e).is_some());
    }
}
