//! Derived operations built on the operation core.
//!
//! Every combinator here is itself an [`Operation`](crate::Operation): it
//! registers private callbacks on its antecedents and drives its own
//! terminal setters from inside them. Combinators are both consumers and
//! producers of the same primitive, composed rather than specialized.
//!
//! - [`continue_with`]: run a follow-on stage after an antecedent
//! - [`when_all`]: finish after every antecedent, aggregating failures
//! - [`when_any`]: finish after the first antecedent, first claim wins
//! - [`unwrap`]: flatten a nested operation-of-operation
//! - [`retry`]: re-invoke a factory until success or attempts exhausted
//! - [`delay`]: pure timer-driven completion
//!
//! A derived operation never observably transitions before its antecedent
//! condition holds. Timeouts are not a dedicated combinator: race the real
//! operation against a [`delay`] with [`when_any`] and keep whichever wins.

mod continue_with;
mod delay;
mod retry;
mod unwrap;
mod when_all;
mod when_any;

pub use continue_with::{continue_with, Continuation, ContinuationFilter};
pub use delay::{delay, delay_forever};
pub use retry::retry;
pub use unwrap::unwrap;
pub use when_all::when_all;
pub use when_any::when_any;

use crate::operation::Operation;

/// Propagates a completed antecedent's outcome into a derived operation,
/// preserving error identity. Losing the derived operation's completion
/// race is fine; first writer wins.
pub(crate) fn propagate<T>(from: &Operation<T>, to: &Operation<T>, synchronously: bool)
where
    T: Clone + Send + Sync + 'static,
{
    if let Some(error) = from.error() {
        let _ = to.try_set_error(error, synchronously);
    } else {
        let _ = to.try_set_result(from.result(), synchronously);
    }
}
