//! Explicit change tracking.
//!
//! A [`UnitOfWork`] stages rows for the primary store and records a
//! [`Mutation`] for every change it makes. The log is plain data: the change
//! classifier consumes it without any knowledge of how rows are stored.

mod mutation;
#[allow(clippy::module_inception)]
mod unit_of_work;

pub use mutation::{ChangeKind, FieldChange, Mutation, MutationTarget};
pub use unit_of_work::{StagedAuthor, StagedBook, UnitOfWork, WriteOp};
