//! Pull-based query operators. Each operator is a DbIterator over its children.

mod aggregate;
mod mutation;
mod scan;
mod source;

pub use aggregate::{Aggregate, AggregateOp};
pub use mutation::{Delete, Insert};
pub use scan::SeqScan;
pub use source::TupleList;

pub use crate::storage::DbIterator;

/// A boxed operator, as consumed by the operators that take children.
pub type OpIterator = Box<dyn DbIterator + Send>;
