//! SMT layer: term representation, backend interface, backends.
//!
//! The encoder emits [`Term`] assertions; the solver driver discharges
//! them through an [`SmtBackend`]. Two backends ship with the crate:
//! the in-process [`BuiltinBackend`] (linear integer fragment, always
//! available) and the [`ProcessBackend`] (any SMT-LIB2 solver binary,
//! with optimize support).

mod backend;
mod builtin;
mod process;
mod term;

pub use backend::{CheckOutcome, Model, OptimizePriority, SmtBackend, Value};
pub use builtin::BuiltinBackend;
pub use process::{ProcessBackend, SOLVER_CMD_ENV};
pub use term::{Sort, Term};
