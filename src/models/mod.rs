//! Scheduling domain models.
//!
//! The declarative side of the crate: tasks, resources, buffers,
//! constraints, indicators and objectives, owned by a [`Problem`].
//! Nothing here knows about SMT; the `encoder` module lowers these
//! types to solver assertions.

mod buffer;
mod constraint;
pub mod expr;
mod function;
mod indicator;
mod objective;
mod problem;
mod resource;
mod task;

pub use buffer::{Buffer, BufferKind};
pub use constraint::{
    BoundKind, Constraint, CountKind, DistanceMode, PrecedenceKind, TimeInterval,
};
pub use expr::{BoolExpr, CmpOp, IntExpr};
pub use function::Function;
pub use indicator::{Indicator, IndicatorExpr};
pub use objective::{Objective, ObjectiveKind};
pub use problem::{ConstraintDef, Problem};
pub use resource::{Resource, SelectKind, SelectWorkers};
pub use task::{DurationSpec, ResourceRequirement, Task};
