//! Resource-constrained project scheduling over SMT.
//!
//! Models scheduling problems declaratively — tasks, resources,
//! buffers, constraints, indicators, objectives — and compiles them to
//! quantifier-free linear integer arithmetic discharged by an SMT
//! backend. Returns concrete schedules: start/end/duration per task,
//! resource assignments, buffer level timelines, indicator values.
//!
//! # Modules
//!
//! - **`models`**: the declarative layer — `Task`, `Resource`,
//!   `Buffer`, `Constraint`, `Indicator`, `Objective`, owned by a
//!   `Problem`
//! - **`encoder`**: compilation of a problem into SMT declarations and
//!   assertions
//! - **`smt`**: term representation, backend trait, builtin and
//!   process backends
//! - **`solver`**: the driver — incremental and backend-optimize
//!   strategies, unsat-core debug mode
//! - **`solution`**: immutable schedule snapshots
//! - **`export`**: JSON rendering of solutions
//!
//! # Example
//!
//! ```
//! use smtsched::models::{Constraint, Indicator, Objective, Problem, Task};
//! use smtsched::solver::{SchedulingSolver, SolverOptions};
//!
//! let mut problem = Problem::new("hello");
//! problem.add_task(Task::fixed_duration("A", 2)).unwrap();
//! problem.add_task(Task::fixed_duration("B", 2)).unwrap();
//! problem.add_constraint(Constraint::precedence("A", "B")).unwrap();
//! problem.add_indicator(Indicator::makespan("makespan")).unwrap();
//! problem.add_objective(Objective::minimize("obj", "makespan")).unwrap();
//!
//! let mut solver = SchedulingSolver::new(&problem, SolverOptions::default()).unwrap();
//! let solution = solver.solve().unwrap();
//! assert_eq!(solution.indicator("makespan"), Some(4));
//! ```
//!
//! # References
//!
//! - Brucker et al. (1999), "Resource-constrained project scheduling:
//!   Notation, classification, models, and methods"
//! - Barrett & Tinelli (2018), "Satisfiability Modulo Theories",
//!   Handbook of Model Checking

pub mod encoder;
pub mod error;
pub mod export;
pub mod models;
pub mod smt;
pub mod solution;
pub mod solver;

pub use error::{BackendError, EncodeError, ModelError, SolveError};
pub use models::Problem;
pub use solution::{Solution, TaskSolution};
pub use solver::{SchedulingSolver, SolverOptions};
