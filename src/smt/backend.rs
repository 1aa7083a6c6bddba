//! SMT backend interface.
//!
//! The solver driver only ever talks to this trait. Implementations:
//! [`crate::smt::BuiltinBackend`] (in-process, linear integer
//! arithmetic) and [`crate::smt::ProcessBackend`] (SMT-LIB2 over a
//! child solver process).

use std::collections::HashMap;
use std::time::Duration;

use crate::error::BackendError;

use super::term::{Sort, Term};

/// Verdict of a satisfiability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// A model exists and can be queried.
    Sat,
    /// No model exists under the current assertions/assumptions.
    Unsat,
    /// The backend gave up without a verdict.
    Unknown,
    /// The per-check deadline elapsed.
    Timeout,
}

/// A concrete value bound to a variable in a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bool(bool),
}

impl Value {
    /// Integer payload, if this is an integer value.
    pub fn as_int(self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(v),
            Value::Bool(_) => None,
        }
    }

    /// Boolean payload, if this is a boolean value.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(b),
            Value::Int(_) => None,
        }
    }
}

/// A satisfying assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    bindings: HashMap<String, Value>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a variable.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Value of a variable.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).copied()
    }

    /// Integer value of a variable (0 when unbound, matching solvers
    /// that omit don't-care variables from models).
    pub fn int(&self, name: &str) -> i64 {
        self.get(name).and_then(Value::as_int).unwrap_or(0)
    }

    /// Boolean value of a variable (false when unbound).
    pub fn bool(&self, name: &str) -> bool {
        self.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Evaluates a ground term under this model.
    ///
    /// Unbound variables evaluate as 0 / false.
    pub fn eval(&self, term: &Term) -> Value {
        match term {
            Term::Int(v) => Value::Int(*v),
            Term::Bool(b) => Value::Bool(*b),
            Term::IntVar(name) => Value::Int(self.int(name)),
            Term::BoolVar(name) => Value::Bool(self.bool(name)),
            Term::Add(parts) => {
                Value::Int(parts.iter().map(|p| self.eval_int(p)).sum())
            }
            Term::Sub(a, b) => Value::Int(self.eval_int(a) - self.eval_int(b)),
            Term::Mul(a, b) => Value::Int(self.eval_int(a) * self.eval_int(b)),
            Term::Div(a, b) => {
                let d = self.eval_int(b);
                Value::Int(if d == 0 { 0 } else { self.eval_int(a).div_euclid(d) })
            }
            Term::Neg(a) => Value::Int(-self.eval_int(a)),
            Term::Eq(a, b) => Value::Bool(self.eval(a) == self.eval(b)),
            Term::Lt(a, b) => Value::Bool(self.eval_int(a) < self.eval_int(b)),
            Term::Le(a, b) => Value::Bool(self.eval_int(a) <= self.eval_int(b)),
            Term::And(parts) => Value::Bool(parts.iter().all(|p| self.eval_bool(p))),
            Term::Or(parts) => Value::Bool(parts.iter().any(|p| self.eval_bool(p))),
            Term::Not(a) => Value::Bool(!self.eval_bool(a)),
            Term::Implies(a, b) => Value::Bool(!self.eval_bool(a) || self.eval_bool(b)),
            Term::Iff(a, b) => Value::Bool(self.eval_bool(a) == self.eval_bool(b)),
            Term::Xor(a, b) => Value::Bool(self.eval_bool(a) != self.eval_bool(b)),
            Term::Ite(c, a, b) => {
                if self.eval_bool(c) {
                    self.eval(a)
                } else {
                    self.eval(b)
                }
            }
        }
    }

    /// Integer evaluation of a ground term.
    pub fn eval_int(&self, term: &Term) -> i64 {
        match self.eval(term) {
            Value::Int(v) => v,
            Value::Bool(b) => i64::from(b),
        }
    }

    /// Boolean evaluation of a ground term.
    pub fn eval_bool(&self, term: &Term) -> bool {
        match self.eval(term) {
            Value::Bool(b) => b,
            Value::Int(v) => v != 0,
        }
    }

    /// Iterates over all bindings.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, Value)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Multi-objective composition mode of the optimize facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizePriority {
    /// Objectives optimized in declaration order, each fixed before
    /// the next.
    Lex,
    /// Objectives optimized independently.
    Box,
    /// Successive checks enumerate Pareto-optimal solutions.
    Pareto,
}

/// The black-box SMT solver interface consumed by the driver.
pub trait SmtBackend {
    /// Declares an integer variable.
    fn declare(&mut self, name: &str, sort: Sort) -> Result<(), BackendError>;

    /// Adds an assertion to the current scope.
    fn assert(&mut self, term: Term) -> Result<(), BackendError>;

    /// Opens a scope.
    fn push(&mut self) -> Result<(), BackendError>;

    /// Closes the innermost scope, dropping its assertions.
    fn pop(&mut self) -> Result<(), BackendError>;

    /// Checks satisfiability under the given assumption literals
    /// (boolean variables or their negations).
    fn check(&mut self, assumptions: &[Term]) -> Result<CheckOutcome, BackendError>;

    /// The model of the last `Sat` check.
    fn model(&mut self) -> Result<Model, BackendError>;

    /// Assumption literals involved in the last `Unsat` check.
    ///
    /// The core need not be minimal; the driver shrinks it.
    fn unsat_core(&self) -> Result<Vec<Term>, BackendError>;

    /// Forwards a logic hint (e.g. `QF_LIA`, `QF_IDL`).
    fn set_logic(&mut self, logic: &str) -> Result<(), BackendError>;

    /// Sets the per-check deadline.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), BackendError>;

    /// Backend-specific option.
    fn set_param(&mut self, key: &str, value: &str) -> Result<(), BackendError>;

    /// Registers a minimization objective with the backend optimizer.
    fn minimize(&mut self, term: Term) -> Result<(), BackendError>;

    /// Registers a maximization objective with the backend optimizer.
    fn maximize(&mut self, term: Term) -> Result<(), BackendError>;

    /// Selects the multi-objective composition mode.
    fn set_optimize_priority(&mut self, priority: OptimizePriority) -> Result<(), BackendError>;

    /// Whether the backend implements `minimize`/`maximize`.
    fn supports_optimization(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_eval_arithmetic() {
        let mut m = Model::new();
        m.insert("x", Value::Int(4));
        m.insert("y", Value::Int(3));
        let t = Term::int_var("x")
            .times(Term::int_var("y"))
            .plus(Term::Int(2));
        assert_eq!(m.eval_int(&t), 14);
    }

    #[test]
    fn test_model_eval_ite() {
        let mut m = Model::new();
        m.insert("p", Value::Bool(true));
        let t = Term::ite(Term::bool_var("p"), Term::Int(1), Term::Int(0));
        assert_eq!(m.eval_int(&t), 1);
    }

    #[test]
    fn test_model_eval_comparison_chain() {
        let mut m = Model::new();
        m.insert("a", Value::Int(2));
        let t = Term::and(vec![
            Term::int_var("a").ge(Term::Int(0)),
            Term::int_var("a").lt(Term::Int(5)),
        ]);
        assert!(m.eval_bool(&t));
    }

    #[test]
    fn test_unbound_defaults() {
        let m = Model::new();
        assert_eq!(m.int("missing"), 0);
        assert!(!m.bool("missing"));
    }

    #[test]
    fn test_div_euclid() {
        let mut m = Model::new();
        m.insert("x", Value::Int(7));
        let t = Term::Div(Box::new(Term::int_var("x")), Box::new(Term::Int(2)));
        assert_eq!(m.eval_int(&t), 3);
    }
}
