//! Symbolic integer/boolean expressions over model entities.
//!
//! Expressions reference tasks, indicators and the horizon by name; the
//! encoder resolves them to solver variables. They feed three places:
//! indicator definitions, `Implies`/`IfThenElse` conditions, and raw
//! expression constraints.

use serde::{Deserialize, Serialize};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// An integer-valued expression over model entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntExpr {
    /// Integer literal.
    Const(i64),
    /// Start variable of a task.
    TaskStart(String),
    /// End variable of a task.
    TaskEnd(String),
    /// Duration variable of a task.
    TaskDuration(String),
    /// The problem horizon variable.
    Horizon,
    /// Value variable of an indicator.
    Indicator(String),
    /// Sum of operands.
    Add(Vec<IntExpr>),
    /// Difference.
    Sub(Box<IntExpr>, Box<IntExpr>),
    /// Product.
    Mul(Box<IntExpr>, Box<IntExpr>),
    /// Negation.
    Neg(Box<IntExpr>),
    /// Conditional value.
    Ite(Box<BoolExpr>, Box<IntExpr>, Box<IntExpr>),
}

/// A boolean-valued expression over model entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolExpr {
    /// Boolean literal.
    Const(bool),
    /// Scheduled flag of an (optional) task.
    TaskScheduled(String),
    /// Integer comparison.
    Cmp(CmpOp, Box<IntExpr>, Box<IntExpr>),
    /// Conjunction.
    And(Vec<BoolExpr>),
    /// Disjunction.
    Or(Vec<BoolExpr>),
    /// Negation.
    Not(Box<BoolExpr>),
    /// Implication.
    Implies(Box<BoolExpr>, Box<BoolExpr>),
    /// Exclusive or.
    Xor(Box<BoolExpr>, Box<BoolExpr>),
}

impl IntExpr {
    /// `self == other`.
    pub fn eq(self, other: IntExpr) -> BoolExpr {
        BoolExpr::Cmp(CmpOp::Eq, Box::new(self), Box::new(other))
    }

    /// `self != other`.
    pub fn ne(self, other: IntExpr) -> BoolExpr {
        BoolExpr::Cmp(CmpOp::Ne, Box::new(self), Box::new(other))
    }

    /// `self < other`.
    pub fn lt(self, other: IntExpr) -> BoolExpr {
        BoolExpr::Cmp(CmpOp::Lt, Box::new(self), Box::new(other))
    }

    /// `self <= other`.
    pub fn le(self, other: IntExpr) -> BoolExpr {
        BoolExpr::Cmp(CmpOp::Le, Box::new(self), Box::new(other))
    }

    /// `self > other`.
    pub fn gt(self, other: IntExpr) -> BoolExpr {
        BoolExpr::Cmp(CmpOp::Gt, Box::new(self), Box::new(other))
    }

    /// `self >= other`.
    pub fn ge(self, other: IntExpr) -> BoolExpr {
        BoolExpr::Cmp(CmpOp::Ge, Box::new(self), Box::new(other))
    }

    /// `self + other`.
    pub fn plus(self, other: IntExpr) -> IntExpr {
        IntExpr::Add(vec![self, other])
    }

    /// `self - other`.
    pub fn minus(self, other: IntExpr) -> IntExpr {
        IntExpr::Sub(Box::new(self), Box::new(other))
    }

    /// `self * other`.
    pub fn times(self, other: IntExpr) -> IntExpr {
        IntExpr::Mul(Box::new(self), Box::new(other))
    }
}

impl From<i64> for IntExpr {
    fn from(v: i64) -> Self {
        IntExpr::Const(v)
    }
}

/// Start variable of a task.
pub fn task_start(name: impl Into<String>) -> IntExpr {
    IntExpr::TaskStart(name.into())
}

/// End variable of a task.
pub fn task_end(name: impl Into<String>) -> IntExpr {
    IntExpr::TaskEnd(name.into())
}

/// Duration variable of a task.
pub fn task_duration(name: impl Into<String>) -> IntExpr {
    IntExpr::TaskDuration(name.into())
}

/// Scheduled flag of a task.
pub fn task_scheduled(name: impl Into<String>) -> BoolExpr {
    BoolExpr::TaskScheduled(name.into())
}

/// The horizon variable.
pub fn horizon() -> IntExpr {
    IntExpr::Horizon
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_builders() {
        let e = task_end("t1").eq(IntExpr::Const(20).minus(task_start("t2")));
        match e {
            BoolExpr::Cmp(CmpOp::Eq, lhs, rhs) => {
                assert_eq!(*lhs, IntExpr::TaskEnd("t1".into()));
                assert!(matches!(*rhs, IntExpr::Sub(_, _)));
            }
            _ => panic!("wrong shape"),
        }
    }

    #[test]
    fn test_arithmetic_builders() {
        let e = task_start("a").plus(IntExpr::Const(3)).times(2.into());
        assert!(matches!(e, IntExpr::Mul(_, _)));
    }

    #[test]
    fn test_from_i64() {
        let e: IntExpr = 7.into();
        assert_eq!(e, IntExpr::Const(7));
    }
}
