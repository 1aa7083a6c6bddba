//! SMT term representation.
//!
//! An integer/boolean expression tree over named variables, printable
//! as SMT-LIB2. This is the only currency between the encoder and the
//! backends: the encoder emits [`Term`] assertions, backends consume
//! them either by printing (process backend) or by direct
//! interpretation (builtin backend).

use std::collections::BTreeSet;
use std::fmt;

/// Variable sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sort {
    Int,
    Bool,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Int => write!(f, "Int"),
            Sort::Bool => write!(f, "Bool"),
        }
    }
}

/// An SMT term over linear (and occasionally nonlinear) integer
/// arithmetic with booleans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// Integer literal.
    Int(i64),
    /// Boolean literal.
    Bool(bool),
    /// Integer variable reference.
    IntVar(String),
    /// Boolean variable reference.
    BoolVar(String),
    /// n-ary sum.
    Add(Vec<Term>),
    /// Difference.
    Sub(Box<Term>, Box<Term>),
    /// Product.
    Mul(Box<Term>, Box<Term>),
    /// Euclidean division (divisor expected positive).
    Div(Box<Term>, Box<Term>),
    /// Negation.
    Neg(Box<Term>),
    /// Equality.
    Eq(Box<Term>, Box<Term>),
    /// Strict less-than.
    Lt(Box<Term>, Box<Term>),
    /// Less-or-equal.
    Le(Box<Term>, Box<Term>),
    /// n-ary conjunction.
    And(Vec<Term>),
    /// n-ary disjunction.
    Or(Vec<Term>),
    /// Negation.
    Not(Box<Term>),
    /// Implication.
    Implies(Box<Term>, Box<Term>),
    /// Equivalence.
    Iff(Box<Term>, Box<Term>),
    /// Exclusive or.
    Xor(Box<Term>, Box<Term>),
    /// If-then-else; the branches share a sort (int or bool).
    Ite(Box<Term>, Box<Term>, Box<Term>),
}

impl Term {
    /// Integer variable reference.
    pub fn int_var(name: impl Into<String>) -> Term {
        Term::IntVar(name.into())
    }

    /// Boolean variable reference.
    pub fn bool_var(name: impl Into<String>) -> Term {
        Term::BoolVar(name.into())
    }

    /// `self == other`.
    pub fn eq(self, other: Term) -> Term {
        Term::Eq(Box::new(self), Box::new(other))
    }

    /// `self != other`.
    pub fn ne(self, other: Term) -> Term {
        Term::Not(Box::new(self.eq(other)))
    }

    /// `self < other`.
    pub fn lt(self, other: Term) -> Term {
        Term::Lt(Box::new(self), Box::new(other))
    }

    /// `self <= other`.
    pub fn le(self, other: Term) -> Term {
        Term::Le(Box::new(self), Box::new(other))
    }

    /// `self > other`.
    pub fn gt(self, other: Term) -> Term {
        Term::Lt(Box::new(other), Box::new(self))
    }

    /// `self >= other`.
    pub fn ge(self, other: Term) -> Term {
        Term::Le(Box::new(other), Box::new(self))
    }

    /// `self + other`.
    pub fn plus(self, other: Term) -> Term {
        Term::Add(vec![self, other])
    }

    /// `self - other`.
    pub fn minus(self, other: Term) -> Term {
        Term::Sub(Box::new(self), Box::new(other))
    }

    /// `self * other`.
    pub fn times(self, other: Term) -> Term {
        Term::Mul(Box::new(self), Box::new(other))
    }

    /// `self -> other`.
    pub fn implies(self, other: Term) -> Term {
        Term::Implies(Box::new(self), Box::new(other))
    }

    /// Conjunction, flattening trivial cases.
    pub fn and(terms: Vec<Term>) -> Term {
        match terms.len() {
            0 => Term::Bool(true),
            1 => terms.into_iter().next().expect("len checked"),
            _ => Term::And(terms),
        }
    }

    /// Disjunction, flattening trivial cases.
    pub fn or(terms: Vec<Term>) -> Term {
        match terms.len() {
            0 => Term::Bool(false),
            1 => terms.into_iter().next().expect("len checked"),
            _ => Term::Or(terms),
        }
    }

    /// Sum, flattening trivial cases.
    pub fn sum(terms: Vec<Term>) -> Term {
        match terms.len() {
            0 => Term::Int(0),
            1 => terms.into_iter().next().expect("len checked"),
            _ => Term::Add(terms),
        }
    }

    /// `if cond then a else b`.
    pub fn ite(cond: Term, a: Term, b: Term) -> Term {
        Term::Ite(Box::new(cond), Box::new(a), Box::new(b))
    }

    /// Renders the term as an SMT-LIB2 s-expression.
    pub fn to_smtlib(&self) -> String {
        match self {
            Term::Int(v) => {
                if *v < 0 {
                    format!("(- {})", -v)
                } else {
                    v.to_string()
                }
            }
            Term::Bool(b) => b.to_string(),
            Term::IntVar(name) | Term::BoolVar(name) => name.clone(),
            Term::Add(parts) => nary("+", parts, "0"),
            Term::Sub(a, b) => format!("(- {} {})", a.to_smtlib(), b.to_smtlib()),
            Term::Mul(a, b) => format!("(* {} {})", a.to_smtlib(), b.to_smtlib()),
            Term::Div(a, b) => format!("(div {} {})", a.to_smtlib(), b.to_smtlib()),
            Term::Neg(a) => format!("(- {})", a.to_smtlib()),
            Term::Eq(a, b) => format!("(= {} {})", a.to_smtlib(), b.to_smtlib()),
            Term::Lt(a, b) => format!("(< {} {})", a.to_smtlib(), b.to_smtlib()),
            Term::Le(a, b) => format!("(<= {} {})", a.to_smtlib(), b.to_smtlib()),
            Term::And(parts) => nary("and", parts, "true"),
            Term::Or(parts) => nary("or", parts, "false"),
            Term::Not(a) => format!("(not {})", a.to_smtlib()),
            Term::Implies(a, b) => format!("(=> {} {})", a.to_smtlib(), b.to_smtlib()),
            Term::Iff(a, b) => format!("(= {} {})", a.to_smtlib(), b.to_smtlib()),
            Term::Xor(a, b) => format!("(xor {} {})", a.to_smtlib(), b.to_smtlib()),
            Term::Ite(c, a, b) => format!(
                "(ite {} {} {})",
                c.to_smtlib(),
                a.to_smtlib(),
                b.to_smtlib()
            ),
        }
    }

    /// All variable names referenced by the term, with their sort.
    pub fn variables(&self) -> BTreeSet<(String, Sort)> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut BTreeSet<(String, Sort)>) {
        match self {
            Term::Int(_) | Term::Bool(_) => {}
            Term::IntVar(name) => {
                out.insert((name.clone(), Sort::Int));
            }
            Term::BoolVar(name) => {
                out.insert((name.clone(), Sort::Bool));
            }
            Term::Add(parts) | Term::And(parts) | Term::Or(parts) => {
                for p in parts {
                    p.collect_variables(out);
                }
            }
            Term::Sub(a, b)
            | Term::Mul(a, b)
            | Term::Div(a, b)
            | Term::Eq(a, b)
            | Term::Lt(a, b)
            | Term::Le(a, b)
            | Term::Implies(a, b)
            | Term::Iff(a, b)
            | Term::Xor(a, b) => {
                a.collect_variables(out);
                b.collect_variables(out);
            }
            Term::Neg(a) | Term::Not(a) => a.collect_variables(out),
            Term::Ite(c, a, b) => {
                c.collect_variables(out);
                a.collect_variables(out);
                b.collect_variables(out);
            }
        }
    }
}

fn nary(op: &str, parts: &[Term], empty: &str) -> String {
    match parts.len() {
        0 => empty.to_string(),
        1 => parts[0].to_smtlib(),
        _ => {
            let inner: Vec<String> = parts.iter().map(Term::to_smtlib).collect();
            format!("({} {})", op, inner.join(" "))
        }
    }
}

impl From<i64> for Term {
    fn from(v: i64) -> Self {
        Term::Int(v)
    }
}

impl From<bool> for Term {
    fn from(v: bool) -> Self {
        Term::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtlib_printing() {
        let t = Term::int_var("x").plus(Term::Int(2)).le(Term::Int(5));
        assert_eq!(t.to_smtlib(), "(<= (+ x 2) 5)");
    }

    #[test]
    fn test_negative_literal() {
        assert_eq!(Term::Int(-3).to_smtlib(), "(- 3)");
    }

    #[test]
    fn test_nary_flattening() {
        assert_eq!(Term::and(vec![]), Term::Bool(true));
        assert_eq!(Term::or(vec![]), Term::Bool(false));
        assert_eq!(Term::sum(vec![]), Term::Int(0));
        assert_eq!(Term::and(vec![Term::Bool(true)]), Term::Bool(true));
    }

    #[test]
    fn test_ge_is_flipped_le() {
        let t = Term::int_var("a").ge(Term::int_var("b"));
        assert_eq!(t.to_smtlib(), "(<= b a)");
    }

    #[test]
    fn test_variable_collection() {
        let t = Term::ite(
            Term::bool_var("p"),
            Term::int_var("x"),
            Term::int_var("y").plus(Term::Int(1)),
        )
        .eq(Term::Int(3));
        let vars = t.variables();
        assert!(vars.contains(&("p".to_string(), Sort::Bool)));
        assert!(vars.contains(&("x".to_string(), Sort::Int)));
        assert!(vars.contains(&("y".to_string(), Sort::Int)));
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn test_ne_prints_as_not_eq() {
        let t = Term::int_var("x").ne(Term::Int(0));
        assert_eq!(t.to_smtlib(), "(not (= x 0))");
    }
}
