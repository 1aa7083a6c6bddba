//! Built-in fallback backend.
//!
//! An in-process decision procedure for the quantifier-free linear
//! integer fragment the encoder emits (plus the occasional product of
//! variables from cost integrals). No external solver binary needed.
//!
//! # Algorithm
//!
//! Classic propagate-and-branch over interval domains:
//! 1. every asserted term is contracted against the variable domains
//!    (forward interval evaluation, backward narrowing) to a fixpoint;
//! 2. if all assertions are entailed by the current box, any point of
//!    the box is a model;
//! 3. otherwise branch: on an undecided boolean, on an undecided
//!    disjunct, or by bisecting the narrowest undecided integer domain.
//!
//! The search honors a wall-clock deadline (reported as `Timeout`) and
//! a node budget (reported as `Unknown`). Optimization registration is
//! not supported; the incremental driver strategy covers this backend.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::BackendError;

use super::backend::{CheckOutcome, Model, OptimizePriority, SmtBackend, Value};
use super::term::{Sort, Term};

/// Saturation bound keeping interval arithmetic clear of i64 overflow.
const INF: i64 = i64::MAX / 8;

/// Default node budget per check.
const DEFAULT_NODE_LIMIT: u64 = 4_000_000;

/// Propagation rounds per search node.
const MAX_ROUNDS: usize = 200;

fn clamp(v: i64) -> i64 {
    v.clamp(-INF, INF)
}

/// A closed integer interval with saturating arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interval {
    lo: i64,
    hi: i64,
}

impl Interval {
    fn new(lo: i64, hi: i64) -> Self {
        Self {
            lo: clamp(lo),
            hi: clamp(hi),
        }
    }

    fn full() -> Self {
        Self { lo: -INF, hi: INF }
    }

    fn point(v: i64) -> Self {
        Self::new(v, v)
    }

    fn is_empty(self) -> bool {
        self.lo > self.hi
    }

    fn is_point(self) -> bool {
        self.lo == self.hi
    }

    fn contains(self, v: i64) -> bool {
        self.lo <= v && v <= self.hi
    }

    fn intersect(self, other: Interval) -> Interval {
        Interval {
            lo: self.lo.max(other.lo),
            hi: self.hi.min(other.hi),
        }
    }

    fn add(self, other: Interval) -> Interval {
        Interval::new(
            self.lo.saturating_add(other.lo),
            self.hi.saturating_add(other.hi),
        )
    }

    fn sub(self, other: Interval) -> Interval {
        Interval::new(
            self.lo.saturating_sub(other.hi),
            self.hi.saturating_sub(other.lo),
        )
    }

    fn neg(self) -> Interval {
        Interval::new(-self.hi, -self.lo)
    }

    fn mul(self, other: Interval) -> Interval {
        let products = [
            self.lo.saturating_mul(other.lo),
            self.lo.saturating_mul(other.hi),
            self.hi.saturating_mul(other.lo),
            self.hi.saturating_mul(other.hi),
        ];
        Interval::new(
            *products.iter().min().expect("non-empty"),
            *products.iter().max().expect("non-empty"),
        )
    }

    /// Euclidean division, sound only for strictly positive divisors.
    fn div_pos(self, divisor: Interval) -> Interval {
        if divisor.lo <= 0 {
            return Interval::full();
        }
        let candidates = [
            self.lo.div_euclid(divisor.lo),
            self.lo.div_euclid(divisor.hi),
            self.hi.div_euclid(divisor.lo),
            self.hi.div_euclid(divisor.hi),
        ];
        Interval::new(
            *candidates.iter().min().expect("non-empty"),
            *candidates.iter().max().expect("non-empty"),
        )
    }
}

/// Three-valued boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoolDom {
    True,
    False,
    Unknown,
}

impl BoolDom {
    fn from_bool(b: bool) -> Self {
        if b {
            BoolDom::True
        } else {
            BoolDom::False
        }
    }

    fn not(self) -> Self {
        match self {
            BoolDom::True => BoolDom::False,
            BoolDom::False => BoolDom::True,
            BoolDom::Unknown => BoolDom::Unknown,
        }
    }
}

/// Per-variable domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dom {
    Int(Interval),
    Bool(Option<bool>),
}

type Domains = HashMap<String, Dom>;

struct Conflict;

/// Whether a term denotes an integer (as opposed to a boolean).
fn is_int_term(term: &Term) -> bool {
    match term {
        Term::Int(_)
        | Term::IntVar(_)
        | Term::Add(_)
        | Term::Sub(_, _)
        | Term::Mul(_, _)
        | Term::Div(_, _)
        | Term::Neg(_) => true,
        Term::Ite(_, a, _) => is_int_term(a),
        _ => false,
    }
}

fn int_dom(domains: &Domains, name: &str) -> Interval {
    match domains.get(name) {
        Some(Dom::Int(iv)) => *iv,
        _ => Interval::full(),
    }
}

fn bool_dom(domains: &Domains, name: &str) -> Option<bool> {
    match domains.get(name) {
        Some(Dom::Bool(b)) => *b,
        _ => None,
    }
}

/// Forward interval evaluation of an integer term.
fn eval_int(term: &Term, domains: &Domains) -> Interval {
    match term {
        Term::Int(v) => Interval::point(*v),
        Term::IntVar(name) => int_dom(domains, name),
        Term::Add(parts) => parts
            .iter()
            .fold(Interval::point(0), |acc, p| acc.add(eval_int(p, domains))),
        Term::Sub(a, b) => eval_int(a, domains).sub(eval_int(b, domains)),
        Term::Mul(a, b) => eval_int(a, domains).mul(eval_int(b, domains)),
        Term::Div(a, b) => eval_int(a, domains).div_pos(eval_int(b, domains)),
        Term::Neg(a) => eval_int(a, domains).neg(),
        Term::Ite(c, a, b) => match eval_bool(c, domains) {
            BoolDom::True => eval_int(a, domains),
            BoolDom::False => eval_int(b, domains),
            BoolDom::Unknown => {
                let ia = eval_int(a, domains);
                let ib = eval_int(b, domains);
                Interval::new(ia.lo.min(ib.lo), ia.hi.max(ib.hi))
            }
        },
        // Boolean term in integer position; treated as 0/1.
        other => match eval_bool(other, domains) {
            BoolDom::True => Interval::point(1),
            BoolDom::False => Interval::point(0),
            BoolDom::Unknown => Interval::new(0, 1),
        },
    }
}

/// Forward three-valued evaluation of a boolean term.
fn eval_bool(term: &Term, domains: &Domains) -> BoolDom {
    match term {
        Term::Bool(b) => BoolDom::from_bool(*b),
        Term::BoolVar(name) => match bool_dom(domains, name) {
            Some(b) => BoolDom::from_bool(b),
            None => BoolDom::Unknown,
        },
        Term::Eq(a, b) => {
            if is_int_term(a) {
                let ia = eval_int(a, domains);
                let ib = eval_int(b, domains);
                if ia.is_point() && ib.is_point() && ia.lo == ib.lo {
                    BoolDom::True
                } else if ia.hi < ib.lo || ib.hi < ia.lo {
                    BoolDom::False
                } else {
                    BoolDom::Unknown
                }
            } else {
                match (eval_bool(a, domains), eval_bool(b, domains)) {
                    (BoolDom::Unknown, _) | (_, BoolDom::Unknown) => BoolDom::Unknown,
                    (x, y) => BoolDom::from_bool(x == y),
                }
            }
        }
        Term::Lt(a, b) => {
            let ia = eval_int(a, domains);
            let ib = eval_int(b, domains);
            if ia.hi < ib.lo {
                BoolDom::True
            } else if ia.lo >= ib.hi {
                BoolDom::False
            } else {
                BoolDom::Unknown
            }
        }
        Term::Le(a, b) => {
            let ia = eval_int(a, domains);
            let ib = eval_int(b, domains);
            if ia.hi <= ib.lo {
                BoolDom::True
            } else if ia.lo > ib.hi {
                BoolDom::False
            } else {
                BoolDom::Unknown
            }
        }
        Term::And(parts) => {
            let mut any_unknown = false;
            for p in parts {
                match eval_bool(p, domains) {
                    BoolDom::False => return BoolDom::False,
                    BoolDom::Unknown => any_unknown = true,
                    BoolDom::True => {}
                }
            }
            if any_unknown {
                BoolDom::Unknown
            } else {
                BoolDom::True
            }
        }
        Term::Or(parts) => {
            let mut any_unknown = false;
            for p in parts {
                match eval_bool(p, domains) {
                    BoolDom::True => return BoolDom::True,
                    BoolDom::Unknown => any_unknown = true,
                    BoolDom::False => {}
                }
            }
            if any_unknown {
                BoolDom::Unknown
            } else {
                BoolDom::False
            }
        }
        Term::Not(a) => eval_bool(a, domains).not(),
        Term::Implies(a, b) => match (eval_bool(a, domains), eval_bool(b, domains)) {
            (BoolDom::False, _) | (_, BoolDom::True) => BoolDom::True,
            (BoolDom::True, BoolDom::False) => BoolDom::False,
            _ => BoolDom::Unknown,
        },
        Term::Iff(a, b) => match (eval_bool(a, domains), eval_bool(b, domains)) {
            (BoolDom::Unknown, _) | (_, BoolDom::Unknown) => BoolDom::Unknown,
            (x, y) => BoolDom::from_bool(x == y),
        },
        Term::Xor(a, b) => match (eval_bool(a, domains), eval_bool(b, domains)) {
            (BoolDom::Unknown, _) | (_, BoolDom::Unknown) => BoolDom::Unknown,
            (x, y) => BoolDom::from_bool(x != y),
        },
        Term::Ite(c, a, b) => match eval_bool(c, domains) {
            BoolDom::True => eval_bool(a, domains),
            BoolDom::False => eval_bool(b, domains),
            BoolDom::Unknown => {
                let va = eval_bool(a, domains);
                let vb = eval_bool(b, domains);
                if va == vb {
                    va
                } else {
                    BoolDom::Unknown
                }
            }
        },
        // Integer term in boolean position never happens with the
        // encoder's output; treat as unknown.
        _ => BoolDom::Unknown,
    }
}

/// Narrows an integer term to `target`. Returns whether any domain changed.
fn contract_int(term: &Term, target: Interval, domains: &mut Domains) -> Result<bool, Conflict> {
    if target.is_empty() {
        return Err(Conflict);
    }
    match term {
        Term::Int(v) => {
            if target.contains(*v) {
                Ok(false)
            } else {
                Err(Conflict)
            }
        }
        Term::IntVar(name) => {
            let cur = int_dom(domains, name);
            let narrowed = cur.intersect(target);
            if narrowed.is_empty() {
                return Err(Conflict);
            }
            if narrowed != cur {
                domains.insert(name.clone(), Dom::Int(narrowed));
                Ok(true)
            } else {
                Ok(false)
            }
        }
        Term::Add(parts) => {
            let evals: Vec<Interval> = parts.iter().map(|p| eval_int(p, domains)).collect();
            let total = evals
                .iter()
                .fold(Interval::point(0), |acc, iv| acc.add(*iv));
            if total.intersect(target).is_empty() {
                return Err(Conflict);
            }
            let mut changed = false;
            for (i, part) in parts.iter().enumerate() {
                let rest = total.sub(evals[i]);
                changed |= contract_int(part, target.sub(rest), domains)?;
            }
            Ok(changed)
        }
        Term::Sub(a, b) => {
            let ia = eval_int(a, domains);
            let ib = eval_int(b, domains);
            let mut changed = contract_int(a, target.add(ib), domains)?;
            changed |= contract_int(b, ia.sub(target), domains)?;
            Ok(changed)
        }
        Term::Neg(a) => contract_int(a, target.neg(), domains),
        Term::Mul(a, b) => {
            // Only constant factors are inverted; variable products are
            // left to branching.
            let ia = eval_int(a, domains);
            let ib = eval_int(b, domains);
            if ia.mul(ib).intersect(target).is_empty() {
                return Err(Conflict);
            }
            if ia.is_point() && ia.lo != 0 {
                let c = ia.lo;
                return contract_int(b, div_range(target, c), domains);
            }
            if ib.is_point() && ib.lo != 0 {
                let c = ib.lo;
                return contract_int(a, div_range(target, c), domains);
            }
            Ok(false)
        }
        Term::Div(a, b) => {
            let ib = eval_int(b, domains);
            if ib.is_point() && ib.lo > 0 {
                let c = ib.lo;
                // q = a div c, q in target  =>  a in [lo*c, hi*c + c - 1]
                let lo = target.lo.saturating_mul(c);
                let hi = target.hi.saturating_mul(c).saturating_add(c - 1);
                return contract_int(a, Interval::new(lo, hi), domains);
            }
            Ok(false)
        }
        Term::Ite(c, a, b) => match eval_bool(c, domains) {
            BoolDom::True => contract_int(a, target, domains),
            BoolDom::False => contract_int(b, target, domains),
            BoolDom::Unknown => {
                let ia = eval_int(a, domains);
                let ib = eval_int(b, domains);
                let a_viable = !ia.intersect(target).is_empty();
                let b_viable = !ib.intersect(target).is_empty();
                match (a_viable, b_viable) {
                    (false, false) => Err(Conflict),
                    (false, true) => {
                        let mut changed = contract_bool(c, false, domains)?;
                        changed |= contract_int(b, target, domains)?;
                        Ok(changed)
                    }
                    (true, false) => {
                        let mut changed = contract_bool(c, true, domains)?;
                        changed |= contract_int(a, target, domains)?;
                        Ok(changed)
                    }
                    (true, true) => Ok(false),
                }
            }
        },
        // Boolean term used as 0/1.
        other => {
            let can_be_false = target.contains(0);
            let can_be_true = target.contains(1);
            match (can_be_false, can_be_true) {
                (false, false) => Err(Conflict),
                (true, false) => contract_bool(other, false, domains),
                (false, true) => contract_bool(other, true, domains),
                (true, true) => Ok(false),
            }
        }
    }
}

/// Integer range of `x` such that `c * x` lands in `target` (`c != 0`).
fn div_range(target: Interval, c: i64) -> Interval {
    let (lo, hi) = if c > 0 {
        (div_ceil(target.lo, c), div_floor(target.hi, c))
    } else {
        (div_ceil(target.hi, c), div_floor(target.lo, c))
    };
    Interval::new(lo, hi)
}

fn div_floor(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && (a < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

fn div_ceil(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && (a < 0) == (b < 0) {
        q + 1
    } else {
        q
    }
}

/// Requires a boolean term to take the given value.
fn contract_bool(term: &Term, required: bool, domains: &mut Domains) -> Result<bool, Conflict> {
    match term {
        Term::Bool(b) => {
            if *b == required {
                Ok(false)
            } else {
                Err(Conflict)
            }
        }
        Term::BoolVar(name) => match bool_dom(domains, name) {
            Some(b) if b == required => Ok(false),
            Some(_) => Err(Conflict),
            None => {
                domains.insert(name.clone(), Dom::Bool(Some(required)));
                Ok(true)
            }
        },
        Term::Not(a) => contract_bool(a, !required, domains),
        Term::And(parts) => {
            if required {
                let mut changed = false;
                for p in parts {
                    changed |= contract_bool(p, true, domains)?;
                }
                Ok(changed)
            } else {
                // not(and ...): only propagates when a single child is open
                let mut open = None;
                for p in parts {
                    match eval_bool(p, domains) {
                        BoolDom::False => return Ok(false),
                        BoolDom::Unknown => {
                            if open.replace(p).is_some() {
                                return Ok(false);
                            }
                        }
                        BoolDom::True => {}
                    }
                }
                match open {
                    Some(p) => contract_bool(p, false, domains),
                    None => Err(Conflict),
                }
            }
        }
        Term::Or(parts) => {
            if required {
                let mut open = None;
                for p in parts {
                    match eval_bool(p, domains) {
                        BoolDom::True => return Ok(false),
                        BoolDom::Unknown => {
                            if open.replace(p).is_some() {
                                return Ok(false);
                            }
                        }
                        BoolDom::False => {}
                    }
                }
                match open {
                    Some(p) => contract_bool(p, true, domains),
                    None => Err(Conflict),
                }
            } else {
                let mut changed = false;
                for p in parts {
                    changed |= contract_bool(p, false, domains)?;
                }
                Ok(changed)
            }
        }
        Term::Implies(a, b) => {
            if required {
                match (eval_bool(a, domains), eval_bool(b, domains)) {
                    (BoolDom::True, _) => contract_bool(b, true, domains),
                    (_, BoolDom::False) => contract_bool(a, false, domains),
                    _ => Ok(false),
                }
            } else {
                let mut changed = contract_bool(a, true, domains)?;
                changed |= contract_bool(b, false, domains)?;
                Ok(changed)
            }
        }
        Term::Iff(a, b) => contract_equivalence(a, b, required, domains),
        Term::Xor(a, b) => contract_equivalence(a, b, !required, domains),
        Term::Eq(a, b) => {
            if is_int_term(a) {
                if required {
                    let ia = eval_int(a, domains);
                    let ib = eval_int(b, domains);
                    let meet = ia.intersect(ib);
                    if meet.is_empty() {
                        return Err(Conflict);
                    }
                    let mut changed = contract_int(a, meet, domains)?;
                    changed |= contract_int(b, meet, domains)?;
                    Ok(changed)
                } else {
                    // Disequality only trims at the edges.
                    let ia = eval_int(a, domains);
                    let ib = eval_int(b, domains);
                    let mut changed = false;
                    if ib.is_point() {
                        changed |= trim_point(a, ib.lo, domains)?;
                    }
                    if ia.is_point() {
                        changed |= trim_point(b, ia.lo, domains)?;
                    }
                    if ia.is_point() && ib.is_point() && ia.lo == ib.lo {
                        return Err(Conflict);
                    }
                    Ok(changed)
                }
            } else {
                contract_equivalence(a, b, required, domains)
            }
        }
        Term::Lt(a, b) => {
            if required {
                let ia = eval_int(a, domains);
                let ib = eval_int(b, domains);
                let mut changed =
                    contract_int(a, Interval::new(-INF, ib.hi.saturating_sub(1)), domains)?;
                changed |=
                    contract_int(b, Interval::new(ia.lo.saturating_add(1), INF), domains)?;
                Ok(changed)
            } else {
                // a >= b
                let ia = eval_int(a, domains);
                let ib = eval_int(b, domains);
                let mut changed = contract_int(a, Interval::new(ib.lo, INF), domains)?;
                changed |= contract_int(b, Interval::new(-INF, ia.hi), domains)?;
                Ok(changed)
            }
        }
        Term::Le(a, b) => {
            if required {
                let ia = eval_int(a, domains);
                let ib = eval_int(b, domains);
                let mut changed = contract_int(a, Interval::new(-INF, ib.hi), domains)?;
                changed |= contract_int(b, Interval::new(ia.lo, INF), domains)?;
                Ok(changed)
            } else {
                // a > b
                let ia = eval_int(a, domains);
                let ib = eval_int(b, domains);
                let mut changed =
                    contract_int(a, Interval::new(ib.lo.saturating_add(1), INF), domains)?;
                changed |=
                    contract_int(b, Interval::new(-INF, ia.hi.saturating_sub(1)), domains)?;
                Ok(changed)
            }
        }
        Term::Ite(c, a, b) => match eval_bool(c, domains) {
            BoolDom::True => contract_bool(a, required, domains),
            BoolDom::False => contract_bool(b, required, domains),
            BoolDom::Unknown => {
                let va = eval_bool(a, domains);
                let vb = eval_bool(b, domains);
                let bad = BoolDom::from_bool(!required);
                match (va == bad, vb == bad) {
                    (true, true) => Err(Conflict),
                    (true, false) => {
                        let mut changed = contract_bool(c, false, domains)?;
                        changed |= contract_bool(b, required, domains)?;
                        Ok(changed)
                    }
                    (false, true) => {
                        let mut changed = contract_bool(c, true, domains)?;
                        changed |= contract_bool(a, required, domains)?;
                        Ok(changed)
                    }
                    (false, false) => Ok(false),
                }
            }
        },
        _ => Ok(false),
    }
}

/// `a == b` (equal = true) or `a != b` (equal = false) over booleans.
fn contract_equivalence(
    a: &Term,
    b: &Term,
    equal: bool,
    domains: &mut Domains,
) -> Result<bool, Conflict> {
    let va = eval_bool(a, domains);
    let vb = eval_bool(b, domains);
    let mut changed = false;
    if let BoolDom::True | BoolDom::False = va {
        let target = (va == BoolDom::True) == equal;
        changed |= contract_bool(b, target, domains)?;
    }
    if let BoolDom::True | BoolDom::False = vb {
        let target = (vb == BoolDom::True) == equal;
        changed |= contract_bool(a, target, domains)?;
    }
    Ok(changed)
}

/// Removes a value from an integer term's domain edge.
fn trim_point(term: &Term, v: i64, domains: &mut Domains) -> Result<bool, Conflict> {
    if let Term::IntVar(name) = term {
        let cur = int_dom(domains, name);
        if cur.is_point() && cur.lo == v {
            return Err(Conflict);
        }
        if cur.lo == v {
            domains.insert(name.clone(), Dom::Int(Interval::new(v + 1, cur.hi)));
            return Ok(true);
        }
        if cur.hi == v {
            domains.insert(name.clone(), Dom::Int(Interval::new(cur.lo, v - 1)));
            return Ok(true);
        }
    }
    Ok(false)
}

enum SearchResult {
    Sat(Model),
    Unsat,
    Limit(CheckOutcome),
}

/// The in-process backend.
pub struct BuiltinBackend {
    declarations: HashMap<String, Sort>,
    assertions: Vec<Rc<Term>>,
    scope_marks: Vec<usize>,
    timeout: Duration,
    node_limit: u64,
    random_values: bool,
    seed: u64,
    last_model: Option<Model>,
    last_core: Vec<Term>,
}

impl BuiltinBackend {
    /// Creates a backend with default limits.
    pub fn new() -> Self {
        Self {
            declarations: HashMap::new(),
            assertions: Vec::new(),
            scope_marks: Vec::new(),
            timeout: Duration::from_secs(60),
            node_limit: DEFAULT_NODE_LIMIT,
            random_values: false,
            seed: 0x5eed,
            last_model: None,
            last_core: Vec::new(),
        }
    }

    fn initial_domains(&self) -> Domains {
        self.declarations
            .iter()
            .map(|(name, sort)| {
                let dom = match sort {
                    Sort::Int => Dom::Int(Interval::full()),
                    Sort::Bool => Dom::Bool(None),
                };
                (name.clone(), dom)
            })
            .collect()
    }

    fn solve(&self, constraints: Vec<Rc<Term>>) -> SearchResult {
        let deadline = Instant::now() + self.timeout;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut nodes: u64 = 0;
        let mut domains = self.initial_domains();
        // Undeclared variables showing up in assumptions get a domain too.
        for c in &constraints {
            for (name, sort) in c.variables() {
                domains.entry(name).or_insert(match sort {
                    Sort::Int => Dom::Int(Interval::full()),
                    Sort::Bool => Dom::Bool(None),
                });
            }
        }
        self.search(&constraints, domains, deadline, &mut nodes, &mut rng)
    }

    fn search(
        &self,
        constraints: &[Rc<Term>],
        mut domains: Domains,
        deadline: Instant,
        nodes: &mut u64,
        rng: &mut StdRng,
    ) -> SearchResult {
        *nodes += 1;
        if *nodes > self.node_limit {
            return SearchResult::Limit(CheckOutcome::Unknown);
        }
        if *nodes % 256 == 0 && Instant::now() >= deadline {
            return SearchResult::Limit(CheckOutcome::Timeout);
        }

        // Propagate to fixpoint (bounded rounds).
        for _ in 0..MAX_ROUNDS {
            let mut changed = false;
            for c in constraints {
                match eval_bool(c, &domains) {
                    BoolDom::True => {}
                    BoolDom::False => return SearchResult::Unsat,
                    BoolDom::Unknown => match contract_bool(c, true, &mut domains) {
                        Ok(delta) => changed |= delta,
                        Err(Conflict) => return SearchResult::Unsat,
                    },
                }
            }
            if !changed {
                break;
            }
        }

        let open: Vec<&Rc<Term>> = constraints
            .iter()
            .filter(|c| eval_bool(c, &domains) != BoolDom::True)
            .collect();
        if open.is_empty() {
            return SearchResult::Sat(self.extract_model(&domains, rng));
        }

        // 1. Branch on an undecided boolean variable of an open constraint.
        for c in &open {
            for (name, sort) in c.variables() {
                if sort == Sort::Bool && bool_dom(&domains, &name).is_none() {
                    let first = if self.random_values {
                        rng.random_bool(0.5)
                    } else {
                        true
                    };
                    for value in [first, !first] {
                        let mut child = domains.clone();
                        child.insert(name.clone(), Dom::Bool(Some(value)));
                        match self.search(constraints, child, deadline, nodes, rng) {
                            SearchResult::Unsat => continue,
                            other => return other,
                        }
                    }
                    return SearchResult::Unsat;
                }
            }
        }

        // 2. Branch on an undecided disjunct of an open disjunction.
        for c in &open {
            if let Term::Or(parts) = c.as_ref() {
                if let Some(pick) = parts
                    .iter()
                    .find(|p| eval_bool(p, &domains) == BoolDom::Unknown)
                {
                    for value in [true, false] {
                        let mut child = domains.clone();
                        if contract_bool(pick, value, &mut child).is_err() {
                            continue;
                        }
                        let mut extended: Vec<Rc<Term>> = constraints.to_vec();
                        let lit = if value {
                            pick.clone()
                        } else {
                            Term::Not(Box::new(pick.clone()))
                        };
                        extended.push(Rc::new(lit));
                        match self.search(&extended, child, deadline, nodes, rng) {
                            SearchResult::Unsat => continue,
                            other => return other,
                        }
                    }
                    return SearchResult::Unsat;
                }
            }
        }

        // 3. Bisect the narrowest undecided integer domain.
        let mut pick: Option<(String, Interval)> = None;
        for c in &open {
            for (name, sort) in c.variables() {
                if sort == Sort::Int {
                    let iv = int_dom(&domains, &name);
                    if !iv.is_point()
                        && pick
                            .as_ref()
                            .map(|(_, best)| {
                                iv.hi.saturating_sub(iv.lo) < best.hi.saturating_sub(best.lo)
                            })
                            .unwrap_or(true)
                    {
                        pick = Some((name, iv));
                    }
                }
            }
        }
        let Some((name, iv)) = pick else {
            // Everything fixed yet some constraint is not entailed.
            return SearchResult::Unsat;
        };
        let mid = iv.lo + (iv.hi - iv.lo) / 2;
        let halves = [
            Interval::new(iv.lo, mid),
            Interval::new(mid + 1, iv.hi),
        ];
        let order = if self.random_values && rng.random_bool(0.5) {
            [1, 0]
        } else {
            [0, 1]
        };
        for idx in order {
            let mut child = domains.clone();
            child.insert(name.clone(), Dom::Int(halves[idx]));
            match self.search(constraints, child, deadline, nodes, rng) {
                SearchResult::Unsat => continue,
                other => return other,
            }
        }
        SearchResult::Unsat
    }

    fn extract_model(&self, domains: &Domains, rng: &mut StdRng) -> Model {
        let mut model = Model::new();
        for (name, dom) in domains {
            match dom {
                Dom::Int(iv) => {
                    let v = if self.random_values && !iv.is_point() {
                        rng.random_range(iv.lo..=iv.hi)
                    } else if iv.contains(0) {
                        0
                    } else {
                        iv.lo
                    };
                    model.insert(name.clone(), Value::Int(v));
                }
                Dom::Bool(b) => {
                    let v = b.unwrap_or_else(|| self.random_values && rng.random_bool(0.5));
                    model.insert(name.clone(), Value::Bool(v));
                }
            }
        }
        model
    }
}

impl Default for BuiltinBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtBackend for BuiltinBackend {
    fn declare(&mut self, name: &str, sort: Sort) -> Result<(), BackendError> {
        self.declarations.insert(name.to_string(), sort);
        Ok(())
    }

    fn assert(&mut self, term: Term) -> Result<(), BackendError> {
        // Top-level conjunctions are split so each conjunct propagates
        // independently.
        match term {
            Term::And(parts) => {
                for p in parts {
                    self.assert(p)?;
                }
            }
            other => self.assertions.push(Rc::new(other)),
        }
        Ok(())
    }

    fn push(&mut self) -> Result<(), BackendError> {
        self.scope_marks.push(self.assertions.len());
        Ok(())
    }

    fn pop(&mut self) -> Result<(), BackendError> {
        let mark = self
            .scope_marks
            .pop()
            .ok_or_else(|| BackendError::Process("pop without matching push".into()))?;
        self.assertions.truncate(mark);
        Ok(())
    }

    fn check(&mut self, assumptions: &[Term]) -> Result<CheckOutcome, BackendError> {
        let mut constraints = self.assertions.clone();
        constraints.extend(assumptions.iter().cloned().map(Rc::new));
        match self.solve(constraints) {
            SearchResult::Sat(model) => {
                self.last_model = Some(model);
                self.last_core.clear();
                Ok(CheckOutcome::Sat)
            }
            SearchResult::Unsat => {
                self.last_model = None;
                self.last_core = assumptions.to_vec();
                Ok(CheckOutcome::Unsat)
            }
            SearchResult::Limit(outcome) => {
                self.last_model = None;
                self.last_core.clear();
                Ok(outcome)
            }
        }
    }

    fn model(&mut self) -> Result<Model, BackendError> {
        self.last_model
            .clone()
            .ok_or_else(|| BackendError::Process("no model available".into()))
    }

    fn unsat_core(&self) -> Result<Vec<Term>, BackendError> {
        Ok(self.last_core.clone())
    }

    fn set_logic(&mut self, _logic: &str) -> Result<(), BackendError> {
        // The builtin procedure has a single fragment; hints are accepted
        // and ignored.
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), BackendError> {
        self.timeout = timeout;
        Ok(())
    }

    fn set_param(&mut self, key: &str, value: &str) -> Result<(), BackendError> {
        match key {
            "random_values" => self.random_values = value == "true",
            "seed" => {
                self.seed = value
                    .parse()
                    .map_err(|_| BackendError::Parse(format!("bad seed '{value}'")))?;
            }
            "node_limit" => {
                self.node_limit = value
                    .parse()
                    .map_err(|_| BackendError::Parse(format!("bad node limit '{value}'")))?;
            }
            _ => {}
        }
        Ok(())
    }

    fn minimize(&mut self, _term: Term) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("optimization objectives"))
    }

    fn maximize(&mut self, _term: Term) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("optimization objectives"))
    }

    fn set_optimize_priority(&mut self, _priority: OptimizePriority) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("optimization priorities"))
    }

    fn supports_optimization(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(name: &str) -> Term {
        Term::int_var(name)
    }

    fn declare_ints(backend: &mut BuiltinBackend, names: &[&str]) {
        for n in names {
            backend.declare(n, Sort::Int).unwrap();
        }
    }

    #[test]
    fn test_simple_sat() {
        let mut b = BuiltinBackend::new();
        declare_ints(&mut b, &["x"]);
        b.assert(int("x").ge(Term::Int(3))).unwrap();
        b.assert(int("x").le(Term::Int(5))).unwrap();
        assert_eq!(b.check(&[]).unwrap(), CheckOutcome::Sat);
        let m = b.model().unwrap();
        let x = m.int("x");
        assert!((3..=5).contains(&x));
    }

    #[test]
    fn test_simple_unsat() {
        let mut b = BuiltinBackend::new();
        declare_ints(&mut b, &["x"]);
        b.assert(int("x").ge(Term::Int(6))).unwrap();
        b.assert(int("x").le(Term::Int(5))).unwrap();
        assert_eq!(b.check(&[]).unwrap(), CheckOutcome::Unsat);
    }

    #[test]
    fn test_equality_chain() {
        let mut b = BuiltinBackend::new();
        declare_ints(&mut b, &["a", "b", "c"]);
        b.assert(int("a").eq(int("b").plus(Term::Int(2)))).unwrap();
        b.assert(int("b").eq(Term::Int(3))).unwrap();
        b.assert(int("c").eq(int("a").plus(int("b")))).unwrap();
        assert_eq!(b.check(&[]).unwrap(), CheckOutcome::Sat);
        let m = b.model().unwrap();
        assert_eq!(m.int("a"), 5);
        assert_eq!(m.int("c"), 8);
    }

    #[test]
    fn test_disjunction_branching() {
        let mut b = BuiltinBackend::new();
        declare_ints(&mut b, &["x"]);
        b.assert(Term::or(vec![
            int("x").eq(Term::Int(2)),
            int("x").eq(Term::Int(9)),
        ]))
        .unwrap();
        b.assert(int("x").ge(Term::Int(5))).unwrap();
        assert_eq!(b.check(&[]).unwrap(), CheckOutcome::Sat);
        assert_eq!(b.model().unwrap().int("x"), 9);
    }

    #[test]
    fn test_boolean_propagation() {
        let mut b = BuiltinBackend::new();
        b.declare("p", Sort::Bool).unwrap();
        b.declare("q", Sort::Bool).unwrap();
        b.assert(Term::bool_var("p").implies(Term::bool_var("q")))
            .unwrap();
        b.assert(Term::bool_var("p")).unwrap();
        assert_eq!(b.check(&[]).unwrap(), CheckOutcome::Sat);
        assert!(b.model().unwrap().bool("q"));
    }

    #[test]
    fn test_xor_exclusivity() {
        let mut b = BuiltinBackend::new();
        b.declare("p", Sort::Bool).unwrap();
        b.declare("q", Sort::Bool).unwrap();
        b.assert(Term::Xor(
            Box::new(Term::bool_var("p")),
            Box::new(Term::bool_var("q")),
        ))
        .unwrap();
        b.assert(Term::bool_var("p")).unwrap();
        assert_eq!(b.check(&[]).unwrap(), CheckOutcome::Sat);
        assert!(!b.model().unwrap().bool("q"));
    }

    #[test]
    fn test_push_pop_scoping() {
        let mut b = BuiltinBackend::new();
        declare_ints(&mut b, &["x"]);
        b.assert(int("x").ge(Term::Int(0))).unwrap();
        b.push().unwrap();
        b.assert(int("x").lt(Term::Int(0))).unwrap();
        assert_eq!(b.check(&[]).unwrap(), CheckOutcome::Unsat);
        b.pop().unwrap();
        assert_eq!(b.check(&[]).unwrap(), CheckOutcome::Sat);
    }

    #[test]
    fn test_pop_without_push_fails() {
        let mut b = BuiltinBackend::new();
        assert!(b.pop().is_err());
    }

    #[test]
    fn test_assumptions_scoped_to_check() {
        let mut b = BuiltinBackend::new();
        declare_ints(&mut b, &["x"]);
        b.assert(int("x").ge(Term::Int(0))).unwrap();
        b.assert(int("x").le(Term::Int(10))).unwrap();
        let bad = int("x").gt(Term::Int(20));
        assert_eq!(b.check(std::slice::from_ref(&bad)).unwrap(), CheckOutcome::Unsat);
        assert_eq!(b.unsat_core().unwrap(), vec![bad]);
        assert_eq!(b.check(&[]).unwrap(), CheckOutcome::Sat);
    }

    #[test]
    fn test_ite_arithmetic() {
        let mut b = BuiltinBackend::new();
        declare_ints(&mut b, &["x"]);
        b.declare("p", Sort::Bool).unwrap();
        // x = ite(p, 4, 7) and x >= 5 forces p = false, x = 7
        b.assert(
            int("x").eq(Term::ite(Term::bool_var("p"), Term::Int(4), Term::Int(7))),
        )
        .unwrap();
        b.assert(int("x").ge(Term::Int(5))).unwrap();
        assert_eq!(b.check(&[]).unwrap(), CheckOutcome::Sat);
        let m = b.model().unwrap();
        assert_eq!(m.int("x"), 7);
        assert!(!m.bool("p"));
    }

    #[test]
    fn test_counting_with_ite() {
        let mut b = BuiltinBackend::new();
        for p in ["p1", "p2", "p3"] {
            b.declare(p, Sort::Bool).unwrap();
        }
        let count = Term::sum(
            ["p1", "p2", "p3"]
                .into_iter()
                .map(|p| Term::ite(Term::bool_var(p), Term::Int(1), Term::Int(0)))
                .collect(),
        );
        b.assert(count.eq(Term::Int(2))).unwrap();
        b.assert(Term::Not(Box::new(Term::bool_var("p1")))).unwrap();
        assert_eq!(b.check(&[]).unwrap(), CheckOutcome::Sat);
        let m = b.model().unwrap();
        assert!(!m.bool("p1"));
        assert!(m.bool("p2"));
        assert!(m.bool("p3"));
    }

    #[test]
    fn test_nonoverlap_pair() {
        let mut b = BuiltinBackend::new();
        declare_ints(&mut b, &["s1", "e1", "s2", "e2"]);
        for (s, e) in [("s1", "e1"), ("s2", "e2")] {
            b.assert(int(s).ge(Term::Int(0))).unwrap();
            b.assert(int(e).eq(int(s).plus(Term::Int(3)))).unwrap();
            b.assert(int(e).le(Term::Int(6))).unwrap();
        }
        b.assert(Term::or(vec![
            int("e1").le(int("s2")),
            int("e2").le(int("s1")),
        ]))
        .unwrap();
        assert_eq!(b.check(&[]).unwrap(), CheckOutcome::Sat);
        let m = b.model().unwrap();
        let (s1, e1, s2, e2) = (m.int("s1"), m.int("e1"), m.int("s2"), m.int("e2"));
        assert!(e1 <= s2 || e2 <= s1);
        assert!(e1 <= 6 && e2 <= 6);
    }

    #[test]
    fn test_multiplication_of_variables() {
        let mut b = BuiltinBackend::new();
        declare_ints(&mut b, &["x"]);
        b.assert(int("x").ge(Term::Int(0))).unwrap();
        b.assert(int("x").le(Term::Int(10))).unwrap();
        b.assert(int("x").times(int("x")).eq(Term::Int(49))).unwrap();
        assert_eq!(b.check(&[]).unwrap(), CheckOutcome::Sat);
        assert_eq!(b.model().unwrap().int("x"), 7);
    }

    #[test]
    fn test_timeout_reported() {
        let mut b = BuiltinBackend::new();
        b.set_timeout(Duration::from_millis(0)).unwrap();
        // A pigeonhole-flavored instance that cannot be closed instantly.
        let names: Vec<String> = (0..12).map(|i| format!("v{i}")).collect();
        for n in &names {
            b.declare(n, Sort::Int).unwrap();
            b.assert(int(n).ge(Term::Int(0))).unwrap();
            b.assert(int(n).le(Term::Int(10))).unwrap();
        }
        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                b.assert(int(&names[i]).ne(int(&names[j]))).unwrap();
            }
        }
        let outcome = b.check(&[]).unwrap();
        assert!(matches!(
            outcome,
            CheckOutcome::Timeout | CheckOutcome::Unknown | CheckOutcome::Unsat
        ));
    }

    #[test]
    fn test_random_values_still_satisfy() {
        let mut b = BuiltinBackend::new();
        b.set_param("random_values", "true").unwrap();
        b.set_param("seed", "42").unwrap();
        declare_ints(&mut b, &["x", "y"]);
        b.assert(int("x").ge(Term::Int(2))).unwrap();
        b.assert(int("x").le(Term::Int(9))).unwrap();
        b.assert(int("y").eq(int("x").plus(Term::Int(1)))).unwrap();
        assert_eq!(b.check(&[]).unwrap(), CheckOutcome::Sat);
        let m = b.model().unwrap();
        assert_eq!(m.int("y"), m.int("x") + 1);
        assert!((2..=9).contains(&m.int("x")));
    }

    #[test]
    fn test_div_by_constant() {
        let mut b = BuiltinBackend::new();
        declare_ints(&mut b, &["x", "q"]);
        b.assert(int("x").ge(Term::Int(0))).unwrap();
        b.assert(int("x").le(Term::Int(100))).unwrap();
        b.assert(
            int("q").eq(Term::Div(Box::new(int("x")), Box::new(Term::Int(10)))),
        )
        .unwrap();
        b.assert(int("x").eq(Term::Int(57))).unwrap();
        assert_eq!(b.check(&[]).unwrap(), CheckOutcome::Sat);
        assert_eq!(b.model().unwrap().int("q"), 5);
    }
}
