//! Solver driver.
//!
//! Owns one SMT backend and one encoded problem, and turns `check()`
//! verdicts into [`Solution`]s. Two optimization strategies:
//!
//! - **Incremental** (default, works on every backend): fold all
//!   objectives into one signed weighted sum, then alternate
//!   `check()` / assert `sum < incumbent` until UNSAT (optimal) or the
//!   budget runs out (best incumbent, not proved).
//! - **Optimize**: register objectives with the backend's optimize
//!   facility under a lex/box/pareto priority mode.
//!
//! Debug mode guards every assertion with a selector boolean, checks
//! under assumptions, and shrinks the failed selector set to a minimal
//! core by deletion.
//!
//! The driver is single-threaded; the only suspension points are the
//! `check()` calls, each bounded by the remaining wall-clock budget. A
//! shared cancellation token is polled between iterations.

mod options;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

pub use options::{OptimizerKind, SolverOptions};

use crate::encoder::{encode, Encoding};
use crate::error::SolveError;
use crate::models::{ObjectiveKind, Problem};
use crate::smt::{BuiltinBackend, CheckOutcome, Model, SmtBackend, Term};
use crate::solution::Solution;

/// Schedules a [`Problem`] through an SMT backend.
pub struct SchedulingSolver<B: SmtBackend> {
    problem_name: String,
    encoding: Encoding,
    backend: B,
    options: SolverOptions,
    /// Selector variable → assertion label, in debug mode.
    selectors: Vec<(String, String)>,
    cancel: Arc<AtomicBool>,
    last_model: Option<Model>,
    push_depth: u32,
}

impl SchedulingSolver<BuiltinBackend> {
    /// Creates a solver over the builtin backend.
    pub fn new(problem: &Problem, options: SolverOptions) -> Result<Self, SolveError> {
        Self::with_backend(problem, options, BuiltinBackend::new())
    }
}

impl<B: SmtBackend> SchedulingSolver<B> {
    /// Creates a solver over an explicit backend.
    pub fn with_backend(
        problem: &Problem,
        options: SolverOptions,
        mut backend: B,
    ) -> Result<Self, SolveError> {
        let encoding = encode(problem)?;
        if let Some(logic) = &options.logic {
            backend.set_logic(logic)?;
        }
        backend.set_timeout(options.max_time)?;
        if options.parallel {
            backend.set_param("parallel.enable", "true")?;
        }
        if options.random_values {
            backend.set_param("random_values", "true")?;
        }
        for (name, sort) in &encoding.declarations {
            backend.declare(name, *sort)?;
        }
        let mut selectors = Vec::new();
        for (index, assertion) in encoding.assertions.iter().enumerate() {
            if options.debug {
                let selector = format!("sel_{index}");
                backend.declare(&selector, crate::smt::Sort::Bool)?;
                backend.assert(
                    Term::bool_var(&selector).implies(assertion.term.clone()),
                )?;
                selectors.push((selector, assertion.label.clone()));
            } else {
                backend.assert(assertion.term.clone())?;
            }
        }
        Ok(Self {
            problem_name: problem.name.clone(),
            encoding,
            backend,
            options,
            selectors,
            cancel: Arc::new(AtomicBool::new(false)),
            last_model: None,
            push_depth: 0,
        })
    }

    /// Token that cooperatively interrupts the incremental loop.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// The compiled encoding (variable tables for advanced queries).
    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    /// Name of a task's start variable, for `find_another_solution`.
    pub fn task_start_variable(&self, task: &str) -> Option<String> {
        self.encoding.task_vars.get(task).map(|v| v.start.clone())
    }

    /// Name of an indicator's value variable.
    pub fn indicator_variable(&self, indicator: &str) -> Option<String> {
        self.encoding
            .indicator_var(indicator)
            .map(str::to_string)
    }

    fn assumptions(&self) -> Vec<Term> {
        self.selectors
            .iter()
            .map(|(sel, _)| Term::bool_var(sel))
            .collect()
    }

    fn checked(&mut self, deadline: Instant) -> Result<CheckOutcome, SolveError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(CheckOutcome::Timeout);
        }
        self.backend.set_timeout(remaining)?;
        let assumptions = self.assumptions();
        Ok(self.backend.check(&assumptions)?)
    }

    fn extract(&mut self, optimal: bool) -> Result<Solution, SolveError> {
        let model = self.backend.model()?;
        let solution = Solution::from_model(&self.problem_name, &self.encoding, &model, optimal);
        self.last_model = Some(model);
        Ok(solution)
    }

    fn push(&mut self) -> Result<(), SolveError> {
        self.backend.push()?;
        self.push_depth += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<(), SolveError> {
        debug_assert!(self.push_depth > 0, "pop without push");
        self.backend.pop()?;
        self.push_depth -= 1;
        Ok(())
    }

    /// Solves the problem.
    ///
    /// With objectives the configured strategy runs; on a timeout with
    /// an incumbent, the incumbent is returned with `optimal = false`.
    pub fn solve(&mut self) -> Result<Solution, SolveError> {
        let deadline = Instant::now() + self.options.max_time;
        let signed = self.weighted_sum();
        match signed {
            None => self.solve_feasibility(deadline),
            Some(sum) => {
                if self.options.optimizer == OptimizerKind::Optimize
                    && self.backend.supports_optimization()
                {
                    self.solve_with_optimizer(deadline)
                } else {
                    self.solve_incremental(sum, deadline)
                }
            }
        }
    }

    /// Signed weighted objective sum; `None` without min/max objectives.
    fn weighted_sum(&self) -> Option<Term> {
        let mut parts = Vec::new();
        for objective in &self.encoding.objectives {
            let var = Term::int_var(&objective.variable);
            match objective.kind {
                ObjectiveKind::Minimize => {
                    parts.push(Term::Int(objective.weight).times(var));
                }
                ObjectiveKind::Maximize => {
                    parts.push(Term::Neg(Box::new(
                        Term::Int(objective.weight).times(var),
                    )));
                }
                ObjectiveKind::Exact(_) => {}
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(Term::sum(parts))
        }
    }

    fn solve_feasibility(&mut self, deadline: Instant) -> Result<Solution, SolveError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(SolveError::Interrupt);
        }
        match self.checked(deadline)? {
            CheckOutcome::Sat => self.extract(true),
            CheckOutcome::Unsat => Err(self.unsat_error(deadline)),
            CheckOutcome::Unknown => Err(SolveError::Unknown),
            CheckOutcome::Timeout => Err(SolveError::Timeout),
        }
    }

    fn solve_incremental(
        &mut self,
        sum: Term,
        deadline: Instant,
    ) -> Result<Solution, SolveError> {
        self.push()?;
        let result = self.incremental_loop(&sum, deadline);
        self.pop()?;
        result
    }

    fn incremental_loop(
        &mut self,
        sum: &Term,
        deadline: Instant,
    ) -> Result<Solution, SolveError> {
        let mut incumbent = match self.checked(deadline)? {
            CheckOutcome::Sat => self.extract(false)?,
            CheckOutcome::Unsat => return Err(self.unsat_error(deadline)),
            CheckOutcome::Unknown => return Err(SolveError::Unknown),
            CheckOutcome::Timeout => return Err(SolveError::Timeout),
        };
        let mut bound = self
            .last_model
            .as_ref()
            .expect("model stored by extract")
            .eval_int(sum);
        if self.options.verbosity > 0 {
            info!(problem = %self.problem_name, objective = bound, "first incumbent");
        }
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                debug!(problem = %self.problem_name, "interrupted; returning incumbent");
                return Ok(incumbent);
            }
            self.backend.assert(sum.clone().lt(Term::Int(bound)))?;
            match self.checked(deadline)? {
                CheckOutcome::Sat => {
                    incumbent = self.extract(false)?;
                    let improved = self
                        .last_model
                        .as_ref()
                        .expect("model stored by extract")
                        .eval_int(sum);
                    debug_assert!(improved < bound);
                    bound = improved;
                    if self.options.verbosity > 0 {
                        info!(problem = %self.problem_name, objective = bound, "improved");
                    }
                }
                CheckOutcome::Unsat => {
                    // No better schedule exists: the incumbent is optimal.
                    incumbent.optimal = true;
                    return Ok(incumbent);
                }
                CheckOutcome::Unknown | CheckOutcome::Timeout => {
                    debug!(problem = %self.problem_name, "budget exhausted; incumbent not proved");
                    return Ok(incumbent);
                }
            }
        }
    }

    fn solve_with_optimizer(&mut self, deadline: Instant) -> Result<Solution, SolveError> {
        self.backend
            .set_optimize_priority(self.options.optimize_priority)?;
        let objectives = self.encoding.objectives.clone();
        for objective in &objectives {
            let var = Term::int_var(&objective.variable);
            match objective.kind {
                ObjectiveKind::Minimize => self.backend.minimize(var)?,
                ObjectiveKind::Maximize => self.backend.maximize(var)?,
                ObjectiveKind::Exact(_) => {}
            }
        }
        match self.checked(deadline)? {
            CheckOutcome::Sat => self.extract(true),
            CheckOutcome::Unsat => Err(self.unsat_error(deadline)),
            CheckOutcome::Unknown => Err(SolveError::Unknown),
            CheckOutcome::Timeout => Err(SolveError::Timeout),
        }
    }

    fn unsat_error(&mut self, deadline: Instant) -> SolveError {
        if !self.options.debug {
            return SolveError::Unsat { core: None };
        }
        match self.minimal_core(deadline) {
            Ok(core) => SolveError::Unsat { core: Some(core) },
            Err(e) => e,
        }
    }

    /// Deletion-based shrinking of the failed selector set.
    ///
    /// Backend cores need not be minimal; dropping one selector at a
    /// time and re-checking yields a minimal core for any backend.
    fn minimal_core(&mut self, deadline: Instant) -> Result<Vec<String>, SolveError> {
        let initial: Vec<String> = match self.backend.unsat_core() {
            Ok(core) if !core.is_empty() => core
                .iter()
                .filter_map(|t| match t {
                    Term::BoolVar(name) => Some(name.clone()),
                    _ => None,
                })
                .collect(),
            _ => self.selectors.iter().map(|(s, _)| s.clone()).collect(),
        };
        let labels: HashMap<&str, &str> = self
            .selectors
            .iter()
            .map(|(s, l)| (s.as_str(), l.as_str()))
            .collect();
        let mut core = initial;
        let mut index = 0;
        while index < core.len() {
            let candidate: Vec<Term> = core
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, s)| Term::bool_var(s))
                .collect();
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.backend.set_timeout(remaining)?;
            match self.backend.check(&candidate)? {
                CheckOutcome::Unsat => {
                    // Still unsat without this selector: not needed.
                    core.remove(index);
                }
                _ => index += 1,
            }
        }
        let mut named: Vec<String> = core
            .iter()
            .filter_map(|s| labels.get(s.as_str()).map(|l| l.to_string()))
            .collect();
        named.sort();
        named.dedup();
        Ok(named)
    }

    /// Finds a solution where `variable` differs from its value in the
    /// last solution. Returns `None` when no such solution exists.
    ///
    /// The added disequality is scoped with push/pop and never leaks
    /// into later solves.
    pub fn find_another_solution(
        &mut self,
        variable: &str,
    ) -> Result<Option<Solution>, SolveError> {
        let previous = match &self.last_model {
            Some(model) => model.int(variable),
            None => {
                // No solution yet: produce the first one.
                return self.solve().map(Some);
            }
        };
        let deadline = Instant::now() + self.options.max_time;
        self.push()?;
        self.backend
            .assert(Term::int_var(variable).ne(Term::Int(previous)))?;
        let outcome = self.checked(deadline);
        let result = match outcome {
            Ok(CheckOutcome::Sat) => self.extract(false).map(Some),
            Ok(CheckOutcome::Unsat) => Ok(None),
            Ok(CheckOutcome::Unknown) => Err(SolveError::Unknown),
            Ok(CheckOutcome::Timeout) => Err(SolveError::Timeout),
            Err(e) => Err(e),
        };
        self.pop()?;
        result
    }

    /// Iterator over successive solutions.
    ///
    /// In `Optimize` mode with pareto priority each step yields the
    /// backend's next Pareto-optimal model; otherwise each step is a
    /// plain `check()`, yielding the same schedule until constraints
    /// change.
    pub fn solutions(&mut self) -> Solutions<'_, B> {
        Solutions { solver: self }
    }
}

/// See [`SchedulingSolver::solutions`].
pub struct Solutions<'a, B: SmtBackend> {
    solver: &'a mut SchedulingSolver<B>,
}

impl<B: SmtBackend> Iterator for Solutions<'_, B> {
    type Item = Solution;

    fn next(&mut self) -> Option<Solution> {
        let deadline = Instant::now() + self.solver.options.max_time;
        match self.solver.checked(deadline) {
            Ok(CheckOutcome::Sat) => self.solver.extract(false).ok(),
            _ => None,
        }
    }
}
