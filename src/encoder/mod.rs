//! Problem-to-SMT compilation.
//!
//! Walks the problem's entities in dependency order — horizon, tasks,
//! resources, buffers, constraints, indicators, objectives — and
//! produces an [`Encoding`]: declarations, labeled assertions, and the
//! variable tables the driver needs for optimization and solution
//! extraction.

mod buffers;
mod constraints;
mod context;
mod exprs;
mod indicators;
mod resources;
mod tasks;

use std::collections::HashMap;

pub use context::{BufferEvent, BusyClaim, EncoderCtx, NamedAssertion, SelectNode, TaskVars};

use crate::error::EncodeError;
use crate::models::{ObjectiveKind, Problem};
use crate::smt::{Sort, Term};

/// An objective folded down to its encoded indicator variable.
#[derive(Debug, Clone)]
pub struct EncodedObjective {
    pub name: String,
    /// The indicator's value variable.
    pub variable: String,
    pub kind: ObjectiveKind,
    pub weight: i64,
}

/// The compiled SMT form of a problem.
#[derive(Debug, Clone)]
pub struct Encoding {
    /// Variable declarations, in emission order.
    pub declarations: Vec<(String, Sort)>,
    /// Labeled assertions, in emission order.
    pub assertions: Vec<NamedAssertion>,
    /// Upper bound of the horizon variable.
    pub horizon_ceiling: i64,
    /// Task name → variables.
    pub task_vars: HashMap<String, TaskVars>,
    /// All (task, resource) busy claims.
    pub claims: Vec<BusyClaim>,
    /// Buffer name → events.
    pub buffer_events: HashMap<String, Vec<BufferEvent>>,
    /// Buffer name → initial level term.
    pub buffer_initial: HashMap<String, Term>,
    /// Indicator name → value variable, in attachment order.
    pub indicator_vars: Vec<(String, String)>,
    /// Optional-constraint name → `applied` variable.
    pub applied_vars: HashMap<String, String>,
    /// Objectives to optimize, in attachment order.
    pub objectives: Vec<EncodedObjective>,
}

impl Encoding {
    /// The horizon variable as a term.
    pub fn horizon_term(&self) -> Term {
        Term::int_var("horizon")
    }

    /// Value variable of an indicator.
    pub fn indicator_var(&self, name: &str) -> Option<&str> {
        self.indicator_vars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Compiles a problem into declarations and assertions.
pub fn encode(problem: &Problem) -> Result<Encoding, EncodeError> {
    let mut ctx = EncoderCtx::new(problem);

    // Horizon first: every task interval is bounded by it.
    ctx.declare_int("horizon");
    let ceiling = problem.horizon_ceiling();
    ctx.assert("horizon", ctx.horizon_term().ge(Term::Int(0)));
    ctx.assert("horizon", ctx.horizon_term().le(Term::Int(ceiling)));
    if let Some(h) = problem.fixed_horizon() {
        ctx.assert("horizon", ctx.horizon_term().eq(Term::Int(h)));
    }

    tasks::encode_tasks(&mut ctx);
    resources::encode_resources(&mut ctx)?;
    buffers::encode_buffers(&mut ctx)?;
    constraints::encode_constraints(&mut ctx)?;
    indicators::encode_indicators(&mut ctx)?;

    let mut objectives = Vec::new();
    for objective in problem.objectives() {
        let variable = ctx
            .indicator_vars
            .get(&objective.indicator)
            .cloned()
            .ok_or_else(|| EncodeError::DanglingIndicator {
                objective: objective.name.clone(),
                indicator: objective.indicator.clone(),
            })?;
        if let ObjectiveKind::Exact(v) = objective.kind {
            ctx.assert(
                format!("objective:{}", objective.name),
                Term::int_var(&variable).eq(Term::Int(v)),
            );
        }
        objectives.push(EncodedObjective {
            name: objective.name.clone(),
            variable,
            kind: objective.kind,
            weight: objective.weight,
        });
    }

    let indicator_vars = problem
        .indicators()
        .iter()
        .map(|i| {
            let var = ctx.indicator_vars[&i.name].clone();
            (i.name.clone(), var)
        })
        .collect();

    Ok(Encoding {
        declarations: ctx.declarations,
        assertions: ctx.assertions,
        horizon_ceiling: ceiling,
        task_vars: ctx.task_vars,
        claims: ctx.claims,
        buffer_events: ctx.buffer_events,
        buffer_initial: ctx.buffer_initial,
        indicator_vars,
        applied_vars: ctx.applied_vars,
        objectives,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Indicator, Objective, Task};

    #[test]
    fn test_encode_collects_everything() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_task(Task::fixed_duration("A", 2)).unwrap();
        p.add_indicator(Indicator::makespan("makespan")).unwrap();
        p.add_objective(Objective::minimize("obj", "makespan"))
            .unwrap();
        let enc = encode(&p).unwrap();
        assert!(enc.task_vars.contains_key("A"));
        assert_eq!(enc.objectives.len(), 1);
        assert_eq!(enc.indicator_vars.len(), 1);
        assert!(enc.indicator_var("makespan").is_some());
        assert!(enc
            .declarations
            .iter()
            .any(|(name, _)| name == "horizon"));
    }

    #[test]
    fn test_dangling_indicator_objective() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_task(Task::fixed_duration("A", 2)).unwrap();
        p.add_objective(Objective::minimize("obj", "missing"))
            .unwrap();
        let err = encode(&p).unwrap_err();
        assert!(matches!(err, EncodeError::DanglingIndicator { .. }));
    }

    #[test]
    fn test_variable_names_carry_kind_and_uid() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_task(Task::fixed_duration("T1", 2)).unwrap();
        let enc = encode(&p).unwrap();
        let start = &enc.task_vars["T1"].start;
        assert!(start.starts_with("Task_T1_"));
        assert!(start.ends_with("_start"));
    }
}
