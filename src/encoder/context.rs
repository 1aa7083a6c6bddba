//! Encoder context: variable pool, assertion accumulator, lookups.

use std::collections::HashMap;

use crate::error::EncodeError;
use crate::models::{Problem, Resource};
use crate::smt::{Sort, Term};

/// An assertion tagged with the name of the model element that emitted
/// it; labels power debug-mode unsat cores.
#[derive(Debug, Clone)]
pub struct NamedAssertion {
    /// Name of the emitting entity or constraint.
    pub label: String,
    /// The asserted term.
    pub term: Term,
}

/// Solver variables of one task.
#[derive(Debug, Clone)]
pub struct TaskVars {
    pub start: String,
    pub end: String,
    pub duration: String,
    /// Present only for optional tasks.
    pub scheduled: Option<String>,
}

impl TaskVars {
    /// The scheduled guard: the flag variable, or `true` for mandatory
    /// tasks.
    pub fn scheduled_term(&self) -> Term {
        match &self.scheduled {
            Some(name) => Term::bool_var(name),
            None => Term::Bool(true),
        }
    }

    pub fn start_term(&self) -> Term {
        Term::int_var(&self.start)
    }

    pub fn end_term(&self) -> Term {
        Term::int_var(&self.end)
    }

    pub fn duration_term(&self) -> Term {
        Term::int_var(&self.duration)
    }
}

/// One (task, resource) busy interval.
///
/// The interval is synchronized with the task when the claim is active
/// and collapses to `(-1, -1)` otherwise, so exclusion and capacity
/// clauses hold trivially for inactive claims and assignment extraction
/// is `start_var >= 0`.
#[derive(Debug, Clone)]
pub struct BusyClaim {
    pub resource: String,
    pub task: String,
    pub start_var: String,
    pub end_var: String,
    /// Selection boolean, when the claim came through a `SelectWorkers`.
    pub picked_var: Option<String>,
    /// Whether the resource may join after the task start.
    pub dynamic: bool,
}

impl BusyClaim {
    pub fn start_term(&self) -> Term {
        Term::int_var(&self.start_var)
    }

    pub fn end_term(&self) -> Term {
        Term::int_var(&self.end_var)
    }

    /// `start_var >= 0`: the claim is actually in effect.
    pub fn assigned_term(&self) -> Term {
        self.start_term().ge(Term::Int(0))
    }
}

/// An encoded `SelectWorkers` node.
#[derive(Debug, Clone)]
pub struct SelectNode {
    /// User-provided selection name, when any.
    pub name: Option<String>,
    pub task: String,
    /// `(worker name, picked variable)` per candidate.
    pub picked: Vec<(String, String)>,
}

/// One buffer event, ready for level assertions and extraction.
#[derive(Debug, Clone)]
pub struct BufferEvent {
    pub task: String,
    /// Event instant (a task start or end variable).
    pub time: Term,
    /// Signed quantity: positive load, negative unload.
    pub delta: i64,
    /// Level variable sampled just after this event.
    pub level_var: String,
}

/// Mutable state threaded through the encoding walk.
pub struct EncoderCtx<'a> {
    pub problem: &'a Problem,
    pub declarations: Vec<(String, Sort)>,
    pub assertions: Vec<NamedAssertion>,
    /// Task name → variables, in attachment order.
    pub task_vars: HashMap<String, TaskVars>,
    pub claims: Vec<BusyClaim>,
    pub selects: Vec<SelectNode>,
    /// Buffer name → events (filled by the buffer pass).
    pub buffer_events: HashMap<String, Vec<BufferEvent>>,
    /// Buffer name → initial level term.
    pub buffer_initial: HashMap<String, Term>,
    /// Indicator name → value variable.
    pub indicator_vars: HashMap<String, String>,
    /// Optional-constraint name → `applied` variable.
    pub applied_vars: HashMap<String, String>,
    fresh_counter: u32,
}

impl<'a> EncoderCtx<'a> {
    pub fn new(problem: &'a Problem) -> Self {
        Self {
            problem,
            declarations: Vec::new(),
            assertions: Vec::new(),
            task_vars: HashMap::new(),
            claims: Vec::new(),
            selects: Vec::new(),
            buffer_events: HashMap::new(),
            buffer_initial: HashMap::new(),
            indicator_vars: HashMap::new(),
            applied_vars: HashMap::new(),
            fresh_counter: 0,
        }
    }

    /// Declares an integer variable and returns its name.
    pub fn declare_int(&mut self, name: impl Into<String>) -> String {
        let name = name.into();
        self.declarations.push((name.clone(), Sort::Int));
        name
    }

    /// Declares a boolean variable and returns its name.
    pub fn declare_bool(&mut self, name: impl Into<String>) -> String {
        let name = name.into();
        self.declarations.push((name.clone(), Sort::Bool));
        name
    }

    /// Declares a fresh boolean with the given prefix.
    pub fn fresh_bool(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}_{}", self.fresh_counter);
        self.fresh_counter += 1;
        self.declare_bool(name)
    }

    /// Declares a fresh integer with the given prefix.
    pub fn fresh_int(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}_{}", self.fresh_counter);
        self.fresh_counter += 1;
        self.declare_int(name)
    }

    /// Records an assertion under a label.
    pub fn assert(&mut self, label: impl Into<String>, term: Term) {
        self.assertions.push(NamedAssertion {
            label: label.into(),
            term,
        });
    }

    /// The horizon variable.
    pub fn horizon_term(&self) -> Term {
        Term::int_var("horizon")
    }

    /// Variables of a task, or an unknown-reference error.
    pub fn task_vars_of(&self, referrer: &str, name: &str) -> Result<&TaskVars, EncodeError> {
        self.task_vars
            .get(name)
            .ok_or_else(|| EncodeError::UnknownReference {
                referrer: referrer.to_string(),
                kind: "task",
                name: name.to_string(),
            })
    }

    /// A resource, or an unknown-reference error.
    pub fn resource(&self, referrer: &str, name: &str) -> Result<&'a Resource, EncodeError> {
        self.problem
            .resource(name)
            .ok_or_else(|| EncodeError::UnknownReference {
                referrer: referrer.to_string(),
                kind: "resource",
                name: name.to_string(),
            })
    }

    /// All busy claims on a resource, in claim order.
    pub fn claims_on(&self, resource: &str) -> Vec<BusyClaim> {
        self.claims
            .iter()
            .filter(|c| c.resource == resource)
            .cloned()
            .collect()
    }

    /// A named selection node.
    pub fn select_node(&self, referrer: &str, name: &str) -> Result<&SelectNode, EncodeError> {
        self.selects
            .iter()
            .find(|s| s.name.as_deref() == Some(name))
            .ok_or_else(|| EncodeError::UnknownReference {
                referrer: referrer.to_string(),
                kind: "select",
                name: name.to_string(),
            })
    }
}
