//! Solution model.
//!
//! An immutable snapshot of one satisfying assignment: per-task
//! schedule record, buffer level timelines, indicator values and the
//! concrete horizon. Extraction reads the backend model once; the
//! snapshot never refers back to the solver.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::encoder::Encoding;
use crate::smt::Model;

/// Schedule record of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSolution {
    /// Whether the task was scheduled (always true for mandatory tasks).
    pub scheduled: bool,
    /// Start period (meaningless when unscheduled).
    pub start: i64,
    /// End period (meaningless when unscheduled).
    pub end: i64,
    /// Duration in periods.
    pub duration: i64,
    /// Names of the resources actually assigned, sorted.
    pub assigned: Vec<String>,
}

/// A complete schedule extracted from a backend model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    /// Name of the solved problem.
    pub problem: String,
    /// Concrete horizon value.
    pub horizon: i64,
    /// Task name → schedule record.
    pub tasks: BTreeMap<String, TaskSolution>,
    /// Buffer name → `(instant, level)` timeline, first entry at time 0.
    pub buffers: BTreeMap<String, Vec<(i64, i64)>>,
    /// Indicator name → value.
    pub indicators: BTreeMap<String, i64>,
    /// Optional-constraint name → whether it was applied.
    pub applied_constraints: BTreeMap<String, bool>,
    /// Whether the driver proved this schedule optimal.
    pub optimal: bool,
}

impl Solution {
    /// Builds a solution from a backend model.
    pub(crate) fn from_model(
        problem: &str,
        encoding: &Encoding,
        model: &Model,
        optimal: bool,
    ) -> Self {
        let mut tasks = BTreeMap::new();
        for (name, vars) in &encoding.task_vars {
            let scheduled = match &vars.scheduled {
                Some(flag) => model.bool(flag),
                None => true,
            };
            let mut assigned: Vec<String> = encoding
                .claims
                .iter()
                .filter(|c| c.task == *name && model.int(&c.start_var) >= 0)
                .map(|c| c.resource.clone())
                .collect();
            assigned.sort();
            assigned.dedup();
            tasks.insert(
                name.clone(),
                TaskSolution {
                    scheduled,
                    start: model.int(&vars.start),
                    end: model.int(&vars.end),
                    duration: model.int(&vars.duration),
                    assigned,
                },
            );
        }

        let mut buffers = BTreeMap::new();
        for (buffer, events) in &encoding.buffer_events {
            let initial = model.eval_int(&encoding.buffer_initial[buffer]);
            // Sum deltas per instant over scheduled tasks, then prefix-sum.
            let mut by_time: BTreeMap<i64, i64> = BTreeMap::new();
            for event in events {
                let scheduled = tasks
                    .get(&event.task)
                    .map(|t| t.scheduled)
                    .unwrap_or(false);
                if scheduled {
                    *by_time.entry(model.eval_int(&event.time)).or_insert(0) += event.delta;
                }
            }
            let mut timeline = vec![(0, initial)];
            let mut level = initial;
            for (time, delta) in by_time {
                level += delta;
                if time == 0 {
                    timeline[0].1 = level;
                } else {
                    timeline.push((time, level));
                }
            }
            buffers.insert(buffer.clone(), timeline);
        }
        // Buffers without any event still report their initial level.
        for (buffer, initial) in &encoding.buffer_initial {
            buffers
                .entry(buffer.clone())
                .or_insert_with(|| vec![(0, model.eval_int(initial))]);
        }

        let indicators = encoding
            .indicator_vars
            .iter()
            .map(|(name, var)| (name.clone(), model.int(var)))
            .collect();

        let applied_constraints = encoding
            .applied_vars
            .iter()
            .map(|(name, var)| (name.clone(), model.bool(var)))
            .collect();

        Self {
            problem: problem.to_string(),
            horizon: model.int("horizon"),
            tasks,
            buffers,
            indicators,
            applied_constraints,
            optimal,
        }
    }

    /// Schedule record of a task.
    pub fn task(&self, name: &str) -> Option<&TaskSolution> {
        self.tasks.get(name)
    }

    /// Value of an indicator.
    pub fn indicator(&self, name: &str) -> Option<i64> {
        self.indicators.get(name).copied()
    }

    /// Level timeline of a buffer.
    pub fn buffer(&self, name: &str) -> Option<&[(i64, i64)]> {
        self.buffers.get(name).map(Vec::as_slice)
    }

    /// Latest end over scheduled tasks (0 when nothing is scheduled).
    pub fn makespan(&self) -> i64 {
        self.tasks
            .values()
            .filter(|t| t.scheduled)
            .map(|t| t.end)
            .max()
            .unwrap_or(0)
    }

    /// Names of scheduled tasks, sorted.
    pub fn scheduled_tasks(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|(_, t)| t.scheduled)
            .map(|(n, _)| n.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode;
    use crate::models::{Constraint, Problem, Resource, Task};
    use crate::smt::{BuiltinBackend, CheckOutcome, SmtBackend};

    fn solve_and_extract(problem: &Problem) -> Solution {
        let encoding = encode(problem).unwrap();
        let mut backend = BuiltinBackend::new();
        for (name, sort) in &encoding.declarations {
            backend.declare(name, *sort).unwrap();
        }
        for a in &encoding.assertions {
            backend.assert(a.term.clone()).unwrap();
        }
        assert_eq!(backend.check(&[]).unwrap(), CheckOutcome::Sat);
        let model = backend.model().unwrap();
        Solution::from_model(&problem.name, &encoding, &model, false)
    }

    #[test]
    fn test_task_record() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_resource(Resource::worker("W")).unwrap();
        p.add_task(Task::fixed_duration("A", 3).with_required_resource("W"))
            .unwrap();
        p.add_constraint(Constraint::task_start_at("A", 2)).unwrap();
        let s = solve_and_extract(&p);
        let a = s.task("A").unwrap();
        assert!(a.scheduled);
        assert_eq!(a.start, 2);
        assert_eq!(a.end, 5);
        assert_eq!(a.duration, 3);
        assert_eq!(a.assigned, vec!["W"]);
        assert_eq!(s.makespan(), 5);
    }

    #[test]
    fn test_unscheduled_task_record() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_task(Task::fixed_duration("Z", 2).optional()).unwrap();
        p.add_constraint(Constraint::FromExpression(crate::models::BoolExpr::Not(
            Box::new(crate::models::expr::task_scheduled("Z")),
        )))
        .unwrap();
        let s = solve_and_extract(&p);
        let z = s.task("Z").unwrap();
        assert!(!z.scheduled);
        assert!(z.assigned.is_empty());
        assert_eq!(s.makespan(), 0);
        assert!(s.scheduled_tasks().is_empty());
    }

    #[test]
    fn test_buffer_timeline() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_task(Task::fixed_duration("T1", 4)).unwrap();
        p.add_buffer(crate::models::Buffer::concurrent("B1").with_initial_level(5))
            .unwrap();
        p.add_constraint(Constraint::unload_buffer("T1", "B1", 1))
            .unwrap();
        p.add_constraint(Constraint::task_start_at("T1", 1))
            .unwrap();
        let s = solve_and_extract(&p);
        assert_eq!(s.buffer("B1").unwrap(), &[(0, 5), (1, 4)]);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_task(Task::fixed_duration("A", 3)).unwrap();
        let s = solve_and_extract(&p);
        let json = serde_json::to_string(&s).unwrap();
        let back: Solution = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
