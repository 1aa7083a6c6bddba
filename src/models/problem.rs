//! Problem container and name registry.
//!
//! A [`Problem`] owns every entity of a scheduling model: tasks,
//! resources, buffers, constraints, indicators and objectives. Entities
//! are attached explicitly; on attachment each `(kind, name)` pair is
//! registered and receives an opaque uid used for solver variable
//! naming (`Task_T1_17_start`). Duplicate names within a kind fail with
//! [`ModelError::DuplicateName`].
//!
//! Cross-references between entities are by name; ownership is strictly
//! problem → entity, with no cycles.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

use super::buffer::Buffer;
use super::constraint::Constraint;
use super::indicator::Indicator;
use super::objective::Objective;
use super::resource::Resource;
use super::task::{DurationSpec, ResourceRequirement, Task};

/// A constraint attached to a problem, with identity and optionality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintDef {
    /// Unique constraint name (auto-assigned when not user-provided).
    pub name: String,
    /// When true, a fresh `applied` boolean guards the body.
    pub optional: bool,
    /// The constraint node.
    pub constraint: Constraint,
}

/// A scheduling problem over the integer timeline `[0, horizon]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    /// Problem name.
    pub name: String,
    /// User-fixed horizon; when absent the horizon is a decision
    /// variable bounded by [`Problem::horizon_ceiling`].
    fixed_horizon: Option<i64>,
    tasks: Vec<Task>,
    resources: Vec<Resource>,
    buffers: Vec<Buffer>,
    constraints: Vec<ConstraintDef>,
    indicators: Vec<Indicator>,
    objectives: Vec<Objective>,
    /// `(kind, name)` → uid.
    registry: HashMap<(String, String), u32>,
    next_uid: u32,
}

impl Problem {
    /// Creates a problem with a free (solver-decided) horizon.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fixed_horizon: None,
            tasks: Vec::new(),
            resources: Vec::new(),
            buffers: Vec::new(),
            constraints: Vec::new(),
            indicators: Vec::new(),
            objectives: Vec::new(),
            registry: HashMap::new(),
            next_uid: 0,
        }
    }

    /// Creates a problem with a fixed horizon.
    pub fn with_horizon(name: impl Into<String>, horizon: i64) -> Self {
        let mut p = Self::new(name);
        p.fixed_horizon = Some(horizon);
        p
    }

    /// The user-fixed horizon, if any.
    pub fn fixed_horizon(&self) -> Option<i64> {
        self.fixed_horizon
    }

    fn register(&mut self, kind: &'static str, name: &str) -> Result<u32, ModelError> {
        let key = (kind.to_string(), name.to_string());
        if self.registry.contains_key(&key) {
            return Err(ModelError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
        let uid = self.next_uid;
        self.next_uid += 1;
        self.registry.insert(key, uid);
        Ok(uid)
    }

    /// Uid assigned to a registered `(kind, name)` pair.
    pub fn uid_of(&self, kind: &str, name: &str) -> Option<u32> {
        self.registry
            .get(&(kind.to_string(), name.to_string()))
            .copied()
    }

    /// Attaches a task.
    pub fn add_task(&mut self, task: Task) -> Result<(), ModelError> {
        check_non_negative("priority", task.priority)?;
        check_non_negative("work_amount", task.work_amount)?;
        if let Some(r) = task.release_date {
            check_non_negative("release_date", r)?;
        }
        if let Some(d) = task.due_date {
            check_non_negative("due_date", d)?;
        }
        match &task.duration {
            DurationSpec::Zero => {}
            DurationSpec::Fixed(d) => check_non_negative("duration", *d)?,
            DurationSpec::Variable { min, max, allowed } => {
                check_non_negative("min_duration", *min)?;
                if let Some(max) = max {
                    if max < min {
                        return Err(ModelError::InconsistentDuration {
                            task: task.name.clone(),
                            detail: format!("min {min} > max {max}"),
                        });
                    }
                }
                if let Some(allowed) = allowed {
                    if allowed.is_empty() {
                        return Err(ModelError::InconsistentDuration {
                            task: task.name.clone(),
                            detail: "empty allowed duration set".into(),
                        });
                    }
                    if let Some(&bad) = allowed.iter().find(|&&d| d < 0) {
                        return Err(ModelError::NegativeValue {
                            what: "allowed duration",
                            value: bad,
                        });
                    }
                }
            }
        }
        for req in &task.requirements {
            if let ResourceRequirement::Select(sel) = req {
                if sel.workers.is_empty() || sel.n > sel.workers.len() {
                    return Err(ModelError::SelectCountOutOfRange {
                        n: sel.n,
                        pool: sel.workers.len(),
                    });
                }
            }
        }
        // A resource backs at most one requirement per task, whether
        // named directly or reachable through a selection pool; a second
        // mention would give the task two busy intervals on the same
        // resource.
        let mut required = HashSet::new();
        for req in &task.requirements {
            let names: Vec<&str> = match req {
                ResourceRequirement::Worker { resource, .. } => vec![resource.as_str()],
                ResourceRequirement::Select(sel) => {
                    sel.workers.iter().map(String::as_str).collect()
                }
            };
            for name in names {
                if !required.insert(name) {
                    return Err(ModelError::DuplicateResourceRequirement {
                        task: task.name.clone(),
                        resource: name.to_string(),
                    });
                }
            }
        }
        self.register("task", &task.name)?;
        // Named selections are registered so resource constraints can
        // reference them.
        for req in &task.requirements {
            if let ResourceRequirement::Select(sel) = req {
                if let Some(sel_name) = &sel.name {
                    self.register("select", sel_name)?;
                }
            }
        }
        self.tasks.push(task);
        Ok(())
    }

    /// Attaches a resource.
    pub fn add_resource(&mut self, resource: Resource) -> Result<(), ModelError> {
        if resource.size < 1 {
            return Err(ModelError::NegativeValue {
                what: "resource size",
                value: resource.size,
            });
        }
        check_non_negative("productivity", resource.productivity)?;
        self.register("resource", &resource.name)?;
        self.resources.push(resource);
        Ok(())
    }

    /// Attaches a buffer.
    pub fn add_buffer(&mut self, buffer: Buffer) -> Result<(), ModelError> {
        if let (Some(lb), Some(ub)) = (buffer.lower_bound, buffer.upper_bound) {
            if lb > ub {
                return Err(ModelError::BufferBounds {
                    buffer: buffer.name.clone(),
                    detail: format!("lower_bound {lb} > upper_bound {ub}"),
                });
            }
        }
        for (what, level) in [
            ("initial_level", buffer.initial_level),
            ("final_level", buffer.final_level),
        ] {
            if let Some(level) = level {
                let below = buffer.lower_bound.is_some_and(|lb| level < lb);
                let above = buffer.upper_bound.is_some_and(|ub| level > ub);
                if below || above {
                    return Err(ModelError::BufferBounds {
                        buffer: buffer.name.clone(),
                        detail: format!("{what} {level} outside bounds"),
                    });
                }
            }
        }
        self.register("buffer", &buffer.name)?;
        self.buffers.push(buffer);
        Ok(())
    }

    /// Attaches a mandatory constraint under an auto-assigned name.
    ///
    /// Returns the assigned name (used in debug-mode unsat cores).
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<String, ModelError> {
        let name = format!("constraint_{}", self.next_uid);
        self.attach_constraint(name.clone(), false, constraint)?;
        Ok(name)
    }

    /// Attaches a mandatory constraint under an explicit name.
    pub fn add_named_constraint(
        &mut self,
        name: impl Into<String>,
        constraint: Constraint,
    ) -> Result<(), ModelError> {
        self.attach_constraint(name.into(), false, constraint)
    }

    /// Attaches an optional constraint; the solver decides whether it
    /// applies (through the generated `applied` boolean).
    pub fn add_optional_constraint(
        &mut self,
        name: impl Into<String>,
        constraint: Constraint,
    ) -> Result<(), ModelError> {
        self.attach_constraint(name.into(), true, constraint)
    }

    fn attach_constraint(
        &mut self,
        name: String,
        optional: bool,
        constraint: Constraint,
    ) -> Result<(), ModelError> {
        self.register("constraint", &name)?;
        self.constraints.push(ConstraintDef {
            name,
            optional,
            constraint,
        });
        Ok(())
    }

    /// Attaches an indicator.
    pub fn add_indicator(&mut self, indicator: Indicator) -> Result<(), ModelError> {
        self.register("indicator", &indicator.name)?;
        self.indicators.push(indicator);
        Ok(())
    }

    /// Attaches an objective.
    pub fn add_objective(&mut self, objective: Objective) -> Result<(), ModelError> {
        if objective.weight < 1 {
            return Err(ModelError::BadObjectiveWeight(objective.weight));
        }
        self.register("objective", &objective.name)?;
        self.objectives.push(objective);
        Ok(())
    }

    /// All tasks, in attachment order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// All resources, in attachment order.
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// All buffers, in attachment order.
    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    /// All attached constraints.
    pub fn constraints(&self) -> &[ConstraintDef] {
        &self.constraints
    }

    /// All indicators.
    pub fn indicators(&self) -> &[Indicator] {
        &self.indicators
    }

    /// All objectives.
    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    /// Looks up a task by name.
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Looks up a resource by name.
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Looks up a buffer by name.
    pub fn buffer(&self, name: &str) -> Option<&Buffer> {
        self.buffers.iter().find(|b| b.name == name)
    }

    /// Looks up an indicator by name.
    pub fn indicator(&self, name: &str) -> Option<&Indicator> {
        self.indicators.iter().find(|i| i.name == name)
    }

    /// Upper bound for the horizon variable when no horizon is fixed.
    ///
    /// Sequential execution of every task after the latest static time
    /// mentioned anywhere in the model is always feasible, so the bound
    /// is the sum of maximum durations plus that anchor.
    pub fn horizon_ceiling(&self) -> i64 {
        if let Some(h) = self.fixed_horizon {
            return h;
        }
        let mut anchor: i64 = 0;
        let mut total: i64 = 0;
        for t in &self.tasks {
            let d = match t.max_duration_hint() {
                Some(d) => d,
                // Unbounded variable duration: minimum plus the work
                // demand is enough for any productivity >= 1.
                None => match &t.duration {
                    DurationSpec::Variable { min, .. } => min + t.work_amount,
                    _ => 0,
                },
            };
            total += d;
            if let Some(r) = t.release_date {
                anchor = anchor.max(r);
            }
            if let Some(due) = t.due_date {
                anchor = anchor.max(due);
            }
        }
        for def in &self.constraints {
            anchor = anchor.max(constraint_time_anchor(&def.constraint));
        }
        (anchor + total).max(1)
    }
}

fn check_non_negative(what: &'static str, value: i64) -> Result<(), ModelError> {
    if value < 0 {
        Err(ModelError::NegativeValue { what, value })
    } else {
        Ok(())
    }
}

/// Largest static time constant a constraint mentions.
fn constraint_time_anchor(c: &Constraint) -> i64 {
    use Constraint::*;
    match c {
        TaskStartAt { value, .. }
        | TaskEndAt { value, .. }
        | TaskStartAfter { value, .. }
        | TaskEndBefore { value, .. } => (*value).max(0),
        TaskPrecedence { offset, .. } => (*offset).max(0),
        UnorderedTaskGroup { window, .. } => window.end.max(0),
        ScheduleNTasksInTimeIntervals { intervals, .. } => {
            intervals.iter().map(|i| i.end).max().unwrap_or(0).max(0)
        }
        WorkLoad { windows, .. } => windows
            .iter()
            .map(|(i, _)| i.end)
            .max()
            .unwrap_or(0)
            .max(0),
        ResourceUnavailable { intervals, .. } => {
            intervals.iter().map(|i| i.end).max().unwrap_or(0).max(0)
        }
        ResourceTasksDistance {
            distance,
            intervals,
            ..
        } => {
            let w = intervals
                .as_ref()
                .map(|is| is.iter().map(|i| i.end).max().unwrap_or(0))
                .unwrap_or(0);
            w.max(*distance).max(0)
        }
        And(children) | Or(children) => children
            .iter()
            .map(constraint_time_anchor)
            .max()
            .unwrap_or(0),
        Xor(a, b) => constraint_time_anchor(a).max(constraint_time_anchor(b)),
        Not(inner) => constraint_time_anchor(inner),
        Implies { then, .. } => then.iter().map(constraint_time_anchor).max().unwrap_or(0),
        IfThenElse {
            then, otherwise, ..
        } => then
            .iter()
            .chain(otherwise)
            .map(constraint_time_anchor)
            .max()
            .unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::buffer::Buffer;
    use crate::models::resource::Resource;

    #[test]
    fn test_duplicate_task_name_rejected() {
        let mut p = Problem::new("p");
        p.add_task(Task::fixed_duration("T1", 1)).unwrap();
        let err = p.add_task(Task::fixed_duration("T1", 2)).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateName { kind: "task", .. }));
    }

    #[test]
    fn test_same_name_different_kind_allowed() {
        let mut p = Problem::new("p");
        p.add_task(Task::fixed_duration("X", 1)).unwrap();
        p.add_resource(Resource::worker("X")).unwrap();
        assert!(p.task("X").is_some());
        assert!(p.resource("X").is_some());
    }

    #[test]
    fn test_uids_are_distinct() {
        let mut p = Problem::new("p");
        p.add_task(Task::fixed_duration("A", 1)).unwrap();
        p.add_task(Task::fixed_duration("B", 1)).unwrap();
        let a = p.uid_of("task", "A").unwrap();
        let b = p.uid_of("task", "B").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let mut p = Problem::new("p");
        let err = p.add_task(Task::fixed_duration("T", -1)).unwrap_err();
        assert!(matches!(err, ModelError::NegativeValue { .. }));
    }

    #[test]
    fn test_inconsistent_variable_duration() {
        let mut p = Problem::new("p");
        let t = Task::variable_duration("V")
            .with_min_duration(5)
            .with_max_duration(2);
        let err = p.add_task(t).unwrap_err();
        assert!(matches!(err, ModelError::InconsistentDuration { .. }));
    }

    #[test]
    fn test_buffer_bounds_crossing() {
        let mut p = Problem::new("p");
        let b = Buffer::concurrent("B")
            .with_lower_bound(5)
            .with_upper_bound(2);
        let err = p.add_buffer(b).unwrap_err();
        assert!(matches!(err, ModelError::BufferBounds { .. }));
    }

    #[test]
    fn test_buffer_initial_outside_bounds() {
        let mut p = Problem::new("p");
        let b = Buffer::concurrent("B")
            .with_lower_bound(0)
            .with_upper_bound(3)
            .with_initial_level(7);
        assert!(p.add_buffer(b).is_err());
    }

    #[test]
    fn test_select_count_out_of_range() {
        use crate::models::resource::{SelectKind, SelectWorkers};
        let mut p = Problem::new("p");
        let t = Task::fixed_duration("T", 1)
            .with_select_workers(SelectWorkers::new(["A", "B"], 3, SelectKind::Exact));
        let err = p.add_task(t).unwrap_err();
        assert!(matches!(err, ModelError::SelectCountOutOfRange { n: 3, pool: 2 }));
    }

    #[test]
    fn test_resource_required_twice_rejected() {
        let mut p = Problem::new("p");
        let t = Task::fixed_duration("T", 2)
            .with_required_resource("W")
            .with_required_resource("W");
        let err = p.add_task(t).unwrap_err();
        match err {
            ModelError::DuplicateResourceRequirement { task, resource } => {
                assert_eq!(task, "T");
                assert_eq!(resource, "W");
            }
            other => panic!("expected duplicate requirement, got {other:?}"),
        }
    }

    #[test]
    fn test_static_and_dynamic_same_resource_rejected() {
        let mut p = Problem::new("p");
        let t = Task::fixed_duration("T", 2)
            .with_required_resource("W")
            .with_dynamic_resource("W");
        let err = p.add_task(t).unwrap_err();
        assert!(matches!(
            err,
            ModelError::DuplicateResourceRequirement { .. }
        ));
    }

    #[test]
    fn test_worker_repeated_in_select_pool_rejected() {
        use crate::models::resource::{SelectKind, SelectWorkers};
        let mut p = Problem::new("p");
        let t = Task::fixed_duration("T", 2)
            .with_required_resource("A")
            .with_select_workers(SelectWorkers::new(["A", "B"], 1, SelectKind::Exact));
        let err = p.add_task(t).unwrap_err();
        assert!(matches!(
            err,
            ModelError::DuplicateResourceRequirement { .. }
        ));
    }

    #[test]
    fn test_objective_weight_validation() {
        let mut p = Problem::new("p");
        p.add_indicator(Indicator::makespan("m")).unwrap();
        let err = p
            .add_objective(Objective::minimize("o", "m").with_weight(0))
            .unwrap_err();
        assert!(matches!(err, ModelError::BadObjectiveWeight(0)));
    }

    #[test]
    fn test_auto_constraint_names_unique() {
        let mut p = Problem::new("p");
        p.add_task(Task::fixed_duration("A", 1)).unwrap();
        let n1 = p.add_constraint(Constraint::task_start_at("A", 0)).unwrap();
        let n2 = p.add_constraint(Constraint::task_start_at("A", 0)).unwrap();
        assert_ne!(n1, n2);
    }

    #[test]
    fn test_horizon_ceiling_sums_durations() {
        let mut p = Problem::new("p");
        p.add_task(Task::fixed_duration("A", 2)).unwrap();
        p.add_task(Task::fixed_duration("B", 2)).unwrap();
        assert_eq!(p.horizon_ceiling(), 4);
    }

    #[test]
    fn test_horizon_ceiling_includes_anchor() {
        let mut p = Problem::new("p");
        p.add_task(Task::fixed_duration("A", 4)).unwrap();
        p.add_constraint(Constraint::task_start_at("A", 1)).unwrap();
        assert_eq!(p.horizon_ceiling(), 5);
    }

    #[test]
    fn test_fixed_horizon_is_ceiling() {
        let mut p = Problem::with_horizon("p", 10);
        p.add_task(Task::fixed_duration("A", 2)).unwrap();
        assert_eq!(p.horizon_ceiling(), 10);
        assert_eq!(p.fixed_horizon(), Some(10));
    }
}
