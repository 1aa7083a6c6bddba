//! Task model.
//!
//! A task is an interval on the integer timeline with `start`, `end` and
//! `duration` decision variables bound by `end = start + duration`.
//! Duration policy is a variant: pinned to zero, fixed, or left to the
//! solver within bounds / an allowed set.
//!
//! Optional tasks carry an extra `scheduled` boolean; every constraint
//! that mentions the task is guarded by it, and an unscheduled task is
//! reported with no interval at all.

use serde::{Deserialize, Serialize};

use super::resource::SelectWorkers;

/// Duration policy of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationSpec {
    /// An instant: `duration = 0`, `start = end`.
    Zero,
    /// `duration` pinned to a constant.
    Fixed(i64),
    /// `min <= duration <= max` (max defaults to the horizon), or
    /// membership in an explicit allowed set.
    Variable {
        min: i64,
        max: Option<i64>,
        allowed: Option<Vec<i64>>,
    },
}

/// A resource demand attached to a task.
///
/// References resources by name; the encoder resolves them against the
/// owning problem. `dynamic` workers may join after the task has
/// started, contributing work only from their join instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceRequirement {
    /// One concrete worker (or cumulative worker), required.
    Worker { resource: String, dynamic: bool },
    /// A combinatorial choice of `n` workers among candidates.
    Select(SelectWorkers),
}

/// A task to be scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task name within the problem.
    pub name: String,
    /// Duration policy.
    pub duration: DurationSpec,
    /// Whether the solver may leave this task unscheduled.
    pub optional: bool,
    /// Earliest allowed start.
    pub release_date: Option<i64>,
    /// Target completion time.
    pub due_date: Option<i64>,
    /// When true the due date is a hard deadline (`end <= due_date`);
    /// otherwise it only feeds lateness/tardiness indicators.
    pub due_date_is_deadline: bool,
    /// Weight for priority objectives (higher = more important).
    pub priority: i64,
    /// Work demand to be covered by assigned resource productivities.
    pub work_amount: i64,
    /// Required resource assignments.
    pub requirements: Vec<ResourceRequirement>,
}

impl Task {
    fn new(name: impl Into<String>, duration: DurationSpec) -> Self {
        Self {
            name: name.into(),
            duration,
            optional: false,
            release_date: None,
            due_date: None,
            due_date_is_deadline: false,
            priority: 0,
            work_amount: 0,
            requirements: Vec::new(),
        }
    }

    /// Creates a zero-duration task (a milestone).
    pub fn zero_duration(name: impl Into<String>) -> Self {
        Self::new(name, DurationSpec::Zero)
    }

    /// Creates a task with a fixed duration.
    pub fn fixed_duration(name: impl Into<String>, duration: i64) -> Self {
        Self::new(name, DurationSpec::Fixed(duration))
    }

    /// Creates a task whose duration is decided by the solver.
    pub fn variable_duration(name: impl Into<String>) -> Self {
        Self::new(
            name,
            DurationSpec::Variable {
                min: 0,
                max: None,
                allowed: None,
            },
        )
    }

    /// Marks the task as optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Sets the minimum duration (variable-duration tasks).
    pub fn with_min_duration(mut self, min: i64) -> Self {
        if let DurationSpec::Variable { min: m, .. } = &mut self.duration {
            *m = min;
        }
        self
    }

    /// Sets the maximum duration (variable-duration tasks).
    pub fn with_max_duration(mut self, max: i64) -> Self {
        if let DurationSpec::Variable { max: m, .. } = &mut self.duration {
            *m = Some(max);
        }
        self
    }

    /// Restricts the duration to an explicit set of values.
    pub fn with_allowed_durations(mut self, allowed: Vec<i64>) -> Self {
        if let DurationSpec::Variable { allowed: a, .. } = &mut self.duration {
            *a = Some(allowed);
        }
        self
    }

    /// Sets the release date (earliest start).
    pub fn with_release_date(mut self, release: i64) -> Self {
        self.release_date = Some(release);
        self
    }

    /// Sets a soft due date, observed by lateness indicators only.
    pub fn with_due_date(mut self, due: i64) -> Self {
        self.due_date = Some(due);
        self.due_date_is_deadline = false;
        self
    }

    /// Sets a hard deadline (`end <= due`).
    pub fn with_deadline(mut self, due: i64) -> Self {
        self.due_date = Some(due);
        self.due_date_is_deadline = true;
        self
    }

    /// Sets the priority weight.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the work amount.
    pub fn with_work_amount(mut self, work: i64) -> Self {
        self.work_amount = work;
        self
    }

    /// Requires a concrete resource for the whole task interval.
    pub fn with_required_resource(mut self, resource: impl Into<String>) -> Self {
        self.requirements.push(ResourceRequirement::Worker {
            resource: resource.into(),
            dynamic: false,
        });
        self
    }

    /// Requires several concrete resources, all for the whole interval.
    pub fn with_required_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for r in resources {
            self = self.with_required_resource(r);
        }
        self
    }

    /// Requires a resource that may join after the task start.
    pub fn with_dynamic_resource(mut self, resource: impl Into<String>) -> Self {
        self.requirements.push(ResourceRequirement::Worker {
            resource: resource.into(),
            dynamic: true,
        });
        self
    }

    /// Requires `n` workers chosen among candidates.
    pub fn with_select_workers(mut self, select: SelectWorkers) -> Self {
        self.requirements.push(ResourceRequirement::Select(select));
        self
    }

    /// Maximum duration this task can take, if statically known.
    pub fn max_duration_hint(&self) -> Option<i64> {
        match &self.duration {
            DurationSpec::Zero => Some(0),
            DurationSpec::Fixed(d) => Some(*d),
            DurationSpec::Variable { max, allowed, .. } => match (allowed, max) {
                (Some(set), _) => set.iter().copied().max(),
                (None, Some(m)) => Some(*m),
                (None, None) => None,
            },
        }
    }

    /// Names of all concrete resources this task may end up using.
    pub fn candidate_resources(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for req in &self.requirements {
            match req {
                ResourceRequirement::Worker { resource, .. } => out.push(resource.as_str()),
                ResourceRequirement::Select(sel) => {
                    out.extend(sel.workers.iter().map(|s| s.as_str()))
                }
            }
        }
        out
    }
}
