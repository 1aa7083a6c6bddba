//! Resource model.
//!
//! Two atomic resource variants: a [`Worker`] processes at most one task
//! per time period, a cumulative worker hosts up to `size` concurrent
//! tasks. [`SelectWorkers`] is not a resource but a choice node: the
//! encoder introduces one selection boolean per candidate and a
//! cardinality constraint over them.

use serde::{Deserialize, Serialize};

use super::function::Function;

/// An atomic resource consumed by tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique resource name within the problem.
    pub name: String,
    /// Number of tasks the resource can host concurrently (1 = worker).
    pub size: i64,
    /// Work produced per time period when busy.
    pub productivity: i64,
    /// Cost curve over time, used by cost indicators.
    pub cost: Option<Function>,
}

impl Resource {
    /// Creates a worker: one task at a time.
    pub fn worker(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 1,
            productivity: 0,
            cost: None,
        }
    }

    /// Creates a cumulative worker hosting up to `size` concurrent tasks.
    pub fn cumulative_worker(name: impl Into<String>, size: i64) -> Self {
        Self {
            name: name.into(),
            size,
            productivity: 0,
            cost: None,
        }
    }

    /// Sets the productivity (work per period).
    pub fn with_productivity(mut self, productivity: i64) -> Self {
        self.productivity = productivity;
        self
    }

    /// Attaches a cost function.
    pub fn with_cost(mut self, cost: Function) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Whether this resource is a plain (capacity-1) worker.
    pub fn is_worker(&self) -> bool {
        self.size == 1
    }
}

/// Cardinality mode of a [`SelectWorkers`] choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectKind {
    /// Exactly `n` candidates are picked.
    Exact,
    /// At least `n` candidates are picked.
    AtLeast,
    /// At most `n` candidates are picked.
    AtMost,
}

/// A choice of `n` workers among a candidate pool.
///
/// The encoder introduces a boolean per candidate; every clause the task
/// contributes about a candidate is guarded by its selection boolean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectWorkers {
    /// Optional selection name, required only to reference the choice
    /// from `DistinctWorkers`/`SameWorkers` constraints.
    pub name: Option<String>,
    /// Candidate resource names.
    pub workers: Vec<String>,
    /// Cardinality target.
    pub n: usize,
    /// Cardinality mode.
    pub kind: SelectKind,
}

impl SelectWorkers {
    /// Creates a selection of `n` among the given candidates.
    pub fn new<I, S>(workers: I, n: usize, kind: SelectKind) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            workers: workers.into_iter().map(Into::into).collect(),
            n,
            kind,
        }
    }

    /// Names the selection so constraints can reference it.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_builder() {
        let w = Resource::worker("W1")
            .with_productivity(3)
            .with_cost(Function::constant(5));
        assert_eq!(w.name, "W1");
        assert_eq!(w.size, 1);
        assert_eq!(w.productivity, 3);
        assert!(w.is_worker());
        assert_eq!(w.cost, Some(Function::constant(5)));
    }

    #[test]
    fn test_cumulative_worker() {
        let m = Resource::cumulative_worker("M", 3);
        assert_eq!(m.size, 3);
        assert!(!m.is_worker());
        assert_eq!(m.productivity, 0);
    }

    #[test]
    fn test_select_workers() {
        let s = SelectWorkers::new(["A", "B", "C"], 2, SelectKind::AtLeast);
        assert_eq!(s.workers, vec!["A", "B", "C"]);
        assert_eq!(s.n, 2);
        assert_eq!(s.kind, SelectKind::AtLeast);
    }
}
