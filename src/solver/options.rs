//! Solver configuration.

use std::time::Duration;

use crate::smt::OptimizePriority;

/// Optimization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    /// Check-then-tighten loop over a weighted objective sum; works
    /// with every backend.
    Incremental,
    /// Delegate to the backend's optimize facility (lex/box/pareto).
    Optimize,
}

/// Solver options.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Replace every assertion by a selector-guarded implication and
    /// extract a minimal unsat core on failure.
    pub debug: bool,
    /// Wall-clock budget for the whole solve.
    pub max_time: Duration,
    /// Hint the backend to use a parallel portfolio. Does not change
    /// the driver's sequential control flow.
    pub parallel: bool,
    /// Ask the backend for varied model values.
    pub random_values: bool,
    /// Logic hint forwarded to the backend (e.g. `QF_IDL`, `QF_LIA`).
    pub logic: Option<String>,
    /// 0 = quiet, 1 = progress, 2 = chatty.
    pub verbosity: u8,
    /// Optimization strategy.
    pub optimizer: OptimizerKind,
    /// Multi-objective composition in `Optimize` mode.
    pub optimize_priority: OptimizePriority,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            debug: false,
            max_time: Duration::from_secs(60),
            parallel: false,
            random_values: false,
            logic: None,
            verbosity: 0,
            optimizer: OptimizerKind::Incremental,
            optimize_priority: OptimizePriority::Lex,
        }
    }
}

impl SolverOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables debug (unsat-core) mode.
    pub fn with_debug(mut self) -> Self {
        self.debug = true;
        self
    }

    /// Sets the wall-clock budget in seconds.
    pub fn with_max_time_s(mut self, seconds: u64) -> Self {
        self.max_time = Duration::from_secs(seconds);
        self
    }

    /// Sets the wall-clock budget.
    pub fn with_max_time(mut self, budget: Duration) -> Self {
        self.max_time = budget;
        self
    }

    /// Enables the parallel-portfolio hint.
    pub fn with_parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Requests varied model values.
    pub fn with_random_values(mut self) -> Self {
        self.random_values = true;
        self
    }

    /// Sets the logic hint.
    pub fn with_logic(mut self, logic: impl Into<String>) -> Self {
        self.logic = Some(logic.into());
        self
    }

    /// Sets the verbosity level.
    pub fn with_verbosity(mut self, level: u8) -> Self {
        self.verbosity = level;
        self
    }

    /// Selects the optimization strategy.
    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Selects the multi-objective priority mode.
    pub fn with_optimize_priority(mut self, priority: OptimizePriority) -> Self {
        self.optimize_priority = priority;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let o = SolverOptions::default();
        assert!(!o.debug);
        assert_eq!(o.max_time, Duration::from_secs(60));
        assert_eq!(o.optimizer, OptimizerKind::Incremental);
        assert_eq!(o.optimize_priority, OptimizePriority::Lex);
        assert!(o.logic.is_none());
    }

    #[test]
    fn test_builder_chain() {
        let o = SolverOptions::new()
            .with_debug()
            .with_max_time_s(5)
            .with_logic("QF_LIA")
            .with_optimizer(OptimizerKind::Optimize)
            .with_optimize_priority(OptimizePriority::Pareto)
            .with_verbosity(2);
        assert!(o.debug);
        assert_eq!(o.max_time, Duration::from_secs(5));
        assert_eq!(o.logic.as_deref(), Some("QF_LIA"));
        assert_eq!(o.optimizer, OptimizerKind::Optimize);
        assert_eq!(o.optimize_priority, OptimizePriority::Pareto);
        assert_eq!(o.verbosity, 2);
    }
}
