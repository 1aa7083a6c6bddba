//! Optimization objectives.
//!
//! An objective targets an indicator with a sense (minimize, maximize,
//! or pin to an exact value) and an integer weight used when several
//! objectives are folded into one weighted sum.

use serde::{Deserialize, Serialize};

/// Optimization sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveKind {
    /// Drive the indicator as low as possible.
    Minimize,
    /// Drive the indicator as high as possible.
    Maximize,
    /// Pin the indicator to a value (a hard equality, not optimized).
    Exact(i64),
}

/// An optimization target over an indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    /// Unique objective name within the problem.
    pub name: String,
    /// Name of the indicator being optimized.
    pub indicator: String,
    /// Optimization sense.
    pub kind: ObjectiveKind,
    /// Weight in the combined objective (>= 1).
    pub weight: i64,
}

impl Objective {
    /// Creates a minimization objective with weight 1.
    pub fn minimize(name: impl Into<String>, indicator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indicator: indicator.into(),
            kind: ObjectiveKind::Minimize,
            weight: 1,
        }
    }

    /// Creates a maximization objective with weight 1.
    pub fn maximize(name: impl Into<String>, indicator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indicator: indicator.into(),
            kind: ObjectiveKind::Maximize,
            weight: 1,
        }
    }

    /// Pins the indicator to an exact value.
    pub fn exact(name: impl Into<String>, indicator: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            indicator: indicator.into(),
            kind: ObjectiveKind::Exact(value),
            weight: 1,
        }
    }

    /// Sets the weight.
    pub fn with_weight(mut self, weight: i64) -> Self {
        self.weight = weight;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objective_builders() {
        let o = Objective::minimize("makespan_obj", "makespan").with_weight(3);
        assert_eq!(o.name, "makespan_obj");
        assert_eq!(o.indicator, "makespan");
        assert_eq!(o.kind, ObjectiveKind::Minimize);
        assert_eq!(o.weight, 3);

        let m = Objective::maximize("late", "smallest_start");
        assert_eq!(m.kind, ObjectiveKind::Maximize);
        assert_eq!(m.weight, 1);

        let e = Objective::exact("pin", "makespan", 21);
        assert_eq!(e.kind, ObjectiveKind::Exact(21));
    }
}
