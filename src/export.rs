//! Schedule export.
//!
//! The minimal (de)serialization façade over [`Solution`]: a JSON
//! object carrying the horizon, one record per task, the buffer level
//! timelines and the indicator values. All values are the exact
//! integers of the backend model.

use crate::error::BackendError;
use crate::solution::Solution;

/// Renders a solution as pretty-printed JSON.
pub fn to_json(solution: &Solution) -> String {
    serde_json::to_string_pretty(solution).expect("solution serialization cannot fail")
}

/// Parses a solution back from its JSON export.
pub fn from_json(input: &str) -> Result<Solution, BackendError> {
    serde_json::from_str(input).map_err(|e| BackendError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Constraint, Indicator, Problem, Task};
    use crate::solver::{SchedulingSolver, SolverOptions};

    fn sample_solution() -> Solution {
        let mut p = Problem::with_horizon("export", 10);
        p.add_task(Task::fixed_duration("A", 3)).unwrap();
        p.add_constraint(Constraint::task_start_at("A", 1)).unwrap();
        p.add_indicator(Indicator::makespan("makespan")).unwrap();
        let mut solver = SchedulingSolver::new(&p, SolverOptions::default()).unwrap();
        solver.solve().unwrap()
    }

    #[test]
    fn test_json_round_trip() {
        let solution = sample_solution();
        let json = to_json(&solution);
        let back = from_json(&json).unwrap();
        assert_eq!(solution, back);
    }

    #[test]
    fn test_json_contains_exact_values() {
        let solution = sample_solution();
        let json = to_json(&solution);
        assert!(json.contains("\"horizon\": 10"));
        assert!(json.contains("\"makespan\": 4"));
    }

    #[test]
    fn test_bad_json_rejected() {
        assert!(from_json("{not json").is_err());
    }
}
