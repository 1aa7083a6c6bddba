//! Performance indicators.
//!
//! An indicator is a named integer expression observed in the solution
//! and optionally bounded to tighten the search. Besides free-form
//! expressions, the usual scheduling metrics are available as built-in
//! templates expanded by the encoder.
//!
//! | Template | Definition |
//! |----------|-----------|
//! | Makespan | max end over scheduled tasks |
//! | Flowtime | sum of ends over scheduled tasks |
//! | Tardiness | sum of max(0, end - due_date) |
//! | Earliness | sum of max(0, due_date - end) |
//! | MaximumLateness | max(end - due_date) |
//! | NumberOfTardyTasks | count of end > due_date |
//! | ResourceUtilization | 100 * busy time / horizon |
//! | ResourceCost | integral of cost curves over busy windows |

use serde::{Deserialize, Serialize};

use super::constraint::TimeInterval;
use super::expr::IntExpr;

/// The expression an indicator evaluates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndicatorExpr {
    /// A free-form integer expression.
    Expression(IntExpr),
    /// Latest end over scheduled tasks.
    Makespan,
    /// Sum of ends over scheduled tasks.
    Flowtime,
    /// Sum of ends of tasks using a resource, within an optional window.
    FlowtimeSingleResource {
        resource: String,
        interval: Option<TimeInterval>,
    },
    /// Sum of positive lateness over tasks with a due date.
    Tardiness,
    /// Sum of positive earliness over tasks with a due date.
    Earliness,
    /// Largest `end - due_date` over tasks with a due date.
    MaximumLateness,
    /// Count of tasks finishing after their due date.
    NumberOfTardyTasks,
    /// `100 * busy periods / horizon`, integer-rounded.
    ResourceUtilization { resource: String },
    /// Count of tasks actually assigned to the resource.
    NumberTasksAssigned { resource: String },
    /// Total cost of the given resources over their busy windows.
    ResourceCost { resources: Vec<String> },
    /// Sum of priority-weighted ends over scheduled tasks.
    PriorityWeightedEnds,
    /// Earliest start over scheduled tasks; maximize to schedule as
    /// late as possible.
    SmallestStartTime,
    /// Latest start over scheduled tasks; minimize to schedule as
    /// early as possible.
    LargestStartTime,
    /// Largest buffer level over the event instants.
    MaxBufferLevel { buffer: String },
    /// Smallest buffer level over the event instants.
    MinBufferLevel { buffer: String },
}

/// A named, observable integer quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    /// Unique indicator name within the problem.
    pub name: String,
    /// What the indicator measures.
    pub expr: IndicatorExpr,
    /// Optional `(lower, upper)` bounds asserted on the value.
    pub bounds: Option<(i64, i64)>,
}

impl Indicator {
    /// Creates an indicator from a free-form expression.
    pub fn new(name: impl Into<String>, expr: IntExpr) -> Self {
        Self {
            name: name.into(),
            expr: IndicatorExpr::Expression(expr),
            bounds: None,
        }
    }

    /// Creates an indicator from a built-in template.
    pub fn template(name: impl Into<String>, expr: IndicatorExpr) -> Self {
        Self {
            name: name.into(),
            expr,
            bounds: None,
        }
    }

    /// Creates the makespan indicator.
    pub fn makespan(name: impl Into<String>) -> Self {
        Self::template(name, IndicatorExpr::Makespan)
    }

    /// Creates the flowtime indicator.
    pub fn flowtime(name: impl Into<String>) -> Self {
        Self::template(name, IndicatorExpr::Flowtime)
    }

    /// Creates the total-tardiness indicator.
    pub fn tardiness(name: impl Into<String>) -> Self {
        Self::template(name, IndicatorExpr::Tardiness)
    }

    /// Creates a resource-utilization indicator.
    pub fn resource_utilization(name: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::template(
            name,
            IndicatorExpr::ResourceUtilization {
                resource: resource.into(),
            },
        )
    }

    /// Creates a resource-cost indicator.
    pub fn resource_cost<I, S>(name: impl Into<String>, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::template(
            name,
            IndicatorExpr::ResourceCost {
                resources: resources.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// Bounds the indicator value to `[lower, upper]`.
    pub fn with_bounds(mut self, lower: i64, upper: i64) -> Self {
        self.bounds = Some((lower, upper));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::expr::task_end;

    #[test]
    fn test_expression_indicator() {
        let i = Indicator::new("gap", task_end("B").minus(task_end("A"))).with_bounds(0, 100);
        assert_eq!(i.name, "gap");
        assert_eq!(i.bounds, Some((0, 100)));
        assert!(matches!(i.expr, IndicatorExpr::Expression(_)));
    }

    #[test]
    fn test_template_constructors() {
        assert!(matches!(
            Indicator::makespan("m").expr,
            IndicatorExpr::Makespan
        ));
        assert!(matches!(
            Indicator::flowtime("f").expr,
            IndicatorExpr::Flowtime
        ));
        assert!(matches!(
            Indicator::tardiness("t").expr,
            IndicatorExpr::Tardiness
        ));
        match Indicator::resource_utilization("u", "W1").expr {
            IndicatorExpr::ResourceUtilization { resource } => assert_eq!(resource, "W1"),
            _ => panic!("wrong variant"),
        }
    }
}
