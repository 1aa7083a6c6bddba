//! Error types.
//!
//! Four error families, one per lifecycle stage:
//! - [`ModelError`]: raised while building entities or attaching them to
//!   a problem (duplicate names, inconsistent bounds, bad coefficients).
//! - [`EncodeError`]: raised while compiling the problem to SMT
//!   assertions (dangling references, impossible encodings).
//! - [`BackendError`]: solver-level I/O or API failures.
//! - [`SolveError`]: the solver verdicts that carry no schedule.

use thiserror::Error;

/// Errors detected while constructing the model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Two entities of the same kind share a name within one problem.
    #[error("duplicate {kind} name: '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    /// A negative value where a non-negative integer is required.
    #[error("{what} must be a non-negative integer, got {value}")]
    NegativeValue { what: &'static str, value: i64 },

    /// Variable duration bounds with `min > max`, or an empty allowed set.
    #[error("inconsistent duration bounds for task '{task}': {detail}")]
    InconsistentDuration { task: String, detail: String },

    /// Buffer `lower_bound > upper_bound`, or initial/final level outside bounds.
    #[error("buffer '{buffer}' bounds are inconsistent: {detail}")]
    BufferBounds { buffer: String, detail: String },

    /// `SelectWorkers` with `n` larger than the candidate pool (or zero pool).
    #[error("select-workers over {pool} candidates cannot pick {n}")]
    SelectCountOutOfRange { n: usize, pool: usize },

    /// The same resource is required more than once by one task.
    #[error("resource '{resource}' is required more than once by task '{task}'")]
    DuplicateResourceRequirement { task: String, resource: String },

    /// Polynomial whose antiderivative is not integer-coefficient.
    #[error("polynomial coefficient {coefficient} of degree {degree} is not divisible by {divisor}; the integral would not be integer-exact")]
    NonIntegerCoefficient {
        coefficient: i64,
        degree: usize,
        divisor: i64,
    },

    /// Objective weight below 1.
    #[error("objective weight must be >= 1, got {0}")]
    BadObjectiveWeight(i64),
}

/// Errors detected while lowering the problem to SMT assertions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// A constraint or objective references an entity the problem does not own.
    #[error("{referrer} references unknown {kind} '{name}'")]
    UnknownReference {
        referrer: String,
        kind: &'static str,
        name: String,
    },

    /// An objective references an indicator not attached to the problem.
    #[error("objective '{objective}' references indicator '{indicator}' which is not part of the problem")]
    DanglingIndicator { objective: String, indicator: String },

    /// A fixed horizon is required for this construct but none was given.
    #[error("{what} requires a fixed horizon")]
    HorizonRequired { what: &'static str },
}

/// Failures at the SMT backend boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Child process could not be spawned or died unexpectedly.
    #[error("backend process error: {0}")]
    Process(String),

    /// The backend produced a response we could not parse.
    #[error("unparsable backend response: {0}")]
    Parse(String),

    /// The requested operation is not supported by this backend.
    #[error("backend does not support {0}")]
    Unsupported(&'static str),

    /// A variable was used before being declared.
    #[error("undeclared variable '{0}'")]
    Undeclared(String),
}

/// Solver verdicts that do not produce a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    /// The assertion set is unsatisfiable. In debug mode the minimal core
    /// of constraint names is attached.
    #[error("problem is unsatisfiable")]
    Unsat { core: Option<Vec<String>> },

    /// The backend could not reach a verdict.
    #[error("solver returned unknown")]
    Unknown,

    /// The deadline elapsed before any schedule was found.
    #[error("solve timed out before a first schedule was found")]
    Timeout,

    /// The solve was interrupted through the cancellation token.
    #[error("solve was interrupted")]
    Interrupt,

    /// Encoding failed.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_display() {
        let e = ModelError::DuplicateName {
            kind: "task",
            name: "T1".into(),
        };
        assert_eq!(e.to_string(), "duplicate task name: 'T1'");
    }

    #[test]
    fn test_solve_error_wraps_encode() {
        let e: SolveError = EncodeError::HorizonRequired { what: "workload" }.into();
        assert!(matches!(e, SolveError::Encode(_)));
    }

    #[test]
    fn test_unsat_carries_core() {
        let e = SolveError::Unsat {
            core: Some(vec!["c1".into(), "c2".into()]),
        };
        match e {
            SolveError::Unsat { core: Some(core) } => assert_eq!(core.len(), 2),
            _ => panic!("wrong variant"),
        }
    }
}
