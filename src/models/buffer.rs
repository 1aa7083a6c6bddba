//! Buffer model.
//!
//! A buffer holds an integer level that changes at discrete instants:
//! a task unloads a quantity at its start and loads a quantity at its
//! end. The level timeline is piecewise constant and must stay within
//! the configured bounds at every event instant.

use serde::{Deserialize, Serialize};

/// Concurrency policy of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferKind {
    /// Load/unload events of different tasks may coincide in time.
    Concurrent,
    /// Load/unload events of different tasks must happen at distinct
    /// instants.
    NonConcurrent,
}

/// An integer-level buffer fed and drained by tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buffer {
    /// Unique buffer name within the problem.
    pub name: String,
    /// Concurrency policy.
    pub kind: BufferKind,
    /// Level at time 0.
    pub initial_level: Option<i64>,
    /// Required level at the horizon.
    pub final_level: Option<i64>,
    /// Minimum admissible level.
    pub lower_bound: Option<i64>,
    /// Maximum admissible level.
    pub upper_bound: Option<i64>,
}

impl Buffer {
    /// Creates a concurrent buffer.
    pub fn concurrent(name: impl Into<String>) -> Self {
        Self::new(name, BufferKind::Concurrent)
    }

    /// Creates a non-concurrent buffer.
    pub fn non_concurrent(name: impl Into<String>) -> Self {
        Self::new(name, BufferKind::NonConcurrent)
    }

    fn new(name: impl Into<String>, kind: BufferKind) -> Self {
        Self {
            name: name.into(),
            kind,
            initial_level: None,
            final_level: None,
            lower_bound: None,
            upper_bound: None,
        }
    }

    /// Sets the level at time 0.
    pub fn with_initial_level(mut self, level: i64) -> Self {
        self.initial_level = Some(level);
        self
    }

    /// Requires the level at the horizon.
    pub fn with_final_level(mut self, level: i64) -> Self {
        self.final_level = Some(level);
        self
    }

    /// Sets the minimum admissible level.
    pub fn with_lower_bound(mut self, bound: i64) -> Self {
        self.lower_bound = Some(bound);
        self
    }

    /// Sets the maximum admissible level.
    pub fn with_upper_bound(mut self, bound: i64) -> Self {
        self.upper_bound = Some(bound);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_builder() {
        let b = Buffer::concurrent("B1")
            .with_initial_level(5)
            .with_final_level(2)
            .with_lower_bound(0)
            .with_upper_bound(10);
        assert_eq!(b.name, "B1");
        assert_eq!(b.kind, BufferKind::Concurrent);
        assert_eq!(b.initial_level, Some(5));
        assert_eq!(b.final_level, Some(2));
        assert_eq!(b.lower_bound, Some(0));
        assert_eq!(b.upper_bound, Some(10));
    }

    #[test]
    fn test_non_concurrent() {
        let b = Buffer::non_concurrent("B2");
        assert_eq!(b.kind, BufferKind::NonConcurrent);
        assert!(b.initial_level.is_none());
    }
}
