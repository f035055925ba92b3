//! Monotonic task identifier allocation.
//!
//! Downstream parallelization schemes name the tasks they derive from
//! partition subsets. Ids must be unique within one allocator; the allocator
//! is an owned object handed down the pipeline rather than static state.

use serde::{Serialize, Deserialize};

/// A unique identifier for a generated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task_{}", self.0)
    }
}

/// Allocator of task ids, monotonically increasing.
#[derive(Debug, Default)]
pub struct TaskIdAllocator {
    next: u64,
}

impl TaskIdAllocator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn next(&mut self) -> TaskId {
        let id = TaskId(self.next);
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_are_unique_and_ordered() {
        let mut alloc = TaskIdAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(a.to_string(), "task_0");
    }
}
