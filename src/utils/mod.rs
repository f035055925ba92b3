//! Utility modules shared across the analyzer.
//!
//! - Error types
//! - Task id allocation

pub mod errors;
pub mod task_id;

// Re-exports
pub use errors::*;
pub use task_id::{TaskId, TaskIdAllocator};
