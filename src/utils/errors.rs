//! Error types for the dependence analysis core.
//!
//! This module defines all error types used throughout the crate,
//! organized by the phase that produces them.

use thiserror::Error;
use std::fmt;

/// Top-level error type for the analyzer.
#[derive(Error, Debug)]
pub enum AutoParError {
    /// Error in the graph substrate
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Error while classifying SCCs
    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    /// Error while partitioning the SCCDAG
    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    /// Internal analyzer error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised by the generic directed-graph substrate.
#[derive(Error, Debug, Clone)]
pub struct GraphError {
    /// The error message
    pub message: String,
    /// The kind of graph error
    pub kind: GraphErrorKind,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphErrorKind {
    /// A node id does not belong to this graph (or was extracted out of it)
    UnknownNode,
    /// An edge id does not belong to this graph
    UnknownEdge,
    /// The extraction pivot is not a member of the extracted node set
    PivotOutsideSet,
}

impl GraphError {
    pub fn new(kind: GraphErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

/// Error raised while classifying SCCs.
///
/// These represent inconsistencies in the input dependence graph (compiler
/// infrastructure bugs), not classification misses: an SCC that merely fails
/// the criteria for a category falls back to the next one silently.
#[derive(Error, Debug, Clone)]
pub struct ClassificationError {
    /// The error message
    pub message: String,
    /// Rendering of the offending SCC (its member instructions)
    pub scc: String,
    /// Header of the loop the SCC belongs to, if known
    pub loop_header: Option<String>,
    /// The kind of classification error
    pub kind: ClassificationErrorKind,
}

impl fmt::Display for ClassificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (SCC: {})", self.message, self.scc)?;
        if let Some(ref header) = self.loop_header {
            write!(f, " (loop header: {})", header)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationErrorKind {
    /// A reducible SCC has no PHI in the header of its loop
    ReductionPhiNotInHeader,
    /// The comparison/branch pair of an induction-variable SCC uses a
    /// predicate and step combination outside the recognized table
    UnrecognizedIvComparison,
    /// An SCC attribute record was requested for an unknown SCC
    UnknownScc,
}

impl ClassificationError {
    pub fn new(
        kind: ClassificationErrorKind,
        message: impl Into<String>,
        scc: impl Into<String>,
        loop_header: Option<String>,
    ) -> Self {
        Self {
            message: message.into(),
            scc: scc.into(),
            loop_header,
            kind,
        }
    }
}

/// Error raised while partitioning the SCCDAG.
#[derive(Error, Debug, Clone)]
pub struct PartitionError {
    /// The error message
    pub message: String,
    /// The kind of partition error
    pub kind: PartitionErrorKind,
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionErrorKind {
    /// A subset id does not name a live subset
    UnknownSubset,
    /// A requested merge would introduce a cycle in the subset DAG
    IllegalMerge,
}

impl PartitionError {
    pub fn new(kind: PartitionErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

/// Result type using AutoParError.
pub type AutoParResult<T> = Result<T, AutoParError>;
