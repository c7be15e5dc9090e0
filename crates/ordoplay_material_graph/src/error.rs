// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types shared by the scheduler, generator and persistence layers.

use crate::graph::GraphError;
use crate::node::NodeId;

/// Result alias used throughout the crate
pub type Result<T, E = MaterialError> = std::result::Result<T, E>;

/// Broad category of a [`MaterialError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Dangling references, cycles, unknown node types
    Structural,
    /// A node's own input contract was violated
    Validation,
    /// A root output has the wrong shape
    OutputContract,
    /// The persistence capability failed
    Io,
}

/// Error raised while scheduling, compiling or persisting a material
#[derive(Debug, thiserror::Error)]
pub enum MaterialError {
    /// A node input points at a node that does not exist
    #[error("dangling reference: '{consumer}' references missing node '{missing}'")]
    DanglingReference {
        /// Name of the consuming node or root output
        consumer: String,
        /// Name (or handle) of the missing producer
        missing: String,
    },

    /// A node input selects an output the producer does not have
    #[error("'{consumer}' references output {index} of node '{producer}', which has {count} output(s)")]
    InvalidOutput {
        /// Name of the consuming node or root output
        consumer: String,
        /// Name of the producer
        producer: String,
        /// Requested output index
        index: usize,
        /// Number of outputs the producer declares
        count: usize,
    },

    /// The dependency walk found a cycle
    #[error("infinite loop: node '{consumer}' depends on node '{producer}', which depends back on '{consumer}'")]
    InfiniteLoop {
        /// Node whose input closes the cycle
        consumer: String,
        /// Node that is already being visited
        producer: String,
    },

    /// A persisted record names a node type the catalogue does not know
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    /// Graph construction failed
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A node rejected its own inputs
    #[error("node '{name}': {message}")]
    Validation {
        /// Handle of the failing node
        node: NodeId,
        /// Name of the failing node
        name: String,
        /// Node-specific message
        message: String,
    },

    /// A root output resolved to the wrong size
    #[error("{output} must be size {expected}, found size {actual}")]
    OutputSize {
        /// Description of the root output
        output: String,
        /// Required size
        expected: usize,
        /// Resolved size
        actual: usize,
    },

    /// Two root outputs of the same stage share a name
    #[error("duplicate {stage} output name '{name}'")]
    DuplicateOutput {
        /// Stage list the duplicate was found in
        stage: &'static str,
        /// Repeated name
        name: String,
    },

    /// Root output name is not usable as a shader identifier
    #[error("invalid output name '{0}'")]
    InvalidOutputName(String),

    /// A root output shares its name with another declaration of the stage
    #[error("{output} collides with a {other} of the same name")]
    NameConflict {
        /// Description of the root output
        output: String,
        /// What the name is already used by
        other: &'static str,
    },

    /// A vertex attribute, geometry output or geometry uniform is malformed
    #[error("{what} '{name}' {reason}")]
    InvalidInterface {
        /// Kind of declaration
        what: &'static str,
        /// Declared name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Geometry compile requested for data that cannot produce a stage
    #[error("geometry shader requires a non-empty body and max_vertices > 0")]
    InvalidGeometryShader,

    /// The persistence capability failed
    #[error("{0}")]
    Io(String),

    /// Breadcrumb added by a calling layer
    #[error("{context}: {source}")]
    Context {
        /// Context prepended by the caller
        context: String,
        /// Underlying error
        source: Box<MaterialError>,
    },
}

impl MaterialError {
    /// Wrap this error with caller context
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create an IO error from any displayable error
    pub fn io(error: impl std::fmt::Display) -> Self {
        Self::Io(error.to_string())
    }

    /// The innermost error, with all context stripped
    pub fn root_cause(&self) -> &MaterialError {
        match self {
            Self::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Category of the underlying failure
    pub fn kind(&self) -> ErrorKind {
        match self.root_cause() {
            Self::DanglingReference { .. }
            | Self::InvalidOutput { .. }
            | Self::InfiniteLoop { .. }
            | Self::UnknownNodeType(_) => ErrorKind::Structural,
            Self::Graph(error) => error.kind(),
            Self::Validation { .. } => ErrorKind::Validation,
            Self::OutputSize { .. }
            | Self::DuplicateOutput { .. }
            | Self::InvalidOutputName(_)
            | Self::NameConflict { .. }
            | Self::InvalidInterface { .. }
            | Self::InvalidGeometryShader => ErrorKind::OutputContract,
            Self::Io(_) | Self::Context { .. } => ErrorKind::Io,
        }
    }

    /// Handle of the node that failed validation, if any
    pub fn node(&self) -> Option<NodeId> {
        match self.root_cause() {
            Self::Validation { node, .. } => Some(*node),
            _ => None,
        }
    }
}
